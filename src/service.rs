//! Service runtime
//!
//! Wires the scheduler, engine, outage monitor and presenter together and runs
//! the two poll loops until shutdown is requested.

use crate::api::EdfApi;
use crate::calendar::reference_datetime;
use crate::config::Config;
use crate::engine::{AggregationOptions, ConsumptionSummary, aggregate};
use crate::error::{LinkydError, Result};
use crate::logging::{LogContext, StructuredLogger, get_logger_with_context};
use crate::outage::OutageMonitor;
use crate::presentation::{EntityState, Presenter};
use crate::scheduler::{FetchScheduler, RefreshState, SchedulerSettings, SchedulerState};
use crate::store::Granularity;
use chrono::{NaiveDateTime, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio::time::{Duration, MissedTickBehavior, interval};

/// Snapshot served by the health endpoint
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub version: &'static str,
    pub scheduler: SchedulerState,
    pub refresh: RefreshState,
    pub hourly_readings: usize,
    pub daily_readings: usize,
    pub monthly_readings: usize,
    pub outage_enabled: bool,
    pub outage_stale: bool,
    pub last_error: Option<String>,
}

pub struct Service {
    config: Config,
    tz: Tz,
    scheduler: FetchScheduler,
    outage: OutageMonitor,
    presenter: Presenter,
    options: AggregationOptions,
    summary_tx: watch::Sender<ConsumptionSummary>,
    last_error: Mutex<Option<String>>,
    shutdown_tx: watch::Sender<bool>,
    logger: StructuredLogger,
}

impl Service {
    pub fn new(config: Config, api: Arc<dyn EdfApi>) -> Result<Self> {
        config.validate()?;
        let tz = config.tz()?;
        let (summary_tx, _) = watch::channel(ConsumptionSummary::default());
        let (shutdown_tx, _) = watch::channel(false);
        let logger = get_logger_with_context(
            LogContext::new("service").with_pdl(&config.api.pdl_id),
        );
        Ok(Self {
            tz,
            scheduler: FetchScheduler::new(api.clone(), SchedulerSettings::from(&config)),
            outage: OutageMonitor::new(api, config.outage.stale_after_minutes),
            presenter: Presenter::new(&config.api.pdl_id, &config.api.insee_code),
            options: AggregationOptions::from(&config),
            summary_tx,
            last_error: Mutex::new(None),
            shutdown_tx,
            logger,
            config,
        })
    }

    pub const fn config(&self) -> &Config {
        &self.config
    }

    pub const fn scheduler(&self) -> &FetchScheduler {
        &self.scheduler
    }

    pub const fn outage(&self) -> &OutageMonitor {
        &self.outage
    }

    /// Wall clock in the configured timezone, as naive local time
    pub fn now(&self) -> NaiveDateTime {
        Utc::now().with_timezone(&self.tz).naive_local()
    }

    pub fn summary(&self) -> ConsumptionSummary {
        self.summary_tx.borrow().clone()
    }

    pub fn subscribe_summary(&self) -> watch::Receiver<ConsumptionSummary> {
        self.summary_tx.subscribe()
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().ok().and_then(|e| e.clone())
    }

    fn set_last_error(&self, error: Option<String>) {
        if let Ok(mut slot) = self.last_error.lock() {
            *slot = error;
        }
    }

    fn reaggregate(&self, now: NaiveDateTime) {
        let reference = reference_datetime(now, self.config.data.day_offset);
        let store = self.scheduler.store();
        let previous = self.summary();
        let next = aggregate(&store, reference, &previous, self.options);
        self.summary_tx.send_replace(next);
    }

    /// One data poll: refresh if due, then recompute the summary
    pub async fn data_tick(&self, now: NaiveDateTime) -> Result<()> {
        match self.scheduler.refresh(now).await {
            Ok(outcome) => {
                if !outcome.is_cache_hit() {
                    self.set_last_error(None);
                }
                self.reaggregate(now);
                Ok(())
            }
            // Another refresh is running and will publish for us
            Err(LinkydError::Busy) => Ok(()),
            Err(e) => {
                self.set_last_error(Some(e.to_string()));
                Err(e)
            }
        }
    }

    /// Refresh now, ignoring the daily schedule
    pub async fn force_refresh(&self) -> Result<()> {
        let now = self.now();
        match self.scheduler.force_refresh(now).await {
            Ok(_) => {
                self.set_last_error(None);
                self.reaggregate(now);
                Ok(())
            }
            Err(LinkydError::Busy) => Err(LinkydError::Busy),
            Err(e) => {
                self.set_last_error(Some(e.to_string()));
                Err(e)
            }
        }
    }

    pub async fn outage_tick(&self, now: NaiveDateTime) -> Result<()> {
        self.outage.poll(now).await.map(|_| ())
    }

    pub fn sensors(&self) -> Vec<EntityState> {
        let updated_at = self.scheduler.refresh_state().last_successful_fetch;
        self.presenter.consumption_sensors(&self.summary(), updated_at)
    }

    pub fn linky_card(&self) -> EntityState {
        self.presenter
            .linky_card(&self.summary(), self.last_error().as_deref())
    }

    pub fn outage_entity(&self) -> EntityState {
        let snapshot = self.outage.latest();
        self.presenter
            .outage_sensor(snapshot.as_ref(), self.outage.is_stale(self.now()))
    }

    /// Every exposed entity
    pub fn entities(&self) -> Vec<EntityState> {
        let mut all = self.sensors();
        all.push(self.linky_card());
        if self.config.outage.enabled {
            all.push(self.outage_entity());
        }
        all
    }

    pub fn health(&self) -> HealthReport {
        let store = self.scheduler.store();
        HealthReport {
            version: env!("APP_VERSION"),
            scheduler: self.scheduler.state(),
            refresh: self.scheduler.refresh_state(),
            hourly_readings: store.len(Granularity::Hourly),
            daily_readings: store.len(Granularity::Daily),
            monthly_readings: store.len(Granularity::Monthly),
            outage_enabled: self.config.outage.enabled,
            outage_stale: self.config.outage.enabled && self.outage.is_stale(self.now()),
            last_error: self.last_error(),
        }
    }

    /// Ask both poll loops to stop
    pub fn request_shutdown(&self) {
        self.shutdown_tx.send_replace(true);
    }

    pub fn subscribe_shutdown(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    async fn data_loop(&self) {
        let mut shutdown = self.shutdown_tx.subscribe();
        let period = Duration::from_secs(self.config.polling.data_interval_minutes.max(1) * 60);
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        while !*shutdown.borrow() {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.data_tick(self.now()).await {
                        self.logger.error(&format!("Data update failed: {}", e));
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
    }

    async fn outage_loop(&self) {
        if !self.config.outage.enabled {
            self.logger.info("Outage monitoring disabled");
            return;
        }
        let mut shutdown = self.shutdown_tx.subscribe();
        let period = Duration::from_secs(self.config.polling.outage_interval_minutes.max(1) * 60);
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        while !*shutdown.borrow() {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.outage_tick(self.now()).await {
                        self.logger.error(&format!("Outage update failed: {}", e));
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
    }

    /// Run both loops until [`Service::request_shutdown`]
    pub async fn run(&self) {
        self.logger.info(&format!(
            "Polling data every {} min, outages every {} min (timezone {})",
            self.config.polling.data_interval_minutes,
            self.config.polling.outage_interval_minutes,
            self.tz
        ));
        tokio::join!(self.data_loop(), self.outage_loop());
        self.logger.info("Poll loops stopped");
    }
}
