//! Fetch scheduler
//!
//! Decides on every data tick whether the once-a-day refresh is due, works
//! out which ranges to request and rebuilds the [`ReadingStore`] from scratch.
//! The new store is assembled off to the side and published only once every
//! fetch has succeeded, so a failed refresh leaves the previous store in place.

use crate::api::EdfApi;
use crate::calendar::{YearMonth, reference_datetime};
use crate::config::Config;
use crate::error::{LinkydError, Result};
use crate::logging::{LogContext, StructuredLogger, get_logger_with_context};
use crate::store::ReadingStore;
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

/// Bookkeeping carried from one tick to the next
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RefreshState {
    pub last_successful_fetch: Option<NaiveDateTime>,
    pub next_due: Option<NaiveDateTime>,
}

impl RefreshState {
    /// Never refreshed, or `now` has reached `next_due`
    pub fn is_due(&self, now: NaiveDateTime) -> bool {
        self.next_due.is_none_or(|due| now >= due)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerState {
    Idle,
    Refreshing,
}

/// What a refresh tick ended up doing
#[derive(Debug, Clone)]
pub enum RefreshOutcome {
    /// Not due yet; no request was made
    CacheHit(Arc<ReadingStore>),
    /// A complete new store was fetched and published
    Refreshed(Arc<ReadingStore>),
}

impl RefreshOutcome {
    pub fn store(&self) -> &Arc<ReadingStore> {
        match self {
            Self::CacheHit(store) | Self::Refreshed(store) => store,
        }
    }

    pub const fn is_cache_hit(&self) -> bool {
        matches!(self, Self::CacheHit(_))
    }
}

/// Ranges requested by one refresh, in issue order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchPlan {
    /// Whole calendar months of daily + half-hour data
    pub daily_ranges: Vec<(NaiveDate, NaiveDate)>,
    /// Monthly summaries, when extended aggregates are on
    pub monthly_range: Option<(YearMonth, YearMonth)>,
}

impl FetchPlan {
    /// Plan the requests needed to cover `reference - lookback_days ..= reference`
    pub fn for_reference(reference: NaiveDate, lookback_days: u32, extended: bool) -> Self {
        let start_month = YearMonth::of(reference - Duration::days(i64::from(lookback_days)));
        let end_month = YearMonth::of(reference);

        let mut daily_ranges = vec![(start_month.first_day(), start_month.last_day())];
        if end_month != start_month {
            daily_ranges.push((end_month.first_day(), end_month.last_day()));
        }

        let monthly_range = extended.then(|| (end_month.add_months(-13), end_month.add_months(1)));

        Self {
            daily_ranges,
            monthly_range,
        }
    }

    pub fn request_count(&self) -> usize {
        self.daily_ranges.len() + usize::from(self.monthly_range.is_some())
    }
}

/// Scheduler parameters lifted out of [`Config`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerSettings {
    pub day_offset: u32,
    pub lookback_days: u32,
    pub extended_aggregates_enabled: bool,
    pub refresh_hour: u32,
}

impl From<&Config> for SchedulerSettings {
    fn from(cfg: &Config) -> Self {
        Self {
            day_offset: cfg.data.day_offset,
            lookback_days: cfg.effective_lookback_days(),
            extended_aggregates_enabled: cfg.data.extended_aggregates_enabled,
            refresh_hour: cfg.data.refresh_hour,
        }
    }
}

impl SchedulerSettings {
    /// Tomorrow at the configured hour
    pub fn next_due_after(&self, now: NaiveDateTime) -> NaiveDateTime {
        let time = NaiveTime::from_hms_opt(self.refresh_hour.min(23), 0, 0).unwrap_or(NaiveTime::MIN);
        (now.date() + Duration::days(1)).and_time(time)
    }

    pub fn plan(&self, now: NaiveDateTime) -> FetchPlan {
        let reference = reference_datetime(now, self.day_offset).date();
        FetchPlan::for_reference(reference, self.lookback_days, self.extended_aggregates_enabled)
    }
}

/// Clears the busy flag when a refresh ends, however it ends
struct BusyGuard<'a>(&'a AtomicBool);

impl<'a> BusyGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Single writer of the reading store
pub struct FetchScheduler {
    api: Arc<dyn EdfApi>,
    settings: SchedulerSettings,
    state: Mutex<RefreshState>,
    busy: AtomicBool,
    store_tx: watch::Sender<Arc<ReadingStore>>,
    logger: StructuredLogger,
}

impl FetchScheduler {
    pub fn new(api: Arc<dyn EdfApi>, settings: SchedulerSettings) -> Self {
        let (store_tx, _) = watch::channel(Arc::new(ReadingStore::new()));
        Self {
            api,
            settings,
            state: Mutex::new(RefreshState::default()),
            busy: AtomicBool::new(false),
            store_tx,
            logger: get_logger_with_context(LogContext::new("scheduler")),
        }
    }

    pub const fn settings(&self) -> &SchedulerSettings {
        &self.settings
    }

    /// Currently published store
    pub fn store(&self) -> Arc<ReadingStore> {
        self.store_tx.borrow().clone()
    }

    /// Receive every newly published store
    pub fn subscribe(&self) -> watch::Receiver<Arc<ReadingStore>> {
        self.store_tx.subscribe()
    }

    pub fn refresh_state(&self) -> RefreshState {
        self.state.lock().map(|s| *s).unwrap_or_default()
    }

    pub fn state(&self) -> SchedulerState {
        if self.busy.load(Ordering::Acquire) {
            SchedulerState::Refreshing
        } else {
            SchedulerState::Idle
        }
    }

    /// Poll tick: refresh if due, otherwise hand back the cached store
    pub async fn refresh(&self, now: NaiveDateTime) -> Result<RefreshOutcome> {
        if !self.refresh_state().is_due(now) {
            return Ok(RefreshOutcome::CacheHit(self.store()));
        }
        self.force_refresh(now).await
    }

    /// Refresh regardless of `next_due`
    pub async fn force_refresh(&self, now: NaiveDateTime) -> Result<RefreshOutcome> {
        let Some(_guard) = BusyGuard::acquire(&self.busy) else {
            self.logger.warn("Refresh requested while another one is in flight");
            return Err(LinkydError::Busy);
        };

        let plan = self.settings.plan(now);
        self.logger.info(&format!(
            "Refreshing readings: {} request(s), daily ranges {:?}, monthly {:?}",
            plan.request_count(),
            plan.daily_ranges,
            plan.monthly_range.map(|(a, b)| format!("{}..{}", a, b))
        ));

        let store = match self.fetch(&plan).await {
            Ok(store) => Arc::new(store),
            Err(e) => {
                if e.is_upstream() {
                    self.logger.warn(&format!("EDF API refused refresh: {}", e));
                } else {
                    self.logger.error(&format!("Refresh failed: {}", e));
                }
                return Err(e);
            }
        };

        let next_due = self.settings.next_due_after(now);
        if let Ok(mut state) = self.state.lock() {
            state.last_successful_fetch = Some(now);
            state.next_due = Some(next_due);
        }
        self.store_tx.send_replace(store.clone());
        self.logger.info(&format!(
            "Readings refreshed: {} half-hours, {} days, {} months; next update: {}",
            store.hourly.len(),
            store.daily.len(),
            store.monthly.len(),
            next_due.format("%Y-%m-%dT%H:%M:%S")
        ));
        Ok(RefreshOutcome::Refreshed(store))
    }

    /// Issue the plan's requests one after the other into a fresh store
    async fn fetch(&self, plan: &FetchPlan) -> Result<ReadingStore> {
        let mut hourly = Vec::new();
        let mut daily = Vec::new();
        for (start, end) in &plan.daily_ranges {
            let data = self.api.get_elec_daily_data(*start, *end).await?;
            let (days, buckets) = data.into_readings();
            self.logger.debug(&format!(
                "{}..{}: {} days, {} half-hours",
                start,
                end,
                days.len(),
                buckets.len()
            ));
            daily.extend(days);
            hourly.extend(buckets);
        }

        let mut store = ReadingStore::new();
        store.hourly.replace_all(hourly);
        store.daily.replace_all(daily);

        if let Some((start, end)) = plan.monthly_range {
            let monthly = self.api.get_elec_monthly_data(start, end).await?;
            store.monthly.replace_all(monthly.into_readings());
        }
        Ok(store)
    }
}
