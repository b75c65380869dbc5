//! Outage monitor
//!
//! Polls the grid-status endpoint and keeps the latest answer only. A failed
//! poll leaves the previous snapshot in place; the snapshot turns stale once
//! it is older than the configured limit.

use crate::api::{EdfApi, GridInfo};
use crate::config::MAX_STALE_AFTER_MINUTES;
use crate::error::Result;
use crate::logging::{LogContext, StructuredLogger, get_logger_with_context};
use chrono::{Duration, NaiveDateTime};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;

/// Grid status of the configured commune
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OutageStatus {
    pub active: bool,
    pub title: String,
    pub description: String,
    pub grid_status: i64,
    pub affected_homes: i64,
    pub start: Option<String>,
    pub end: Option<String>,
    pub status: String,
}

impl From<GridInfo> for OutageStatus {
    fn from(info: GridInfo) -> Self {
        Self {
            active: info.outage,
            title: info.title.unwrap_or_default(),
            description: info.description.unwrap_or_default(),
            grid_status: info.grid_status.unwrap_or_default(),
            affected_homes: info.number_affected_homes.unwrap_or_default(),
            start: info.outage_start_date,
            end: info.outage_end_date,
            status: info.status.unwrap_or_default(),
        }
    }
}

/// A status with the time it was received
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutageSnapshot {
    pub status: OutageStatus,
    pub received_at: NaiveDateTime,
}

pub struct OutageMonitor {
    api: Arc<dyn EdfApi>,
    stale_after: Duration,
    snapshot_tx: watch::Sender<Option<OutageSnapshot>>,
    logger: StructuredLogger,
}

impl OutageMonitor {
    pub fn new(api: Arc<dyn EdfApi>, stale_after_minutes: i64) -> Self {
        let (snapshot_tx, _) = watch::channel(None);
        Self {
            api,
            stale_after: Duration::minutes(stale_after_minutes.clamp(1, MAX_STALE_AFTER_MINUTES)),
            snapshot_tx,
            logger: get_logger_with_context(LogContext::new("outage")),
        }
    }

    /// Fetch the current status and publish it
    pub async fn poll(&self, now: NaiveDateTime) -> Result<OutageStatus> {
        let status = match self.api.get_grid_info().await {
            Ok(info) => OutageStatus::from(info),
            Err(e) => {
                self.logger
                    .warn(&format!("Failed to update grid status: {}", e));
                return Err(e);
            }
        };

        let previous = self.latest().map(|s| s.status.active);
        if previous != Some(status.active) {
            if status.active {
                self.logger.warn(&format!(
                    "Outage reported: {} ({} homes affected)",
                    status.title, status.affected_homes
                ));
            } else {
                self.logger.info("No outage reported");
            }
        }

        self.snapshot_tx.send_replace(Some(OutageSnapshot {
            status: status.clone(),
            received_at: now,
        }));
        Ok(status)
    }

    pub fn latest(&self) -> Option<OutageSnapshot> {
        self.snapshot_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<OutageSnapshot>> {
        self.snapshot_tx.subscribe()
    }

    /// True when nothing was ever received or the last status is too old
    pub fn is_stale(&self, now: NaiveDateTime) -> bool {
        self.latest()
            .is_none_or(|s| now - s.received_at > self.stale_after)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_info_maps_missing_fields_to_blanks() {
        let status = OutageStatus::from(GridInfo {
            outage: true,
            title: Some("Incident".into()),
            number_affected_homes: Some(42),
            ..GridInfo::default()
        });
        assert!(status.active);
        assert_eq!(status.title, "Incident");
        assert_eq!(status.affected_homes, 42);
        assert_eq!(status.description, "");
        assert_eq!(status.grid_status, 0);
        assert!(status.start.is_none());
    }
}
