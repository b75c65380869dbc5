//! EDF customer API integration
//!
//! The [`EdfApi`] trait is the seam between the scheduler / outage monitor and
//! the network. [`client::HttpEdfApi`] talks to the real service; tests plug in
//! scripted implementations.

pub mod client;
pub mod types;

pub use client::HttpEdfApi;
pub use types::{ApiResponse, DailyData, GridInfo, MonthlyData};

use crate::calendar::YearMonth;
use crate::error::Result;
use chrono::NaiveDate;

/// Operations consumed from the remote API
#[async_trait::async_trait]
pub trait EdfApi: Send + Sync {
    /// Daily totals plus half-hour load curve for `[start, end]`
    async fn get_elec_daily_data(&self, start: NaiveDate, end: NaiveDate) -> Result<DailyData>;

    /// Monthly totals for `[start, end]`
    async fn get_elec_monthly_data(&self, start: YearMonth, end: YearMonth)
    -> Result<MonthlyData>;

    /// Current grid status for the configured commune
    async fn get_grid_info(&self) -> Result<GridInfo>;
}
