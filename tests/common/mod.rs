#![allow(dead_code)]

use chrono::{Duration, NaiveDate, NaiveDateTime};
use linkyd::api::EdfApi;
use linkyd::api::types::{
    Consumption, ConsumptionTotals, DailyData, DailyLoadCurve, GridInfo, MonthlyConsumption,
    MonthlyData,
};
use linkyd::calendar::YearMonth;
use linkyd::error::{LinkydError, Result};
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Daily(NaiveDate, NaiveDate),
    Monthly(YearMonth, YearMonth),
    Grid,
}

/// In-memory EDF API answering from fixed data and recording every call
#[derive(Default)]
pub struct ScriptedApi {
    pub days: Vec<DailyLoadCurve>,
    pub months: Vec<MonthlyConsumption>,
    pub grid: Mutex<GridInfo>,
    pub fail_with: Mutex<Option<LinkydError>>,
    pub monthly_error: Mutex<Option<LinkydError>>,
    pub delay_ms: u64,
    pub calls: Mutex<Vec<Call>>,
}

impl ScriptedApi {
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn fail_next(&self, err: LinkydError) {
        *self.fail_with.lock().unwrap() = Some(err);
    }

    fn record(&self, call: Call) -> Result<()> {
        self.calls.lock().unwrap().push(call);
        match self.fail_with.lock().unwrap().take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait::async_trait]
impl EdfApi for ScriptedApi {
    async fn get_elec_daily_data(&self, start: NaiveDate, end: NaiveDate) -> Result<DailyData> {
        self.record(Call::Daily(start, end))?;
        if self.delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
        }
        Ok(DailyData {
            daily_load_curves: self
                .days
                .iter()
                .filter(|c| c.day >= start && c.day <= end)
                .cloned()
                .collect(),
        })
    }

    async fn get_elec_monthly_data(&self, start: YearMonth, end: YearMonth) -> Result<MonthlyData> {
        self.record(Call::Monthly(start, end))?;
        if let Some(err) = self.monthly_error.lock().unwrap().take() {
            return Err(err);
        }
        Ok(MonthlyData {
            monthly_consumptions: self
                .months
                .iter()
                .filter(|m| {
                    m.end_ts
                        .parse::<YearMonth>()
                        .is_ok_and(|ym| ym >= start && ym <= end)
                })
                .cloned()
                .collect(),
        })
    }

    async fn get_grid_info(&self) -> Result<GridInfo> {
        self.record(Call::Grid)?;
        Ok(self.grid.lock().unwrap().clone())
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
    date(y, m, d).and_hms_opt(h, min, 0).unwrap()
}

/// A day with a total and 48 equal half-hour points
pub fn day_curve(day: NaiveDate, energy: f64, cost: f64) -> DailyLoadCurve {
    let midnight = day.and_hms_opt(0, 0, 0).unwrap();
    DailyLoadCurve {
        day,
        total_cost: Some(cost),
        total_energy: Some(energy),
        consumptions: (0..48)
            .map(|i| Consumption {
                timestamp: (midnight + Duration::minutes(30 * i))
                    .format("%Y-%m-%dT%H:%M:%S")
                    .to_string(),
                cost: Some(cost / 48.0),
                energy: Some(energy / 48.0),
            })
            .collect(),
    }
}

pub fn month_total(month: &str, energy: f64, cost: f64) -> MonthlyConsumption {
    MonthlyConsumption {
        end_ts: format!("{}-28T00:00:00Z", month),
        consumption: ConsumptionTotals {
            cost: Some(cost),
            energy: Some(energy),
        },
    }
}
