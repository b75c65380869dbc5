use crate::calendar::{YearMonth, floor_to_bucket};
use crate::error::{LinkydError, Result};
use crate::store::Reading;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Error payload the EDF API returns instead of data
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiErrorBody {
    pub error_code: serde_json::Value,
    #[serde(default)]
    pub error_description: Option<String>,
}

impl ApiErrorBody {
    pub fn into_error(self) -> LinkydError {
        let code = match self.error_code {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        };
        LinkydError::upstream(code, self.error_description.unwrap_or_default())
    }
}

/// Either the expected payload or an upstream error description
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ApiResponse<T> {
    Error(ApiErrorBody),
    Data(T),
}

impl<T> ApiResponse<T> {
    pub fn into_result(self) -> Result<T> {
        match self {
            Self::Error(body) => Err(body.into_error()),
            Self::Data(data) => Ok(data),
        }
    }
}

/// Response of the daily load curve endpoint
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyData {
    #[serde(default)]
    pub daily_load_curves: Vec<DailyLoadCurve>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyLoadCurve {
    pub day: NaiveDate,
    pub total_cost: Option<f64>,
    pub total_energy: Option<f64>,
    #[serde(default)]
    pub consumptions: Vec<Consumption>,
}

/// One half-hour point of a load curve
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Consumption {
    pub timestamp: String,
    pub cost: Option<f64>,
    pub energy: Option<f64>,
}

/// Response of the monthly summary endpoint
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyData {
    #[serde(default)]
    pub monthly_consumptions: Vec<MonthlyConsumption>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyConsumption {
    pub end_ts: String,
    pub consumption: ConsumptionTotals,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumptionTotals {
    pub cost: Option<f64>,
    pub energy: Option<f64>,
}

/// Grid status of the commune, as returned by the outage endpoint
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GridInfo {
    pub outage: bool,
    pub title: Option<String>,
    pub description: Option<String>,
    pub grid_status: Option<i64>,
    pub number_affected_homes: Option<i64>,
    pub outage_start_date: Option<String>,
    pub outage_end_date: Option<String>,
    pub status: Option<String>,
}

fn reading(energy: Option<f64>, cost: Option<f64>) -> Option<Reading> {
    Some(Reading::new(energy?, cost?))
}

/// Parse a load curve timestamp into a naive local bucket start.
///
/// Offsets and a trailing `Z` are dropped rather than converted: readings are
/// keyed on the wall-clock time the meter reports.
pub fn parse_bucket_timestamp(s: &str) -> Result<NaiveDateTime> {
    let naive = match DateTime::parse_from_rfc3339(s) {
        Ok(dt) => dt.naive_local(),
        Err(_) => NaiveDateTime::parse_from_str(s.trim_end_matches('Z'), "%Y-%m-%dT%H:%M:%S")
            .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S"))?,
    };
    Ok(floor_to_bucket(naive))
}

impl DailyData {
    /// Split into daily totals and half-hour points.
    ///
    /// Entries with a missing value are left out so that they read as absent
    /// rather than zero.
    pub fn into_readings(self) -> (Vec<(NaiveDate, Reading)>, Vec<(NaiveDateTime, Reading)>) {
        let mut daily = Vec::with_capacity(self.daily_load_curves.len());
        let mut hourly = Vec::new();
        for curve in self.daily_load_curves {
            if let Some(r) = reading(curve.total_energy, curve.total_cost) {
                daily.push((curve.day, r));
            }
            hourly.extend(curve.consumptions.into_iter().filter_map(|c| {
                let ts = parse_bucket_timestamp(&c.timestamp).ok()?;
                Some((ts, reading(c.energy, c.cost)?))
            }));
        }
        (daily, hourly)
    }
}

impl MonthlyData {
    /// Monthly totals keyed by the month of `endTs`
    pub fn into_readings(self) -> Vec<(YearMonth, Reading)> {
        self.monthly_consumptions
            .into_iter()
            .filter_map(|m| {
                let month = m.end_ts.parse::<YearMonth>().ok()?;
                Some((month, reading(m.consumption.energy, m.consumption.cost)?))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn error_payload_becomes_upstream_error() {
        let body = json!({"errorCode": "X", "errorDescription": "rate limited"});
        let parsed: ApiResponse<DailyData> = serde_json::from_value(body).unwrap();
        let err = parsed.into_result().unwrap_err();
        assert!(err.is_upstream());
        assert!(err.to_string().contains("rate limited"));

        let numeric: ApiResponse<DailyData> =
            serde_json::from_value(json!({"errorCode": 429})).unwrap();
        assert_eq!(
            numeric.into_result().unwrap_err().to_string(),
            "Upstream error 429: "
        );
    }

    #[test]
    fn daily_payload_splits_into_days_and_buckets() {
        let body = json!({
            "dailyLoadCurves": [{
                "day": "2024-01-14",
                "totalCost": 2.4,
                "totalEnergy": 12.0,
                "consumptions": [
                    {"timestamp": "2024-01-14T00:00:00Z", "cost": 0.1, "energy": 0.5},
                    {"timestamp": "2024-01-14T00:30:00Z", "cost": null, "energy": 0.4},
                    {"timestamp": "garbage", "cost": 0.1, "energy": 0.4}
                ]
            }]
        });
        let data = serde_json::from_value::<ApiResponse<DailyData>>(body)
            .unwrap()
            .into_result()
            .unwrap();
        let (daily, hourly) = data.into_readings();
        assert_eq!(daily.len(), 1);
        assert_eq!(daily[0].1, Reading::new(12.0, 2.4));
        assert_eq!(hourly.len(), 1);
        assert_eq!(hourly[0].0.to_string(), "2024-01-14 00:00:00");
    }

    #[test]
    fn monthly_payload_is_keyed_by_end_month() {
        let body = json!({
            "monthlyConsumptions": [
                {"endTs": "2024-01-31T23:00:00Z", "consumption": {"cost": 45.0, "energy": 300.0}},
                {"endTs": "bad", "consumption": {"cost": 1.0, "energy": 1.0}}
            ]
        });
        let data: MonthlyData = serde_json::from_value(body).unwrap();
        let readings = data.into_readings();
        assert_eq!(readings.len(), 1);
        assert_eq!(readings[0].0.to_string(), "2024-01");
        assert_eq!(readings[0].1, Reading::new(300.0, 45.0));
    }

    #[test]
    fn timestamps_with_offsets_keep_wall_clock() {
        let ts = parse_bucket_timestamp("2024-01-15T10:45:00+01:00").unwrap();
        assert_eq!(ts.to_string(), "2024-01-15 10:30:00");
        let ts = parse_bucket_timestamp("2024-01-15T10:00:00").unwrap();
        assert_eq!(ts.to_string(), "2024-01-15 10:00:00");
    }
}
