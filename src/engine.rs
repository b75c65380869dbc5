//! Aggregation engine
//!
//! A pure function of the published store, the reference datetime and the
//! previous summary. Week and day figures are computed only when all of their
//! inputs are present; otherwise the previous value is carried over. Running
//! totals abstain only while the current half-hour is missing and skip older
//! gaps.

use crate::calendar::{
    YearMonth, buckets_between, clamp_to_month, floor_to_bucket, start_of_day,
};
use crate::config::Config;
use crate::store::{Container, Reading, ReadingStore};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::Serialize;

/// Days in a rolling week window
pub const WEEK_DAYS: i64 = 7;

/// Switches that change what gets computed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregationOptions {
    pub extended_aggregates_enabled: bool,
    pub round_weeks_to_month: bool,
}

impl Default for AggregationOptions {
    fn default() -> Self {
        Self {
            extended_aggregates_enabled: true,
            round_weeks_to_month: false,
        }
    }
}

impl From<&Config> for AggregationOptions {
    fn from(cfg: &Config) -> Self {
        Self {
            extended_aggregates_enabled: cfg.data.extended_aggregates_enabled,
            round_weeks_to_month: cfg.data.round_weeks_to_month,
        }
    }
}

/// Derived figures, energy and cost side by side
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConsumptionSummary {
    /// Reference datetime of the last aggregation
    pub reference: Option<NaiveDateTime>,
    /// Half-hours from midnight through the current bucket
    pub today: Reading,
    /// Half-hours from the first of the month through the current bucket
    pub month: Reading,
    pub yesterday: Reading,
    pub day_2: Reading,
    pub current_week: Reading,
    pub last_week: Reading,
    pub current_month: Reading,
    pub last_month: Reading,
    pub current_month_last_year: Reading,
    pub last_month_last_year: Reading,
    /// Days of the current week window, most recent first
    pub week_days: Vec<(NaiveDate, Reading)>,
}

impl ConsumptionSummary {
    pub fn yesterday_evolution(&self) -> i64 {
        evolution(self.yesterday.energy, self.day_2.energy)
    }

    pub fn current_week_evolution(&self) -> i64 {
        evolution(self.current_week.energy, self.last_week.energy)
    }

    /// Last month against the same month a year earlier
    pub fn monthly_evolution(&self) -> i64 {
        evolution(self.last_month.energy, self.last_month_last_year.energy)
    }

    pub fn current_month_evolution(&self) -> i64 {
        evolution(
            self.current_month.energy,
            self.current_month_last_year.energy,
        )
    }
}

/// Percentage change rounded to the nearest integer; 0 when `reference` is 0
pub fn evolution(current: f64, reference: f64) -> i64 {
    if reference == 0.0 {
        return 0;
    }
    ((current - reference) / reference * 100.0).round() as i64
}

/// Seven days ending at `end`, most recent first.
///
/// With `clamp_to` set, days outside that month are moved onto its first or
/// last day and consecutive repeats are collapsed, so a window straddling a
/// month boundary counts the edge day once.
pub fn week_window(end: NaiveDate, clamp_to: Option<YearMonth>) -> Vec<NaiveDate> {
    let mut days: Vec<NaiveDate> = (0..WEEK_DAYS)
        .map(|i| end - Duration::days(i))
        .map(|d| clamp_to.map_or(d, |m| clamp_to_month(d, m)))
        .collect();
    days.dedup();
    days
}

fn add(a: Reading, b: Reading) -> Reading {
    Reading::new(a.energy + b.energy, a.cost + b.cost)
}

/// Sum over `keys`, `None` as soon as one of them is missing
fn sum_all<K, I>(container: &Container<K>, keys: I) -> Option<Reading>
where
    K: Ord + Copy,
    I: IntoIterator<Item = K>,
{
    keys.into_iter()
        .try_fold(Reading::default(), |acc, k| Some(add(acc, container.get(&k)?)))
}

/// Running total from `from` through `current`, skipping absent half-hours.
///
/// `None` while `current` itself has no reading yet.
fn running_total(
    store: &ReadingStore,
    from: NaiveDateTime,
    current: NaiveDateTime,
) -> Option<Reading> {
    store.hourly.get(&current)?;
    Some(
        buckets_between(from, current)
            .filter_map(|ts| store.hourly.get(&ts))
            .fold(Reading::default(), add),
    )
}

/// Recompute the summary for `reference`.
///
/// Fields whose inputs are incomplete keep their value from `previous`;
/// running this twice over the same store yields the same summary.
pub fn aggregate(
    store: &ReadingStore,
    reference: NaiveDateTime,
    previous: &ConsumptionSummary,
    options: AggregationOptions,
) -> ConsumptionSummary {
    let mut next = previous.clone();
    next.reference = Some(reference);

    let ref_date = reference.date();
    let ref_month = YearMonth::of(ref_date);
    let current_bucket = floor_to_bucket(reference);

    if let Some(r) = running_total(store, start_of_day(ref_date), current_bucket) {
        next.today = r;
    }
    if let Some(r) = running_total(store, start_of_day(ref_month.first_day()), current_bucket) {
        next.month = r;
    }

    let yesterday = ref_date - Duration::days(1);
    let day_2 = ref_date - Duration::days(2);
    if let Some(r) = store.daily.get(&yesterday) {
        next.yesterday = r;
    }
    if let Some(r) = store.daily.get(&day_2) {
        next.day_2 = r;
    }

    let clamp = options.round_weeks_to_month.then_some(ref_month);
    let this_week = week_window(yesterday, clamp);
    let last_week = week_window(ref_date - Duration::days(WEEK_DAYS + 1), clamp);

    let week_days: Option<Vec<_>> = this_week
        .iter()
        .map(|d| store.daily.get(d).map(|r| (*d, r)))
        .collect();
    if let Some(days) = week_days {
        next.current_week = days.iter().fold(Reading::default(), |acc, (_, r)| add(acc, *r));
        next.week_days = days;
    }
    if let Some(r) = sum_all(&store.daily, last_week) {
        next.last_week = r;
    }

    if options.extended_aggregates_enabled {
        let lookups = [
            (ref_month, &mut next.current_month),
            (ref_month.add_months(-1), &mut next.last_month),
            (ref_month.previous_year(), &mut next.current_month_last_year),
            (
                ref_month.add_months(-1).previous_year(),
                &mut next.last_month_last_year,
            ),
        ];
        for (month, field) in lookups {
            if let Some(r) = store.monthly.get(&month) {
                *field = r;
            }
        }
    }

    next
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn evolution_rounds_and_guards_zero() {
        assert_eq!(evolution(300.0, 250.0), 20);
        assert_eq!(evolution(1.0, 3.0), -67);
        assert_eq!(evolution(5.0, 0.0), 0);
        assert_eq!(evolution(0.0, 0.0), 0);
    }

    #[test]
    fn week_window_without_clamp_has_seven_days() {
        let w = week_window(d(2024, 3, 3), None);
        assert_eq!(w.len(), 7);
        assert_eq!(w[0], d(2024, 3, 3));
        assert_eq!(w[6], d(2024, 2, 26));
    }

    #[test]
    fn week_window_clamp_collapses_edge_days() {
        let march = YearMonth::new(2024, 3).unwrap();
        let w = week_window(d(2024, 3, 3), Some(march));
        assert_eq!(w, vec![d(2024, 3, 3), d(2024, 3, 2), d(2024, 3, 1)]);
    }

    #[test]
    fn today_sum_stops_at_current_bucket() {
        let mut store = ReadingStore::new();
        let midnight = start_of_day(d(2024, 1, 15));
        store.hourly.replace_all(
            buckets_between(midnight, midnight + Duration::hours(2))
                .map(|ts| (ts, Reading::new(0.5, 0.1))),
        );
        let reference = midnight + Duration::minutes(75);
        let s = aggregate(
            &store,
            reference,
            &ConsumptionSummary::default(),
            AggregationOptions::default(),
        );
        // 00:00, 00:30, 01:00
        assert!((s.today.energy - 1.5).abs() < 1e-9);
        assert!((s.today.cost - 0.3).abs() < 1e-9);
    }

    #[test]
    fn running_total_waits_for_current_bucket() {
        let mut store = ReadingStore::new();
        let midnight = start_of_day(d(2024, 1, 15));
        store.hourly.replace_all([(midnight, Reading::new(0.5, 0.1))]);
        let previous = ConsumptionSummary {
            today: Reading::new(9.0, 1.8),
            ..ConsumptionSummary::default()
        };
        let s = aggregate(
            &store,
            midnight + Duration::minutes(40),
            &previous,
            AggregationOptions::default(),
        );
        assert_eq!(s.today, previous.today);
    }
}
