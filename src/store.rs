//! In-memory reading store
//!
//! Three containers of `{energy, cost}` readings keyed by period start: half
//! hours, days and months. A container is only ever replaced wholesale; the
//! store as a whole is published as an `Arc` so readers never observe a
//! half-built state.

use crate::calendar::YearMonth;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Total energy and cost over one period
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Reading {
    /// kWh
    pub energy: f64,
    /// Currency units
    pub cost: f64,
}

impl Reading {
    pub const fn new(energy: f64, cost: f64) -> Self {
        Self { energy, cost }
    }

    /// Select one of the two measures
    pub const fn value(&self, measure: Measure) -> f64 {
        match measure {
            Measure::Energy => self.energy,
            Measure::Cost => self.cost,
        }
    }
}

/// Which half of a reading a derived figure is built from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Measure {
    Energy,
    Cost,
}

impl Measure {
    pub const ALL: [Self; 2] = [Self::Energy, Self::Cost];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Energy => "energy",
            Self::Cost => "cost",
        }
    }
}

/// Granularity of a container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Hourly,
    Daily,
    Monthly,
}

/// Readings of one granularity, unique per key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Container<K: Ord> {
    readings: BTreeMap<K, Reading>,
}

impl<K: Ord> Default for Container<K> {
    fn default() -> Self {
        Self {
            readings: BTreeMap::new(),
        }
    }
}

impl<K: Ord + Copy> Container<K> {
    /// Reading for a period, `None` when upstream has nothing for it
    pub fn get(&self, key: &K) -> Option<Reading> {
        self.readings.get(key).copied()
    }

    /// Swap in a complete new set of readings; later duplicates win
    pub fn replace_all<I>(&mut self, readings: I)
    where
        I: IntoIterator<Item = (K, Reading)>,
    {
        self.readings = readings.into_iter().collect();
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &Reading)> {
        self.readings.iter()
    }

    /// Most recent key present
    pub fn latest(&self) -> Option<K> {
        self.readings.keys().next_back().copied()
    }
}

impl<K: Ord> FromIterator<(K, Reading)> for Container<K> {
    fn from_iter<I: IntoIterator<Item = (K, Reading)>>(iter: I) -> Self {
        Self {
            readings: iter.into_iter().collect(),
        }
    }
}

impl<K: Ord> Extend<(K, Reading)> for Container<K> {
    fn extend<I: IntoIterator<Item = (K, Reading)>>(&mut self, iter: I) {
        self.readings.extend(iter);
    }
}

/// Half-hourly, daily and monthly readings fetched in one refresh
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReadingStore {
    pub hourly: Container<NaiveDateTime>,
    pub daily: Container<NaiveDate>,
    pub monthly: Container<YearMonth>,
}

impl ReadingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when no container holds anything; this means "no data yet", not zero usage
    pub fn is_empty(&self) -> bool {
        self.hourly.is_empty() && self.daily.is_empty() && self.monthly.is_empty()
    }

    pub fn len(&self, granularity: Granularity) -> usize {
        match granularity {
            Granularity::Hourly => self.hourly.len(),
            Granularity::Daily => self.daily.len(),
            Granularity::Monthly => self.monthly.len(),
        }
    }
}
