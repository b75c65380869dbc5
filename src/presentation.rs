//! Presentation adapter
//!
//! Maps the consumption summary and the outage snapshot onto named entities
//! with a fixed attribute vocabulary, the one expected by linky display cards.

use crate::calendar::{YearMonth, start_of_day};
use crate::engine::ConsumptionSummary;
use crate::outage::OutageSnapshot;
use crate::store::Reading;
use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use serde_json::{Map, Value, json};

pub const ENERGY_UNIT: &str = "kWh";
pub const COST_UNIT: &str = "EUR";

const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// One exposed entity
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityState {
    pub entity_id: String,
    pub name: String,
    pub state: Value,
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_of_measurement: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_class: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_class: Option<&'static str>,
    pub attributes: Map<String, Value>,
}

impl EntityState {
    fn new(entity_id: String, name: String, state: Value) -> Self {
        Self {
            entity_id,
            name,
            state,
            available: true,
            unit_of_measurement: None,
            device_class: None,
            state_class: None,
            attributes: Map::new(),
        }
    }

    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }
}

/// Two decimals, the precision readings are displayed with
fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

fn fmt_datetime(dt: Option<NaiveDateTime>) -> Value {
    dt.map_or(Value::Null, |d| Value::String(d.format(DATETIME_FORMAT).to_string()))
}

fn join<T: ToString>(items: impl IntoIterator<Item = T>) -> String {
    items
        .into_iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

/// Builds entity states for one delivery point and commune
#[derive(Debug, Clone)]
pub struct Presenter {
    pdl_id: String,
    insee_code: String,
}

impl Presenter {
    pub fn new(pdl_id: impl Into<String>, insee_code: impl Into<String>) -> Self {
        Self {
            pdl_id: pdl_id.into(),
            insee_code: insee_code.into(),
        }
    }

    fn entity_id(&self, suffix: &str) -> String {
        format!("edf_{}_{}", self.pdl_id, suffix)
    }

    #[allow(clippy::too_many_arguments)]
    fn running_total(
        &self,
        suffix: &str,
        name: &str,
        value: f64,
        unit: &'static str,
        device_class: &'static str,
        last_reset: NaiveDateTime,
        summary: &ConsumptionSummary,
        updated_at: Option<NaiveDateTime>,
    ) -> EntityState {
        let mut e = EntityState::new(self.entity_id(suffix), name.to_string(), json!(round2(value)));
        e.available = summary.reference.is_some();
        e.unit_of_measurement = Some(unit);
        e.device_class = Some(device_class);
        e.state_class = Some("total");
        e.attributes.insert("update_date".into(), fmt_datetime(updated_at));
        e.attributes
            .insert("last_reset".into(), fmt_datetime(Some(last_reset)));
        e
    }

    /// Today-so-far and month-so-far energy and cost
    pub fn consumption_sensors(
        &self,
        summary: &ConsumptionSummary,
        updated_at: Option<NaiveDateTime>,
    ) -> Vec<EntityState> {
        let reference = summary.reference.unwrap_or_default();
        let day_start = start_of_day(reference.date());
        let month_start = start_of_day(YearMonth::of(reference.date()).first_day());
        let s = summary;
        vec![
            self.running_total("elec_energy", "EDF electricity energy", s.today.energy, ENERGY_UNIT, "energy", day_start, s, updated_at),
            self.running_total("elec_cost", "EDF electricity cost", s.today.cost, COST_UNIT, "monetary", day_start, s, updated_at),
            self.running_total("elec_energy_month", "EDF electricity energy this month", s.month.energy, ENERGY_UNIT, "energy", month_start, s, updated_at),
            self.running_total("elec_cost_month", "EDF electricity cost this month", s.month.cost, COST_UNIT, "monetary", month_start, s, updated_at),
        ]
    }

    /// Card sensor; state is the current month's energy
    pub fn linky_card(&self, summary: &ConsumptionSummary, last_error: Option<&str>) -> EntityState {
        let s = summary;
        let mut e = EntityState::new(
            self.entity_id("linky_card"),
            "EDF linky card".to_string(),
            json!(round2(s.current_month.energy)),
        );
        e.available = s.reference.is_some();
        e.unit_of_measurement = Some(ENERGY_UNIT);
        e.device_class = Some("energy");

        let days: Vec<(NaiveDate, Reading)> = s.week_days.clone();
        let zeros = join(days.iter().map(|_| 0));
        let energy = |r: Reading| round2(r.energy);

        let attrs = json!({
            "typeCompteur": "consommation",
            "unit_of_measurement": ENERGY_UNIT,
            "yesterday": energy(s.yesterday),
            "yesterday_cost": round2(s.yesterday.cost),
            "day_2": energy(s.day_2),
            "yesterday_evolution": s.yesterday_evolution(),
            "current_week": energy(s.current_week),
            "last_week": energy(s.last_week),
            "current_week_evolution": s.current_week_evolution(),
            "current_month": energy(s.current_month),
            "last_month": energy(s.last_month),
            "current_month_last_year": energy(s.current_month_last_year),
            "last_month_last_year": energy(s.last_month_last_year),
            "monthly_evolution": s.monthly_evolution(),
            "current_month_evolution": s.current_month_evolution(),
            "daily_cost": round2(s.current_month.cost),
            "daily": days.iter().map(|(_, r)| energy(*r)).collect::<Vec<_>>(),
            "dailyweek": join(days.iter().map(|(d, _)| d.format("%Y-%m-%d"))),
            "dailyweek_cost": join(days.iter().map(|(_, r)| round2(r.cost))),
            "dailyweek_HC": zeros,
            "dailyweek_HP": zeros,
            "dailyweek_costHC": zeros,
            "dailyweek_costHP": zeros,
            "yesterday_HC": 0,
            "yesterday_HP": 0,
            "yesterday_HCHP": 0,
            "peak_offpeak_percent": 100,
            "errorLastCall": last_error.unwrap_or_default(),
        });
        if let Value::Object(map) = attrs {
            e.attributes = map;
        }
        e
    }

    /// Binary problem sensor for the commune's grid
    pub fn outage_sensor(&self, snapshot: Option<&OutageSnapshot>, stale: bool) -> EntityState {
        let active = snapshot.map(|s| s.status.active);
        let mut e = EntityState::new(
            format!("edf_{}_status", self.insee_code),
            "EDF grid status".to_string(),
            active.map_or(Value::Null, |a| json!(if a { "on" } else { "off" })),
        );
        e.available = snapshot.is_some() && !stale;
        e.device_class = Some("problem");

        let blank = json!({
            "title": "",
            "description": "",
            "grid_status": 0,
            "affected_homes": 0,
            "start_date": "",
            "end_date": "",
            "status": "",
        });
        let attrs = match snapshot.map(|s| &s.status) {
            Some(status) if status.active => json!({
                "title": status.title,
                "description": status.description,
                "grid_status": status.grid_status,
                "affected_homes": status.affected_homes,
                "start_date": status.start.clone().unwrap_or_default(),
                "end_date": status.end.clone().unwrap_or_default(),
                "status": status.status,
            }),
            _ => blank,
        };
        if let Value::Object(map) = attrs {
            e.attributes = map;
        }
        e.attributes.insert(
            "received_at".into(),
            fmt_datetime(snapshot.map(|s| s.received_at)),
        );
        e.attributes.insert("stale".into(), json!(stale));
        e
    }
}
