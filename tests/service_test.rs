mod common;

use common::{ScriptedApi, at, date, day_curve, month_total};
use linkyd::config::Config;
use linkyd::error::LinkydError;
use linkyd::service::Service;
use serde_json::json;
use std::sync::Arc;

fn config() -> Config {
    let mut cfg = Config::default();
    cfg.api.pdl_id = "123".to_string();
    cfg.api.insee_code = "75056".to_string();
    cfg
}

fn api() -> Arc<ScriptedApi> {
    Arc::new(ScriptedApi {
        days: (1..=20)
            .map(|d| day_curve(date(2024, 1, d), 10.0 + f64::from(d), 2.0))
            .collect(),
        months: vec![
            month_total("2024-01", 300.0, 60.0),
            month_total("2023-01", 250.0, 50.0),
        ],
        ..ScriptedApi::default()
    })
}

#[tokio::test]
async fn data_tick_refreshes_and_aggregates_against_offset_reference() {
    let api = api();
    let service = Service::new(config(), api.clone()).unwrap();

    // day_offset 1: reference is 2024-01-15 10:00
    service.data_tick(at(2024, 1, 16, 10, 0)).await.unwrap();
    let summary = service.summary();
    assert_eq!(summary.reference, Some(at(2024, 1, 15, 10, 0)));
    assert_eq!(summary.yesterday.energy, 24.0);
    assert_eq!(summary.current_month_evolution(), 20);
    // 00:00 ..= 10:00 of the 15th at 25/48 kWh each
    assert!((summary.today.energy - 21.0 * 25.0 / 48.0).abs() < 1e-9);

    let card = service.linky_card();
    assert_eq!(card.state, json!(300.0));
    assert_eq!(card.attribute("yesterday"), Some(&json!(24.0)));
    assert_eq!(card.attribute("current_month_evolution"), Some(&json!(20)));
    assert_eq!(card.attribute("errorLastCall"), Some(&json!("")));
}

#[tokio::test]
async fn failed_refresh_freezes_summary_and_reports_error() {
    let api = api();
    let service = Service::new(config(), api.clone()).unwrap();
    service.data_tick(at(2024, 1, 16, 10, 0)).await.unwrap();
    let before = service.summary();

    api.fail_next(LinkydError::upstream("X", "maintenance"));
    assert!(service.data_tick(at(2024, 1, 17, 12, 0)).await.is_err());
    assert_eq!(service.summary(), before);
    assert_eq!(
        service.linky_card().attribute("errorLastCall"),
        Some(&json!("Upstream error X: maintenance"))
    );
    assert_eq!(
        service.health().last_error.as_deref(),
        Some("Upstream error X: maintenance")
    );
}

#[tokio::test]
async fn cache_hit_tick_still_moves_today_forward() {
    let api = api();
    let service = Service::new(config(), api.clone()).unwrap();
    service.data_tick(at(2024, 1, 16, 10, 0)).await.unwrap();
    let calls = api.calls().len();

    service.data_tick(at(2024, 1, 16, 10, 30)).await.unwrap();
    assert_eq!(api.calls().len(), calls);
    assert_eq!(
        service.summary().reference,
        Some(at(2024, 1, 15, 10, 30))
    );
    assert!((service.summary().today.energy - 22.0 * 25.0 / 48.0).abs() < 1e-9);
}

#[tokio::test]
async fn entities_cover_sensors_card_and_outage() {
    let service = Service::new(config(), api()).unwrap();
    let ids: Vec<String> = service
        .entities()
        .into_iter()
        .map(|e| e.entity_id)
        .collect();
    assert_eq!(
        ids,
        [
            "edf_123_elec_energy",
            "edf_123_elec_cost",
            "edf_123_elec_energy_month",
            "edf_123_elec_cost_month",
            "edf_123_linky_card",
            "edf_75056_status",
        ]
    );
}

#[tokio::test]
async fn run_stops_on_shutdown() {
    let service = Arc::new(Service::new(config(), api()).unwrap());
    let task = {
        let s = service.clone();
        tokio::spawn(async move { s.run().await })
    };
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    service.request_shutdown();
    tokio::time::timeout(std::time::Duration::from_secs(5), task)
        .await
        .unwrap()
        .unwrap();
}

#[test]
fn invalid_config_is_rejected() {
    let mut cfg = config();
    cfg.timezone = "Nowhere/Special".to_string();
    assert!(Service::new(cfg, api()).is_err());
}
