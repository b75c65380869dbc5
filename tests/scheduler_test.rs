mod common;

use common::{Call, ScriptedApi, at, date, day_curve, month_total};
use linkyd::calendar::YearMonth;
use linkyd::error::LinkydError;
use linkyd::scheduler::{FetchScheduler, SchedulerSettings, SchedulerState};
use std::sync::Arc;

fn settings() -> SchedulerSettings {
    SchedulerSettings {
        day_offset: 1,
        lookback_days: 14,
        extended_aggregates_enabled: true,
        refresh_hour: 11,
    }
}

fn ym(s: &str) -> YearMonth {
    s.parse().unwrap()
}

fn api_with_january() -> Arc<ScriptedApi> {
    Arc::new(ScriptedApi {
        days: (1..=31)
            .map(|d| day_curve(date(2024, 1, d), 10.0, 2.0))
            .collect(),
        months: vec![month_total("2024-01", 300.0, 60.0)],
        ..ScriptedApi::default()
    })
}

#[tokio::test]
async fn first_refresh_fetches_and_publishes() {
    let api = api_with_january();
    let scheduler = FetchScheduler::new(api.clone(), settings());
    let mut rx = scheduler.subscribe();

    let outcome = scheduler.refresh(at(2024, 1, 21, 9, 0)).await.unwrap();
    assert!(!outcome.is_cache_hit());
    assert_eq!(outcome.store().daily.len(), 31);
    assert_eq!(outcome.store().hourly.len(), 31 * 48);
    assert_eq!(outcome.store().monthly.len(), 1);

    assert!(rx.has_changed().unwrap());
    assert!(Arc::ptr_eq(&rx.borrow_and_update(), outcome.store()));

    let state = scheduler.refresh_state();
    assert_eq!(state.last_successful_fetch, Some(at(2024, 1, 21, 9, 0)));
    assert_eq!(state.next_due, Some(at(2024, 1, 22, 11, 0)));
    assert_eq!(scheduler.state(), SchedulerState::Idle);
}

#[tokio::test]
async fn cache_hit_issues_zero_fetches() {
    let api = api_with_january();
    let scheduler = FetchScheduler::new(api.clone(), settings());
    let first = scheduler.refresh(at(2024, 1, 21, 9, 0)).await.unwrap();
    let calls_after_first = api.calls().len();

    for now in [at(2024, 1, 21, 9, 30), at(2024, 1, 22, 10, 59)] {
        let outcome = scheduler.refresh(now).await.unwrap();
        assert!(outcome.is_cache_hit());
        assert!(Arc::ptr_eq(outcome.store(), first.store()));
    }
    assert_eq!(api.calls().len(), calls_after_first);

    // Due again at the configured hour
    let outcome = scheduler.refresh(at(2024, 1, 22, 11, 0)).await.unwrap();
    assert!(!outcome.is_cache_hit());
    assert_eq!(api.calls().len(), calls_after_first * 2);
}

#[tokio::test]
async fn upstream_error_keeps_store_and_schedule() {
    let api = api_with_january();
    let scheduler = FetchScheduler::new(api.clone(), settings());
    let good = scheduler.refresh(at(2024, 1, 21, 9, 0)).await.unwrap();
    let state_before = scheduler.refresh_state();

    api.fail_next(LinkydError::upstream("X", "quota exceeded"));
    let err = scheduler.refresh(at(2024, 1, 22, 12, 0)).await.unwrap_err();
    assert!(err.is_upstream());

    assert!(Arc::ptr_eq(&scheduler.store(), good.store()));
    assert_eq!(scheduler.refresh_state(), state_before);
    assert_eq!(scheduler.state(), SchedulerState::Idle);

    // Next tick retries
    let retry = scheduler.refresh(at(2024, 1, 22, 12, 30)).await.unwrap();
    assert!(!retry.is_cache_hit());
    assert_eq!(
        scheduler.refresh_state().next_due,
        Some(at(2024, 1, 23, 11, 0))
    );
}

#[tokio::test]
async fn failure_on_first_run_leaves_empty_store() {
    let api = api_with_january();
    let scheduler = FetchScheduler::new(api.clone(), settings());
    api.fail_next(LinkydError::transport("connection reset"));

    assert!(scheduler.refresh(at(2024, 1, 21, 9, 0)).await.is_err());
    assert!(scheduler.store().is_empty());
    assert!(scheduler.refresh_state().next_due.is_none());
    assert!(scheduler.refresh_state().last_successful_fetch.is_none());
}

#[tokio::test]
async fn failure_in_monthly_fetch_discards_daily_data() {
    let api = api_with_january();
    let scheduler = FetchScheduler::new(api.clone(), settings());
    let good = scheduler.refresh(at(2024, 1, 21, 9, 0)).await.unwrap();

    *api.monthly_error.lock().unwrap() = Some(LinkydError::transport("connection reset"));
    assert!(scheduler.refresh(at(2024, 1, 22, 11, 0)).await.is_err());

    // The daily fetch went through but nothing was published
    assert_eq!(
        api.calls().last(),
        Some(&Call::Monthly(ym("2022-12"), ym("2024-02")))
    );
    assert!(Arc::ptr_eq(&scheduler.store(), good.store()));
    assert_eq!(
        scheduler.refresh_state().next_due,
        Some(at(2024, 1, 22, 11, 0))
    );
}

#[tokio::test]
async fn month_boundary_lookback_issues_two_daily_fetches() {
    let api = Arc::new(ScriptedApi::default());
    let scheduler = FetchScheduler::new(api.clone(), settings());

    // Reference 2024-02-05; lookback reaches 2024-01-22
    scheduler.refresh(at(2024, 2, 6, 9, 0)).await.unwrap();
    assert_eq!(
        api.calls(),
        vec![
            Call::Daily(date(2024, 1, 1), date(2024, 1, 31)),
            Call::Daily(date(2024, 2, 1), date(2024, 2, 29)),
            Call::Monthly(ym("2023-01"), ym("2024-03")),
        ]
    );
}

#[tokio::test]
async fn same_month_lookback_issues_one_daily_fetch() {
    let api = Arc::new(ScriptedApi::default());
    let scheduler = FetchScheduler::new(api.clone(), settings());

    scheduler.refresh(at(2024, 1, 21, 9, 0)).await.unwrap();
    let daily_calls = api
        .calls()
        .into_iter()
        .filter(|c| matches!(c, Call::Daily(..)))
        .count();
    assert_eq!(daily_calls, 1);
}

#[tokio::test]
async fn without_extended_aggregates_only_reference_month_is_fetched() {
    let api = Arc::new(ScriptedApi::default());
    let scheduler = FetchScheduler::new(
        api.clone(),
        SchedulerSettings {
            lookback_days: 0,
            extended_aggregates_enabled: false,
            ..settings()
        },
    );

    scheduler.refresh(at(2023, 3, 1, 9, 0)).await.unwrap();
    // Reference 2023-02-28, a non-leap February
    assert_eq!(
        api.calls(),
        vec![Call::Daily(date(2023, 2, 1), date(2023, 2, 28))]
    );
}

#[tokio::test]
async fn concurrent_refresh_is_rejected_as_busy() {
    let api = Arc::new(ScriptedApi {
        delay_ms: 100,
        ..ScriptedApi::default()
    });
    let scheduler = Arc::new(FetchScheduler::new(api.clone(), settings()));
    let now = at(2024, 1, 21, 9, 0);

    let first = {
        let s = scheduler.clone();
        tokio::spawn(async move { s.force_refresh(now).await })
    };
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    assert_eq!(scheduler.state(), SchedulerState::Refreshing);

    let second = scheduler.force_refresh(now).await;
    assert!(matches!(second, Err(LinkydError::Busy)));

    assert!(first.await.unwrap().is_ok());
    assert_eq!(scheduler.state(), SchedulerState::Idle);
}
