//! Load, retry and state-machine behaviour of ProfileDataStore.

mod common;

use common::{fields, harness};
use scholarly_application::{Outcome, ProfileDataStore};
use scholarly_core::auth::AuthProvider;
use scholarly_core::error::ErrorKind;
use scholarly_core::profile::{LoadingState, ProfileUpdate, is_valid_trace, profile_path};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn test_three_failed_loads_end_in_error_without_fourth_attempt() {
    let h = harness().await;
    h.store.fail_next_gets(10);
    let data = ProfileDataStore::new(h.context.clone());

    let err = data.load().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Network);
    assert_eq!(data.state(), LoadingState::Error);
    assert_eq!(data.retry_count(), 3);
    assert_eq!(h.store.get_attempts().len(), 3);

    // Nothing retries on its own, however long we wait
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(h.store.get_attempts().len(), 3);

    // A plain load does not bypass the exhausted budget either
    assert!(data.load().await.is_err());
    assert_eq!(h.store.get_attempts().len(), 3);
    assert!(data.retry_count() <= 3);

    h.store.fail_next_gets(0);
    let profile = data.retry().await.unwrap().completed().unwrap();
    assert_eq!(profile.email, "ada@example.org");
    assert_eq!(data.state(), LoadingState::Success);
    assert_eq!(h.store.get_attempts().len(), 4);
    assert!(data.last_error().is_none());
    assert!(is_valid_trace(&data.transitions()));
}

#[tokio::test(start_paused = true)]
async fn test_backoff_doubles_between_attempts() {
    let h = harness().await;
    h.store.fail_next_gets(3);
    let data = ProfileDataStore::new(h.context.clone());
    let base = data.settings().retry_base_delay();

    data.load().await.unwrap_err();

    let attempts = h.store.get_attempts();
    assert_eq!(attempts.len(), 3);
    for (k, pair) in attempts.windows(2).enumerate() {
        let gap = pair[1] - pair[0];
        let expected = base * 2u32.pow(k as u32);
        assert!(
            gap >= expected && gap < expected + Duration::from_millis(50),
            "gap {} was {:?}, expected {:?}",
            k,
            gap,
            expected
        );
    }
}

#[tokio::test(start_paused = true)]
async fn test_transient_failure_recovers_within_budget() {
    let h = harness().await;
    h.store.fail_next_gets(2);
    let data = ProfileDataStore::new(h.context.clone());

    let outcome = data.load().await.unwrap();
    assert!(matches!(outcome, Outcome::Completed(_)));
    assert_eq!(data.retry_count(), 2);
    assert_eq!(data.state(), LoadingState::Success);
    assert_eq!(
        data.transitions(),
        vec![
            LoadingState::Idle,
            LoadingState::Initializing,
            LoadingState::Loading,
            LoadingState::Success
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_load_is_skipped() {
    let h = harness().await;
    h.store.set_delay(Duration::from_millis(300));
    let data = Arc::new(ProfileDataStore::new(h.context.clone()));

    let (first, second) = tokio::join!(data.load(), data.load());
    let outcomes = [first.unwrap(), second.unwrap()];
    assert_eq!(outcomes.iter().filter(|o| o.is_skipped()).count(), 1);
    assert_eq!(h.store.get_attempts().len(), 1);
    assert_eq!(h.store.max_in_flight(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_slow_load_is_not_aborted() {
    let h = harness().await;
    h.store.set_delay(Duration::from_secs(8));
    let data = ProfileDataStore::new(h.context.clone());

    assert!(data.load().await.unwrap().completed().is_some());
    assert_eq!(data.state(), LoadingState::Success);
}

#[tokio::test(start_paused = true)]
async fn test_completeness_scenario() {
    let h = harness().await;
    let uid = h.auth.current_user().unwrap().uid;
    h.store
        .seed(
            &profile_path(&uid),
            fields(json!({
                "uid": uid,
                "name": "",
                "role": "",
                "institution": "",
                "email": "ada@example.org"
            })),
        )
        .await;
    let data = ProfileDataStore::new(h.context.clone());

    data.load().await.unwrap();
    assert!(!data.is_profile_complete());

    let updated = data
        .update(
            ProfileUpdate::new()
                .name("A")
                .role("Researcher")
                .institution("X"),
        )
        .await
        .unwrap()
        .completed()
        .unwrap();

    assert!(updated.profile_complete);
    assert!(data.is_profile_complete());
    assert_eq!(data.state(), LoadingState::Success);
    // Filling blank fields does not use up the one-time change
    assert!(!updated.has_changed_name);
    assert!(!updated.has_changed_institution);
    assert!(is_valid_trace(&data.transitions()));
}

#[tokio::test(start_paused = true)]
async fn test_failed_write_retries_then_errors() {
    let h = harness().await;
    let data = ProfileDataStore::new(h.context.clone());
    data.load().await.unwrap();
    h.store.fail_next_updates(5);

    let err = data
        .update(ProfileUpdate::new().department("Physics"))
        .await
        .unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(h.store.update_attempts(), 3);
    assert_eq!(data.state(), LoadingState::Error);
    // The record in memory is unchanged
    assert_eq!(data.profile().unwrap().department, "");

    // Writing again from ERROR is allowed once the profile is loaded
    h.store.fail_next_updates(0);
    let updated = data
        .update(ProfileUpdate::new().department("Physics"))
        .await
        .unwrap()
        .completed()
        .unwrap();
    assert_eq!(updated.department, "Physics");
    assert_eq!(data.state(), LoadingState::Success);
    assert!(is_valid_trace(&data.transitions()));
}

#[tokio::test(start_paused = true)]
async fn test_successful_write_after_failed_refresh_allows_loading_again() {
    let h = harness().await;
    let data = ProfileDataStore::new(h.context.clone());
    data.load().await.unwrap();

    h.store.fail_next_gets(3);
    assert!(data.load().await.is_err());
    assert_eq!(data.state(), LoadingState::Error);

    data.update(ProfileUpdate::new().department("Physics"))
        .await
        .unwrap()
        .completed()
        .unwrap();
    assert_eq!(data.state(), LoadingState::Success);
    assert!(data.last_error().is_none());

    let reloaded = data.load().await.unwrap().completed().unwrap();
    assert_eq!(reloaded.department, "Physics");
    assert_eq!(data.state(), LoadingState::Success);
    assert_eq!(h.store.get_attempts().len(), 5);
    assert!(is_valid_trace(&data.transitions()));
}

#[tokio::test(start_paused = true)]
async fn test_one_time_name_change_is_enforced() {
    let h = harness().await;
    let data = ProfileDataStore::new(h.context.clone());
    data.load().await.unwrap();

    data.update(ProfileUpdate::new().name("Ada")).await.unwrap();
    let renamed = data
        .update(ProfileUpdate::new().name("Ada Lovelace"))
        .await
        .unwrap()
        .completed()
        .unwrap();
    assert!(renamed.has_changed_name);

    let err = data
        .update(ProfileUpdate::new().name("Countess"))
        .await
        .unwrap_err();
    assert!(err.validation_errors().unwrap().contains("name"));
    assert_eq!(data.profile().unwrap().name, "Ada Lovelace");
}

#[tokio::test(start_paused = true)]
async fn test_reset_during_load_drops_stale_result() {
    let h = harness().await;
    h.store.set_delay(Duration::from_millis(200));
    let data = Arc::new(ProfileDataStore::new(h.context.clone()));

    let loading = tokio::spawn({
        let data = data.clone();
        async move { data.load().await }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    data.reset();

    let outcome = loading.await.unwrap().unwrap();
    assert!(outcome.is_skipped());
    assert!(data.profile().is_none());
    assert_eq!(data.state(), LoadingState::Idle);
    assert!(is_valid_trace(&data.transitions()));
}

#[tokio::test(start_paused = true)]
async fn test_teardown_during_load_suppresses_state_update() {
    let h = harness().await;
    h.store.set_delay(Duration::from_millis(200));
    let data = Arc::new(ProfileDataStore::new(h.context.clone()));

    let loading = tokio::spawn({
        let data = data.clone();
        async move { data.load().await }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    data.teardown();

    let err = loading.await.unwrap().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SessionClosed);
    assert_eq!(data.state(), LoadingState::Loading);
    assert!(data.profile().is_none());
}
