//! Debouncing, serialization and error handling of ProfileOperations.

mod common;

use common::harness;
use scholarly_application::error_handler::{PROFILE_UPDATED_ID, ProfileErrorHandler};
use scholarly_application::{CoordinatorPhase, ErrorDisposition, ProfileDataStore, ProfileOperations};
use scholarly_core::auth::AuthProvider;
use scholarly_core::error::ScholarlyError;
use scholarly_core::notification::{NotificationAction, NotificationLevel};
use scholarly_core::profile::{LoadingState, ProfileUpdate, is_valid_trace, profile_path};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

async fn loaded(h: &common::Harness) -> (ProfileOperations, Arc<ProfileDataStore>) {
    let data = Arc::new(ProfileDataStore::new(h.context.clone()));
    data.load().await.unwrap();
    let (operations, _task) =
        ProfileOperations::spawn(data.clone(), h.notifier.clone(), CancellationToken::new());
    (operations, data)
}

#[tokio::test(start_paused = true)]
async fn test_rapid_updates_produce_one_write() {
    let h = harness().await;
    let (operations, data) = loaded(&h).await;

    let first = operations
        .submit(ProfileUpdate::new().department("Physics"))
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    let second = operations
        .submit(ProfileUpdate::new().position("PhD Student"))
        .unwrap();

    let a = first.wait().await.unwrap();
    let b = second.wait().await.unwrap();
    assert_eq!(a, b);
    assert_eq!(a.department, "Physics");
    assert_eq!(a.position, "PhD Student");

    let writes = h.store.writes();
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].get("department"), Some(&json!("Physics")));
    assert_eq!(writes[0].get("position"), Some(&json!("PhD Student")));

    // One success notification for the whole batch
    let ids = h.notifier.ids();
    assert_eq!(ids.iter().filter(|id| *id == PROFILE_UPDATED_ID).count(), 1);
    assert_eq!(data.state(), LoadingState::Success);
}

#[tokio::test(start_paused = true)]
async fn test_last_value_wins_within_window() {
    let h = harness().await;
    let (operations, _data) = loaded(&h).await;

    let pending: Vec<_> = ["Maths", "Physics", "Chemistry"]
        .into_iter()
        .map(|d| operations.submit(ProfileUpdate::new().department(d)).unwrap())
        .collect();
    for p in pending {
        assert_eq!(p.wait().await.unwrap().department, "Chemistry");
    }

    let writes = h.store.writes();
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].get("department"), Some(&json!("Chemistry")));
}

#[tokio::test(start_paused = true)]
async fn test_each_edit_rearms_the_window() {
    let h = harness().await;
    let (operations, data) = loaded(&h).await;
    let window = data.settings().debounce_window();
    let start = tokio::time::Instant::now();

    let first = operations.submit(ProfileUpdate::new().department("A")).unwrap();
    tokio::time::sleep(window / 2).await;
    let _second = operations.submit(ProfileUpdate::new().position("B")).unwrap();
    first.wait().await.unwrap();

    assert!(start.elapsed() >= window + window / 2);
    assert_eq!(h.store.writes().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_edits_separated_by_window_are_separate_writes() {
    let h = harness().await;
    let (operations, _data) = loaded(&h).await;

    operations
        .update_profile(ProfileUpdate::new().department("Physics"))
        .await
        .unwrap();
    operations
        .update_profile(ProfileUpdate::new().position("Postdoc"))
        .await
        .unwrap();

    assert_eq!(h.store.writes().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_edit_during_write_waits_for_it() {
    let h = harness().await;
    let (operations, data) = loaded(&h).await;
    h.store.set_delay(Duration::from_millis(400));
    let mut phases = operations.subscribe_phase();

    let first = operations
        .submit(ProfileUpdate::new().department("Physics"))
        .unwrap();
    while *phases.borrow_and_update() != CoordinatorPhase::InFlight {
        phases.changed().await.unwrap();
    }
    let second = operations
        .submit(ProfileUpdate::new().position("PhD Student"))
        .unwrap();

    first.wait().await.unwrap();
    let last = second.wait().await.unwrap();
    assert_eq!(last.department, "Physics");
    assert_eq!(last.position, "PhD Student");

    let writes = h.store.writes();
    assert_eq!(writes.len(), 2);
    assert!(writes[1].get("department").is_none());
    assert_eq!(h.store.max_in_flight(), 1);
    assert!(is_valid_trace(&data.transitions()));
}

#[tokio::test(start_paused = true)]
async fn test_write_skipped_by_busy_store_is_rebuffered() {
    let h = harness().await;
    let (operations, data) = loaded(&h).await;
    h.store.set_delay(Duration::from_millis(800));

    // A refresh occupies the data store when the batch comes due
    let refresh = tokio::spawn({
        let data = data.clone();
        async move { data.load().await }
    });
    tokio::task::yield_now().await;
    assert!(data.is_busy());

    let profile = operations
        .update_profile(ProfileUpdate::new().department("Physics"))
        .await
        .unwrap();
    assert_eq!(profile.department, "Physics");
    assert!(refresh.await.unwrap().is_ok());
    assert_eq!(h.store.writes().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_failed_batch_notifies_once_with_retry_action() {
    let h = harness().await;
    let (operations, data) = loaded(&h).await;
    h.store.fail_next_updates(3);

    let first = operations.submit(ProfileUpdate::new().department("Physics")).unwrap();
    let second = operations.submit(ProfileUpdate::new().position("Postdoc")).unwrap();
    assert!(first.wait().await.unwrap_err().is_retryable());
    assert!(second.wait().await.unwrap_err().is_retryable());

    let calls = h.notifier.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].id, "profile-error-network");
    assert_eq!(calls[0].level, NotificationLevel::Error);
    assert_eq!(calls[0].action, Some(NotificationAction::Retry));
    assert_eq!(h.store.update_attempts(), 3);
    assert_eq!(data.state(), LoadingState::Error);
}

#[tokio::test(start_paused = true)]
async fn test_handle_error_uses_stable_ids() {
    let h = harness().await;
    let (operations, _data) = loaded(&h).await;

    for _ in 0..3 {
        assert_eq!(
            operations.handle_error(&ScholarlyError::network("offline")),
            ErrorDisposition::Notified
        );
    }
    assert_eq!(
        operations.handle_error(&ScholarlyError::SessionClosed),
        ErrorDisposition::Ignored
    );

    let ids = h.notifier.ids();
    assert_eq!(ids.len(), 3);
    assert!(ids.iter().all(|id| id == "profile-error-network"));
    assert_eq!(
        ProfileErrorHandler::notification_id(&ScholarlyError::unknown("x")),
        "profile-error-unknown"
    );
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_load_is_not_retried_automatically() {
    let h = harness().await;
    h.store.fail_next_gets(3);
    let data = Arc::new(ProfileDataStore::new(h.context.clone()));
    let handler = ProfileErrorHandler::new(data.clone(), h.notifier.clone());

    let err = data.load().await.unwrap_err();
    assert_eq!(handler.handle(&err), ErrorDisposition::Notified);
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(h.store.get_attempts().len(), 3);
    assert_eq!(data.state(), LoadingState::Error);
}

#[tokio::test(start_paused = true)]
async fn test_handler_reloads_when_budget_remains() {
    let h = harness().await;
    let uid = h.auth.current_user().unwrap().uid;
    let path = profile_path(&uid);
    h.store
        .seed(&path, common::fields(json!({"uid": uid, "articleCount": "lots"})))
        .await;
    let data = Arc::new(ProfileDataStore::new(h.context.clone()));
    let handler = ProfileErrorHandler::new(data.clone(), h.notifier.clone());

    // A malformed record fails once without using up the retry budget
    let err = data.load().await.unwrap_err();
    assert!(!err.is_retryable());
    assert_eq!(data.retry_count(), 1);
    assert_eq!(data.state(), LoadingState::Error);

    h.store
        .seed(&path, common::fields(json!({"uid": uid, "name": "Ada"})))
        .await;
    assert_eq!(
        handler.handle(&ScholarlyError::network("offline")),
        ErrorDisposition::RetryScheduled
    );

    let mut states = data.subscribe();
    while *states.borrow_and_update() != LoadingState::Success {
        states.changed().await.unwrap();
    }
    assert_eq!(data.profile().unwrap().name, "Ada");
}

#[tokio::test(start_paused = true)]
async fn test_second_rename_rejected_while_first_is_in_flight() {
    let h = harness().await;
    let (operations, _data) = loaded(&h).await;
    operations
        .update_profile(ProfileUpdate::new().name("Ada"))
        .await
        .unwrap();
    h.store.set_delay(Duration::from_millis(400));
    let mut phases = operations.subscribe_phase();

    let first = operations.submit(ProfileUpdate::new().name("Ada Byron")).unwrap();
    while *phases.borrow_and_update() != CoordinatorPhase::InFlight {
        phases.changed().await.unwrap();
    }
    let err = operations
        .submit(ProfileUpdate::new().name("Ada Lovelace"))
        .err()
        .unwrap();
    assert!(err.validation_errors().unwrap().contains("name"));

    let saved = first.wait().await.unwrap();
    assert_eq!(saved.name, "Ada Byron");
    assert!(saved.has_changed_name);
    let ids = h.notifier.ids();
    assert!(ids.iter().all(|id| id == PROFILE_UPDATED_ID));
    assert_eq!(h.store.writes().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_buffered_rename_counts_against_one_time_change() {
    let h = harness().await;
    let (operations, _data) = loaded(&h).await;
    operations
        .update_profile(ProfileUpdate::new().institution("X"))
        .await
        .unwrap();

    let first = operations
        .submit(ProfileUpdate::new().institution("Y"))
        .unwrap();
    let err = operations
        .submit(ProfileUpdate::new().institution("Z"))
        .err()
        .unwrap();
    assert!(err.validation_errors().unwrap().contains("institution"));
    // Repeating the buffered value is not a second change
    let same = operations
        .submit(ProfileUpdate::new().institution("Y"))
        .unwrap();

    assert_eq!(first.wait().await.unwrap().institution, "Y");
    assert_eq!(same.wait().await.unwrap().institution, "Y");
    assert_eq!(h.store.writes().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_failed_rename_frees_the_one_time_change() {
    let h = harness().await;
    let (operations, data) = loaded(&h).await;
    operations
        .update_profile(ProfileUpdate::new().name("Ada"))
        .await
        .unwrap();
    h.store.fail_next_updates(3);

    let err = operations
        .update_profile(ProfileUpdate::new().name("Ada Byron"))
        .await
        .unwrap_err();
    assert!(err.is_retryable());
    assert!(!data.profile().unwrap().has_changed_name);

    let renamed = operations
        .update_profile(ProfileUpdate::new().name("Ada Lovelace"))
        .await
        .unwrap();
    assert_eq!(renamed.name, "Ada Lovelace");
    assert!(renamed.has_changed_name);
}
