//! Re-derives profile loading from auth-state changes.

use crate::error_handler::ProfileErrorHandler;
use crate::profile_data_store::{Outcome, ProfileDataStore};
use scholarly_core::auth::{AuthProvider, AuthUser};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Spawns the listener task.
///
/// The identity current at spawn time is loaded right away. Afterwards, a
/// change of signed-in uid resets the data store and loads the new profile;
/// signing out resets it to `Idle`. Re-emissions for the same uid are ignored.
pub fn spawn_auth_listener(
    auth: Arc<dyn AuthProvider>,
    data: Arc<ProfileDataStore>,
    errors: ProfileErrorHandler,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    let mut changes = auth.subscribe();

    tokio::spawn(async move {
        let mut current_uid = changes.borrow_and_update().as_ref().map(|u| u.uid.clone());
        if let Some(uid) = &current_uid {
            tracing::debug!("[AuthListener] Initial identity uid={}", uid);
            load_for(&data, &errors, &cancel).await;
        }

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                changed = changes.changed() => {
                    if changed.is_err() {
                        tracing::debug!("[AuthListener] Auth provider went away");
                        break;
                    }
                }
            }

            let user: Option<AuthUser> = changes.borrow_and_update().clone();
            let uid = user.map(|u| u.uid);
            if uid == current_uid {
                continue;
            }

            match &uid {
                Some(uid) => tracing::info!("[AuthListener] Identity changed to uid={}", uid),
                None => tracing::info!("[AuthListener] Signed out"),
            }
            current_uid = uid;
            data.reset();
            if current_uid.is_some() {
                load_for(&data, &errors, &cancel).await;
            }
        }

        tracing::debug!("[AuthListener] Stopped");
    })
}

/// Loads the current identity's profile, waiting out an operation that is
/// still running for a previous identity.
async fn load_for(data: &ProfileDataStore, errors: &ProfileErrorHandler, cancel: &CancellationToken) {
    loop {
        let result = tokio::select! {
            _ = cancel.cancelled() => return,
            result = data.load() => result,
        };
        match result {
            Ok(Outcome::Completed(profile)) => {
                tracing::debug!("[AuthListener] Loaded profile uid={}", profile.uid);
                return;
            }
            Ok(Outcome::Skipped) => {
                data.wait_until_idle().await;
                if data.profile().is_some() {
                    return;
                }
            }
            Err(e) => {
                errors.handle(&e);
                return;
            }
        }
    }
}
