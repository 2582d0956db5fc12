//! Profile operations coordinator.
//!
//! An actor that serializes profile writes. Edits are validated when they
//! are submitted, then buffered and flushed as one
//! [`ProfileDataStore::update`] once the debounce window has passed without
//! further edits. Callers whose edits end up in the same batch all receive
//! that batch's result.
//!
//! ```text
//! Idle --edit--> Buffering --window elapsed--> InFlight --done--> Idle
//!                    ^                            |
//!                    +------ edits meanwhile -----+
//! ```
//!
//! At most one write is in flight. Edits arriving while a write runs are
//! buffered and flushed after it completes.
//!
//! Submissions are validated against the projected profile: the loaded
//! record with every accepted but unsettled edit applied on top. A second
//! rename is therefore rejected at submit time even while the first one is
//! still buffered or being written.

use crate::error_handler::{ErrorDisposition, PROFILE_UPDATED_ID, ProfileErrorHandler};
use crate::profile_data_store::{Outcome, ProfileDataStore};
use scholarly_core::error::{Result, ScholarlyError};
use scholarly_core::notification::{Notification, Notifier};
use scholarly_core::profile::{ProfileUpdate, UserProfile, validate_update};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CoordinatorPhase {
    #[default]
    Idle,
    Buffering,
    InFlight,
}

type Reply = oneshot::Sender<Result<UserProfile>>;
type WriteResult = Result<Outcome<UserProfile>>;

enum Command {
    Update {
        seq: u64,
        uid: String,
        update: ProfileUpdate,
        reply: Reply,
    },
    Flush {
        reply: oneshot::Sender<()>,
    },
}

/// Edits collected for one profile, written together.
struct Batch {
    uid: String,
    update: ProfileUpdate,
    waiters: Vec<Reply>,
    /// Ledger entries of the edits in this batch.
    seqs: Vec<u64>,
}

impl Batch {
    fn absorb(&mut self, newer: Batch) {
        self.update = std::mem::take(&mut self.update).merge(newer.update);
        self.waiters.extend(newer.waiters);
        self.seqs.extend(newer.seqs);
    }

    fn resolve(self, result: &Result<UserProfile>, ledger: &EditLedger) {
        ledger.settle(&self.seqs);
        for waiter in self.waiters {
            let _ = waiter.send(result.clone());
        }
    }
}

#[derive(Default)]
struct LedgerEntries {
    next_seq: u64,
    edits: BTreeMap<u64, (String, ProfileUpdate)>,
}

impl LedgerEntries {
    /// `base` with this uid's accepted edits applied in submission order.
    fn project(&self, base: &UserProfile) -> UserProfile {
        self.edits
            .values()
            .filter(|(uid, _)| *uid == base.uid)
            .fold(base.clone(), |profile, (_, edit)| {
                let at = profile.updated_at;
                edit.apply_to(&profile, at)
            })
    }

    fn record(&mut self, uid: String, update: ProfileUpdate) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.edits.insert(seq, (uid, update));
        seq
    }
}

/// Edits accepted by `submit` whose batch has not settled yet.
#[derive(Clone, Default)]
struct EditLedger {
    entries: Arc<Mutex<LedgerEntries>>,
}

impl EditLedger {
    fn lock(&self) -> MutexGuard<'_, LedgerEntries> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn settle(&self, seqs: &[u64]) {
        let mut entries = self.lock();
        for seq in seqs {
            entries.edits.remove(seq);
        }
    }
}

/// Receipt for a submitted edit.
pub struct PendingUpdate {
    receiver: oneshot::Receiver<Result<UserProfile>>,
}

impl PendingUpdate {
    /// Waits for the batch containing this edit to be written.
    pub async fn wait(self) -> Result<UserProfile> {
        self.receiver
            .await
            .unwrap_or(Err(ScholarlyError::SessionClosed))
    }
}

/// Handle to the coordinator task.
pub struct ProfileOperations {
    data: Arc<ProfileDataStore>,
    errors: ProfileErrorHandler,
    mailbox: mpsc::UnboundedSender<Command>,
    phase: watch::Receiver<CoordinatorPhase>,
    ledger: EditLedger,
}

impl ProfileOperations {
    /// Starts the coordinator. The task ends when `cancel` fires or every
    /// handle is dropped and the buffer is drained.
    pub fn spawn(
        data: Arc<ProfileDataStore>,
        notifier: Arc<dyn Notifier>,
        cancel: CancellationToken,
    ) -> (Self, JoinHandle<()>) {
        let (mailbox, receiver) = mpsc::unbounded_channel();
        let (phase_tx, phase) = watch::channel(CoordinatorPhase::Idle);
        let errors = ProfileErrorHandler::new(data.clone(), notifier.clone());
        let ledger = EditLedger::default();

        let coordinator = Coordinator {
            data: data.clone(),
            errors: errors.clone(),
            notifier,
            window: data.settings().debounce_window(),
            mailbox: receiver,
            phase: phase_tx,
            ledger: ledger.clone(),
            cancel,
            pending: None,
            deadline: None,
            flushing: None,
            task: None,
            flush_waiters: Vec::new(),
        };
        let handle = tokio::spawn(coordinator.run());

        (
            Self {
                data,
                errors,
                mailbox,
                phase,
                ledger,
            },
            handle,
        )
    }

    /// Validates `update` against the projected profile and queues it.
    ///
    /// Validation failures are returned here and never reach the buffer.
    pub fn submit(&self, update: ProfileUpdate) -> Result<PendingUpdate> {
        if self.data.is_closed() {
            return Err(ScholarlyError::SessionClosed);
        }
        let current = self.data.profile().ok_or(ScholarlyError::ProfileNotLoaded)?;

        // Held until the command is queued so ledger order matches mailbox order
        let mut ledger = self.ledger.lock();
        let projected = ledger.project(&current);
        validate_update(&update, Some(&projected))?;

        let seq = ledger.record(current.uid.clone(), update.clone());
        let (reply, receiver) = oneshot::channel();
        let command = Command::Update {
            seq,
            uid: current.uid,
            update,
            reply,
        };
        if self.mailbox.send(command).is_err() {
            ledger.edits.remove(&seq);
            return Err(ScholarlyError::SessionClosed);
        }
        Ok(PendingUpdate { receiver })
    }

    /// Submits `update` and waits for the write that carries it.
    pub async fn update_profile(&self, update: ProfileUpdate) -> Result<UserProfile> {
        self.submit(update)?.wait().await
    }

    /// Writes any buffered edits now and waits until nothing is pending.
    pub async fn flush(&self) -> Result<()> {
        let (reply, receiver) = oneshot::channel();
        self.mailbox
            .send(Command::Flush { reply })
            .map_err(|_| ScholarlyError::SessionClosed)?;
        receiver.await.map_err(|_| ScholarlyError::SessionClosed)
    }

    pub fn handle_error(&self, error: &ScholarlyError) -> ErrorDisposition {
        self.errors.handle(error)
    }

    pub fn phase(&self) -> CoordinatorPhase {
        *self.phase.borrow()
    }

    pub fn subscribe_phase(&self) -> watch::Receiver<CoordinatorPhase> {
        self.phase.clone()
    }
}

struct Coordinator {
    data: Arc<ProfileDataStore>,
    errors: ProfileErrorHandler,
    notifier: Arc<dyn Notifier>,
    window: Duration,
    mailbox: mpsc::UnboundedReceiver<Command>,
    phase: watch::Sender<CoordinatorPhase>,
    ledger: EditLedger,
    cancel: CancellationToken,

    pending: Option<Batch>,
    /// When the pending batch is due. Re-armed by every edit.
    deadline: Option<Instant>,
    flushing: Option<Batch>,
    task: Option<JoinHandle<WriteResult>>,
    flush_waiters: Vec<oneshot::Sender<()>>,
}

impl Coordinator {
    async fn run(mut self) {
        tracing::debug!("[ProfileOperations] Coordinator started");
        let mut mailbox_open = true;

        loop {
            self.publish_phase();
            self.resolve_flush_waiters();
            if !mailbox_open && self.pending.is_none() && self.task.is_none() {
                break;
            }
            let due = if self.task.is_none() { self.deadline } else { None };

            tokio::select! {
                _ = self.cancel.cancelled() => {
                    self.abandon();
                    break;
                }
                command = self.mailbox.recv(), if mailbox_open => match command {
                    Some(command) => self.on_command(command),
                    None => {
                        mailbox_open = false;
                        if self.pending.is_some() {
                            self.deadline = Some(Instant::now());
                        }
                    }
                },
                _ = sleep_until(due) => self.start_flush(),
                joined = join(&mut self.task) => self.finish_flush(joined),
            }
        }

        self.phase.send_replace(CoordinatorPhase::Idle);
        tracing::debug!("[ProfileOperations] Coordinator stopped");
    }

    fn on_command(&mut self, command: Command) {
        match command {
            Command::Update {
                seq,
                uid,
                update,
                reply,
            } => {
                let fields = update.touched_fields();
                let incoming = Batch {
                    uid,
                    update,
                    waiters: vec![reply],
                    seqs: vec![seq],
                };
                match self.pending.take() {
                    Some(mut batch) if batch.uid == incoming.uid => {
                        batch.absorb(incoming);
                        self.pending = Some(batch);
                    }
                    stale => {
                        if let Some(batch) = stale {
                            tracing::debug!(
                                "[ProfileOperations] Dropping edits buffered for uid={}",
                                batch.uid
                            );
                            batch.resolve(&Err(ScholarlyError::ProfileNotLoaded), &self.ledger);
                        }
                        self.pending = Some(incoming);
                    }
                }
                self.deadline = Some(Instant::now() + self.window);
                tracing::debug!(
                    "[ProfileOperations] Buffered {:?}, flushing in {:?}",
                    fields,
                    self.window
                );
            }
            Command::Flush { reply } => {
                if self.pending.is_some() {
                    self.deadline = Some(Instant::now());
                }
                self.flush_waiters.push(reply);
            }
        }
    }

    fn start_flush(&mut self) {
        self.deadline = None;
        let Some(batch) = self.pending.take() else {
            return;
        };

        let loaded_uid = self.data.profile().map(|profile| profile.uid);
        if loaded_uid.as_deref() != Some(batch.uid.as_str()) {
            tracing::debug!(
                "[ProfileOperations] Profile uid={} is no longer loaded, dropping batch",
                batch.uid
            );
            batch.resolve(&Err(ScholarlyError::ProfileNotLoaded), &self.ledger);
            return;
        }

        tracing::debug!(
            "[ProfileOperations] Flushing {:?} for {} caller(s)",
            batch.update.touched_fields(),
            batch.waiters.len()
        );
        let data = self.data.clone();
        let update = batch.update.clone();
        self.task = Some(tokio::spawn(async move { data.update(update).await }));
        self.flushing = Some(batch);
    }

    fn finish_flush(&mut self, joined: std::result::Result<WriteResult, JoinError>) {
        self.task = None;
        let Some(batch) = self.flushing.take() else {
            return;
        };

        let result = joined.unwrap_or_else(|e| {
            Err(ScholarlyError::unknown(format!("Profile write task failed: {}", e)))
        });
        match result {
            Ok(Outcome::Completed(profile)) => {
                tracing::info!(
                    "[ProfileOperations] Profile saved ({} edit(s) in batch)",
                    batch.waiters.len()
                );
                self.notifier
                    .notify(Notification::success(PROFILE_UPDATED_ID, "Profile updated"));
                batch.resolve(&Ok(profile), &self.ledger);
            }
            Ok(Outcome::Skipped) => {
                tracing::debug!("[ProfileOperations] Write skipped by the data store, re-buffering");
                self.rebuffer(batch);
            }
            Err(error) => {
                self.errors.handle(&error);
                batch.resolve(&Err(error), &self.ledger);
            }
        }
    }

    /// Puts a skipped batch back in front of anything buffered meanwhile.
    fn rebuffer(&mut self, mut batch: Batch) {
        match self.pending.take() {
            Some(newer) if newer.uid == batch.uid => {
                batch.absorb(newer);
                self.pending = Some(batch);
            }
            Some(newer) => {
                batch.resolve(&Err(ScholarlyError::ProfileNotLoaded), &self.ledger);
                self.pending = Some(newer);
            }
            None => self.pending = Some(batch),
        }
        self.deadline = Some(Instant::now() + self.window);
    }

    fn abandon(&mut self) {
        let closed = Err(ScholarlyError::SessionClosed);
        if let Some(batch) = self.pending.take() {
            batch.resolve(&closed, &self.ledger);
        }
        if let Some(batch) = self.flushing.take() {
            batch.resolve(&closed, &self.ledger);
        }
        for waiter in self.flush_waiters.drain(..) {
            let _ = waiter.send(());
        }
        tracing::debug!("[ProfileOperations] Abandoned buffered edits on teardown");
    }

    fn resolve_flush_waiters(&mut self) {
        if self.pending.is_none() && self.task.is_none() {
            for waiter in self.flush_waiters.drain(..) {
                let _ = waiter.send(());
            }
        }
    }

    fn publish_phase(&self) {
        let phase = if self.task.is_some() {
            CoordinatorPhase::InFlight
        } else if self.pending.is_some() {
            CoordinatorPhase::Buffering
        } else {
            CoordinatorPhase::Idle
        };
        self.phase.send_if_modified(|current| {
            if *current == phase {
                false
            } else {
                *current = phase;
                true
            }
        });
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn join<T>(task: &mut Option<JoinHandle<T>>) -> std::result::Result<T, JoinError> {
    match task {
        Some(handle) => handle.await,
        None => std::future::pending().await,
    }
}
