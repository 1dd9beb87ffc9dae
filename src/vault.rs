//! Serialized access to the file store and its expiry schedule
//!
//! Every mutation of the storage directory and of the deadline index goes
//! through one mutex, so a request writing a file can never interleave with
//! an eviction or the startup scan.

use crate::address::StoredName;
use crate::expiry::ExpiryTracker;
use crate::store::{FileStore, PutOutcome, StoreError, StoreResult};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime};
use tokio::sync::Notify;

/// Delay before a failed eviction is attempted again
pub const EVICTION_RETRY: Duration = Duration::from_secs(60);

/// How long files are kept and which ones are exempt
#[derive(Debug, Clone)]
pub struct RetentionPolicy {
    pub duration: Duration,
    pub ignore: BTreeSet<String>,
}

impl RetentionPolicy {
    pub fn new<I, S>(duration: Duration, ignore: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            duration,
            ignore: ignore.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_ignored(&self, name: &str) -> bool {
        self.ignore.contains(name)
    }

    /// Eviction deadline for a file last written at `written`
    pub fn deadline_for(&self, written: SystemTime) -> SystemTime {
        written + self.duration
    }
}

/// Counts from the startup scan
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Files given a deadline
    pub scheduled: usize,
    /// Overdue files deleted during the scan
    pub expired: usize,
    /// Files on the ignore list
    pub ignored: usize,
    /// Overdue files whose delete failed, queued for another attempt
    pub retried: usize,
    /// Leftover temporaries from interrupted writes
    pub stale_temps: usize,
}

/// Result of one [`Vault::evict_due`] pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvictionPass {
    /// Names deleted in this pass
    pub evicted: Vec<String>,
    /// Earliest deadline still tracked afterwards
    pub next_deadline: Option<SystemTime>,
}

/// Outcome of [`Vault::ingest`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// New file written and scheduled
    Stored,
    /// Same content already stored; nothing rewritten
    Duplicate,
}

struct VaultState {
    store: FileStore,
    tracker: ExpiryTracker,
}

enum Deletion {
    Deleted,
    Missing,
    Retrying,
}

impl VaultState {
    /// Delete an expired file, re-queueing it at `retry_at` if that fails
    fn delete_expired(&mut self, name: &str, retry_at: SystemTime) -> Deletion {
        self.tracker.remove(name);
        match self.store.delete(name) {
            Ok(true) => Deletion::Deleted,
            Ok(false) => Deletion::Missing,
            Err(e) => {
                log::warn!("Failed to delete {}, retrying later: {}", name, e);
                self.tracker.schedule(name, retry_at);
                Deletion::Retrying
            }
        }
    }
}

/// Shared handle over one storage directory
#[derive(Clone)]
pub struct Vault {
    state: Arc<Mutex<VaultState>>,
    policy: Arc<RetentionPolicy>,
    verify_existing: bool,
    wakeup: Arc<Notify>,
}

impl Vault {
    /// Wrap a store. Nothing is tracked until [`Vault::reconcile`] runs.
    pub fn new(store: FileStore, policy: RetentionPolicy) -> Self {
        Self {
            state: Arc::new(Mutex::new(VaultState {
                store,
                tracker: ExpiryTracker::new(),
            })),
            policy: Arc::new(policy),
            verify_existing: false,
            wakeup: Arc::new(Notify::new()),
        }
    }

    /// Compare bytes against the existing file on a dedup hit
    pub fn with_verify_existing(mut self, verify: bool) -> Self {
        self.verify_existing = verify;
        self
    }

    fn lock(&self) -> MutexGuard<'_, VaultState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn policy(&self) -> &RetentionPolicy {
        &self.policy
    }

    pub fn root(&self) -> PathBuf {
        self.lock().store.root().to_path_buf()
    }

    /// Rebuild the schedule from the directory's own timestamps.
    ///
    /// Files already past their deadline are deleted on the spot; the rest
    /// are scheduled at `modified + duration`.
    pub fn reconcile(&self, now: SystemTime) -> StoreResult<ReconcileReport> {
        let mut state = self.lock();
        let mut report = ReconcileReport {
            stale_temps: state.store.remove_stale_temps()?,
            ..ReconcileReport::default()
        };
        let files = state.store.list_all()?;

        for file in files {
            if self.policy.is_ignored(&file.name) {
                report.ignored += 1;
                continue;
            }

            let deadline = self.policy.deadline_for(file.modified);
            if deadline >= now {
                if state.tracker.schedule(&file.name, deadline) {
                    report.scheduled += 1;
                }
                continue;
            }

            match state.delete_expired(&file.name, now + EVICTION_RETRY) {
                Deletion::Deleted | Deletion::Missing => {
                    report.expired += 1;
                    log::info!("Removed expired {}", file.path.display());
                }
                Deletion::Retrying => report.retried += 1,
            }
        }

        drop(state);
        self.wakeup.notify_one();
        Ok(report)
    }

    /// Store `data` under `name` once.
    ///
    /// A dedup hit leaves the existing file and its deadline alone.
    pub fn ingest(&self, name: &StoredName, data: &[u8]) -> StoreResult<IngestOutcome> {
        let name = name.to_string();
        let mut state = self.lock();

        if state.store.exists(&name)? {
            if self.verify_existing && state.store.read(&name)? != data {
                return Err(StoreError::Collision(name));
            }
            // Written behind our back since startup
            if !self.policy.is_ignored(&name) && !state.tracker.is_tracked(&name) {
                let modified = state.store.modified(&name)?;
                state
                    .tracker
                    .schedule(&name, self.policy.deadline_for(modified));
                self.wakeup.notify_one();
            }
            log::debug!("Duplicate upload of {}", name);
            return Ok(IngestOutcome::Duplicate);
        }

        if state.store.put(&name, data)? == PutOutcome::AlreadyExists {
            return Ok(IngestOutcome::Duplicate);
        }

        if !self.policy.is_ignored(&name) {
            let deadline = self.policy.deadline_for(SystemTime::now());
            state.tracker.schedule(&name, deadline);
            log::debug!(
                "Scheduled {} for eviction at {}",
                name,
                chrono::DateTime::<chrono::Utc>::from(deadline).to_rfc3339()
            );
            self.wakeup.notify_one();
        }

        Ok(IngestOutcome::Stored)
    }

    /// Delete a stored file and forget its deadline.
    /// Returns true if the file was deleted, false if it didn't exist
    pub fn remove(&self, name: &str) -> StoreResult<bool> {
        if self.policy.is_ignored(name) {
            return Err(StoreError::Protected(name.to_string()));
        }
        let mut state = self.lock();
        state.tracker.remove(name);
        state.store.delete(name)
    }

    /// Delete every file whose deadline has passed.
    ///
    /// A file that cannot be deleted stays tracked and is retried after
    /// [`EVICTION_RETRY`].
    pub fn evict_due(&self, now: SystemTime) -> EvictionPass {
        let mut state = self.lock();
        let mut evicted = Vec::new();

        for name in state.tracker.take_due(now) {
            if self.policy.is_ignored(&name) {
                continue;
            }
            match state.delete_expired(&name, now + EVICTION_RETRY) {
                Deletion::Deleted => {
                    log::info!("Evicted {}", name);
                    evicted.push(name);
                }
                Deletion::Missing => log::debug!("{} was already gone", name),
                Deletion::Retrying => {}
            }
        }

        EvictionPass {
            evicted,
            next_deadline: state.tracker.next_deadline(),
        }
    }

    pub fn next_deadline(&self) -> Option<SystemTime> {
        self.lock().tracker.next_deadline()
    }

    pub fn deadline_of(&self, name: &str) -> Option<SystemTime> {
        self.lock().tracker.deadline_of(name)
    }

    pub fn is_tracked(&self, name: &str) -> bool {
        self.lock().tracker.is_tracked(name)
    }

    pub fn tracked_count(&self) -> usize {
        self.lock().tracker.len()
    }

    /// Signalled whenever a new deadline may be earlier than the current one
    pub(crate) fn wakeup(&self) -> Arc<Notify> {
        Arc::clone(&self.wakeup)
    }
}

/// Open a vault over `root` and run the startup scan
pub fn open_vault<P: AsRef<Path>>(
    root: P,
    policy: RetentionPolicy,
    verify_existing: bool,
) -> StoreResult<(Vault, ReconcileReport)> {
    let store = FileStore::open(root)?;
    let vault = Vault::new(store, policy).with_verify_existing(verify_existing);
    let report = vault.reconcile(SystemTime::now())?;
    Ok((vault, report))
}
