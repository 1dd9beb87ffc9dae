//! Expiry scheduling
//!
//! [`ExpiryTracker`] only records deadlines; it never touches file bytes.
//! The [`worker`] task sleeps until the earliest deadline and evicts due
//! names through the [`Vault`](crate::vault::Vault).

pub mod worker;

use std::collections::{BTreeSet, HashMap};
use std::time::SystemTime;

pub use worker::{spawn_expiry_worker, ExpiryWorkerConfig};

/// Deadline index keyed by stored file name
#[derive(Debug, Default)]
pub struct ExpiryTracker {
    deadlines: HashMap<String, SystemTime>,
    queue: BTreeSet<(SystemTime, String)>,
}

impl ExpiryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track `name` until `deadline`.
    ///
    /// The first deadline recorded for a name wins; returns false if the
    /// name was already tracked.
    pub fn schedule(&mut self, name: &str, deadline: SystemTime) -> bool {
        if self.deadlines.contains_key(name) {
            return false;
        }
        self.deadlines.insert(name.to_string(), deadline);
        self.queue.insert((deadline, name.to_string()));
        true
    }

    /// Stop tracking `name`. Returns false if it was not tracked.
    pub fn remove(&mut self, name: &str) -> bool {
        match self.deadlines.remove(name) {
            Some(deadline) => {
                self.queue.remove(&(deadline, name.to_string()));
                true
            }
            None => false,
        }
    }

    /// Remove and return every name whose deadline is at or before `now`,
    /// earliest first.
    pub fn take_due(&mut self, now: SystemTime) -> Vec<String> {
        let mut due = Vec::new();
        loop {
            match self.queue.first() {
                Some((deadline, _)) if *deadline <= now => {}
                _ => break,
            }
            if let Some((_, name)) = self.queue.pop_first() {
                self.deadlines.remove(&name);
                due.push(name);
            }
        }
        due
    }

    pub fn next_deadline(&self) -> Option<SystemTime> {
        self.queue.first().map(|(deadline, _)| *deadline)
    }

    pub fn deadline_of(&self, name: &str) -> Option<SystemTime> {
        self.deadlines.get(name).copied()
    }

    pub fn is_tracked(&self, name: &str) -> bool {
        self.deadlines.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.deadlines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deadlines.is_empty()
    }
}
