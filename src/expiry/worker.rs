//! Background eviction task
//!
//! Sleeps until the earliest tracked deadline, then evicts everything that
//! is due. A new upload wakes the task early in case its deadline is now
//! the earliest one.

use crate::vault::Vault;
use std::time::{Duration, SystemTime};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Configuration for the expiry worker.
#[derive(Debug, Clone)]
pub struct ExpiryWorkerConfig {
    /// Longest single sleep, so wall-clock jumps are noticed (default: 60 seconds).
    pub max_sleep: Duration,
}

impl Default for ExpiryWorkerConfig {
    fn default() -> Self {
        Self {
            max_sleep: Duration::from_secs(60),
        }
    }
}

/// Spawn the eviction loop.
///
/// Returns a CancellationToken that stops the task, and its join handle.
pub fn spawn_expiry_worker(
    vault: Vault,
    config: ExpiryWorkerConfig,
) -> (CancellationToken, JoinHandle<()>) {
    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();

    let handle = tokio::spawn(async move {
        run_expiry_loop(vault, config, cancel_clone).await;
    });

    (cancel, handle)
}

async fn run_expiry_loop(vault: Vault, config: ExpiryWorkerConfig, cancel: CancellationToken) {
    let wakeup = vault.wakeup();
    log::info!(
        "Expiry worker started (retention {}s)",
        vault.policy().duration.as_secs()
    );

    // The vault lock is only ever taken on the blocking pool
    let mut next = lookup_next_deadline(&vault).await;

    loop {
        let wait = time_until(next, SystemTime::now()).min(config.max_sleep);

        tokio::select! {
            _ = cancel.cancelled() => {
                log::info!("Expiry worker shutting down");
                break;
            }
            _ = wakeup.notified() => {
                next = lookup_next_deadline(&vault).await;
            }
            _ = tokio::time::sleep(wait) => {
                let vault = vault.clone();
                match tokio::task::spawn_blocking(move || vault.evict_due(SystemTime::now())).await {
                    Ok(pass) => {
                        if !pass.evicted.is_empty() {
                            log::debug!("Evicted {} file(s)", pass.evicted.len());
                        }
                        next = pass.next_deadline;
                    }
                    Err(e) => {
                        log::warn!("Eviction task failed: {}", e);
                        next = None;
                    }
                }
            }
        }
    }
}

async fn lookup_next_deadline(vault: &Vault) -> Option<SystemTime> {
    let vault = vault.clone();
    match tokio::task::spawn_blocking(move || vault.next_deadline()).await {
        Ok(next) => next,
        Err(e) => {
            log::warn!("Deadline lookup failed: {}", e);
            None
        }
    }
}

/// Time left until `deadline`, zero if it has passed, unbounded if none.
fn time_until(deadline: Option<SystemTime>, now: SystemTime) -> Duration {
    match deadline {
        Some(deadline) => deadline.duration_since(now).unwrap_or(Duration::ZERO),
        None => Duration::MAX,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::{ContentAddress, StoredName};
    use crate::store::FileStore;
    use crate::vault::RetentionPolicy;
    use tempfile::TempDir;

    #[test]
    fn test_time_until() {
        let now = SystemTime::now();
        assert_eq!(time_until(None, now), Duration::MAX);
        assert_eq!(
            time_until(Some(now - Duration::from_secs(5)), now),
            Duration::ZERO
        );
        assert_eq!(
            time_until(Some(now + Duration::from_secs(5)), now),
            Duration::from_secs(5)
        );
    }

    #[tokio::test]
    async fn test_file_evicted_after_retention() {
        let temp = TempDir::new().unwrap();
        let policy = RetentionPolicy::new(Duration::from_millis(600), Vec::<String>::new());
        let vault = Vault::new(FileStore::open(temp.path()).unwrap(), policy);
        let (cancel, handle) = spawn_expiry_worker(vault.clone(), ExpiryWorkerConfig::default());

        let name = StoredName::new(ContentAddress::of(b"ephemeral"), "image/png");
        vault.ingest(&name, b"ephemeral").unwrap();
        let path = temp.path().join(name.to_string());

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(path.exists(), "evicted before its deadline");

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(!path.exists(), "not evicted after its deadline");
        assert_eq!(vault.tracked_count(), 0);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_ignored_file_survives_worker() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("style.css"), b"body {}").unwrap();
        let policy = RetentionPolicy::new(Duration::from_millis(10), ["style.css"]);
        let vault = Vault::new(FileStore::open(temp.path()).unwrap(), policy);

        std::thread::sleep(Duration::from_millis(30));
        let report = vault.reconcile(SystemTime::now()).unwrap();
        assert_eq!(report.ignored, 1);

        let (cancel, handle) = spawn_expiry_worker(vault.clone(), ExpiryWorkerConfig::default());
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(temp.path().join("style.css").exists());

        cancel.cancel();
        handle.await.unwrap();
    }
}
