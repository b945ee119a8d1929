//! Cancel Registry (spec §4.K).
//!
//! A thread-safe `jobID -> cancelFn` map. The source keeps separate multi-slot
//! (export) and single-slot (import) registries; here both use the same map type,
//! since Rust's ownership model makes a dedicated single-slot wrapper pure
//! duplication of the same `insert`/`remove`/`call` logic. The contract — at most one
//! cancel handle reachable per in-flight job, cancelling is idempotent — holds either
//! way.

use std::{collections::HashMap, sync::Arc};

use tokio::sync::Mutex;

use crate::pause::PauseController;

/// A handle a worker polls to learn whether its job has been cancelled, and that the
/// registry flips when [`CancelRegistry::cancel`] is called.
#[derive(Clone, Default)]
pub struct CancelToken {
    flag: Arc<std::sync::atomic::AtomicBool>,
}

impl CancelToken {
    /// Creates a fresh, not-yet-cancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns whether this token has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(std::sync::atomic::Ordering::SeqCst)
    }

    /// Marks the token cancelled. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, std::sync::atomic::Ordering::SeqCst);
    }

    /// Exposes the underlying flag for use with [`PauseController::wait_if_paused`].
    pub fn as_atomic(&self) -> &std::sync::atomic::AtomicBool {
        &self.flag
    }
}

struct Entry {
    token: CancelToken,
    pause: Arc<PauseController>,
}

/// Thread-safe mapping `jobID -> cancel handle`, shared by the export and import
/// pipelines.
#[derive(Clone, Default)]
pub struct CancelRegistry {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
}

impl CancelRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a fresh cancel token and pause controller for `job_id`, replacing
    /// any prior entry under the same id (a reused id should not happen in practice,
    /// since ids embed a nanosecond timestamp, but replacing instead of refusing
    /// keeps `register` infallible for callers).
    pub async fn register(&self, job_id: impl Into<String>, pause: Arc<PauseController>) -> CancelToken {
        let token = CancelToken::new();
        self.entries.lock().await.insert(
            job_id.into(),
            Entry {
                token: token.clone(),
                pause,
            },
        );
        token
    }

    /// Removes the entry for `job_id`. Safe to call when absent. Must be called on
    /// every terminal outcome (success, cancel, or failure) so the registry never
    /// retains a handle for a job that's no longer in flight.
    pub async fn deregister(&self, job_id: &str) {
        self.entries.lock().await.remove(job_id);
    }

    /// Cancels a single job by id, or every in-flight job when `job_id` is empty
    /// (spec §4.G: `CancelExport("")` cancels every in-flight export). Cancelling an
    /// id with no registered entry is a no-op — `deregister` having already run, or
    /// the id never having existed, are indistinguishable and both fine.
    pub async fn cancel(&self, job_id: &str) {
        let entries = self.entries.lock().await;
        if job_id.is_empty() {
            for entry in entries.values() {
                entry.token.cancel();
                entry.pause.broadcast();
            }
        } else if let Some(entry) = entries.get(job_id) {
            entry.token.cancel();
            entry.pause.broadcast();
        }
    }

    /// Returns whether any job is currently registered (used by tests and by the
    /// "is anything running" UI affordance).
    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn cancel_by_id_only_affects_that_job() {
        let registry = CancelRegistry::new();
        let pause_a = Arc::new(PauseController::new());
        let pause_b = Arc::new(PauseController::new());
        let token_a = registry.register("job-a", pause_a).await;
        let token_b = registry.register("job-b", pause_b).await;

        registry.cancel("job-a").await;

        assert!(token_a.is_cancelled());
        assert!(!token_b.is_cancelled());
    }

    #[tokio::test]
    async fn cancel_empty_id_cancels_every_job() {
        let registry = CancelRegistry::new();
        let token_a = registry.register("job-a", Arc::new(PauseController::new())).await;
        let token_b = registry.register("job-b", Arc::new(PauseController::new())).await;

        registry.cancel("").await;

        assert!(token_a.is_cancelled());
        assert!(token_b.is_cancelled());
    }

    #[tokio::test]
    async fn deregister_then_cancel_is_a_noop() {
        let registry = CancelRegistry::new();
        let token = registry.register("job-a", Arc::new(PauseController::new())).await;
        registry.deregister("job-a").await;

        registry.cancel("job-a").await;

        assert!(!token.is_cancelled());
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn cancelling_twice_is_idempotent() {
        let registry = CancelRegistry::new();
        let token = registry.register("job-a", Arc::new(PauseController::new())).await;
        registry.cancel("job-a").await;
        registry.cancel("job-a").await;
        assert!(token.is_cancelled());
    }
}
