//! Pause Controller (spec §4.J).
//!
//! The source models this as a mutex + condition variable; `tokio::sync::Notify` is
//! the idiomatic async equivalent (spec §9: "a channel + select loop or an atomic flag
//! polled at each checkpoint is equivalent if `Resume` and cancellation both publish a
//! wake"). `Resume` and cancellation both call `notify_waiters`, so every task blocked
//! in `wait_if_paused` wakes up and re-checks state, matching the "broadcast" contract.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

/// Thread-safe pause/wait/resume primitive shared by the export and import pipelines.
#[derive(Debug, Default)]
pub struct PauseController {
    paused: AtomicBool,
    notify: Notify,
}

impl PauseController {
    /// Creates a new controller in the running (not paused) state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the paused flag. Workers already blocked in [`wait_if_paused`] stay
    /// blocked until [`resume`] or the caller's cancellation signal fires.
    ///
    /// [`wait_if_paused`]: PauseController::wait_if_paused
    /// [`resume`]: PauseController::resume
    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    /// Clears the paused flag and wakes every waiter.
    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Returns whether the controller is currently paused.
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// Clears the paused flag without waking anyone (used when re-registering a
    /// pipeline for a fresh job so a stale pause from a prior job can't leak in).
    pub fn reset(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    /// Wakes every waiter without changing the paused flag. Callers that cancel an
    /// operation must call this so a worker currently blocked inside
    /// [`wait_if_paused`] observes the cancellation promptly instead of waiting for
    /// an unrelated `resume`.
    ///
    /// [`wait_if_paused`]: PauseController::wait_if_paused
    pub fn broadcast(&self) {
        self.notify.notify_waiters();
    }

    /// Blocks while paused. Returns `true` once clear to proceed, `false` if
    /// `cancelled` became true while waiting. Checks `cancelled` both before and
    /// after blocking, since `notify_waiters` only wakes tasks already registered as
    /// waiters — a cancellation published strictly before the first `paused` check
    /// still must be observed immediately rather than requiring a spurious pause
    /// first.
    pub async fn wait_if_paused(&self, cancelled: &AtomicBool) -> bool {
        loop {
            if cancelled.load(Ordering::SeqCst) {
                return false;
            }
            if !self.is_paused() {
                return true;
            }
            let notified = self.notify.notified();
            // Re-check after subscribing to avoid missing a wake that happened
            // between the `is_paused` check above and `notified()` registering.
            if !self.is_paused() || cancelled.load(Ordering::SeqCst) {
                continue;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod test {
    use std::{sync::Arc, time::Duration};

    use super::*;

    #[tokio::test]
    async fn wait_if_paused_proceeds_immediately_when_not_paused() {
        let controller = PauseController::new();
        let cancelled = AtomicBool::new(false);
        assert!(controller.wait_if_paused(&cancelled).await);
    }

    #[tokio::test]
    async fn resume_wakes_a_blocked_waiter() {
        let controller = Arc::new(PauseController::new());
        controller.pause();
        let cancelled = Arc::new(AtomicBool::new(false));

        let waiter_controller = controller.clone();
        let waiter_cancelled = cancelled.clone();
        let waiter = tokio::spawn(async move { waiter_controller.wait_if_paused(&waiter_cancelled).await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        controller.resume();

        assert!(waiter.await.unwrap());
    }

    #[tokio::test]
    async fn cancellation_unblocks_a_paused_waiter() {
        let controller = Arc::new(PauseController::new());
        controller.pause();
        let cancelled = Arc::new(AtomicBool::new(false));

        let waiter_controller = controller.clone();
        let waiter_cancelled = cancelled.clone();
        let waiter = tokio::spawn(async move { waiter_controller.wait_if_paused(&waiter_cancelled).await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        cancelled.store(true, Ordering::SeqCst);
        controller.broadcast();

        assert!(!waiter.await.unwrap());
    }

    #[tokio::test]
    async fn reset_clears_a_stale_pause() {
        let controller = PauseController::new();
        controller.pause();
        controller.reset();
        assert!(!controller.is_paused());
    }
}
