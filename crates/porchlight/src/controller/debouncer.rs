//! Motion debouncing.
//!
//! Motion sensors report "motion ended" immediately, but people linger. When
//! motion ends the debouncer arms a timer; until it expires the motion still
//! counts as "recently active". New motion cancels the timer.
//!
//! At most one timer exists at a time. Arming always cancels the previous
//! timer first, and every timer carries a `TimerId` that expiry must present
//! back to [`MotionDebouncer::expire`]. Callers hold the controller gate for
//! both, so a timer cancelled while its expiry was waiting for the gate is
//! rejected instead of clearing newer state.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;

/// Identifies one armed timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerId(u64);

#[derive(Debug)]
struct PendingTimeout {
    id: TimerId,
    handle: JoinHandle<()>,
}

#[derive(Debug)]
pub struct MotionDebouncer {
    timeout: Duration,
    motion_active: bool,
    recently_active: bool,
    pending_timeout: Option<PendingTimeout>,
    next_id: u64,
}

impl MotionDebouncer {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            motion_active: false,
            recently_active: false,
            pending_timeout: None,
            next_id: 0,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn motion_active(&self) -> bool {
        self.motion_active
    }

    pub fn recently_active(&self) -> bool {
        self.recently_active
    }

    /// Motion now, or motion that ended less than `timeout` ago.
    pub fn is_active(&self) -> bool {
        self.motion_active || self.recently_active
    }

    pub fn is_pending(&self) -> bool {
        self.pending_timeout.is_some()
    }

    /// Record a new motion reading.
    ///
    /// When motion ends a new timer is armed; after `timeout` it calls
    /// `on_expire` with the timer's id. The callback is expected to take the
    /// gate and call [`expire`](Self::expire).
    pub fn on_motion_changed<F, Fut>(&mut self, active: bool, on_expire: F)
    where
        F: FnOnce(TimerId) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.motion_active = active;
        if active {
            // recently_active is left alone: motion_active already covers it
            // and the next "ended" re-arms it.
            self.cancel();
        } else {
            self.arm(on_expire);
        }
    }

    /// Clear `recently_active` if `id` is the timer currently armed.
    ///
    /// Returns false for a cancelled or superseded timer, which must not
    /// trigger re-resolution.
    pub fn expire(&mut self, id: TimerId) -> bool {
        if !self.pending_timeout.as_ref().is_some_and(|p| p.id == id) {
            return false;
        }
        self.pending_timeout = None;
        self.recently_active = false;
        true
    }

    /// Cancel the pending timer, if any. Returns whether one was cancelled.
    pub fn cancel(&mut self) -> bool {
        match self.pending_timeout.take() {
            Some(pending) => {
                pending.handle.abort();
                true
            }
            None => false,
        }
    }

    fn arm<F, Fut>(&mut self, on_expire: F)
    where
        F: FnOnce(TimerId) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.cancel();

        let id = TimerId(self.next_id);
        self.next_id += 1;

        // Created here so the deadline counts from arming, not from the
        // task's first poll. Saturates instead of overflowing.
        let sleep = tokio::time::sleep(self.timeout);
        let handle = tokio::spawn(async move {
            sleep.await;
            on_expire(id).await;
        });

        self.pending_timeout = Some(PendingTimeout { id, handle });
        self.recently_active = true;
    }
}

impl Drop for MotionDebouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}
