//! Per-group usage accounting

use tokio::sync::mpsc;
use tracing::trace;

/// Limit and usage of one named group
///
/// A `Group` performs no locking of its own; every method is called with
/// the owning limiter's lock held.
#[derive(Debug)]
pub(crate) struct Group {
    name: String,
    limit: usize,
    current: usize,
    waiters: Vec<mpsc::Sender<()>>,
}

impl Group {
    pub(crate) fn new(name: impl Into<String>, limit: usize) -> Self {
        Self {
            name: name.into(),
            limit,
            current: 0,
            waiters: Vec::new(),
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn limit(&self) -> usize {
        self.limit
    }

    pub(crate) fn current(&self) -> usize {
        self.current
    }

    pub(crate) fn waiter_count(&self) -> usize {
        self.waiters.len()
    }

    /// Overwrite the limit. Existing reservations are never revoked, so a
    /// lowered limit can leave the group over-subscribed for a while.
    pub(crate) fn set_limit(&mut self, limit: usize) {
        self.limit = limit;
    }

    pub(crate) fn can_reserve(&self) -> bool {
        self.current < self.limit
    }

    /// Commit one unit of usage. The caller has already checked
    /// [`Group::can_reserve`] under the same lock.
    pub(crate) fn reserve(&mut self) {
        self.current += 1;
    }

    pub(crate) fn remaining_capacity(&self) -> usize {
        self.limit.saturating_sub(self.current)
    }

    pub(crate) fn register_waiter(&mut self, waiter: mpsc::Sender<()>) {
        // waiters whose reservation already finished
        self.waiters.retain(|w| !w.is_closed());
        self.waiters.push(waiter);
    }

    /// Give back one unit of usage and wake every registered waiter.
    ///
    /// Returns `true` when usage is zero afterwards, whether it just got
    /// there or already was; either way the group can be forgotten.
    pub(crate) fn release(&mut self) -> bool {
        self.current = self.current.saturating_sub(1);
        self.notify_waiters();
        self.current == 0
    }

    /// Non-blocking broadcast to every waiter, then forget them.
    pub(crate) fn notify_waiters(&mut self) {
        if self.waiters.is_empty() {
            return;
        }
        trace!(group = %self.name, waiters = self.waiters.len(), "notifying waiters");
        for waiter in self.waiters.drain(..) {
            // full or closed channels already know to re-check
            let _ = waiter.try_send(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserve_until_full() {
        let mut group = Group::new("downloads", 2);
        assert!(group.can_reserve());
        group.reserve();
        group.reserve();
        assert!(!group.can_reserve());
        assert_eq!(group.current(), 2);
        assert_eq!(group.remaining_capacity(), 0);
    }

    #[test]
    fn test_zero_limit_never_reserves() {
        let group = Group::new("paused", 0);
        assert!(!group.can_reserve());
        assert_eq!(group.remaining_capacity(), 0);
    }

    #[test]
    fn test_lowered_limit_oversubscribes() {
        let mut group = Group::new("builds", 3);
        group.reserve();
        group.reserve();
        group.set_limit(1);
        assert_eq!(group.current(), 2);
        assert!(!group.can_reserve());
        assert_eq!(group.remaining_capacity(), 0);

        assert!(!group.release());
        assert!(!group.can_reserve());
        assert!(group.release());
    }

    #[test]
    fn test_release_on_empty_group_reports_drained() {
        let mut group = Group::new("idle", 1);
        assert!(group.release());
        assert_eq!(group.current(), 0);
    }

    #[test]
    fn test_release_wakes_and_clears_waiters() {
        let mut group = Group::new("db", 1);
        group.reserve();

        let (tx1, mut rx1) = mpsc::channel(1);
        let (tx2, mut rx2) = mpsc::channel(1);
        group.register_waiter(tx1);
        group.register_waiter(tx2);
        assert_eq!(group.waiter_count(), 2);

        assert!(group.release());
        assert_eq!(group.waiter_count(), 0);
        assert_eq!(rx1.try_recv(), Ok(()));
        assert_eq!(rx2.try_recv(), Ok(()));
    }

    #[test]
    fn test_release_does_not_block_on_full_channel() {
        let mut group = Group::new("db", 2);
        group.reserve();
        group.reserve();

        let (tx, mut rx) = mpsc::channel(1);
        tx.try_send(()).unwrap();
        group.register_waiter(tx);

        assert!(!group.release());
        assert_eq!(rx.try_recv(), Ok(()));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_register_prunes_closed_waiters() {
        let mut group = Group::new("db", 1);
        let (stale, stale_rx) = mpsc::channel(1);
        group.register_waiter(stale);
        drop(stale_rx);

        let (fresh, _fresh_rx) = mpsc::channel(1);
        group.register_waiter(fresh);
        assert_eq!(group.waiter_count(), 1);
    }
}
