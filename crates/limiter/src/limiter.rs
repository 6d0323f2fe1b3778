//! Multi-group admission control
//!
//! All group state lives behind one mutex. A reservation checks every named
//! group and commits to all of them inside the same critical section, so no
//! other caller can observe a partially applied reservation.

use crate::group::Group;
use crate::guard::{OwnedReservation, Reservation};
use crate::lookup::LimitLookup;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{timeout_at, Instant};
use tracing::debug;

/// Usage of one cached group at a point in time
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupUsage {
    pub name: String,
    pub limit: usize,
    pub current: usize,
    /// Callers currently blocked on this group
    pub waiters: usize,
}

/// Bounds concurrent usage per named group
///
/// Groups are materialized on first reference by asking the lookup and are
/// evicted as soon as their usage drops back to zero, so the limiter only
/// holds state for groups that are actually in use (or were queried).
pub struct Limiter {
    lookup: Box<dyn LimitLookup>,
    groups: Mutex<HashMap<String, Group>>,
}

impl fmt::Debug for Limiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Limiter")
            .field("groups", &self.lock().len())
            .finish_non_exhaustive()
    }
}

impl Limiter {
    /// Create a limiter with an empty group cache
    pub fn new<L>(lookup: L) -> Self
    where
        L: LimitLookup + 'static,
    {
        Self {
            lookup: Box::new(lookup),
            groups: Mutex::new(HashMap::new()),
        }
    }

    /// Create a limiter from a plain lookup closure
    pub fn from_fn<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<usize> + Send + Sync + 'static,
    {
        Self::new(lookup)
    }

    // Group state is only mutated in single steps that keep it consistent,
    // so a panic elsewhere while the lock was held leaves nothing to repair.
    fn lock(&self) -> MutexGuard<'_, HashMap<String, Group>> {
        self.groups.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn materialize<'g>(
        &self,
        groups: &'g mut HashMap<String, Group>,
        name: &str,
    ) -> Option<&'g mut Group> {
        if !groups.contains_key(name) {
            let limit = self.lookup.lookup(name)?;
            debug!(group = name, limit, "materialized group");
            groups.insert(name.to_owned(), Group::new(name, limit));
        }
        groups.get_mut(name)
    }

    /// Set the limit for `name`, creating the group without consulting the
    /// lookup if it is not cached yet
    pub fn set_limit(&self, name: &str, limit: usize) {
        let mut groups = self.lock();
        if let Some(group) = groups.get_mut(name) {
            let raised = limit > group.limit();
            group.set_limit(limit);
            if raised {
                group.notify_waiters();
            }
        } else {
            groups.insert(name.to_owned(), Group::new(name, limit));
        }
        debug!(group = name, limit, "limit set");
    }

    /// Limit for `name`, or `None` when the lookup knows no limit
    pub fn get_limit(&self, name: &str) -> Option<usize> {
        let mut groups = self.lock();
        self.materialize(&mut groups, name).map(|g| g.limit())
    }

    /// Forget the cached group for `name`
    ///
    /// Usage state is dropped with it; the next reference consults the
    /// lookup again.
    pub fn remove_limit(&self, name: &str) {
        let Some(mut group) = self.lock().remove(name) else {
            return;
        };
        // waiters may also be registered elsewhere, so closing this
        // group's senders alone would not wake them
        group.notify_waiters();
        debug!(group = name, "group removed");
    }

    /// Reserve one unit in every named group, or in none of them
    ///
    /// Never waits. Names without a known limit always pass.
    pub fn try_reserve<S: AsRef<str>>(&self, names: &[S]) -> bool {
        let names = distinct(names);
        let mut groups = self.lock();
        self.check_and_commit(&mut groups, &names)
    }

    /// Reserve one unit in every named group, waiting up to `wait` for
    /// capacity
    ///
    /// With `wait` set to `None` this behaves like [`Limiter::try_reserve`].
    /// Otherwise the caller sleeps until a release in one of the named
    /// groups lets it re-check, and gives up once `wait` has elapsed since
    /// the call started. Re-checks that fail again keep the original
    /// deadline. A denied reservation leaves no usage behind.
    pub async fn reserve<S: AsRef<str>>(&self, names: &[S], wait: Option<Duration>) -> bool {
        let names = distinct(names);
        let Some(wait) = wait else {
            let mut groups = self.lock();
            return self.check_and_commit(&mut groups, &names);
        };
        let deadline = Instant::now().checked_add(wait);

        loop {
            let mut notified = {
                let mut groups = self.lock();
                if self.check_and_commit(&mut groups, &names) {
                    return true;
                }
                // one slot per group so no release ever has to block
                let (tx, rx) = mpsc::channel(names.len().max(1));
                for name in &names {
                    if let Some(group) = groups.get_mut(*name) {
                        group.register_waiter(tx.clone());
                    }
                }
                rx
            };

            // a closed channel means every group we waited on was evicted,
            // which is as good a reason to re-check as a release
            match deadline {
                Some(deadline) => {
                    if timeout_at(deadline, notified.recv()).await.is_err() {
                        debug!(groups = ?names, ?wait, "reservation timed out");
                        return false;
                    }
                }
                None => {
                    notified.recv().await;
                }
            }
        }
    }

    /// Like [`Limiter::reserve`], returning a guard that releases the
    /// reservation when dropped
    pub async fn acquire<S: AsRef<str>>(
        &self,
        names: &[S],
        wait: Option<Duration>,
    ) -> Option<Reservation<'_>> {
        if self.reserve(names, wait).await {
            Some(Reservation::new(self, owned_names(names)))
        } else {
            None
        }
    }

    /// Like [`Limiter::acquire`], for callers that share the limiter through
    /// an `Arc` and need a `'static` guard
    pub async fn acquire_owned<S: AsRef<str>>(
        self: Arc<Self>,
        names: &[S],
        wait: Option<Duration>,
    ) -> Option<OwnedReservation> {
        if self.reserve(names, wait).await {
            Some(OwnedReservation::new(self, owned_names(names)))
        } else {
            None
        }
    }

    /// Give back one unit in every named group
    ///
    /// Groups that drain to zero are evicted. Names without a cached group
    /// are ignored.
    pub fn release<S: AsRef<str>>(&self, names: &[S]) {
        let names = distinct(names);
        let mut groups = self.lock();
        for name in names {
            let Some(group) = groups.get_mut(name) else {
                continue;
            };
            if group.release() {
                groups.remove(name);
                debug!(group = name, "group drained and evicted");
            }
        }
    }

    /// Smallest known limit among `names`, ignoring unlimited ones
    pub fn lowest_limit<S: AsRef<str>>(&self, names: &[S]) -> Option<usize> {
        let mut groups = self.lock();
        names
            .iter()
            .filter_map(|name| self.materialize(&mut groups, name.as_ref()).map(|g| g.limit()))
            .min()
    }

    /// Smallest remaining capacity among `names`, ignoring unlimited ones
    pub fn remaining_capacity<S: AsRef<str>>(&self, names: &[S]) -> Option<usize> {
        let mut groups = self.lock();
        names
            .iter()
            .filter_map(|name| {
                self.materialize(&mut groups, name.as_ref())
                    .map(|g| g.remaining_capacity())
            })
            .min()
    }

    /// Number of groups currently cached
    pub fn cached_groups(&self) -> usize {
        self.lock().len()
    }

    /// Usage of every cached group, sorted by name
    pub fn snapshot(&self) -> Vec<GroupUsage> {
        let groups = self.lock();
        let mut usage: Vec<GroupUsage> = groups
            .values()
            .map(|g| GroupUsage {
                name: g.name().to_owned(),
                limit: g.limit(),
                current: g.current(),
                waiters: g.waiter_count(),
            })
            .collect();
        usage.sort_by(|a, b| a.name.cmp(&b.name));
        usage
    }

    fn check_and_commit(&self, groups: &mut HashMap<String, Group>, names: &[&str]) -> bool {
        // materialize all of them even after a refusal so waiters can
        // register with every group
        let mut admitted = true;
        for name in names {
            if let Some(group) = self.materialize(groups, name) {
                admitted &= group.can_reserve();
            }
        }
        if !admitted {
            debug!(groups = ?names, "reservation denied");
            return false;
        }
        for name in names {
            if let Some(group) = groups.get_mut(*name) {
                group.reserve();
            }
        }
        debug!(groups = ?names, "reservation granted");
        true
    }
}

/// Names with duplicates removed, first occurrence wins. A group named
/// twice in one call is still reserved only once.
///
/// Quadratic in the number of names; calls name a handful of groups.
fn distinct<S: AsRef<str>>(names: &[S]) -> Vec<&str> {
    let mut out: Vec<&str> = Vec::with_capacity(names.len());
    for name in names {
        let name = name.as_ref();
        if !out.contains(&name) {
            out.push(name);
        }
    }
    out
}

fn owned_names<S: AsRef<str>>(names: &[S]) -> Vec<String> {
    distinct(names).into_iter().map(str::to_owned).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn table(entries: &[(&'static str, usize)]) -> Limiter {
        let entries: HashMap<&'static str, usize> = entries.iter().copied().collect();
        Limiter::from_fn(move |name| entries.get(name).copied())
    }

    fn current(limiter: &Limiter, name: &str) -> usize {
        limiter
            .snapshot()
            .into_iter()
            .find(|g| g.name == name)
            .map_or(0, |g| g.current)
    }

    #[test]
    fn test_multi_group_scenario() {
        let limiter = table(&[("l1", 3), ("l2", 2)]);

        assert!(limiter.try_reserve(&["l1", "l2"]));
        assert_eq!(current(&limiter, "l1"), 1);
        assert_eq!(current(&limiter, "l2"), 1);

        assert!(limiter.try_reserve(&["l2"]));
        assert_eq!(current(&limiter, "l2"), 2);
        assert!(!limiter.try_reserve(&["l2"]));

        // l1 has room but the transaction is blocked by l2
        assert!(!limiter.try_reserve(&["l1", "l2"]));
        assert_eq!(current(&limiter, "l1"), 1);
        assert_eq!(current(&limiter, "l2"), 2);

        limiter.release(&["l2"]);
        assert_eq!(current(&limiter, "l2"), 1);

        assert!(limiter.try_reserve(&["l1", "l2"]));
        assert_eq!(current(&limiter, "l1"), 2);
        assert_eq!(current(&limiter, "l2"), 2);
    }

    #[test]
    fn test_zero_limit_then_relookup() {
        let limit = Arc::new(AtomicUsize::new(0));
        let source = Arc::clone(&limit);
        let limiter =
            Limiter::from_fn(move |name| (name == "x").then(|| source.load(Ordering::SeqCst)));

        assert!(!limiter.try_reserve(&["x"]));
        assert!(!limiter.try_reserve(&["x"]));

        // still cached, so a changed lookup has no effect yet
        limit.store(5, Ordering::SeqCst);
        assert!(!limiter.try_reserve(&["x"]));

        limiter.remove_limit("x");
        assert!(limiter.try_reserve(&["x"]));
        assert_eq!(limiter.get_limit("x"), Some(5));
    }

    #[test]
    fn test_drained_group_is_looked_up_again() {
        let calls = Arc::new(AtomicUsize::new(0));
        let limit = Arc::new(AtomicUsize::new(2));
        let (c, l) = (Arc::clone(&calls), Arc::clone(&limit));
        let limiter = Limiter::from_fn(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
            Some(l.load(Ordering::SeqCst))
        });

        assert!(limiter.try_reserve(&["g"]));
        assert!(limiter.try_reserve(&["g"]));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        limit.store(7, Ordering::SeqCst);
        limiter.release(&["g"]);
        assert_eq!(limiter.lowest_limit(&["g"]), Some(2));

        limiter.release(&["g"]);
        assert_eq!(limiter.cached_groups(), 0);
        assert_eq!(limiter.lowest_limit(&["g"]), Some(7));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_unknown_groups_are_unlimited_and_not_cached() {
        let limiter = table(&[("db", 1)]);

        for _ in 0..10 {
            assert!(limiter.try_reserve(&["anything"]));
        }
        assert_eq!(limiter.cached_groups(), 0);
        assert_eq!(limiter.get_limit("anything"), None);

        assert!(limiter.try_reserve(&["db", "anything"]));
        assert!(!limiter.try_reserve(&["db", "anything"]));
    }

    #[test]
    fn test_aggregation_ignores_unlimited_names() {
        let limiter = table(&[("small", 2), ("large", 10)]);
        assert!(limiter.try_reserve(&["large"]));
        assert!(limiter.try_reserve(&["large"]));

        assert_eq!(limiter.lowest_limit(&["small", "large", "free"]), Some(2));
        assert_eq!(
            limiter.remaining_capacity(&["small", "large", "free"]),
            Some(2)
        );
        assert_eq!(limiter.remaining_capacity(&["large", "free"]), Some(8));
        assert_eq!(limiter.lowest_limit(&["free"]), None);
        assert_eq!(limiter.remaining_capacity(&["free"]), None);
        assert_eq!(limiter.lowest_limit::<&str>(&[]), None);
    }

    #[test]
    fn test_set_limit_bypasses_lookup() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&calls);
        let limiter = Limiter::from_fn(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
            None
        });

        limiter.set_limit("jobs", 1);
        assert_eq!(limiter.get_limit("jobs"), Some(1));
        assert!(limiter.try_reserve(&["jobs"]));
        assert!(!limiter.try_reserve(&["jobs"]));
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        limiter.set_limit("jobs", 2);
        assert!(limiter.try_reserve(&["jobs"]));
        assert_eq!(limiter.remaining_capacity(&["jobs"]), Some(0));
    }

    #[test]
    fn test_lowering_limit_keeps_existing_reservations() {
        let limiter = table(&[("g", 3)]);
        assert!(limiter.try_reserve(&["g"]));
        assert!(limiter.try_reserve(&["g"]));

        limiter.set_limit("g", 1);
        assert_eq!(current(&limiter, "g"), 2);
        assert_eq!(limiter.remaining_capacity(&["g"]), Some(0));

        limiter.release(&["g"]);
        assert!(!limiter.try_reserve(&["g"]));
    }

    #[test]
    fn test_release_of_unknown_names_is_a_noop() {
        let limiter = table(&[("g", 1)]);
        limiter.release(&["never-reserved", "g"]);
        assert_eq!(limiter.cached_groups(), 0);
        assert!(limiter.try_reserve(&["g"]));
    }

    #[test]
    fn test_duplicate_names_reserve_once() {
        let limiter = table(&[("g", 2)]);
        assert!(limiter.try_reserve(&["g", "g", "g"]));
        assert_eq!(current(&limiter, "g"), 1);

        limiter.release(&["g", "g"]);
        assert_eq!(limiter.cached_groups(), 0);
    }

    #[test]
    fn test_empty_reservation_is_granted() {
        let limiter = table(&[]);
        assert!(limiter.try_reserve::<&str>(&[]));
    }

    #[test]
    fn test_snapshot_is_sorted() {
        let limiter = table(&[("b", 1), ("a", 4)]);
        assert!(limiter.try_reserve(&["b", "a"]));
        let snapshot = limiter.snapshot();
        assert_eq!(
            snapshot,
            vec![
                GroupUsage {
                    name: "a".into(),
                    limit: 4,
                    current: 1,
                    waiters: 0,
                },
                GroupUsage {
                    name: "b".into(),
                    limit: 1,
                    current: 1,
                    waiters: 0,
                },
            ]
        );
    }
}
