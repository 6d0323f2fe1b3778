//! Limit lookup seam
//!
//! The limiter never owns limit configuration. It asks a [`LimitLookup`]
//! the first time a group is referenced and caches the answer until the
//! group drains.

/// Legacy encoding of "no known limit" used by integer-only callbacks.
pub const UNLIMITED_SENTINEL: i64 = -1;

/// Source of truth for group limits
///
/// Returning `None` means the group has no known limit: it is treated as
/// unlimited and nothing is cached for it. Lookups run while the limiter's
/// lock is held, so implementations must be quick and must not call back
/// into the same limiter.
pub trait LimitLookup: Send + Sync {
    /// Resolve the limit for `name`
    fn lookup(&self, name: &str) -> Option<usize>;
}

impl<F> LimitLookup for F
where
    F: Fn(&str) -> Option<usize> + Send + Sync,
{
    fn lookup(&self, name: &str) -> Option<usize> {
        self(name)
    }
}

/// Adapter for callbacks that speak the integer sentinel convention
///
/// Any negative value, not only [`UNLIMITED_SENTINEL`], is read as unknown.
#[derive(Debug, Clone)]
pub struct SentinelLookup<F>(pub F);

impl<F> LimitLookup for SentinelLookup<F>
where
    F: Fn(&str) -> i64 + Send + Sync,
{
    fn lookup(&self, name: &str) -> Option<usize> {
        limit_from_sentinel((self.0)(name))
    }
}

/// Decode a sentinel-encoded limit
#[must_use]
pub fn limit_from_sentinel(value: i64) -> Option<usize> {
    usize::try_from(value).ok()
}

/// Encode a limit with the sentinel convention
#[must_use]
pub fn limit_to_sentinel(limit: Option<usize>) -> i64 {
    limit.map_or(UNLIMITED_SENTINEL, |n| i64::try_from(n).unwrap_or(i64::MAX))
}
