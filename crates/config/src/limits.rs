//! Fixed limit table usable as a limiter lookup

use grouplimit_limiter::LimitLookup;
use std::collections::HashMap;

/// Immutable name to limit table
///
/// Names missing from the table have no known limit.
#[derive(Debug, Clone, Default)]
pub struct StaticLimits {
    limits: HashMap<String, usize>,
}

impl StaticLimits {
    #[must_use]
    pub fn new(limits: HashMap<String, usize>) -> Self {
        Self { limits }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.limits.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.limits.is_empty()
    }
}

impl FromIterator<(String, usize)> for StaticLimits {
    fn from_iter<T: IntoIterator<Item = (String, usize)>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl LimitLookup for StaticLimits {
    fn lookup(&self, name: &str) -> Option<usize> {
        self.limits.get(name).copied()
    }
}
