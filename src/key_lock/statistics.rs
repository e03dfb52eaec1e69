use super::Access;

/// Lock registry statistics.
///
/// Counters accumulate over the lifetime of a registry.
/// They are updated under the registry guard, so a snapshot is internally consistent.
/// It is intended to aid in testing and tuning, e.g. a high ratio of `entries_created` to requests indicates little key reuse.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LockStatistics {
    /// The number of lock entries created.
    pub entries_created: usize,
    /// The number of lock entries reclaimed.
    pub entries_reclaimed: usize,
    /// The number of exclusive lock requests, including failed `try_*` attempts.
    pub exclusive_requests: usize,
    /// The number of shared lock requests, including failed `try_*` attempts.
    pub shared_requests: usize,
}

impl LockStatistics {
    pub(crate) fn record_request(&mut self, access: Access) {
        match access {
            Access::Exclusive => self.exclusive_requests += 1,
            Access::Shared => self.shared_requests += 1,
        }
    }

    /// Returns the number of lock entries which are currently live.
    #[must_use]
    pub fn live_entries(&self) -> usize {
        self.entries_created - self.entries_reclaimed
    }
}

impl core::ops::Add for LockStatistics {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            entries_created: self.entries_created + rhs.entries_created,
            entries_reclaimed: self.entries_reclaimed + rhs.entries_reclaimed,
            exclusive_requests: self.exclusive_requests + rhs.exclusive_requests,
            shared_requests: self.shared_requests + rhs.shared_requests,
        }
    }
}

impl core::iter::Sum for LockStatistics {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), core::ops::Add::add)
    }
}
