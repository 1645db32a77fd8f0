//! Explicit wall-clock budgets.
//!
//! A [`Deadline`] is a plain value threaded through every recursive search
//! call and every propagation round; there is no ambient clock and no task
//! cancellation. Exceeding a deadline surfaces as [`DeadlineExceeded`], which
//! unwinds to the nearest strategy boundary where the orchestrator either
//! escalates to the next strategy or reports the query as inconclusive.

use std::time::{Duration, Instant};

/// Signal raised when a budget elapses. Control flow, not a user-facing
/// error: callers catch it at strategy boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("wall-clock budget elapsed")]
pub struct DeadlineExceeded;

/// An optional expiry instant. `Copy`, so it is handed down by value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    expires: Option<Instant>,
}

impl Deadline {
    /// A deadline that never fires.
    pub fn unbounded() -> Self {
        Self { expires: None }
    }

    /// A deadline `budget` from now.
    pub fn within(budget: Duration) -> Self {
        Self {
            // An overflowing addition means "further out than we can
            // represent", which is indistinguishable from unbounded.
            expires: Instant::now().checked_add(budget),
        }
    }

    pub fn is_unbounded(&self) -> bool {
        self.expires.is_none()
    }

    /// Fail if the deadline has passed.
    pub fn check(&self) -> Result<(), DeadlineExceeded> {
        match self.expires {
            Some(expires) if Instant::now() >= expires => Err(DeadlineExceeded),
            _ => Ok(()),
        }
    }

    /// Time left, or `None` when unbounded.
    pub fn remaining(&self) -> Option<Duration> {
        self.expires
            .map(|expires| expires.saturating_duration_since(Instant::now()))
    }

    /// A child deadline covering `numerator/denominator` of the remaining
    /// budget. A fraction of an unbounded deadline is unbounded.
    pub fn fraction(&self, numerator: u32, denominator: u32) -> Self {
        match self.remaining() {
            None => Self::unbounded(),
            Some(remaining) => Self::within(remaining * numerator / denominator),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unbounded_never_fires() {
        let deadline = Deadline::unbounded();
        assert!(deadline.check().is_ok());
        assert_eq!(deadline.remaining(), None);
        assert!(deadline.is_unbounded());
    }

    #[test]
    fn test_zero_budget_fires_immediately() {
        let deadline = Deadline::within(Duration::ZERO);
        assert_eq!(deadline.check(), Err(DeadlineExceeded));
    }

    #[test]
    fn test_generous_budget_does_not_fire() {
        let deadline = Deadline::within(Duration::from_secs(3600));
        assert!(deadline.check().is_ok());
        let remaining = deadline.remaining().unwrap();
        assert!(remaining <= Duration::from_secs(3600));
        assert!(remaining > Duration::from_secs(3599));
    }

    #[test]
    fn test_fraction_of_unbounded_is_unbounded() {
        assert!(Deadline::unbounded().fraction(1, 3).is_unbounded());
    }

    #[test]
    fn test_fraction_shrinks_the_budget() {
        let deadline = Deadline::within(Duration::from_secs(90));
        let third = deadline.fraction(1, 3);
        let remaining = third.remaining().unwrap();
        assert!(remaining <= Duration::from_secs(30));
        assert!(remaining > Duration::from_secs(29));
    }
}
