//! Compilation deadline
//!
//! Checked between pipeline stages and after schema/statistics lookups.
//! Execution is never covered.

use std::time::{Duration, Instant};

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("planning deadline exceeded during {stage}")]
pub struct DeadlineExceeded {
    pub stage: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Deadline {
    at: Option<Instant>,
}

impl Deadline {
    /// Never expires
    pub fn none() -> Self {
        Self { at: None }
    }

    pub fn after(timeout: Duration) -> Self {
        Self {
            at: Instant::now().checked_add(timeout),
        }
    }

    /// Request timeout, else the configured default; zero disables
    pub fn from_timeout_ms(timeout_ms: Option<u64>, default_ms: u64) -> Self {
        match timeout_ms.unwrap_or(default_ms) {
            0 => Self::none(),
            ms => Self::after(Duration::from_millis(ms)),
        }
    }

    pub fn is_expired(&self) -> bool {
        self.at.map_or(false, |at| Instant::now() >= at)
    }

    pub fn remaining(&self) -> Option<Duration> {
        self.at.map(|at| at.saturating_duration_since(Instant::now()))
    }

    pub fn check(&self, stage: &'static str) -> Result<(), DeadlineExceeded> {
        if self.is_expired() {
            Err(DeadlineExceeded { stage })
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_none_never_expires() {
        let deadline = Deadline::none();
        assert!(!deadline.is_expired());
        assert!(deadline.check("cqm").is_ok());
        assert_eq!(deadline.remaining(), None);
    }

    #[test]
    fn test_zero_timeout_disables() {
        assert_eq!(Deadline::from_timeout_ms(Some(0), 5000), Deadline::none());
    }

    #[test]
    fn test_elapsed_deadline_reports_stage() {
        let deadline = Deadline::after(Duration::ZERO);
        let err = deadline.check("optimize").unwrap_err();
        assert_eq!(err.stage, "optimize");
        assert_eq!(err.to_string(), "planning deadline exceeded during optimize");
    }
}
