//! Observability
//!
//! Structured JSON log lines for compiler lifecycle events and a set of
//! atomic counters. Logging never fails the caller and never changes a
//! compilation's result.
//!
//! ```ignore
//! use querycraft::observability::{log_event, Event};
//!
//! log_event(Event::QueryPlanned, &[("entity", "orders"), ("total_cost", "42.00")]);
//! ```

mod events;
mod logger;
mod metrics;

pub use events::Event;
pub use logger::{capture_log, Logger, Severity};
pub use metrics::{CompilerMetrics, MetricsSnapshot};

/// Logs `event` at its default severity
pub fn log_event(event: Event, fields: &[(&str, &str)]) {
    Logger::log(event.severity(), event.as_str(), fields);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_event_does_not_panic() {
        log_event(Event::ConfigLoaded, &[("path", "/tmp/querycraft.json")]);
    }

    #[test]
    fn test_capture_uses_event_name() {
        let line = capture_log(Event::PlanningTimeout.severity(), Event::PlanningTimeout.as_str(), &[]);
        assert!(line.contains("\"PLANNING_TIMEOUT\""));
        assert!(line.contains("\"WARN\""));
    }
}
