//! Compiler lifecycle events

use std::fmt;

use super::logger::Severity;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// A query entered the pipeline
    QueryCompileStart,
    /// CQM build produced validation errors
    QueryRejected,
    /// A physical plan was produced
    QueryPlanned,
    /// A plan relied on default statistics
    PlanUncosted,
    PlanningTimeout,
    /// The downstream executor returned an error
    ExecutionFailed,
    ConfigLoaded,
}

impl Event {
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::QueryCompileStart => "QUERY_COMPILE_START",
            Event::QueryRejected => "QUERY_REJECTED",
            Event::QueryPlanned => "QUERY_PLANNED",
            Event::PlanUncosted => "PLAN_UNCOSTED",
            Event::PlanningTimeout => "PLANNING_TIMEOUT",
            Event::ExecutionFailed => "EXECUTION_FAILED",
            Event::ConfigLoaded => "CONFIG_LOADED",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Event::QueryCompileStart => Severity::Trace,
            Event::QueryPlanned | Event::ConfigLoaded => Severity::Info,
            Event::QueryRejected | Event::PlanUncosted | Event::PlanningTimeout => Severity::Warn,
            Event::ExecutionFailed => Severity::Error,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names() {
        assert_eq!(Event::QueryCompileStart.as_str(), "QUERY_COMPILE_START");
        assert_eq!(Event::PlanUncosted.to_string(), "PLAN_UNCOSTED");
        assert_eq!(Event::ExecutionFailed.severity(), Severity::Error);
    }
}
