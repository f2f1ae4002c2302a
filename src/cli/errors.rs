//! CLI error types

use std::io;

use thiserror::Error;

use crate::compiler::CompileError;
use crate::config::ConfigError;
use crate::executor::ExecutionError;
use crate::schema::SchemaError;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("{path}: {message}")]
    Input { path: String, message: String },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error("failed to write output: {0}")]
    Output(#[from] io::Error),
}

impl CliError {
    pub fn code(&self) -> &'static str {
        match self {
            CliError::Read { .. } | CliError::Output(_) => "CLI_IO_ERROR",
            CliError::Json { .. } | CliError::Input { .. } => "CLI_INPUT_ERROR",
            CliError::Config(_) => "CLI_CONFIG_ERROR",
            CliError::Schema(_) => "CLI_SCHEMA_ERROR",
            CliError::Compile(CompileError::Rejected(_)) => "QUERY_REJECTED",
            CliError::Compile(CompileError::PlanningTimeout { .. }) => "PLANNING_TIMEOUT",
            CliError::Compile(CompileError::Planner(_)) => "PLANNER_ERROR",
            CliError::Execution(err) => err.code(),
        }
    }
}

pub type CliResult<T> = Result<T, CliError>;
