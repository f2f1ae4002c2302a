//! CLI command implementations
//!
//! Every command loads its inputs, compiles once with full read access and
//! prints to stdout. A rejected query prints the ordered error list before
//! the command fails.

use std::path::Path;

use serde_json::json;

use crate::compiler::{CompiledQuery, QueryCompiler};
use crate::config::CompilerConfig;
use crate::cqm::AllowAll;
use crate::executor::InMemoryExecutor;
use crate::observability::{log_event, Event};
use crate::planner::{explain as explain_plan, ExecutionStats, InMemoryStatistics};
use crate::query::Query;
use crate::schema::SchemaLoader;

use super::args::{Command, Inputs};
use super::errors::{CliError, CliResult};
use super::io::{read_json, write_json, write_text};

pub fn run_command(command: Command) -> CliResult<()> {
    match command {
        Command::Explain {
            inputs,
            stats,
            runtime,
            data,
            json,
        } => explain(&inputs, stats.as_deref(), runtime.as_deref(), data.as_deref(), json),
        Command::Plan { inputs, json } => plan(&inputs, json),
        Command::Validate { inputs } => validate(&inputs),
    }
}

pub fn explain(
    inputs: &Inputs,
    stats: Option<&Path>,
    runtime: Option<&Path>,
    data: Option<&Path>,
    json: bool,
) -> CliResult<()> {
    let (compiler, query) = load(inputs, stats)?;
    let compiled = compile(&compiler, &query)?;

    let recorded: Option<ExecutionStats> = match (runtime, data) {
        (Some(path), _) => Some(read_json(path)?),
        (None, Some(path)) => run_in_memory(&compiler, &compiled, path)?,
        (None, None) => None,
    };
    let report = match &recorded {
        Some(stats) => compiler.explain_with_runtime(&compiled, stats),
        None => explain_plan(&compiled.physical, None, &compiler.config().explain),
    };

    if json {
        write_json(&report)
    } else {
        write_text(&report.to_string())
    }
}

pub fn plan(inputs: &Inputs, json: bool) -> CliResult<()> {
    let (compiler, query) = load(inputs, None)?;
    let compiled = compile(&compiler, &query)?;
    if json {
        write_json(&compiled.logical)
    } else {
        write_text(&compiled.logical.to_string())
    }
}

pub fn validate(inputs: &Inputs) -> CliResult<()> {
    let (compiler, query) = load(inputs, None)?;
    let compiled = compile(&compiler, &query)?;
    let projection: Vec<&str> = compiled
        .canonical
        .projection
        .iter()
        .map(|f| f.field_name.as_str())
        .collect();
    write_json(&json!({
        "status": "ok",
        "query_id": compiled.canonical.query_id,
        "projection": projection,
    }))
}

fn load(inputs: &Inputs, stats: Option<&Path>) -> CliResult<(QueryCompiler, Query)> {
    let config = match &inputs.config {
        Some(path) => {
            let config = CompilerConfig::load(path)?;
            let shown = path.display().to_string();
            log_event(Event::ConfigLoaded, &[("path", shown.as_str())]);
            config
        }
        None => CompilerConfig::default(),
    };
    let catalog = SchemaLoader::load(&inputs.schema)?;
    let statistics = match stats {
        Some(path) => InMemoryStatistics::load(path)?,
        None => InMemoryStatistics::new(),
    };
    let query: Query = read_json(&inputs.query)?;
    Ok((QueryCompiler::new(catalog, statistics, config), query))
}

/// Compiles with full read access; prints the error list on failure
fn compile(compiler: &QueryCompiler, query: &Query) -> CliResult<CompiledQuery> {
    match compiler.compile(query, &AllowAll) {
        Ok(compiled) => Ok(compiled),
        Err(err) => {
            write_json(&json!({
                "status": "error",
                "errors": err.to_response(),
            }))?;
            Err(err.into())
        }
    }
}

fn run_in_memory(compiler: &QueryCompiler, compiled: &CompiledQuery, path: &Path) -> CliResult<Option<ExecutionStats>> {
    let rows: serde_json::Value = read_json(path)?;
    let executor = InMemoryExecutor::from_json(rows).map_err(|message| CliError::Input {
        path: path.display().to_string(),
        message,
    })?;
    let (_, stats) = compiler.execute(compiled, &executor)?.collect_rows();
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, content: serde_json::Value) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, content.to_string()).unwrap();
        path
    }

    fn inputs(dir: &TempDir, query: serde_json::Value) -> Inputs {
        let schema = write(
            dir,
            "schema.json",
            json!({
                "entities": [{
                    "name": "orders",
                    "fields": {
                        "id": {"type": "identifier"},
                        "status": {"type": "string", "indexed": true},
                        "total_amount": {"type": "float64"}
                    }
                }]
            }),
        );
        Inputs {
            query: write(dir, "query.json", query),
            schema,
            config: None,
        }
    }

    #[test]
    fn test_validate_and_plan() {
        let dir = TempDir::new().unwrap();
        let inputs = inputs(
            &dir,
            json!({"entity": "orders", "tenant_id": "acme", "filter": {"condition": {"field": "status", "operator": "EQ", "value": "completed"}}}),
        );
        validate(&inputs).unwrap();
        plan(&inputs, false).unwrap();
        plan(&inputs, true).unwrap();
    }

    #[test]
    fn test_explain_with_stats_and_data() {
        let dir = TempDir::new().unwrap();
        let inputs = inputs(&dir, json!({"entity": "orders", "tenant_id": "acme"}));
        let stats = write(&dir, "stats.json", json!({"entities": {"orders": {"row_count": 3}}}));
        let data = write(
            &dir,
            "data.json",
            json!({"acme": {"orders": [{"id": "o1", "status": "completed", "total_amount": 3.5}]}}),
        );
        explain(&inputs, Some(&stats), None, Some(&data), true).unwrap();
        explain(&inputs, None, None, None, false).unwrap();
    }

    #[test]
    fn test_rejected_query_fails() {
        let dir = TempDir::new().unwrap();
        let inputs = inputs(&dir, json!({"entity": "orders", "tenant_id": "acme", "sorts": [{"field": "nope"}]}));
        let err = validate(&inputs).unwrap_err();
        assert_eq!(err.code(), "QUERY_REJECTED");
    }
}
