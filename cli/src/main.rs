mod args;
mod output;

use anyhow::Context;
use args::Cli;
use clap::Parser;
use executor::client::http::HttpStatementClient;
use executor::{EngineConfig, QueryExecution, QueryExecutor};
use model::query::QueryResult;
use std::io::{self, Read};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("presto-exec: {e:#}");
            ExitCode::from(2)
        }
    }
}

fn init_tracing(level: &str) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(format!("{level},reqwest=warn,hyper=warn"))
            .with_context(|| format!("Invalid log level '{level}'"))?,
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
    Ok(())
}

fn load_config(cli: &Cli) -> anyhow::Result<EngineConfig> {
    let mut config = match &cli.config {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::from_env()?,
    };
    cli.apply(&mut config);
    config.validate()?;
    Ok(config)
}

fn read_statement(cli: &Cli) -> anyhow::Result<String> {
    let sql = match &cli.sql {
        Some(sql) => sql.clone(),
        None => {
            let mut sql = String::new();
            io::stdin()
                .read_to_string(&mut sql)
                .context("Failed to read the statement from stdin")?;
            sql
        }
    };
    let sql = sql.trim().trim_end_matches(';').trim();
    anyhow::ensure!(!sql.is_empty(), "No statement given");
    Ok(sql.to_owned())
}

fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let config = load_config(&cli)?;
    init_tracing(&config.log_level)?;
    let sql = read_statement(&cli)?;

    // The blocking HTTP client must be created and dropped outside the runtime
    let client = Arc::new(HttpStatementClient::new(
        config.address.clone(),
        config.request_timeout(),
    )?);
    let executor = QueryExecutor::new(config, client)?;
    let mut session = executor.default_session();
    if let Some(schema) = &cli.schema {
        session = session.with_schema(schema);
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start the runtime")?;
    let execution = executor.execute(session, sql)?;
    let result = runtime.block_on(follow(&execution, cli.poll_interval()));
    drop(runtime);
    executor.shutdown();

    if let Some(error) = result.error_details() {
        error!(state = %result.state(), "{error}");
        return Ok(ExitCode::FAILURE);
    }
    output::write_result(&mut io::stdout().lock(), &result)?;
    info!(
        rows = result.rows().len(),
        elapsed_ms = ?result.execution_time_millis(),
        "Query finished"
    );
    Ok(ExitCode::SUCCESS)
}

/// Reports progress until the execution resolves. The first Ctrl-C kills
/// the query; its ABORTED result is still awaited.
async fn follow(execution: &QueryExecution, poll_interval: Duration) -> Arc<QueryResult> {
    let mut progress = tokio::time::interval(poll_interval);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut killed = false;

    loop {
        tokio::select! {
            result = execution.result() => return result,
            _ = progress.tick() => {
                let stats = execution.current_stats();
                info!(
                    state = %stats.state,
                    percentage = ?stats.percentage,
                    processed_rows = stats.processed_rows,
                    "Progress"
                );
            }
            signal = &mut ctrl_c, if !killed => {
                killed = true;
                match signal {
                    Ok(()) => {
                        warn!("Interrupted, killing query");
                        execution.kill();
                    }
                    Err(e) => warn!(error = %e, "Failed to listen for Ctrl-C"),
                }
            }
        }
    }
}
