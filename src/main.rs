//! `akso-task` command line entry point
//!
//! Runs a batch of simulated `codeholders/create` operations through a local
//! worker, one at a time, retrying failed items at the tail of the queue.

use anyhow::Context;
use clap::{Parser, Subcommand};
use dashmap::DashMap;
use log::{info, warn};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};

use akso_task::tasks::{Options, Parameters};
use akso_task::{BatchQueue, Config, LocalWorker, OperationRequest, TaskError, WorkerEvent};

const CREATE_CODEHOLDER: &str = "codeholders/create";

#[derive(Parser)]
#[command(name = "akso-task", version, about = "Drive AKSO tasks through a local worker")]
struct Cli {
    /// Config file (defaults to $AKSO_TASK_CONFIG or the user config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create one codeholder per name, sequentially
    Batch {
        /// Names to create; an empty name fails validation
        names: Vec<String>,

        /// Fail the first attempt of every n-th item with a network error
        #[arg(long, default_value_t = 0)]
        flaky: usize,
    },

    /// Print the effective configuration
    ShowConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default()?,
    };

    match cli.command {
        Command::Batch { names, flaky } => run_batch(&config, names, flaky).await,
        Command::ShowConfig => {
            let rendered = toml::to_string_pretty(&config).context("Failed to render config")?;
            print!("{}", rendered);
            Ok(())
        }
    }
}

/// Log every task-error until the worker goes away; returns how many were logged
async fn log_task_errors(mut events: broadcast::Receiver<WorkerEvent>) -> usize {
    let mut logged = 0;
    loop {
        match events.recv().await {
            Ok(event) => {
                if let WorkerEvent::TaskError { code } = &event {
                    info!("{}: {}", event.event_name(), code);
                    logged += 1;
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!("Skipped {} worker events", skipped);
            }
            Err(RecvError::Closed) => break,
        }
    }
    logged
}

async fn run_batch(config: &Config, names: Vec<String>, flaky: usize) -> anyhow::Result<()> {
    let worker = Arc::new(LocalWorker::from_config(&config.worker));
    register_simulated_handlers(&worker);

    tokio::spawn(log_task_errors(worker.subscribe()));

    let items: Vec<(usize, String)> = names.into_iter().enumerate().collect();
    let queue = BatchQueue::new(items, &config.batch);

    let make_task = |(index, name): &(usize, String)| {
        let mut options = Options::new();
        options.insert("item".to_string(), json!(index));
        options.insert("flaky".to_string(), json!(flaky > 0 && (index + 1) % flaky == 0));

        let mut parameters = Parameters::new();
        parameters.insert("name".to_string(), json!(name));

        worker.create_task(CREATE_CODEHOLDER, options, Some(parameters))
    };

    let report = queue
        .run_with_progress(make_task, |attempt| {
            let (_, name) = attempt.item;
            match attempt.result {
                Ok(value) => println!("ok     {:?} (attempt {}): {}", name, attempt.attempt, value),
                Err(err) if attempt.requeued => {
                    println!("retry  {:?} (attempt {}): {}", name, attempt.attempt, err)
                }
                Err(err) => println!("failed {:?} (attempt {}): {}", name, attempt.attempt, err),
            }
        })
        .await?;

    println!(
        "{} succeeded, {} failed",
        report.succeeded.len(),
        report.failed.len()
    );

    worker.shutdown();

    if !report.is_complete_success() {
        anyhow::bail!("{} of {} items failed", report.failed.len(), report.total());
    }
    Ok(())
}

fn register_simulated_handlers(worker: &LocalWorker) {
    // item index -> attempts seen
    let attempts: Arc<DashMap<u64, u32>> = Arc::new(DashMap::new());

    worker.register_fn(CREATE_CODEHOLDER, move |req: OperationRequest| {
        let attempts = attempts.clone();
        async move {
            let item = req.options.get("item").and_then(Value::as_u64).unwrap_or_default();
            let flaky = req.options.get("flaky").and_then(Value::as_bool).unwrap_or(false);

            let attempt = {
                let mut seen = attempts.entry(item).or_insert(0);
                *seen += 1;
                *seen
            };

            if flaky && attempt == 1 {
                return Err(TaskError::new("network", "Connection reset")
                    .with_extra("attempt", json!(attempt)));
            }

            match req.param_str("name").map(str::trim) {
                Some(name) if !name.is_empty() => Ok(json!({ "id": item + 1, "name": name })),
                _ => Err(TaskError::new("validation", "Name must not be empty")
                    .with_extra("field", json!("name"))),
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_task_error_logging_survives_lag() {
        let (tx, rx) = broadcast::channel(1);
        for code in ["network", "validation", "network"] {
            tx.send(WorkerEvent::TaskError { code: code.to_string() }).unwrap();
        }
        drop(tx);

        assert_eq!(log_task_errors(rx).await, 1);
    }
}
