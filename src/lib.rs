// src/lib.rs

pub mod cli;
pub mod config;
pub mod context;
pub mod engine;
pub mod env;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod message;

use anyhow::Context as _;
use serde_json::{json, Value};
use tokio::io::AsyncReadExt;
use tracing::{debug, error, info};

use crate::cli::CliArgs;
use crate::config::{load_with_env, AdapterConfig};
use crate::context::InvocationContext;
use crate::engine::{TaskHandler, TaskRunner};
use crate::exec::spawn_args::{self, STREAM_COMMAND};
use crate::exec::CommandTask;

/// Run `handler` as a pipeline task on `message`.
///
/// The adapter is configured from the process environment
/// (`CUMULUS_MESSAGE_ADAPTER_DIR`, `USE_CMA_BINARY`,
/// `CUMULUS_MESSAGE_ADAPTER_DISABLED`). Use [`TaskRunner`] directly for any
/// other configuration source.
///
/// Message fields are projected into the process environment through
/// [`env::ProcessEnv`]. Concurrent invocations are safe with respect to each
/// other, but foreign code that reads the environment with `getenv` must not
/// run on another thread at the same time; use [`TaskRunner::with_env_sink`]
/// to avoid touching the process environment.
pub async fn run_cumulus_task<H>(
    handler: H,
    message: Value,
    context: InvocationContext,
    schemas: Option<Value>,
) -> errors::Result<Value>
where
    H: TaskHandler + 'static,
{
    TaskRunner::new(handler, AdapterConfig::from_env())
        .run(message, context, schemas)
        .await
}

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading (file, then environment overrides)
/// - reading the message, context and schemas
/// - a [`CommandTask`] business function around the trailing command
/// - printing the next message on stdout
pub async fn run(args: CliArgs) -> anyhow::Result<()> {
    let config_path = args.config_path();
    let cfg = load_with_env(Some(&config_path))
        .with_context(|| format!("loading config from '{}'", config_path.display()))?;

    if args.dry_run {
        print_dry_run(&cfg, &args)?;
        return Ok(());
    }

    let message = read_event(&args.event).await?;
    let context = match &args.context {
        Some(path) => {
            let raw = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("reading context from '{}'", path.display()))?;
            serde_json::from_str::<InvocationContext>(&raw)
                .with_context(|| format!("parsing context from '{}'", path.display()))?
        }
        None => InvocationContext::new(),
    };
    let schemas = args
        .schemas
        .as_deref()
        .map(|raw| serde_json::from_str::<Value>(raw))
        .transpose()
        .context("parsing --schemas")?;

    let task = CommandTask::new(args.command_line());
    info!(cmd = %task.cmd(), disabled = cfg.adapter.disabled, "running task");

    let runner = TaskRunner::new(task, cfg);
    match runner.run(message, context, schemas).await {
        Ok(next) => {
            println!("{}", serde_json::to_string(&next)?);
            Ok(())
        }
        Err(err) => {
            let name = err.classification_name().to_string();
            error!(classification = %name, error = %err, "task failed");
            Err(anyhow::Error::new(err).context(name))
        }
    }
}

async fn read_event(source: &str) -> anyhow::Result<Value> {
    let raw = if source == "-" {
        let mut buf = String::new();
        tokio::io::stdin()
            .read_to_string(&mut buf)
            .await
            .context("reading message from stdin")?;
        buf
    } else {
        tokio::fs::read_to_string(source)
            .await
            .with_context(|| format!("reading message from '{source}'"))?
    };
    serde_json::from_str(&raw).context("parsing message JSON")
}

/// Dry-run output: the resolved config and how the adapter would be launched.
fn print_dry_run(cfg: &AdapterConfig, args: &CliArgs) -> anyhow::Result<()> {
    let spawn = spawn_args::resolve(cfg, STREAM_COMMAND);
    let report = json!({
        "config": cfg,
        "adapter": {
            "program": spawn.program.to_string_lossy(),
            "args": spawn.args.iter().map(|a| a.to_string_lossy()).collect::<Vec<_>>(),
        },
        "command": args.command_line(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);

    debug!("dry-run complete (no execution)");
    Ok(())
}
