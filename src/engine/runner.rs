// src/engine/runner.rs

use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::handler::TaskHandler;
use super::session::AdapterSession;
use super::stage::{Stage, StageTracker};
use crate::config::AdapterConfig;
use crate::context::InvocationContext;
use crate::env::{self, EnvSink, ProcessEnv};
use crate::errors::{AdapterError, Result, TaskError};
use crate::exec::protocol::Command;
use crate::exec::spawn_args::{self, STREAM_COMMAND};
use crate::exec::supervisor::{AdapterProcess, StderrBuffer};
use crate::message::{self, FullMessage, NestedEvent};

/// Runs a business function behind the message adapter.
///
/// For every invocation the runner spawns one adapter process and drives the
/// fixed exchange:
///
/// 1. `loadAndUpdateRemoteEvent` resolves a remote message into a full one;
/// 2. `loadNestedEvent` derives the task-scoped envelope;
/// 3. the business function runs on that envelope;
/// 4. `createNextEvent` folds its output back into the message.
///
/// Any failure tears the adapter down before it is reported. Workflow errors
/// raised by the business function come back as a failure-shaped message
/// instead of an error, unless the input was already in the adapter's
/// wrapper shape.
pub struct TaskRunner<H> {
    handler: Arc<H>,
    config: AdapterConfig,
    env: Arc<dyn EnvSink>,
}

impl<H: TaskHandler + 'static> TaskRunner<H> {
    pub fn new(handler: H, config: AdapterConfig) -> Self {
        Self {
            handler: Arc::new(handler),
            config,
            env: Arc::new(ProcessEnv),
        }
    }

    /// Send projected environment variables to `sink` instead of the process
    /// environment.
    pub fn with_env_sink(mut self, sink: impl EnvSink + 'static) -> Self {
        self.env = Arc::new(sink);
        self
    }

    pub fn config(&self) -> &AdapterConfig {
        &self.config
    }

    /// Run one task invocation and return the next pipeline message.
    pub async fn run(
        &self,
        message: Value,
        context: InvocationContext,
        schemas: Option<Value>,
    ) -> Result<Value> {
        if self.config.adapter.disabled {
            return self.run_direct(message, context).await;
        }

        let original = message.clone();
        env::project(&original, &context, self.env.as_ref());

        let mut stages = StageTracker::new();
        let outcome = self
            .run_with_adapter(&mut stages, message, &context, schemas.unwrap_or(Value::Null))
            .await;

        match outcome {
            Ok(next) => Ok(next),
            Err(err) => recover(err, &original),
        }
    }

    /// Bypass mode: hand the raw message to the business function and return
    /// whatever it returns.
    async fn run_direct(&self, message: Value, context: InvocationContext) -> Result<Value> {
        debug!("message adapter disabled; invoking business function directly");
        self.invoke_handler(NestedEvent::passthrough(message), context)
            .await
    }

    async fn run_with_adapter(
        &self,
        stages: &mut StageTracker,
        message: Value,
        context: &InvocationContext,
        schemas: Value,
    ) -> Result<Value> {
        let spawn = spawn_args::resolve(&self.config, STREAM_COMMAND);
        let process = match AdapterProcess::spawn(&spawn) {
            Ok(process) => process,
            Err(err) => {
                stages.fail();
                return Err(err);
            }
        };
        let mut session = AdapterSession::new(process, self.config.timeouts);

        let _timer = DiagnosticTimer::arm(
            context.remaining_time(),
            self.config.timeouts.diagnostic_margin(),
            session.stderr().clone(),
        );

        match self
            .exchange_all(&mut session, stages, message, context, &schemas)
            .await
        {
            Ok(next) => {
                session.finish().await;
                stages.advance();
                debug_assert_eq!(stages.current(), Stage::Done);
                Ok(next)
            }
            Err(err) => {
                let failed_in = stages.current();
                stages.fail();
                warn!(
                    stage = %failed_in,
                    error = %err,
                    classification = err.classification_name(),
                    "task invocation failed; tearing down message adapter"
                );
                session.teardown().await;
                Err(err)
            }
        }
    }

    async fn exchange_all(
        &self,
        session: &mut AdapterSession,
        stages: &mut StageTracker,
        message: Value,
        context: &InvocationContext,
        schemas: &Value,
    ) -> Result<Value> {
        let command = next_command(stages)?;
        let remote = session
            .exchange(
                command,
                &json!({ "event": message, "context": context, "schemas": schemas }),
            )
            .await?;
        let resolved = FullMessage::decode(command.as_str(), remote)?.into_value();
        env::project(&resolved, context, self.env.as_ref());

        let command = next_command(stages)?;
        let nested = session
            .exchange(
                command,
                &json!({ "event": &resolved, "schemas": schemas, "context": context }),
            )
            .await?;
        let nested = NestedEvent::decode(command.as_str(), nested)?;
        let message_config = nested.message_config.clone();

        stages.advance();
        let output = self.invoke_handler(nested, context.clone()).await?;

        let command = next_command(stages)?;
        let next = session
            .exchange(
                command,
                &json!({
                    "event": resolved,
                    "handler_response": output,
                    "message_config": message_config,
                    "schemas": schemas,
                }),
            )
            .await?;
        message::decode_next_event(command.as_str(), next)
    }

    /// Run the business function on its own task so a panic is reported as
    /// an error instead of unwinding through the runner.
    async fn invoke_handler(&self, event: NestedEvent, context: InvocationContext) -> Result<Value> {
        let handler = Arc::clone(&self.handler);
        let joined = tokio::spawn(async move { handler.handle(event, context).await }).await;

        match joined {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(task_err)) => Err(AdapterError::from(task_err)),
            Err(join_err) if join_err.is_panic() => {
                let message = panic_message(join_err.into_panic());
                Err(AdapterError::Task(TaskError::new("Panic", message)))
            }
            Err(join_err) => Err(AdapterError::Task(TaskError::new(
                "Cancelled",
                join_err.to_string(),
            ))),
        }
    }
}

/// Turn a workflow error into the failure-shaped message; pass everything
/// else through.
fn recover(err: AdapterError, original: &Value) -> Result<Value> {
    match err {
        AdapterError::Workflow(task_err) if !message::is_cma_wrapped(original) => {
            info!(
                exception = %task_err.name,
                "business function raised a workflow error; returning failure message"
            );
            Ok(message::failure_message(original, &task_err.name))
        }
        other => Err(other),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "business function panicked".to_string()
    }
}

/// Dumps the adapter's stderr shortly before the invocation deadline.
///
/// It only logs; it never interrupts the exchange. Dropping it disarms it.
pub struct DiagnosticTimer {
    handle: Option<JoinHandle<()>>,
    fired: Arc<AtomicBool>,
}

impl DiagnosticTimer {
    pub fn arm(remaining: Option<Duration>, margin: Duration, stderr: StderrBuffer) -> Self {
        let fired = Arc::new(AtomicBool::new(false));
        let Some(remaining) = remaining else {
            return Self { handle: None, fired };
        };

        let delay = remaining.saturating_sub(margin);
        let flag = Arc::clone(&fired);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            flag.store(true, Ordering::SeqCst);
            warn!(
                stderr = %stderr.snapshot(),
                "invocation deadline approaching; message adapter stderr so far"
            );
        });

        Self {
            handle: Some(handle),
            fired,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }
}

impl Drop for DiagnosticTimer {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

/// Advance to the next stage and return the adapter command it awaits.
fn next_command(stages: &mut StageTracker) -> Result<Command> {
    let stage = stages.advance();
    stage
        .command()
        .ok_or_else(|| AdapterError::Other(anyhow::anyhow!("no adapter command is due in stage {stage}")))
}
