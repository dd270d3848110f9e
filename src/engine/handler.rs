// src/engine/handler.rs

//! The seam between the runner and the task's business logic.

use std::future::Future;
use std::pin::Pin;

use serde_json::Value;

use crate::context::InvocationContext;
use crate::errors::TaskError;
use crate::message::NestedEvent;

/// Boxed future returned by [`TaskHandler::handle`].
pub type HandlerFuture<'a> = Pin<Box<dyn Future<Output = Result<Value, TaskError>> + Send + 'a>>;

/// A task's business function.
///
/// It receives the task-scoped envelope and the invocation context and
/// returns the value to fold back into the pipeline message. Returning a
/// [`TaskError`] whose name contains `WorkflowError` marks an intentional
/// short-circuit rather than a defect.
pub trait TaskHandler: Send + Sync {
    fn handle(&self, event: NestedEvent, context: InvocationContext) -> HandlerFuture<'_>;
}

/// Adapter turning an async function or closure into a [`TaskHandler`].
#[derive(Clone)]
pub struct FnHandler<F> {
    f: F,
}

/// Wrap `f` as a [`TaskHandler`].
///
/// ```ignore
/// async fn business_logic(event: NestedEvent, _ctx: InvocationContext) -> Result<Value, TaskError> {
///     Ok(json!({ "answer": 42, "input": event.input }))
/// }
///
/// let runner = TaskRunner::new(handler_fn(business_logic), AdapterConfig::from_env());
/// ```
pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(NestedEvent, InvocationContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, TaskError>> + Send + 'static,
{
    FnHandler { f }
}

impl<F, Fut> TaskHandler for FnHandler<F>
where
    F: Fn(NestedEvent, InvocationContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, TaskError>> + Send + 'static,
{
    fn handle(&self, event: NestedEvent, context: InvocationContext) -> HandlerFuture<'_> {
        Box::pin((self.f)(event, context))
    }
}
