//! Invoker: runs one resolved callback under the flush's error policy.

use std::borrow::Cow;
use std::fmt;
use std::rc::Rc;

use serde_json::Value;

use crate::domain::{
    Callback, DiagnosticContext, ErrorCallback, Owner, Target, TaskResult, error_callback,
};
use crate::error::TaskError;

/// Where task failures go when isolation is wanted.
#[derive(Clone)]
pub enum ErrorHandler {
    Direct(ErrorCallback),

    /// Looked up on `target` once at the start of every flush pass.
    Method {
        target: Owner,
        name: Cow<'static, str>,
    },
}

impl ErrorHandler {
    pub fn direct<F>(f: F) -> Self
    where
        F: Fn(&TaskError, &DiagnosticContext) -> TaskResult + 'static,
    {
        ErrorHandler::Direct(error_callback(f))
    }

    pub fn method(target: Owner, name: impl Into<Cow<'static, str>>) -> Self {
        ErrorHandler::Method {
            target,
            name: name.into(),
        }
    }

    fn resolve(&self) -> Option<ErrorCallback> {
        match self {
            ErrorHandler::Direct(callback) => Some(Rc::clone(callback)),
            ErrorHandler::Method { target, name } => target.error_handler(name),
        }
    }
}

impl fmt::Debug for ErrorHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorHandler::Direct(_) => f.write_str("ErrorHandler::Direct"),
            ErrorHandler::Method { name, .. } => {
                f.debug_struct("ErrorHandler::Method").field("name", name).finish()
            }
        }
    }
}

/// Outcome of a single invocation that did not abort the pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Invocation {
    Completed,
    /// The task failed and the error handler accepted the failure.
    Isolated,
}

/// Failure that aborts the pass.
#[derive(Debug)]
pub(crate) enum InvokeError {
    Task(TaskError),
    Handler(TaskError),
}

/// Error policy, fixed for one flush pass.
pub(crate) enum Invoker {
    Propagating,
    Isolating(ErrorCallback),
}

impl Invoker {
    /// A handler that cannot be resolved means failures propagate.
    pub fn select(on_error: Option<&ErrorHandler>) -> Self {
        match on_error.and_then(ErrorHandler::resolve) {
            Some(callback) => Invoker::Isolating(callback),
            None => Invoker::Propagating,
        }
    }

    pub fn is_isolating(&self) -> bool {
        matches!(self, Invoker::Isolating(_))
    }

    pub fn invoke(
        &self,
        callback: &Callback,
        target: Option<&dyn Target>,
        args: &[Value],
        context: &DiagnosticContext,
    ) -> Result<Invocation, InvokeError> {
        let result = callback(target, args);
        match (self, result) {
            (_, Ok(())) => Ok(Invocation::Completed),
            (Invoker::Propagating, Err(err)) => Err(InvokeError::Task(err)),
            (Invoker::Isolating(on_error), Err(err)) => {
                tracing::warn!(error = %err, %context, "task failed; reporting to error handler");
                on_error(&err, context).map_err(InvokeError::Handler)?;
                Ok(Invocation::Isolated)
            }
        }
    }
}
