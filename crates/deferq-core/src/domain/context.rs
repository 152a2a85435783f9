//! Diagnostic context captured when a task is scheduled.
//!
//! The queue only carries this value around; it is handed to the error
//! handler untouched when the task fails.

use std::backtrace::Backtrace;
use std::borrow::Cow;
use std::fmt;
use std::panic::Location;
use std::sync::Arc;

use chrono::{DateTime, Utc};

#[derive(Debug, Clone)]
pub struct DiagnosticContext {
    location: Option<&'static Location<'static>>,
    scheduled_at: DateTime<Utc>,
    label: Option<Cow<'static, str>>,
    backtrace: Option<Arc<Backtrace>>,
}

impl DiagnosticContext {
    /// Record the caller's location and the current time.
    #[track_caller]
    pub fn here() -> Self {
        Self::capture(false)
    }

    /// Like `here`, optionally with a full backtrace of the scheduling site.
    /// Backtraces are expensive; leave them off outside of debugging.
    #[track_caller]
    pub fn capture(with_backtrace: bool) -> Self {
        Self {
            location: Some(Location::caller()),
            scheduled_at: Utc::now(),
            label: None,
            backtrace: with_backtrace.then(|| Arc::new(Backtrace::force_capture())),
        }
    }

    /// A context without a scheduling site.
    pub fn empty() -> Self {
        Self {
            location: None,
            scheduled_at: Utc::now(),
            label: None,
            backtrace: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<Cow<'static, str>>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn location(&self) -> Option<&'static Location<'static>> {
        self.location
    }

    pub fn scheduled_at(&self) -> DateTime<Utc> {
        self.scheduled_at
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn backtrace(&self) -> Option<&Backtrace> {
        self.backtrace.as_deref()
    }
}

impl Default for DiagnosticContext {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Display for DiagnosticContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(label) = &self.label {
            write!(f, "{label} ")?;
        }
        match self.location {
            Some(location) => write!(f, "scheduled at {location}")?,
            None => write!(f, "scheduled")?,
        }
        write!(f, " ({})", self.scheduled_at.to_rfc3339())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn here_records_caller_location() {
        let context = DiagnosticContext::here();
        let location = context.location().unwrap();
        assert!(location.file().ends_with("context.rs"));
        assert!(context.backtrace().is_none());
    }

    #[test]
    fn capture_with_backtrace() {
        let context = DiagnosticContext::capture(true);
        assert!(context.backtrace().is_some());
    }

    #[test]
    fn display_includes_label_and_site() {
        let context = DiagnosticContext::here().with_label("render");
        let text = context.to_string();
        assert!(text.starts_with("render scheduled at "));
        assert!(text.contains("context.rs"));

        let empty = DiagnosticContext::empty().to_string();
        assert!(empty.starts_with("scheduled ("));
    }
}
