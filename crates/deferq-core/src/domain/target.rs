//! Target - タスクの所有者（receiver）と呼び出し対象
//!
//! A scheduled call is bound to an optional owner (`Target`) and a `Method`,
//! which is either a callback fixed at scheduling time or a name that is
//! looked up on the owner when the task actually runs.

use std::borrow::Cow;
use std::fmt;
use std::rc::Rc;

use serde_json::Value;

use super::context::DiagnosticContext;
use crate::error::TaskError;

pub type TaskResult = Result<(), TaskError>;

/// A callable bound to its owner at invocation time.
pub type Callback = Rc<dyn Fn(Option<&dyn Target>, &[Value]) -> TaskResult>;

/// Receives a task failure together with the context captured when the task
/// was scheduled.
pub type ErrorCallback = Rc<dyn Fn(&TaskError, &DiagnosticContext) -> TaskResult>;

/// Build a `Callback` from a closure.
pub fn callback<F>(f: F) -> Callback
where
    F: Fn(Option<&dyn Target>, &[Value]) -> TaskResult + 'static,
{
    Rc::new(f)
}

/// Build an `ErrorCallback` from a closure.
pub fn error_callback<F>(f: F) -> ErrorCallback
where
    F: Fn(&TaskError, &DiagnosticContext) -> TaskResult + 'static,
{
    Rc::new(f)
}

/// Shared handle to an owner. The queue never owns targets exclusively.
pub type Owner = Rc<dyn Target>;

/// Stable identity of an owner, used by the owner index for O(1) dedup.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OwnerKey(Rc<str>);

impl OwnerKey {
    pub fn new(key: impl AsRef<str>) -> Self {
        Self(Rc::from(key.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Capabilities an owner may expose to the queue.
///
/// Every method has a default, so a plain receiver only needs `impl Target for X {}`.
/// - `identity`: a stable key. Owners without one fall back to linear dedup.
/// - `method`: late-bound lookup for `Method::Named`. Called on every flush,
///   so reassigning a method after scheduling is picked up.
/// - `error_handler`: lookup for `ErrorHandler::Method`.
pub trait Target {
    fn identity(&self) -> Option<OwnerKey> {
        None
    }

    fn method(&self, _name: &str) -> Option<Callback> {
        None
    }

    fn error_handler(&self, _name: &str) -> Option<ErrorCallback> {
        None
    }
}

/// What to call: a direct callback or a method name resolved on the owner.
#[derive(Clone)]
pub enum Method {
    Direct(Callback),
    Named(Cow<'static, str>),
}

impl Method {
    pub fn direct<F>(f: F) -> Self
    where
        F: Fn(Option<&dyn Target>, &[Value]) -> TaskResult + 'static,
    {
        Method::Direct(callback(f))
    }

    pub fn named(name: impl Into<Cow<'static, str>>) -> Self {
        Method::Named(name.into())
    }

    /// Resolve to something callable. Named methods without an owner, or
    /// that the owner doesn't know, resolve to `None`.
    pub fn resolve(&self, target: Option<&dyn Target>) -> Option<Callback> {
        match self {
            Method::Direct(callback) => Some(Rc::clone(callback)),
            Method::Named(name) => target.and_then(|t| t.method(name)),
        }
    }
}

/// Dedup/cancel identity: callbacks by reference, names by value.
/// This compares the raw method, never the resolved function.
impl PartialEq for Method {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Method::Direct(a), Method::Direct(b)) => same_allocation(a, b),
            (Method::Named(a), Method::Named(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Method {}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Direct(callback) => {
                write!(f, "Direct({:p})", Rc::as_ptr(callback) as *const ())
            }
            Method::Named(name) => f.debug_tuple("Named").field(name).finish(),
        }
    }
}

impl From<&'static str> for Method {
    fn from(name: &'static str) -> Self {
        Method::Named(Cow::Borrowed(name))
    }
}

impl From<String> for Method {
    fn from(name: String) -> Self {
        Method::Named(Cow::Owned(name))
    }
}

impl From<Callback> for Method {
    fn from(callback: Callback) -> Self {
        Method::Direct(callback)
    }
}

/// Owner identity by reference. Two absent owners are the same owner.
pub fn same_owner(a: Option<&Owner>, b: Option<&Owner>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => same_allocation(a, b),
        (None, None) => true,
        _ => false,
    }
}

// Compare data pointers only; vtable pointers for the same type may differ
// between codegen units.
fn same_allocation<T: ?Sized>(a: &Rc<T>, b: &Rc<T>) -> bool {
    std::ptr::eq(Rc::as_ptr(a) as *const (), Rc::as_ptr(b) as *const ())
}
