//! Task record: owner + method + arguments + diagnostic context.

use std::fmt;

use serde_json::Value;

use crate::domain::{Callback, DiagnosticContext, Method, Owner, same_owner};

/// One scheduled call.
///
/// Records live in fixed positions of a `Vec`; the owner index and the flush
/// iterator both refer to them by offset. A record whose `method` is `None`
/// has been neutralized (cancelled while in flight) or already consumed, and
/// is skipped.
#[derive(Default)]
pub(crate) struct TaskRecord {
    pub target: Option<Owner>,
    pub method: Option<Method>,
    pub args: Vec<Value>,
    pub context: DiagnosticContext,
}

impl TaskRecord {
    pub fn new(
        target: Option<Owner>,
        method: Method,
        args: Vec<Value>,
        context: DiagnosticContext,
    ) -> Self {
        Self {
            target,
            method: Some(method),
            args,
            context,
        }
    }

    /// Same `(owner, method)` pair. Neutralized records never match.
    pub fn matches(&self, target: Option<&Owner>, method: &Method) -> bool {
        self.method.as_ref() == Some(method) && same_owner(self.target.as_ref(), target)
    }

    /// Dedup hit: replace the payload, keep the position.
    pub fn replace_payload(&mut self, args: Vec<Value>, context: DiagnosticContext) {
        self.args = args;
        self.context = context;
    }

    /// Clear the method in place without touching the surrounding storage.
    pub fn neutralize(&mut self) {
        self.method = None;
    }

    /// Copy out what is needed to run this record. Owner and method stay in
    /// place so the record keeps matching; the payload moves out.
    pub fn claim(&mut self) -> TaskRecord {
        TaskRecord {
            target: self.target.clone(),
            method: self.method.clone(),
            args: std::mem::take(&mut self.args),
            context: std::mem::take(&mut self.context),
        }
    }

    pub fn is_live(&self) -> bool {
        self.method.is_some()
    }

    /// Resolve the method against the owner. Named methods are looked up now,
    /// not at scheduling time.
    pub fn resolve(&self) -> Option<Callback> {
        self.method
            .as_ref()
            .and_then(|method| method.resolve(self.target.as_deref()))
    }
}

impl fmt::Debug for TaskRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskRecord")
            .field("has_target", &self.target.is_some())
            .field("method", &self.method)
            .field("args", &self.args)
            .field("context", &self.context)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Target;
    use std::rc::Rc;

    struct Plain;
    impl Target for Plain {}

    #[test]
    fn matches_owner_and_method() {
        let owner: Owner = Rc::new(Plain);
        let record = TaskRecord::new(
            Some(Rc::clone(&owner)),
            Method::named("save"),
            vec![],
            DiagnosticContext::empty(),
        );

        assert!(record.matches(Some(&owner), &Method::named("save")));
        assert!(!record.matches(Some(&owner), &Method::named("load")));
        assert!(!record.matches(None, &Method::named("save")));
    }

    #[test]
    fn neutralized_record_never_matches() {
        let mut record = TaskRecord::new(
            None,
            Method::named("save"),
            vec![],
            DiagnosticContext::empty(),
        );
        record.neutralize();

        assert!(!record.is_live());
        assert!(!record.matches(None, &Method::named("save")));
        assert!(record.resolve().is_none());
    }

    #[test]
    fn claim_moves_payload_and_keeps_identity() {
        let owner: Owner = Rc::new(Plain);
        let mut record = TaskRecord::new(
            Some(Rc::clone(&owner)),
            Method::named("save"),
            vec![Value::from(1)],
            DiagnosticContext::empty().with_label("save"),
        );

        let claimed = record.claim();
        assert_eq!(claimed.args, vec![Value::from(1)]);
        assert_eq!(claimed.context.label(), Some("save"));
        assert!(record.args.is_empty());
        assert!(record.matches(Some(&owner), &Method::named("save")));
    }

    #[test]
    fn replace_payload_keeps_method() {
        let mut record = TaskRecord::new(
            None,
            Method::named("save"),
            vec![Value::from(1)],
            DiagnosticContext::empty(),
        );
        record.replace_payload(vec![Value::from(2)], DiagnosticContext::empty().with_label("second"));

        assert_eq!(record.args, vec![Value::from(2)]);
        assert_eq!(record.context.label(), Some("second"));
        assert!(record.matches(None, &Method::named("save")));
    }
}
