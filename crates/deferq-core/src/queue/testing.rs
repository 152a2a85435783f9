//! Test fixtures shared by the queue tests.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use serde_json::Value;

use crate::config::{GlobalOptions, QueueOptions};
use crate::domain::{Callback, Owner, OwnerKey, Target, callback};
use crate::error::TaskError;
use crate::queue::TaskQueue;

/// Ordered log of what ran.
#[derive(Clone, Default)]
pub(crate) struct Journal(Rc<RefCell<Vec<String>>>);

impl Journal {
    pub fn record(&self, entry: impl Into<String>) {
        self.0.borrow_mut().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.borrow().clone()
    }
}

/// A receiver with optional identity and reassignable named methods.
pub(crate) struct Component {
    key: Option<OwnerKey>,
    methods: RefCell<HashMap<String, Callback>>,
}

impl Component {
    pub fn keyed(key: &str) -> Rc<Self> {
        Rc::new(Self {
            key: Some(OwnerKey::new(key)),
            methods: RefCell::new(HashMap::new()),
        })
    }

    pub fn anonymous() -> Rc<Self> {
        Rc::new(Self {
            key: None,
            methods: RefCell::new(HashMap::new()),
        })
    }

    pub fn define(&self, name: &str, callback: Callback) {
        self.methods.borrow_mut().insert(name.to_string(), callback);
    }
}

impl Target for Component {
    fn identity(&self) -> Option<OwnerKey> {
        self.key.clone()
    }

    fn method(&self, name: &str) -> Option<Callback> {
        self.methods.borrow().get(name).cloned()
    }
}

pub(crate) fn owner(component: &Rc<Component>) -> Option<Owner> {
    Some(Rc::clone(component) as Owner)
}

/// Records `label(arg,arg,...)`.
pub(crate) fn recorder(journal: &Journal, label: &'static str) -> Callback {
    let journal = journal.clone();
    callback(move |_, args| {
        journal.record(format!("{label}({})", render(args)));
        Ok(())
    })
}

/// Records like `recorder`, then fails.
pub(crate) fn failing(journal: &Journal, label: &'static str) -> Callback {
    let journal = journal.clone();
    callback(move |_, args| {
        journal.record(format!("{label}({})", render(args)));
        Err(TaskError::msg(format!("{label} failed")))
    })
}

pub(crate) fn queue(global: GlobalOptions) -> TaskQueue {
    TaskQueue::new("actions", QueueOptions::new(), Rc::new(global))
}

pub(crate) fn args(values: &[i64]) -> Vec<Value> {
    values.iter().copied().map(Value::from).collect()
}

fn render(args: &[Value]) -> String {
    args.iter()
        .map(Value::to_string)
        .collect::<Vec<_>>()
        .join(",")
}
