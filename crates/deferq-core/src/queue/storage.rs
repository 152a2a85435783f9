//! Pending storage and the owner index.
//!
//! Design:
//! - `records`: the pending sequence, in registration order.
//! - `owners`: owner key -> (method, offset into `records`) for records that
//!   were registered through `push_unique` with an identity.
//! - Invariant: every indexed offset points at a live record with the same
//!   method. Removing a record drops its index entry and shifts later offsets.

use std::collections::HashMap;
use std::mem;

use serde_json::Value;

use super::record::TaskRecord;
use crate::domain::{Method, Owner, OwnerKey};

#[derive(Debug)]
struct IndexEntry {
    method: Method,
    offset: usize,
}

/// What `push_unique` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Dedup {
    Appended(usize),
    Replaced(usize),
}

#[derive(Debug, Default)]
pub(crate) struct PendingTasks {
    records: Vec<TaskRecord>,
    owners: HashMap<OwnerKey, Vec<IndexEntry>>,
}

impl PendingTasks {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn indexed_owners(&self) -> usize {
        self.owners.len()
    }

    /// Unconditional append. Returns the new record's offset.
    pub fn push(&mut self, record: TaskRecord) -> usize {
        self.records.push(record);
        self.records.len() - 1
    }

    /// Append unless a pending record with the same `(owner, method)` exists,
    /// in which case only its arguments and context are replaced.
    ///
    /// With `key`, the lookup goes through the owner index and only sees
    /// records registered there. Without it, every pending record is scanned.
    pub fn push_unique(&mut self, record: TaskRecord, key: Option<OwnerKey>) -> Dedup {
        let Some(method) = record.method.clone() else {
            return Dedup::Appended(self.push(record));
        };

        let Some(key) = key else {
            return match self.position(record.target.as_ref(), &method) {
                Some(offset) => {
                    self.records[offset].replace_payload(record.args, record.context);
                    Dedup::Replaced(offset)
                }
                None => Dedup::Appended(self.push(record)),
            };
        };

        let indexed = self
            .owners
            .get(&key)
            .and_then(|entries| entries.iter().find(|e| e.method == method))
            .map(|e| e.offset);

        match indexed {
            Some(offset) => {
                self.records[offset].replace_payload(record.args, record.context);
                Dedup::Replaced(offset)
            }
            None => {
                let offset = self.push(record);
                self.owners
                    .entry(key)
                    .or_default()
                    .push(IndexEntry { method, offset });
                Dedup::Appended(offset)
            }
        }
    }

    /// First pending record matching `(target, method)`.
    pub fn position(&self, target: Option<&Owner>, method: &Method) -> Option<usize> {
        self.records.iter().position(|r| r.matches(target, method))
    }

    pub fn args(&self, offset: usize) -> Option<&[Value]> {
        self.records.get(offset).map(|r| r.args.as_slice())
    }

    /// Remove a pending record.
    ///
    /// Tries the owner index first, then the first match in registration
    /// order. The index is repaired either way.
    pub fn cancel(
        &mut self,
        target: Option<&Owner>,
        method: &Method,
        key: Option<&OwnerKey>,
    ) -> Option<TaskRecord> {
        let indexed = key
            .and_then(|key| self.owners.get(key))
            .and_then(|entries| entries.iter().find(|e| &e.method == method))
            .map(|e| e.offset)
            .filter(|&offset| self.records[offset].matches(target, method));

        let offset = indexed.or_else(|| self.position(target, method))?;
        Some(self.remove(offset))
    }

    fn remove(&mut self, offset: usize) -> TaskRecord {
        let record = self.records.remove(offset);
        self.owners.retain(|_, entries| {
            entries.retain(|e| e.offset != offset);
            for entry in entries.iter_mut() {
                if entry.offset > offset {
                    entry.offset -= 1;
                }
            }
            !entries.is_empty()
        });
        record
    }

    /// Detach every pending record and reset the index.
    pub fn take(&mut self) -> Vec<TaskRecord> {
        self.owners.clear();
        mem::take(&mut self.records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DiagnosticContext, Target};
    use rstest::rstest;
    use std::rc::Rc;

    struct Keyed(&'static str);

    impl Target for Keyed {
        fn identity(&self) -> Option<OwnerKey> {
            Some(OwnerKey::new(self.0))
        }
    }

    fn owner(key: &'static str) -> Owner {
        Rc::new(Keyed(key))
    }

    fn task(target: &Owner, name: &'static str, arg: i64) -> TaskRecord {
        TaskRecord::new(
            Some(Rc::clone(target)),
            Method::named(name),
            vec![Value::from(arg)],
            DiagnosticContext::empty(),
        )
    }

    fn key_of(target: &Owner) -> Option<OwnerKey> {
        target.identity()
    }

    #[test]
    fn push_appends_in_order() {
        let a = owner("a");
        let mut pending = PendingTasks::default();

        assert_eq!(pending.push(task(&a, "foo", 1)), 0);
        assert_eq!(pending.push(task(&a, "foo", 2)), 1);
        assert_eq!(pending.len(), 2);
        assert_eq!(pending.indexed_owners(), 0);
    }

    #[rstest]
    #[case::indexed(true)]
    #[case::linear(false)]
    fn push_unique_replaces_in_place(#[case] use_index: bool) {
        let a = owner("a");
        let b = owner("b");
        let key = |o: &Owner| if use_index { key_of(o) } else { None };
        let mut pending = PendingTasks::default();

        assert_eq!(pending.push_unique(task(&a, "foo", 1), key(&a)), Dedup::Appended(0));
        assert_eq!(pending.push_unique(task(&b, "foo", 1), key(&b)), Dedup::Appended(1));
        assert_eq!(pending.push_unique(task(&a, "foo", 2), key(&a)), Dedup::Replaced(0));

        assert_eq!(pending.len(), 2);
        assert_eq!(pending.args(0), Some(&[Value::from(2)][..]));
        assert_eq!(pending.args(1), Some(&[Value::from(1)][..]));
    }

    #[test]
    fn indexed_push_unique_ignores_plain_pushes() {
        let a = owner("a");
        let mut pending = PendingTasks::default();

        pending.push(task(&a, "foo", 1));
        assert_eq!(pending.push_unique(task(&a, "foo", 2), key_of(&a)), Dedup::Appended(1));
    }

    #[test]
    fn linear_push_unique_matches_plain_pushes() {
        let a = owner("a");
        let mut pending = PendingTasks::default();

        pending.push(task(&a, "foo", 1));
        assert_eq!(pending.push_unique(task(&a, "foo", 2), None), Dedup::Replaced(0));
    }

    #[test]
    fn cancel_repairs_index_offsets() {
        let a = owner("a");
        let b = owner("b");
        let mut pending = PendingTasks::default();

        pending.push_unique(task(&a, "foo", 1), key_of(&a));
        pending.push_unique(task(&b, "foo", 1), key_of(&b));
        pending.push_unique(task(&b, "bar", 1), key_of(&b));

        let removed = pending.cancel(Some(&a), &Method::named("foo"), key_of(&a).as_ref());
        assert!(removed.is_some());
        assert_eq!(pending.len(), 2);
        assert_eq!(pending.indexed_owners(), 1);

        // b.bar moved from offset 2 to 1; dedup must still land on it.
        assert_eq!(pending.push_unique(task(&b, "bar", 9), key_of(&b)), Dedup::Replaced(1));
        assert_eq!(pending.args(1), Some(&[Value::from(9)][..]));
    }

    #[test]
    fn cancel_falls_back_to_linear_scan() {
        let a = owner("a");
        let mut pending = PendingTasks::default();

        pending.push(task(&a, "foo", 1));
        pending.push(task(&a, "foo", 2));

        let removed = pending.cancel(Some(&a), &Method::named("foo"), key_of(&a).as_ref());
        assert_eq!(removed.map(|r| r.args), Some(vec![Value::from(1)]));
        assert_eq!(pending.len(), 1);
    }

    #[test]
    fn cancel_unknown_returns_none() {
        let a = owner("a");
        let mut pending = PendingTasks::default();
        pending.push(task(&a, "foo", 1));

        assert!(pending.cancel(Some(&a), &Method::named("bar"), None).is_none());
        assert!(pending.cancel(None, &Method::named("foo"), None).is_none());
        assert_eq!(pending.len(), 1);
    }

    #[test]
    fn take_resets_index() {
        let a = owner("a");
        let mut pending = PendingTasks::default();
        pending.push_unique(task(&a, "foo", 1), key_of(&a));

        let snapshot = pending.take();
        assert_eq!(snapshot.len(), 1);
        assert!(pending.is_empty());
        assert_eq!(pending.indexed_owners(), 0);

        // A new registration is not deduped against the detached record.
        assert_eq!(pending.push_unique(task(&a, "foo", 2), key_of(&a)), Dedup::Appended(0));
    }
}
