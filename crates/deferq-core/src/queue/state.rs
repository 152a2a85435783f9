//! Flush state machine for the queue.

use super::record::TaskRecord;
use crate::domain::{Method, Owner};

/// Queue phase.
///
/// State transitions:
/// - Idle -> Flushing (pending detached into the snapshot)
/// - Flushing -> Idle (snapshot drained, aborted, or unwound)
///
/// At most one snapshot exists at a time.
#[derive(Debug, Default)]
pub(crate) enum FlushPhase {
    #[default]
    Idle,

    /// The snapshot being drained. Its length never changes while flushing.
    /// Records before `next` have been handed out; they stay in place and
    /// still match `(owner, method)`.
    Flushing {
        snapshot: Vec<TaskRecord>,
        next: usize,
    },
}

impl FlushPhase {
    pub fn is_flushing(&self) -> bool {
        matches!(self, FlushPhase::Flushing { .. })
    }

    pub fn flushing(snapshot: Vec<TaskRecord>) -> Self {
        FlushPhase::Flushing { snapshot, next: 0 }
    }

    /// Live records not yet handed out.
    pub fn in_flight(&self) -> usize {
        match self {
            FlushPhase::Idle => 0,
            FlushPhase::Flushing { snapshot, next } => snapshot
                .iter()
                .skip(*next)
                .filter(|r| r.is_live())
                .count(),
        }
    }

    /// Hand out the record at `offset` and advance the cursor past it.
    /// Returns `None` for neutralized records.
    pub fn claim(&mut self, offset: usize) -> Option<TaskRecord> {
        let FlushPhase::Flushing { snapshot, next } = self else {
            return None;
        };
        *next = (*next).max(offset + 1);
        let record = snapshot.get_mut(offset)?;
        if !record.is_live() {
            return None;
        }
        Some(record.claim())
    }

    /// Neutralize the first record matching `(target, method)`, searching
    /// from the start of the snapshot. A hit on a record that already ran
    /// has no effect on what runs.
    pub fn neutralize(&mut self, target: Option<&Owner>, method: &Method) -> bool {
        let FlushPhase::Flushing { snapshot, .. } = self else {
            return false;
        };
        match snapshot.iter_mut().find(|r| r.matches(target, method)) {
            Some(record) => {
                record.neutralize();
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DiagnosticContext;

    fn record(name: &'static str) -> TaskRecord {
        TaskRecord::new(None, Method::named(name), vec![], DiagnosticContext::empty())
    }

    #[test]
    fn idle_has_nothing_in_flight() {
        let mut phase = FlushPhase::Idle;
        assert!(!phase.is_flushing());
        assert_eq!(phase.in_flight(), 0);
        assert!(phase.claim(0).is_none());
        assert!(!phase.neutralize(None, &Method::named("a")));
    }

    #[test]
    fn neutralize_keeps_snapshot_length() {
        let mut phase = FlushPhase::flushing(vec![record("a"), record("b"), record("c")]);

        assert!(phase.neutralize(None, &Method::named("b")));
        assert_eq!(phase.in_flight(), 2);
        let FlushPhase::Flushing { snapshot, .. } = &phase else {
            panic!("expected flushing");
        };
        assert_eq!(snapshot.len(), 3);

        assert!(phase.claim(0).is_some());
        assert!(phase.claim(1).is_none());
        assert!(phase.claim(2).is_some());
        assert_eq!(phase.in_flight(), 0);
    }

    #[test]
    fn claimed_records_still_match_first() {
        let mut phase = FlushPhase::flushing(vec![record("a"), record("a")]);

        assert!(phase.claim(0).is_some());
        assert_eq!(phase.in_flight(), 1);
        // The first match is the record already handed out, so the later
        // duplicate is untouched.
        assert!(phase.neutralize(None, &Method::named("a")));
        assert_eq!(phase.in_flight(), 1);
        assert!(phase.claim(1).is_some());
    }
}
