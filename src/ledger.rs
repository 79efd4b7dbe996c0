//! The statement ledger.
//!
//! Run-scoped record of every unit drawn from every file, in arrival order,
//! together with its execution state. Entries are never removed during a run.
//!
//! For every entry that has been attempted (or seeded as failed):
//! `executed == execution_number.is_some() == error.is_none()`.

use serde::Serialize;

use crate::error::LoaderError;
use crate::unit::SourceUnit;

/// Position of an entry in the ledger, assigned in arrival order from 1.
pub type EntryId = usize;

/// A unit and its execution state.
#[derive(Debug, Clone, Serialize)]
pub struct LedgerEntry {
    pub id: EntryId,
    pub unit: SourceUnit,
    /// Global order of successful execution, starting at 1.
    pub execution_number: Option<u64>,
    pub executed: bool,
    /// Last error, cleared on success.
    pub error: Option<String>,
    pub attempts: u32,
    /// Normalized text produced by the last transform.
    pub audit_text: Option<String>,
    /// Entries seeded from ingestion failures are never attempted.
    pub attemptable: bool,
}

impl LedgerEntry {
    /// Text shown in reports.
    pub fn statement_text(&self) -> &str {
        self.audit_text.as_deref().unwrap_or(&self.unit.code)
    }
}

/// A distinct file in the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerFile<'a> {
    pub path: &'a str,
    pub priority: i32,
}

#[derive(Debug, Default)]
pub struct Ledger {
    entries: Vec<LedgerEntry>,
    next_execution: u64,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a pending unit.
    pub fn push(&mut self, unit: SourceUnit) -> EntryId {
        self.insert(unit, None, true)
    }

    /// Add a unit that failed before it could be attempted.
    pub fn push_failed(&mut self, unit: SourceUnit, error: &LoaderError) -> EntryId {
        self.insert(unit, Some(error.ledger_message()), false)
    }

    fn insert(&mut self, unit: SourceUnit, error: Option<String>, attemptable: bool) -> EntryId {
        let id = self.entries.len() + 1;
        self.entries.push(LedgerEntry {
            id,
            unit,
            execution_number: None,
            executed: false,
            error,
            attempts: 0,
            audit_text: None,
            attemptable,
        });
        id
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    pub fn get(&self, id: EntryId) -> Option<&LedgerEntry> {
        id.checked_sub(1).and_then(|i| self.entries.get(i))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Distinct files, in order of first arrival.
    pub fn files(&self) -> Vec<LedgerFile<'_>> {
        let mut files: Vec<LedgerFile<'_>> = Vec::new();
        for entry in &self.entries {
            if !files.iter().any(|f| f.path == entry.unit.path) {
                files.push(LedgerFile {
                    path: &entry.unit.path,
                    priority: entry.unit.class.priority,
                });
            }
        }
        files
    }

    /// Unexecuted, attemptable entries of `path` in ordinal order.
    pub fn pending_in(&self, path: &str) -> Vec<EntryId> {
        let mut pending: Vec<&LedgerEntry> = self
            .entries
            .iter()
            .filter(|e| e.attemptable && !e.executed && e.unit.path == path)
            .collect();
        pending.sort_by_key(|e| e.unit.ordinal);
        pending.into_iter().map(|e| e.id).collect()
    }

    /// Mark an entry executed and return its execution number.
    pub fn record_success(&mut self, id: EntryId, audit_text: Option<String>) -> u64 {
        self.next_execution += 1;
        let number = self.next_execution;
        let entry = self.entry_mut(id);
        entry.attempts += 1;
        entry.executed = true;
        entry.execution_number = Some(number);
        entry.error = None;
        entry.audit_text = audit_text.or(entry.audit_text.take());
        number
    }

    /// Record a failed attempt.
    pub fn record_failure(&mut self, id: EntryId, error: String, audit_text: Option<String>) {
        let entry = self.entry_mut(id);
        debug_assert!(!entry.executed, "executed entries are never retried");
        entry.attempts += 1;
        entry.error = Some(error);
        if audit_text.is_some() {
            entry.audit_text = audit_text;
        }
    }

    fn entry_mut(&mut self, id: EntryId) -> &mut LedgerEntry {
        &mut self.entries[id - 1]
    }

    pub fn executed_count(&self) -> usize {
        self.entries.iter().filter(|e| e.executed).count()
    }

    /// Entries that carry an error.
    pub fn failed_count(&self) -> usize {
        self.entries.iter().filter(|e| e.error.is_some()).count()
    }

    /// Entries never attempted.
    pub fn untouched_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| !e.executed && e.error.is_none())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unit::Classification;

    fn unit(path: &str, ordinal: usize, priority: i32) -> SourceUnit {
        SourceUnit {
            path: path.into(),
            ordinal,
            line: ordinal,
            column: 1,
            suffix: ".sql".into(),
            class: Classification {
                language: Some("sql".into()),
                priority,
                ..Default::default()
            },
            code: format!("select {}", ordinal),
        }
    }

    fn assert_invariant(ledger: &Ledger) {
        for e in ledger.entries() {
            if e.attempts > 0 || !e.attemptable {
                assert_eq!(e.executed, e.execution_number.is_some());
                assert_eq!(e.executed, e.error.is_none());
            }
        }
    }

    #[test]
    fn test_ids_follow_arrival() {
        let mut ledger = Ledger::new();
        assert_eq!(ledger.push(unit("a.sql", 1, 0)), 1);
        assert_eq!(ledger.push(unit("b.sql", 1, 5)), 2);
        assert_eq!(ledger.push(unit("a.sql", 2, 0)), 3);
        assert_eq!(ledger.get(3).unwrap().unit.ordinal, 2);
        assert!(ledger.get(0).is_none());
        assert_eq!(
            ledger.files(),
            vec![
                LedgerFile { path: "a.sql", priority: 0 },
                LedgerFile { path: "b.sql", priority: 5 },
            ]
        );
    }

    #[test]
    fn test_success_and_failure_transitions() {
        let mut ledger = Ledger::new();
        let a = ledger.push(unit("a.sql", 1, 0));
        let b = ledger.push(unit("a.sql", 2, 0));

        ledger.record_failure(b, "relation does not exist".into(), Some("select 2".into()));
        assert_invariant(&ledger);
        assert_eq!(ledger.pending_in("a.sql"), vec![a, b]);

        assert_eq!(ledger.record_success(a, None), 1);
        assert_eq!(ledger.record_success(b, None), 2);
        assert_invariant(&ledger);

        let entry = ledger.get(b).unwrap();
        assert_eq!(entry.attempts, 2);
        assert_eq!(entry.error, None);
        assert_eq!(entry.statement_text(), "select 2");
        assert!(ledger.pending_in("a.sql").is_empty());
        assert_eq!(ledger.executed_count(), 2);
    }

    #[test]
    fn test_seeded_failure_is_not_pending() {
        let mut ledger = Ledger::new();
        let id = ledger.push_failed(unit("bad.sql", 1, 0), &LoaderError::parse(1, 8, "boom"));
        assert!(ledger.pending_in("bad.sql").is_empty());
        assert_eq!(
            ledger.get(id).unwrap().error.as_deref(),
            Some("Parse error at line 1, column 8: boom")
        );
        assert_eq!(ledger.failed_count(), 1);
        assert_eq!(ledger.untouched_count(), 0);
        assert_invariant(&ledger);
    }
}
