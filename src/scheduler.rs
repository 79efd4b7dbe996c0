//! The fixpoint scheduler.
//!
//! Sources may reference each other in any order, so instead of resolving
//! dependencies the scheduler retries. Each pass walks the files in scan
//! order and attempts their unexecuted units in file order. The first failure
//! in a file ends that file's turn for the pass, since later units may depend
//! on it; other files carry on. Passes repeat until one executes nothing.
//!
//! ```text
//! SCANNING ──(a unit executed)──▶ ADVANCED ──▶ SCANNING
//!     └──────(nothing executed)─▶ STALLED ───▶ DONE
//! ```

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::LoadResult;
use crate::ledger::{EntryId, Ledger, LedgerFile};
use crate::session::{FileSessions, Target};
use crate::template::TemplateMarkers;
use crate::transform::{ToPlan, TransformContext};
use crate::unit::SourceUnit;

/// Order in which files are scanned within a pass.
///
/// Only affects which admissible order is found, never which units succeed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScanOrder {
    /// Higher priority first, ties broken by path.
    #[default]
    PriorityDesc,
    /// Lower priority first, ties broken by path.
    PriorityAsc,
    /// By path only.
    Path,
}

impl ScanOrder {
    pub fn compare(&self, a: &LedgerFile<'_>, b: &LedgerFile<'_>) -> Ordering {
        match self {
            ScanOrder::PriorityDesc => b.priority.cmp(&a.priority).then(a.path.cmp(b.path)),
            ScanOrder::PriorityAsc => a.priority.cmp(&b.priority).then(a.path.cmp(b.path)),
            ScanOrder::Path => a.path.cmp(b.path),
        }
    }
}

/// Outcome of a scheduler run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub passes: usize,
    pub executed: usize,
    /// Entries left with an error.
    pub failed: usize,
    /// Entries never attempted.
    pub pending: usize,
    /// Sessions opened (and closed) during the run.
    pub sessions: usize,
    pub cancelled: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunSummary {
    /// Whether every entry executed.
    pub fn is_complete(&self) -> bool {
        self.failed == 0 && self.pending == 0
    }
}

/// Drives a ledger to its fixpoint against a target.
pub struct Scheduler<'t, T: Target> {
    target: &'t T,
    order: ScanOrder,
    markers: TemplateMarkers,
    fs_handle: String,
    max_passes: Option<usize>,
    cancel: CancellationToken,
}

impl<'t, T: Target> Scheduler<'t, T> {
    pub fn new(target: &'t T) -> Self {
        Self {
            target,
            order: ScanOrder::default(),
            markers: TemplateMarkers::default(),
            fs_handle: String::new(),
            max_passes: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn order(mut self, order: ScanOrder) -> Self {
        self.order = order;
        self
    }

    pub fn markers(mut self, markers: TemplateMarkers) -> Self {
        self.markers = markers;
        self
    }

    /// Filesystem handle passed to file processors.
    pub fn fs_handle(mut self, handle: impl Into<String>) -> Self {
        self.fs_handle = handle.into();
        self
    }

    /// Stop after this many passes even if the last one made progress.
    pub fn max_passes(mut self, max: Option<usize>) -> Self {
        self.max_passes = max;
        self
    }

    /// Token checked between units; cancelling ends the run early.
    pub fn cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Run to the fixpoint. Unit failures are recorded in the ledger; the run
    /// itself never fails. Every session opened is closed before returning.
    pub async fn run(&self, ledger: &mut Ledger) -> RunSummary {
        let started_at = Utc::now();
        let mut sessions = FileSessions::new(self.target);

        let (passes, cancelled) = self.drive(ledger, &mut sessions).await;

        let opened = sessions.len();
        let closed = sessions.close_all().await;
        tracing::debug!("Closed {}/{} sessions", closed, opened);

        let summary = RunSummary {
            passes,
            executed: ledger.executed_count(),
            failed: ledger.failed_count(),
            pending: ledger.untouched_count(),
            sessions: opened,
            cancelled,
            started_at,
            finished_at: Utc::now(),
        };

        if summary.is_complete() {
            tracing::info!(
                "Executed all {} units in {} passes",
                summary.executed,
                summary.passes
            );
        } else {
            tracing::warn!(
                "Stopped after {} passes: {} executed, {} failed, {} not attempted",
                summary.passes,
                summary.executed,
                summary.failed,
                summary.pending
            );
        }
        summary
    }

    /// Returns the number of passes and whether the run was cancelled.
    async fn drive(&self, ledger: &mut Ledger, sessions: &mut FileSessions<'t, T>) -> (usize, bool) {
        let files: Vec<String> = {
            let mut files = ledger.files();
            files.sort_by(|a, b| self.order.compare(a, b));
            files.into_iter().map(|f| f.path.to_string()).collect()
        };
        let ctx = TransformContext {
            markers: &self.markers,
            fs_handle: &self.fs_handle,
        };

        let mut passes = 0;
        let mut progress = true;

        while progress {
            if self.max_passes.is_some_and(|max| passes >= max) {
                tracing::warn!("Reached the limit of {} passes", passes);
                break;
            }
            progress = false;
            passes += 1;
            let mut advanced = 0;

            for path in &files {
                for id in ledger.pending_in(path) {
                    if self.cancel.is_cancelled() {
                        tracing::info!("Cancelled during pass {}", passes);
                        return (passes, true);
                    }
                    if self.step(ledger, id, &ctx, sessions).await {
                        advanced += 1;
                        progress = true;
                    } else {
                        break;
                    }
                }
            }

            tracing::info!("Pass {}: executed {} units", passes, advanced);
        }

        (passes, false)
    }

    /// Attempt one entry and record the outcome. Returns whether it executed.
    async fn step(
        &self,
        ledger: &mut Ledger,
        id: EntryId,
        ctx: &TransformContext<'_>,
        sessions: &mut FileSessions<'t, T>,
    ) -> bool {
        let Some(entry) = ledger.get(id) else {
            return false;
        };
        let (result, audit_text) = self.attempt(&entry.unit, ctx, sessions).await;

        match result {
            Ok(()) => {
                let number = ledger.record_success(id, audit_text);
                tracing::debug!("Executed entry {} as #{}", id, number);
                true
            }
            Err(e) => {
                if let Some(entry) = ledger.get(id) {
                    tracing::debug!(
                        "{}:{}:{}: {}",
                        entry.unit.path,
                        entry.unit.line,
                        entry.unit.column,
                        e
                    );
                }
                ledger.record_failure(id, e.ledger_message(), audit_text);
                false
            }
        }
    }

    async fn attempt(
        &self,
        unit: &SourceUnit,
        ctx: &TransformContext<'_>,
        sessions: &mut FileSessions<'t, T>,
    ) -> (LoadResult<()>, Option<String>) {
        let plan = match unit.to_plan(ctx) {
            Ok(plan) => plan,
            Err(e) => return (Err(e), None),
        };
        let result = match sessions.get(&unit.path).await {
            Ok(session) => plan.apply(session).await,
            Err(e) => Err(e),
        };
        (result, plan.audit_text)
    }
}
