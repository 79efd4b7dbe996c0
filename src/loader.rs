//! High-level entry point tying ingestion, scheduling and reporting together.

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::classify::RuleSet;
use crate::config::LoaderConfig;
use crate::error::LoadResult;
use crate::fs::FileSystem;
use crate::ingest::{IngestStats, Ingestor};
use crate::ledger::Ledger;
use crate::parser::SqlSplitter;
use crate::report::Report;
use crate::scheduler::{RunSummary, Scheduler};
use crate::session::Target;
use crate::transform::{Plan, ToPlan, TransformContext};

/// Everything a load produced.
#[derive(Debug, Serialize)]
pub struct LoadOutcome {
    pub ingest: IngestStats,
    pub summary: RunSummary,
    pub report: Report,
}

/// A unit and the plan it would execute, without touching a database.
#[derive(Debug, Clone, Serialize)]
pub struct PlannedUnit {
    pub file: String,
    pub ordinal: usize,
    pub line: usize,
    pub column: usize,
    pub plan: Option<Plan>,
    pub error: Option<String>,
}

/// Loads a source tree according to a [`LoaderConfig`].
///
/// # Example
///
/// ```ignore
/// use schemaload::prelude::*;
///
/// let loader = Loader::new(LoaderConfig::default())?;
/// let target = PgTarget::from_url("postgres://localhost/app")?;
/// let outcome = loader.load(&LocalFs, "db", &target, CancellationToken::new()).await?;
/// println!("{}", outcome.report.render_table(60));
/// ```
#[derive(Debug, Clone)]
pub struct Loader {
    config: LoaderConfig,
    rules: RuleSet,
}

impl Loader {
    pub fn new(config: LoaderConfig) -> LoadResult<Self> {
        let rules = config.rule_set()?;
        Ok(Self { config, rules })
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Seed a fresh ledger from the files under `root`.
    pub fn ingest(&self, fs: &dyn FileSystem, root: &str) -> LoadResult<(Ledger, IngestStats)> {
        let mut ledger = Ledger::new();
        let stats = Ingestor::new(&self.rules, &SqlSplitter)
            .ignore_marker(&self.config.ignore_marker)
            .ingest(fs, root, &mut ledger)?;
        Ok((ledger, stats))
    }

    /// Ingest and transform every unit without executing anything.
    pub fn plan(&self, fs: &dyn FileSystem, root: &str) -> LoadResult<Vec<PlannedUnit>> {
        let (ledger, _) = self.ingest(fs, root)?;
        let handle = fs.handle(root);
        let ctx = TransformContext {
            markers: &self.config.template,
            fs_handle: &handle,
        };

        Ok(ledger
            .entries()
            .iter()
            .map(|entry| {
                let (plan, error) = match &entry.error {
                    Some(seeded) => (None, Some(seeded.clone())),
                    None => match entry.unit.to_plan(&ctx) {
                        Ok(plan) => (Some(plan), None),
                        Err(e) => (None, Some(e.ledger_message())),
                    },
                };
                PlannedUnit {
                    file: entry.unit.path.clone(),
                    ordinal: entry.unit.ordinal,
                    line: entry.unit.line,
                    column: entry.unit.column,
                    plan,
                    error,
                }
            })
            .collect())
    }

    /// Ingest `root` and run it to the fixpoint against `target`.
    pub async fn load<T: Target>(
        &self,
        fs: &dyn FileSystem,
        root: &str,
        target: &T,
        cancel: CancellationToken,
    ) -> LoadResult<LoadOutcome> {
        let (mut ledger, ingest) = self.ingest(fs, root)?;

        let summary = Scheduler::new(target)
            .order(self.config.scan_order)
            .markers(self.config.template.clone())
            .fs_handle(fs.handle(root))
            .max_passes(self.config.max_passes)
            .cancel_token(cancel)
            .run(&mut ledger)
            .await;

        Ok(LoadOutcome {
            ingest,
            summary,
            report: Report::from_ledger(&ledger),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MemoryFs;
    use crate::transform::Step;

    #[test]
    fn test_plan_without_database() {
        let fs = MemoryFs::new()
            .with("a.sql", "create table t (id int);\nselect * from t;")
            .with("bad.sql", "select 'x")
            .with("f.js", "// SQL[[CREATE FUNCTION f() RETURNS int]]\nreturn 1;");

        let loader = Loader::new(LoaderConfig::default()).unwrap();
        let planned = loader.plan(&fs, "/srv").unwrap();
        assert_eq!(planned.len(), 4);

        let query = planned[1].plan.as_ref().unwrap();
        assert_eq!(
            query.steps,
            vec![Step::Execute {
                sql: "WITH cte AS (select * from t\n) SELECT true FROM cte".into()
            }]
        );

        assert!(planned[2].plan.is_none());
        assert!(planned[2].error.as_deref().unwrap().starts_with("Parse error"));

        let js = planned[3].plan.as_ref().unwrap();
        assert_eq!(js.steps.len(), 2);
    }
}
