//! # schemaload
//!
//! Load a tree of SQL, procedural-language and tool sources into PostgreSQL
//! without declaring dependencies between them.
//!
//! Files are classified by name, SQL files are split into statements, and
//! every unit is retried pass after pass until a pass executes nothing. Each
//! file runs in its own session, and every unit's outcome lands in a ledger
//! that is reported in execution order.
//!
//! ## Quick Example
//!
//! ```rust,ignore
//! use schemaload::prelude::*;
//!
//! let loader = Loader::new(LoaderConfig::default())?;
//! let target = PgTarget::from_url("postgres://localhost/app")?;
//! let outcome = loader
//!     .load(&LocalFs, "db", &target, CancellationToken::new())
//!     .await?;
//!
//! for row in outcome.report.failed() {
//!     eprintln!("{}:{}: {:?}", row.file, row.line, row.error);
//! }
//! ```
//!
//! ## Classification
//!
//! | Suffix | Language     | Priority |
//! |--------|--------------|----------|
//! | `.sql` | `sql`        | 100      |
//! | `.py`  | `plpython3u` | 10       |
//! | `.pl`  | `plperl`     | 10       |
//! | `.tcl` | `pltcl`      | 10       |
//! | `.js`  | `plv8`       | 10       |

pub mod classify;
pub mod config;
pub mod engine;
pub mod error;
pub mod fs;
pub mod ingest;
pub mod ledger;
pub mod loader;
pub mod parser;
pub mod report;
pub mod scheduler;
pub mod session;
pub mod template;
pub mod transform;
pub mod unit;

pub mod prelude {
    pub use crate::classify::{Classifier, Rule, RuleSet};
    pub use crate::config::LoaderConfig;
    pub use crate::engine::{PgSession, PgTarget};
    pub use crate::error::*;
    pub use crate::fs::{FileSystem, LocalFs, MemoryFs};
    pub use crate::ledger::{Ledger, LedgerEntry};
    pub use crate::loader::{LoadOutcome, Loader, PlannedUnit};
    pub use crate::report::{Report, ReportRow};
    pub use crate::scheduler::{RunSummary, ScanOrder, Scheduler};
    pub use crate::session::{Session, Target};
    pub use crate::transform::{Plan, Step, ToPlan};
    pub use crate::unit::{Classification, SourceUnit, UnitKind};
    pub use tokio_util::sync::CancellationToken;
}

/// Split SQL text into statements.
///
/// # Example
///
/// ```
/// let stmts = schemaload::split("create table t (id int);\nselect 1;").unwrap();
/// assert_eq!(stmts.len(), 2);
/// assert_eq!(stmts[1].line, 2);
/// ```
pub fn split(input: &str) -> error::LoadResult<Vec<parser::Statement>> {
    parser::split(input)
}
