//! Ingestion: files to ledger entries.

use serde::Serialize;

use crate::classify::Classifier;
use crate::error::{LoadResult, LoaderError};
use crate::fs::FileSystem;
use crate::ledger::Ledger;
use crate::parser::Splitter;
use crate::unit::SourceUnit;

/// Default marker that excludes a file from loading.
pub const DEFAULT_IGNORE_MARKER: &str = "schemaload[[ignore]]";

/// Counts gathered while seeding the ledger.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestStats {
    pub files_seen: usize,
    pub files_loaded: usize,
    pub files_ignored: usize,
    pub files_unclassified: usize,
    /// Files that produced a single failing entry.
    pub files_failed: usize,
    pub units: usize,
}

/// Seeds a ledger from files.
pub struct Ingestor<'a> {
    classifier: &'a dyn Classifier,
    splitter: &'a dyn Splitter,
    ignore_marker: &'a str,
}

impl<'a> Ingestor<'a> {
    pub fn new(classifier: &'a dyn Classifier, splitter: &'a dyn Splitter) -> Self {
        Self {
            classifier,
            splitter,
            ignore_marker: DEFAULT_IGNORE_MARKER,
        }
    }

    pub fn ignore_marker(mut self, marker: &'a str) -> Self {
        self.ignore_marker = marker;
        self
    }

    /// Ingest every file under `root`. Only listing the root can fail; per-file
    /// problems become failing entries.
    pub fn ingest(
        &self,
        fs: &dyn FileSystem,
        root: &str,
        ledger: &mut Ledger,
    ) -> LoadResult<IngestStats> {
        let mut stats = IngestStats::default();

        for path in fs.list(root)? {
            stats.files_seen += 1;
            let Some(classified) = self.classifier.classify(&path) else {
                tracing::debug!("Skipping unclassified file: {}", path);
                stats.files_unclassified += 1;
                continue;
            };
            let unit = SourceUnit {
                path,
                ordinal: 1,
                line: 1,
                column: 1,
                suffix: classified.suffix,
                class: classified.class,
                code: String::new(),
            };

            let bytes = match fs.read(root, &unit.path) {
                Ok(bytes) => bytes,
                Err(err) => {
                    self.seed_failure(unit, &err, ledger, &mut stats);
                    continue;
                }
            };

            if self.is_ignored(&bytes) {
                tracing::debug!("Ignoring marked file: {}", unit.path);
                stats.files_ignored += 1;
                continue;
            }

            let text = match String::from_utf8(bytes) {
                Ok(text) => text,
                Err(e) => {
                    let err = LoaderError::parse(1, 1, format!("file is not valid UTF-8: {}", e));
                    self.seed_failure(unit, &err, ledger, &mut stats);
                    continue;
                }
            };

            self.ingest_text(unit, text, ledger, &mut stats);
        }

        tracing::info!(
            "Ingested {} units from {} files ({} ignored, {} unclassified)",
            stats.units,
            stats.files_loaded,
            stats.files_ignored,
            stats.files_unclassified
        );
        Ok(stats)
    }

    /// The marker is matched on raw bytes, so undecodable files can be ignored too.
    fn is_ignored(&self, bytes: &[u8]) -> bool {
        let marker = self.ignore_marker.as_bytes();
        !marker.is_empty() && bytes.windows(marker.len()).any(|w| w == marker)
    }

    fn ingest_text(
        &self,
        template: SourceUnit,
        text: String,
        ledger: &mut Ledger,
        stats: &mut IngestStats,
    ) {
        if !template.class.is_sql() {
            stats.files_loaded += 1;
            stats.units += 1;
            ledger.push(SourceUnit {
                code: text,
                ..template
            });
            return;
        }

        match self.splitter.split(&text) {
            Ok(statements) => {
                stats.files_loaded += 1;
                stats.units += statements.len();
                for (i, stmt) in statements.into_iter().enumerate() {
                    ledger.push(SourceUnit {
                        ordinal: i + 1,
                        line: stmt.line,
                        column: stmt.column,
                        code: stmt.text,
                        ..template.clone()
                    });
                }
            }
            Err(err) => {
                let (line, column) = match &err {
                    LoaderError::Parse { line, column, .. } => (*line, *column),
                    _ => (1, 1),
                };
                tracing::warn!("{}: {}", template.path, err);
                let unit = SourceUnit {
                    line,
                    column,
                    code: text,
                    ..template
                };
                self.seed_failure(unit, &err, ledger, stats);
            }
        }
    }

    fn seed_failure(
        &self,
        unit: SourceUnit,
        err: &LoaderError,
        ledger: &mut Ledger,
        stats: &mut IngestStats,
    ) {
        stats.files_failed += 1;
        stats.units += 1;
        ledger.push_failed(unit, err);
    }
}
