//! Source units and their classification.
//!
//! A [`SourceUnit`] is one executable granule drawn from a file: a single
//! statement of a SQL file, or a whole file written in another language.
//! Units are immutable once ingested; execution state lives in the
//! [`Ledger`](crate::ledger::Ledger).

use serde::{Deserialize, Serialize};

use crate::parser;

/// Language tag of plain SQL files.
pub const SQL_LANGUAGE: &str = "sql";

/// Classification metadata attached to a file by the
/// [`Classifier`](crate::classify::Classifier).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Classification {
    /// Language tag (`sql`, `plpython3u`, ...). `None` for tool files.
    pub language: Option<String>,
    /// PostgreSQL extension that provides the language.
    pub extension: Option<String>,
    /// Function handed the whole file (code, path, filesystem handle).
    pub file_processor: Option<String>,
    /// Extension the file processor lives in.
    pub file_processor_extension: Option<String>,
    /// Auxiliary-tool function that receives the raw text of a tool file.
    pub processor: Option<String>,
    /// Extension the auxiliary-tool function lives in.
    pub processor_extension: Option<String>,
    /// Scan priority of files with this classification.
    pub priority: i32,
}

impl Classification {
    /// Whether this classification describes plain SQL.
    pub fn is_sql(&self) -> bool {
        self.language
            .as_deref()
            .is_some_and(|l| l.eq_ignore_ascii_case(SQL_LANGUAGE))
    }

    /// A classification can only produce units when it names a language or a
    /// tool processor.
    pub fn is_executable(&self) -> bool {
        self.language.is_some() || self.processor.is_some()
    }
}

/// One executable granule of source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceUnit {
    /// Root-relative path of the file the unit came from.
    pub path: String,
    /// 1-based position of the unit within its file.
    pub ordinal: usize,
    /// 1-based line where the unit starts.
    pub line: usize,
    /// 1-based column where the unit starts.
    pub column: usize,
    /// File suffix the classification matched on (`.sql`, `.py`, ...).
    pub suffix: String,
    pub class: Classification,
    /// Raw code text.
    pub code: String,
}

/// A named function together with the extension it requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Processor<'a> {
    pub function: &'a str,
    pub extension: Option<&'a str>,
}

/// How a unit is executed. One handler per variant lives in
/// [`transform`](crate::transform).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitKind<'a> {
    /// A SQL statement that only reads.
    SqlQuery,
    /// Any other SQL statement.
    SqlCommand,
    /// A file in a procedural language.
    Language {
        language: &'a str,
        extension: Option<&'a str>,
        file_processor: Option<Processor<'a>>,
    },
    /// A file handed entirely to an auxiliary-tool function.
    Tool { processor: Processor<'a> },
}

impl SourceUnit {
    /// Determine the unit's kind, or `None` when its classification names
    /// neither a language nor a processor.
    pub fn kind(&self) -> Option<UnitKind<'_>> {
        let class = &self.class;
        match (&class.language, &class.processor) {
            (Some(_), _) if class.is_sql() => Some(if parser::is_query(&self.code) {
                UnitKind::SqlQuery
            } else {
                UnitKind::SqlCommand
            }),
            (Some(language), _) => Some(UnitKind::Language {
                language,
                extension: class.extension.as_deref(),
                file_processor: class.file_processor.as_deref().map(|function| Processor {
                    function,
                    extension: class.file_processor_extension.as_deref(),
                }),
            }),
            (None, Some(function)) => Some(UnitKind::Tool {
                processor: Processor {
                    function,
                    extension: class.processor_extension.as_deref(),
                },
            }),
            (None, None) => None,
        }
    }
}
