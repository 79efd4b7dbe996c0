//! Result reporting.
//!
//! Successful entries come first in execution order, followed by the entries
//! that never succeeded in ledger order.

use colored::*;
use serde::Serialize;

use crate::error::LoadResult;
use crate::ledger::Ledger;

/// One line of the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportRow {
    pub execution_position: Option<u64>,
    pub file: String,
    pub statement_text: String,
    pub error: Option<String>,
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Report {
    pub rows: Vec<ReportRow>,
}

impl Report {
    pub fn from_ledger(ledger: &Ledger) -> Self {
        let row = |e: &crate::ledger::LedgerEntry| ReportRow {
            execution_position: e.execution_number,
            file: e.unit.path.clone(),
            statement_text: e.statement_text().to_string(),
            error: e.error.clone(),
            line: e.unit.line,
            column: e.unit.column,
        };

        let mut executed: Vec<_> = ledger.entries().iter().filter(|e| e.executed).collect();
        executed.sort_by_key(|e| e.execution_number);

        let rows = executed
            .into_iter()
            .chain(ledger.entries().iter().filter(|e| !e.executed))
            .map(row)
            .collect();
        Self { rows }
    }

    pub fn succeeded(&self) -> impl Iterator<Item = &ReportRow> {
        self.rows.iter().filter(|r| r.execution_position.is_some())
    }

    pub fn failed(&self) -> impl Iterator<Item = &ReportRow> {
        self.rows.iter().filter(|r| r.execution_position.is_none())
    }

    pub fn has_failures(&self) -> bool {
        self.failed().next().is_some()
    }

    pub fn to_json(&self) -> LoadResult<String> {
        Ok(serde_json::to_string_pretty(&self.rows)?)
    }

    /// Render as a terminal table. Statement text is collapsed to one line and
    /// clipped to `width` characters.
    pub fn render_table(&self, width: usize) -> String {
        let mut out = String::new();
        let header = format!("{:>5} │ {:<40} │ {}", "#", "location", "statement");
        out.push_str(&format!("{}\n", header.white().bold()));
        out.push_str(&format!(
            "{}\n",
            format!("{}─┼─{}─┼─{}", "─".repeat(5), "─".repeat(40), "─".repeat(width)).dimmed()
        ));

        for row in &self.rows {
            let location = format!("{}:{}:{}", row.file, row.line, row.column);
            let text = clip(&row.statement_text, width);
            match row.execution_position {
                Some(n) => out.push_str(&format!(
                    "{:>5} │ {:<40} │ {}\n",
                    n.to_string().green(),
                    location,
                    text
                )),
                None => {
                    out.push_str(&format!(
                        "{:>5} │ {:<40} │ {}\n",
                        "✗".red().bold(),
                        location,
                        text
                    ));
                    if let Some(error) = &row.error {
                        for line in error.lines() {
                            out.push_str(&format!("{:>5} │ {:<40} │ {}\n", "", "", line.red()));
                        }
                    }
                }
            }
        }

        let ok = self.succeeded().count();
        let failed = self.failed().count();
        out.push('\n');
        out.push_str(&format!(
            "{} executed, {} failed\n",
            ok.to_string().cyan(),
            if failed > 0 {
                failed.to_string().red().bold()
            } else {
                failed.to_string().normal()
            }
        ));
        out
    }
}

fn clip(text: &str, width: usize) -> String {
    let flat: String = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= width {
        flat
    } else {
        let mut clipped: String = flat.chars().take(width.saturating_sub(1)).collect();
        clipped.push('…');
        clipped
    }
}
