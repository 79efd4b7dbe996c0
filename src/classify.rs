//! File classification.
//!
//! Maps a file name to the language and processors used to execute it.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{LoadResult, LoaderError};
use crate::unit::Classification;

/// A file name matched to its classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classified {
    /// The file's suffix (`.sql`), empty when the file has no extension.
    pub suffix: String,
    pub class: Classification,
}

/// Looks up how a file should be executed.
pub trait Classifier {
    /// Classify the file at `path`, or `None` if no rule matches.
    fn classify(&self, path: &str) -> Option<Classified>;
}

/// One classification rule, keyed by file-name suffix or exact stem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suffix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stem: Option<String>,
    #[serde(flatten)]
    pub class: Classification,
}

impl Rule {
    /// A rule matching files that end in `suffix`.
    pub fn suffix(suffix: &str, class: Classification) -> Self {
        Self {
            suffix: Some(suffix.to_string()),
            stem: None,
            class,
        }
    }

    /// `*.suffix` or the stem, for display.
    pub fn key(&self) -> String {
        match (&self.stem, &self.suffix) {
            (Some(stem), _) => stem.clone(),
            (None, Some(suffix)) => format!("*{}", suffix),
            (None, None) => "<none>".to_string(),
        }
    }

    fn validate(&self) -> LoadResult<()> {
        if self.suffix.is_none() && self.stem.is_none() {
            return Err(LoaderError::Config(
                "classification rule needs a suffix or a stem".to_string(),
            ));
        }
        if !self.class.is_executable() {
            return Err(LoaderError::Config(format!(
                "rule '{}' names neither a language nor a processor",
                self.key()
            )));
        }
        for function in [&self.class.file_processor, &self.class.processor]
            .into_iter()
            .flatten()
        {
            if !is_qualified_name(function) {
                return Err(LoaderError::Config(format!(
                    "rule '{}': '{}' is not a valid function name",
                    self.key(),
                    function
                )));
            }
        }
        Ok(())
    }
}

/// A table of classification rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    /// Build a validated rule set.
    pub fn new(rules: Vec<Rule>) -> LoadResult<Self> {
        for rule in &rules {
            rule.validate()?;
        }
        Ok(Self { rules })
    }

    /// The rules, in declaration order.
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }
}

impl Default for RuleSet {
    /// SQL plus the procedural languages shipped with PostgreSQL.
    fn default() -> Self {
        let language = |name: &str, priority: i32| Classification {
            language: Some(name.to_string()),
            extension: Some(name.to_string()),
            priority,
            ..Default::default()
        };

        Self {
            rules: vec![
                Rule::suffix(
                    ".sql",
                    Classification {
                        language: Some("sql".to_string()),
                        priority: 100,
                        ..Default::default()
                    },
                ),
                Rule::suffix(".py", language("plpython3u", 10)),
                Rule::suffix(".pl", language("plperl", 10)),
                Rule::suffix(".tcl", language("pltcl", 10)),
                Rule::suffix(".js", language("plv8", 10)),
            ],
        }
    }
}

impl Classifier for RuleSet {
    /// Exact stem matches win over suffixes; among suffixes the longest wins.
    fn classify(&self, path: &str) -> Option<Classified> {
        let path = Path::new(path);
        let name = path.file_name()?.to_str()?;
        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or(name);
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{}", e))
            .unwrap_or_default();

        if let Some(rule) = self
            .rules
            .iter()
            .find(|r| r.stem.as_deref().is_some_and(|s| s == stem || s == name))
        {
            return Some(Classified {
                suffix: extension,
                class: rule.class.clone(),
            });
        }

        self.rules
            .iter()
            .filter_map(|r| r.suffix.as_deref().map(|s| (s, r)))
            .filter(|(suffix, _)| name.len() > suffix.len() && name.ends_with(suffix))
            .max_by_key(|(suffix, _)| suffix.len())
            .map(|(suffix, rule)| Classified {
                suffix: suffix.to_string(),
                class: rule.class.clone(),
            })
    }
}

/// Whether `name` is a plain or schema-qualified SQL identifier.
pub fn is_qualified_name(name: &str) -> bool {
    let part = |p: &str| {
        let mut chars = p.chars();
        chars
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
            && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
    };
    let parts: Vec<&str> = name.split('.').collect();
    parts.len() <= 2 && parts.iter().all(|p| part(p))
}
