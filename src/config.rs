//! Loader configuration (`schemaload.toml`).
//!
//! ```toml
//! database_url = "postgres://postgres@localhost/app"
//! root = "db"
//! scan_order = "priority-desc"
//! max_passes = 50
//!
//! [template]
//! open = "SQL[["
//! close = "]]"
//!
//! [[rule]]
//! suffix = ".sql"
//! language = "sql"
//! priority = 100
//! ```
//!
//! When no `[[rule]]` tables are given the built-in rules apply.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::classify::{Rule, RuleSet};
use crate::error::{LoadResult, LoaderError};
use crate::ingest::DEFAULT_IGNORE_MARKER;
use crate::scheduler::ScanOrder;
use crate::template::TemplateMarkers;

/// Name of the project-local config file.
pub const CONFIG_FILE: &str = "schemaload.toml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoaderConfig {
    pub database_url: Option<String>,
    pub root: String,
    pub scan_order: ScanOrder,
    pub ignore_marker: String,
    pub max_passes: Option<usize>,
    pub template: TemplateMarkers,
    #[serde(rename = "rule")]
    pub rules: Vec<Rule>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            root: ".".to_string(),
            scan_order: ScanOrder::default(),
            ignore_marker: DEFAULT_IGNORE_MARKER.to_string(),
            max_passes: None,
            template: TemplateMarkers::default(),
            rules: Vec::new(),
        }
    }
}

impl LoaderConfig {
    pub fn from_toml(text: &str) -> LoadResult<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> LoadResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            LoaderError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&text)
    }

    /// Load from `explicit` if given, otherwise the first existing candidate
    /// of [`config_candidates`], otherwise defaults.
    pub fn load(explicit: Option<&Path>) -> LoadResult<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        match config_candidates().into_iter().find(|p| p.is_file()) {
            Some(path) => {
                tracing::debug!("Using config {}", path.display());
                Self::from_file(&path)
            }
            None => Ok(Self::default()),
        }
    }

    /// The classification rules in effect.
    pub fn rule_set(&self) -> LoadResult<RuleSet> {
        if self.rules.is_empty() {
            Ok(RuleSet::default())
        } else {
            RuleSet::new(self.rules.clone())
        }
    }

    fn validate(&self) -> LoadResult<()> {
        if self.template.open.is_empty() || self.template.close.is_empty() {
            return Err(LoaderError::Config(
                "template delimiters must not be empty".to_string(),
            ));
        }
        if self.max_passes == Some(0) {
            return Err(LoaderError::Config(
                "max_passes must be at least 1".to_string(),
            ));
        }
        self.rule_set().map(|_| ())
    }
}

/// Implicit config locations, most specific first.
pub fn config_candidates() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(CONFIG_FILE)];
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join("schemaload").join("config.toml"));
    }
    paths
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::Classifier;

    #[test]
    fn test_empty_config_is_default() {
        let config = LoaderConfig::from_toml("").unwrap();
        assert_eq!(config, LoaderConfig::default());
        assert_eq!(config.rule_set().unwrap(), RuleSet::default());
    }

    #[test]
    fn test_full_config() {
        let config = LoaderConfig::from_toml(
            r#"
            database_url = "postgres://localhost/app"
            root = "db"
            scan_order = "path"
            ignore_marker = "@skip"
            max_passes = 3

            [template]
            open = "{{"
            close = "}}"

            [[rule]]
            suffix = ".sql"
            language = "sql"

            [[rule]]
            stem = "Policyfile"
            processor = "policy.apply"
            processor_extension = "policy"
            priority = 50
            "#,
        )
        .unwrap();

        assert_eq!(config.root, "db");
        assert_eq!(config.scan_order, ScanOrder::Path);
        assert_eq!(config.max_passes, Some(3));
        assert_eq!(config.template.open, "{{");

        let rules = config.rule_set().unwrap();
        assert_eq!(rules.rules().len(), 2);
        let policy = rules.classify("Policyfile").unwrap();
        assert_eq!(policy.class.priority, 50);
        assert_eq!(policy.class.processor_extension.as_deref(), Some("policy"));
    }

    #[test]
    fn test_invalid_configs() {
        assert!(matches!(
            LoaderConfig::from_toml("max_passes = 0"),
            Err(LoaderError::Config(_))
        ));
        assert!(matches!(
            LoaderConfig::from_toml("[template]\nopen = \"\"\nclose = \"]]\""),
            Err(LoaderError::Config(_))
        ));
        assert!(matches!(
            LoaderConfig::from_toml("[[rule]]\nsuffix = \".txt\""),
            Err(LoaderError::Config(_))
        ));
        assert!(matches!(
            LoaderConfig::from_toml("unknown_key = 1"),
            Err(LoaderError::Toml(_))
        ));
    }

    #[test]
    fn test_explicit_path_must_exist() {
        assert!(LoaderConfig::load(Some(Path::new("/no/such/schemaload.toml"))).is_err());
    }
}
