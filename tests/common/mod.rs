//! An in-memory stand-in for PostgreSQL.
//!
//! Understands just enough SQL to model ordering dependencies: tables,
//! functions, extensions and a per-session `search_path`.

#![allow(dead_code)]

use std::collections::{BTreeSet, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use schemaload::prelude::*;

#[derive(Debug, Default)]
pub struct FakeDb {
    /// Schema-qualified table names.
    pub tables: HashSet<String>,
    pub functions: HashSet<String>,
    pub extensions: HashSet<String>,
    /// Functions callable through `Session::call`.
    pub processors: HashSet<String>,
    /// Paths whose sessions fail to open.
    pub unreachable: HashSet<String>,
    pub opened: Vec<String>,
    pub closed: Vec<String>,
    /// Every statement sent, with the file it came from.
    pub statements: Vec<(String, String)>,
    pub calls: Vec<(String, Vec<String>)>,
}

#[derive(Clone, Default)]
pub struct FakeTarget {
    db: Arc<Mutex<FakeDb>>,
}

impl FakeTarget {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_extension(self, name: &str) -> Self {
        self.db().extensions.insert(name.to_string());
        self
    }

    pub fn with_processor(self, name: &str) -> Self {
        self.db().processors.insert(name.to_string());
        self
    }

    pub fn unreachable_for(self, path: &str) -> Self {
        self.db().unreachable.insert(path.to_string());
        self
    }

    pub fn db(&self) -> MutexGuard<'_, FakeDb> {
        self.db.lock().unwrap()
    }
}

#[async_trait]
impl Target for FakeTarget {
    type Session = FakeSession;

    async fn open(&self, path: &str) -> LoadResult<FakeSession> {
        let mut db = self.db();
        if db.unreachable.contains(path) {
            return Err(LoaderError::Connection(format!("refused for {}", path)));
        }
        db.opened.push(path.to_string());
        Ok(FakeSession {
            path: path.to_string(),
            search_path: "public".to_string(),
            db: self.db.clone(),
        })
    }
}

pub struct FakeSession {
    path: String,
    search_path: String,
    db: Arc<Mutex<FakeDb>>,
}

impl FakeSession {
    fn qualify(&self, name: &str) -> String {
        if name.contains('.') {
            name.to_string()
        } else {
            format!("{}.{}", self.search_path, name)
        }
    }
}

#[async_trait]
impl Session for FakeSession {
    async fn execute(&mut self, sql: &str) -> LoadResult<()> {
        let lower = sql.to_lowercase();
        let words: Vec<&str> = lower
            .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '.'))
            .filter(|w| !w.is_empty())
            .collect();

        self.db
            .lock()
            .unwrap()
            .statements
            .push((self.path.clone(), sql.to_string()));

        if let ["set", "search_path", "to", schema, ..] = words.as_slice() {
            self.search_path = schema.to_string();
            return Ok(());
        }

        let after = |keyword: &str| -> Vec<&str> {
            words
                .windows(2)
                .filter(|w| w[0] == keyword)
                .map(|w| w[1])
                .collect()
        };
        let created = |kind: &str| -> Option<&str> {
            words
                .windows(3)
                .find(|w| w[0] == "create" && w[1] == kind)
                .map(|w| w[2])
        };
        let ctes: BTreeSet<&str> = after("with").into_iter().collect();
        let new_table = created("table");
        let new_function = created("function");

        let mut db = self.db.lock().unwrap();

        for keyword in ["from", "join", "into", "references"] {
            for name in after(keyword) {
                if ctes.contains(name) || Some(name) == new_table {
                    continue;
                }
                if !db.tables.contains(&self.qualify(name)) {
                    return Err(LoaderError::execution(format!(
                        "relation \"{}\" does not exist",
                        name
                    )));
                }
            }
        }

        for name in words.iter().filter(|w| w.starts_with("fn_")) {
            if Some(*name) != new_function && !db.functions.contains(*name) {
                return Err(LoaderError::Execution {
                    message: format!("function {}() does not exist", name),
                    detail: Some("No function matches the given name.".to_string()),
                });
            }
        }

        if let Some(name) = new_table {
            if !db.tables.insert(self.qualify(name)) {
                return Err(LoaderError::execution(format!(
                    "relation \"{}\" already exists",
                    name
                )));
            }
        }
        if let Some(name) = new_function {
            db.functions.insert(name.to_string());
        }
        Ok(())
    }

    async fn call(&mut self, function: &str, args: &[String]) -> LoadResult<()> {
        let mut db = self.db.lock().unwrap();
        if !db.processors.contains(function) {
            return Err(LoaderError::execution(format!(
                "function {}(text) does not exist",
                function
            )));
        }
        db.calls.push((function.to_string(), args.to_vec()));
        Ok(())
    }

    async fn has_extension(&mut self, name: &str) -> LoadResult<bool> {
        Ok(self.db.lock().unwrap().extensions.contains(name))
    }

    async fn close(self) -> LoadResult<()> {
        self.db.lock().unwrap().closed.push(self.path.clone());
        Ok(())
    }
}

/// Ingest `fs` with the default configuration.
pub fn ingest(fs: &MemoryFs) -> Ledger {
    ingest_with(fs, LoaderConfig::default())
}

pub fn ingest_with(fs: &MemoryFs, config: LoaderConfig) -> Ledger {
    let (ledger, _) = Loader::new(config).unwrap().ingest(fs, "/db").unwrap();
    ledger
}

/// The entry for `path` at `ordinal`.
pub fn entry<'a>(ledger: &'a Ledger, path: &str, ordinal: usize) -> &'a LedgerEntry {
    ledger
        .entries()
        .iter()
        .find(|e| e.unit.path == path && e.unit.ordinal == ordinal)
        .unwrap()
}
