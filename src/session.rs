//! Execution targets and per-file sessions.
//!
//! Every source file gets its own [`Session`], opened lazily before the file's
//! first attempt and closed once when the run ends. Session-scoped state such
//! as `SET search_path` therefore never leaks between files.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use async_trait::async_trait;

use crate::error::LoadResult;

/// An isolated execution channel against the target database.
#[async_trait]
pub trait Session: Send {
    /// Execute SQL text as-is.
    async fn execute(&mut self, sql: &str) -> LoadResult<()>;

    /// Call `function` with text arguments, discarding its result.
    async fn call(&mut self, function: &str, args: &[String]) -> LoadResult<()>;

    /// Whether the named extension is installed.
    async fn has_extension(&mut self, name: &str) -> LoadResult<bool>;

    /// Release the session.
    async fn close(self) -> LoadResult<()>;
}

/// A database that hands out sessions.
#[async_trait]
pub trait Target: Send + Sync {
    type Session: Session;

    /// Open a session for the file at `path`.
    async fn open(&self, path: &str) -> LoadResult<Self::Session>;
}

/// The file connection contexts of one run.
pub struct FileSessions<'t, T: Target> {
    target: &'t T,
    sessions: BTreeMap<String, T::Session>,
}

impl<'t, T: Target> FileSessions<'t, T> {
    pub fn new(target: &'t T) -> Self {
        Self {
            target,
            sessions: BTreeMap::new(),
        }
    }

    /// The session of `path`, opening it on first use.
    pub async fn get(&mut self, path: &str) -> LoadResult<&mut T::Session> {
        let target = self.target;
        match self.sessions.entry(path.to_string()) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                tracing::debug!("Opening session for {}", path);
                let session = target.open(path).await?;
                Ok(entry.insert(session))
            }
        }
    }

    /// Number of sessions currently open.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Close every session. Failures are logged; the number closed cleanly is
    /// returned.
    pub async fn close_all(self) -> usize {
        let mut closed = 0;
        for (path, session) in self.sessions {
            match session.close().await {
                Ok(()) => closed += 1,
                Err(e) => tracing::warn!("Failed to close session for {}: {}", path, e),
            }
        }
        closed
    }
}
