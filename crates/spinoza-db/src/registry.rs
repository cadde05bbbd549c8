//! Registry of open database instances.
//!
//! One process-wide (or per-component, it is plain dependency injection)
//! map from database file path to its open [`Database`]. Re-opening a path
//! that is already open does not touch the engine: the credentials are
//! checked against the live instance's key material and the shared handle
//! is returned.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::debug;

use crate::db::Database;
use crate::error::DbResult;

/// Keeps at most one open [`Database`] per file path.
#[derive(Default)]
pub struct DatabaseRegistry {
    open: Mutex<HashMap<PathBuf, Database>>,
}

impl DatabaseRegistry {
    pub fn new() -> DatabaseRegistry {
        DatabaseRegistry::default()
    }

    /// Open `path`, or return the already-open instance after verifying
    /// `login`/`password` against it. Wrong credentials fail with
    /// [`crate::DbError::Credentials`] either way.
    pub fn open(&self, login: &str, password: &str, path: &Path) -> DbResult<Database> {
        let mut open = self.open.lock();
        if let Some(db) = open.get(path) {
            if !db.is_closed() {
                db.verify_credentials(login, password)?;
                debug!(path = %path.display(), "reusing open database");
                return Ok(db.clone());
            }
            open.remove(path);
        }
        let db = Database::open(login, password, path)?;
        open.insert(path.to_path_buf(), db.clone());
        Ok(db)
    }

    /// Close and drop the instance registered under `path`, if any.
    pub fn close(&self, path: &Path) -> DbResult<()> {
        let db = self.open.lock().remove(path);
        match db {
            Some(db) => db.close(),
            None => Ok(()),
        }
    }

    /// Close every registered instance; the first error is returned, the
    /// remaining instances are still closed.
    pub fn close_all(&self) -> DbResult<()> {
        let dbs: Vec<Database> = self.open.lock().drain().map(|(_, db)| db).collect();
        let mut first_err = None;
        for db in dbs {
            if let Err(e) = db.close() {
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    pub fn len(&self) -> usize {
        self.open.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.open.lock().is_empty()
    }
}
