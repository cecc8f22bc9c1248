//! Persistence gateway for the action graph, backed by SQLite.
//!
//! Every read here returns *base* rows: an [`Action`](crate::model::Action)
//! read from this module has no parameters, requirements or children
//! attached. Run it through [`crate::aggregate`] before handing it out.
//! Writes are single-table and know nothing about the other tables; the
//! engine sequences them inside one transaction.
//!
//! All functions take a `&Connection`, so they work both on the store's own
//! connection and on a `Transaction` (which derefs to one).

mod rows;
mod schema;

pub use rows::*;

use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::{Connection, Transaction};
use tracing::debug;

use crate::error::Result;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug)]
pub struct ActionStore {
    conn: Connection,
    path: Option<PathBuf>,
}

impl ActionStore {
    /// Open or create the database at `path` and install the schema.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            crate::io::ensure_dir(parent)?;
        }
        let conn = Connection::open(path)?;
        let store = Self::init(conn, Some(path.to_path_buf()))?;
        debug!(path = %path.display(), "opened action store");
        Ok(store)
    }

    /// A private, throwaway database. Used by tests and dry runs.
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?, None)
    }

    fn init(conn: Connection, path: Option<PathBuf>) -> Result<Self> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(schema::SQL)?;
        Ok(Self { conn, path })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Begin a transaction. Dropping it without `commit()` rolls back.
    pub fn transaction(&mut self) -> Result<Transaction<'_>> {
        Ok(self.conn.transaction()?)
    }
}
