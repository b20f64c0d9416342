//! Versioned document store: the seam the edit pipeline persists through.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::Connection;

use super::repository;
use super::sqlite::{open_database, open_memory_database};
use super::DatabaseError;
use crate::models::{NewVersion, VersionRecord};

/// Append-only version log keyed by conversation id.
///
/// Implementations must make "compute next number and append" atomic per
/// conversation and must never renumber or mutate a returned record.
pub trait VersionStore: Send + Sync {
    fn get_latest(&self, conversation_id: &str) -> Result<Option<VersionRecord>, DatabaseError>;

    fn append_version(
        &self,
        conversation_id: &str,
        new: NewVersion,
    ) -> Result<VersionRecord, DatabaseError>;

    fn list_versions(&self, conversation_id: &str) -> Result<Vec<VersionRecord>, DatabaseError>;

    fn get_version(
        &self,
        conversation_id: &str,
        version: i64,
    ) -> Result<Option<VersionRecord>, DatabaseError>;

    fn list_by_inci(&self, inci_name: &str) -> Result<Vec<VersionRecord>, DatabaseError>;

    fn list_by_batch(&self, batch_id: &str) -> Result<Vec<VersionRecord>, DatabaseError>;
}

/// SQLite-backed store. One connection behind a mutex serializes writers
/// inside the process; the IMMEDIATE transaction covers other processes.
pub struct SqliteVersionStore {
    conn: Mutex<Connection>,
}

impl SqliteVersionStore {
    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        let conn = open_database(path)?;
        tracing::info!(path = %path.display(), "Version store opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn in_memory() -> Result<Self, DatabaseError> {
        Ok(Self {
            conn: Mutex::new(open_memory_database()?),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, DatabaseError> {
        self.conn.lock().map_err(|_| DatabaseError::LockPoisoned)
    }
}

impl VersionStore for SqliteVersionStore {
    fn get_latest(&self, conversation_id: &str) -> Result<Option<VersionRecord>, DatabaseError> {
        repository::get_latest_version(&*self.conn()?, conversation_id)
    }

    fn append_version(
        &self,
        conversation_id: &str,
        new: NewVersion,
    ) -> Result<VersionRecord, DatabaseError> {
        let record = repository::insert_next_version(&*self.conn()?, conversation_id, &new)?;
        tracing::debug!(
            conversation_id,
            version = record.version,
            summary = %record.modification_summary,
            "Version appended"
        );
        Ok(record)
    }

    fn list_versions(&self, conversation_id: &str) -> Result<Vec<VersionRecord>, DatabaseError> {
        repository::list_versions(&*self.conn()?, conversation_id)
    }

    fn get_version(
        &self,
        conversation_id: &str,
        version: i64,
    ) -> Result<Option<VersionRecord>, DatabaseError> {
        repository::get_version(&*self.conn()?, conversation_id, version)
    }

    fn list_by_inci(&self, inci_name: &str) -> Result<Vec<VersionRecord>, DatabaseError> {
        repository::list_versions_by_inci(&*self.conn()?, inci_name)
    }

    fn list_by_batch(&self, batch_id: &str) -> Result<Vec<VersionRecord>, DatabaseError> {
        repository::list_versions_by_batch(&*self.conn()?, batch_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn concurrent_appends_never_share_a_number() {
        let store = Arc::new(SqliteVersionStore::in_memory().unwrap());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || {
                    (0..5)
                        .map(|_| {
                            store
                                .append_version("shared", NewVersion::new(json!({}), "edit"))
                                .unwrap()
                                .version
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut numbers: Vec<i64> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        numbers.sort_unstable();
        assert_eq!(numbers, (1..=40).collect::<Vec<_>>());
    }

    #[test]
    fn file_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("versions.db");
        {
            let store = SqliteVersionStore::open(&path).unwrap();
            store
                .append_version("c", NewVersion::new(json!({"inci": "X"}), "init"))
                .unwrap();
        }
        let store = SqliteVersionStore::open(&path).unwrap();
        let latest = store.get_latest("c").unwrap().unwrap();
        assert_eq!(latest.data["inci"], "X");
        let next = store
            .append_version("c", NewVersion::new(json!({}), "edit"))
            .unwrap();
        assert_eq!(next.version, 2);
    }

    #[test]
    fn every_lookup_goes_through_the_shared_connection() {
        let store: Box<dyn VersionStore> = Box::new(SqliteVersionStore::in_memory().unwrap());
        store
            .append_version(
                "c",
                NewVersion::new(json!({"inci": "GLYCERIN"}), "init")
                    .with_inci(Some("GLYCERIN"))
                    .with_batch(Some("b1")),
            )
            .unwrap();
        store
            .append_version("c", NewVersion::new(json!({"inci": "GLYCERIN"}), "edit"))
            .unwrap();

        assert_eq!(store.get_latest("c").unwrap().unwrap().version, 2);
        assert_eq!(store.list_versions("c").unwrap().len(), 2);
        assert_eq!(store.get_version("c", 1).unwrap().unwrap().modification_summary, "init");
        assert!(store.get_version("c", 3).unwrap().is_none());
        assert_eq!(store.list_by_batch("b1").unwrap().len(), 1);
        assert_eq!(store.list_by_inci("glycerin").unwrap().len(), 1);
    }
}
