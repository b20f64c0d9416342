use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};

use crate::db::DatabaseError;
use crate::models::{content_hash, NewVersion, PatchOperation, VersionRecord};

const SELECT_COLUMNS: &str = "SELECT id, conversation_id, version, data, modification_summary,
        patch_operations, inci_name, batch_id, is_batch_item, patch_success,
        fallback_used, content_hash, created_at
 FROM toxicity_versions";

/// Append a version as `MAX(version) + 1` (or 1) for the conversation.
///
/// Number assignment and insert share one IMMEDIATE transaction, so two
/// writers on the same conversation cannot both claim the same number.
pub fn insert_next_version(
    conn: &Connection,
    conversation_id: &str,
    new: &NewVersion,
) -> Result<VersionRecord, DatabaseError> {
    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;

    let current: Option<i64> = tx.query_row(
        "SELECT MAX(version) FROM toxicity_versions WHERE conversation_id = ?1",
        params![conversation_id],
        |row| row.get(0),
    )?;
    let version = current.unwrap_or(0) + 1;

    let data = serde_json::to_string(&new.data)?;
    let patches = new
        .patch_operations
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;
    let hash = content_hash(&new.data);
    let created_at = chrono::Utc::now().naive_utc();

    tx.execute(
        "INSERT INTO toxicity_versions (conversation_id, version, data, modification_summary,
            patch_operations, inci_name, batch_id, is_batch_item, patch_success,
            fallback_used, content_hash, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            conversation_id,
            version,
            data,
            new.modification_summary,
            patches,
            new.inci_name,
            new.batch_id,
            new.is_batch_item,
            new.patch_success,
            new.fallback_used,
            hash,
            created_at,
        ],
    )
    .map_err(|e| match e {
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            DatabaseError::ConstraintViolation(format!(
                "version {version} already exists for conversation {conversation_id}"
            ))
        }
        other => other.into(),
    })?;
    let id = tx.last_insert_rowid();
    tx.commit()?;

    Ok(VersionRecord {
        id,
        conversation_id: conversation_id.to_string(),
        version,
        data: new.data.clone(),
        modification_summary: new.modification_summary.clone(),
        patch_operations: new.patch_operations.clone(),
        inci_name: new.inci_name.clone(),
        batch_id: new.batch_id.clone(),
        is_batch_item: new.is_batch_item,
        patch_success: new.patch_success,
        fallback_used: new.fallback_used,
        content_hash: hash,
        created_at,
    })
}

pub fn get_latest_version(
    conn: &Connection,
    conversation_id: &str,
) -> Result<Option<VersionRecord>, DatabaseError> {
    let sql = format!("{SELECT_COLUMNS} WHERE conversation_id = ?1 ORDER BY version DESC LIMIT 1");
    let row = conn
        .query_row(&sql, params![conversation_id], read_row)
        .optional()?;
    row.map(version_from_row).transpose()
}

pub fn get_version(
    conn: &Connection,
    conversation_id: &str,
    version: i64,
) -> Result<Option<VersionRecord>, DatabaseError> {
    let sql = format!("{SELECT_COLUMNS} WHERE conversation_id = ?1 AND version = ?2");
    let row = conn
        .query_row(&sql, params![conversation_id, version], read_row)
        .optional()?;
    row.map(version_from_row).transpose()
}

/// All versions of a conversation, oldest first.
pub fn list_versions(
    conn: &Connection,
    conversation_id: &str,
) -> Result<Vec<VersionRecord>, DatabaseError> {
    let sql = format!("{SELECT_COLUMNS} WHERE conversation_id = ?1 ORDER BY version ASC");
    collect(conn, &sql, conversation_id)
}

/// Every version ever written for an ingredient, across conversations.
pub fn list_versions_by_inci(
    conn: &Connection,
    inci_name: &str,
) -> Result<Vec<VersionRecord>, DatabaseError> {
    let sql = format!("{SELECT_COLUMNS} WHERE inci_name = ?1 ORDER BY id ASC");
    collect(conn, &sql, &inci_name.trim().to_uppercase())
}

/// Versions written by one batch run, in write order.
pub fn list_versions_by_batch(
    conn: &Connection,
    batch_id: &str,
) -> Result<Vec<VersionRecord>, DatabaseError> {
    let sql = format!("{SELECT_COLUMNS} WHERE batch_id = ?1 ORDER BY id ASC");
    collect(conn, &sql, batch_id)
}

fn collect(conn: &Connection, sql: &str, key: &str) -> Result<Vec<VersionRecord>, DatabaseError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params![key], read_row)?;

    let mut records = Vec::new();
    for row in rows {
        records.push(version_from_row(row?)?);
    }
    Ok(records)
}

struct VersionRow {
    id: i64,
    conversation_id: String,
    version: i64,
    data: String,
    modification_summary: String,
    patch_operations: Option<String>,
    inci_name: Option<String>,
    batch_id: Option<String>,
    is_batch_item: bool,
    patch_success: bool,
    fallback_used: bool,
    content_hash: String,
    created_at: NaiveDateTime,
}

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<VersionRow> {
    Ok(VersionRow {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        version: row.get(2)?,
        data: row.get(3)?,
        modification_summary: row.get(4)?,
        patch_operations: row.get(5)?,
        inci_name: row.get(6)?,
        batch_id: row.get(7)?,
        is_batch_item: row.get(8)?,
        patch_success: row.get(9)?,
        fallback_used: row.get(10)?,
        content_hash: row.get(11)?,
        created_at: row.get(12)?,
    })
}

fn version_from_row(row: VersionRow) -> Result<VersionRecord, DatabaseError> {
    let patch_operations = row
        .patch_operations
        .as_deref()
        .map(serde_json::from_str::<Vec<PatchOperation>>)
        .transpose()?;

    Ok(VersionRecord {
        id: row.id,
        conversation_id: row.conversation_id,
        version: row.version,
        data: serde_json::from_str(&row.data)?,
        modification_summary: row.modification_summary,
        patch_operations,
        inci_name: row.inci_name,
        batch_id: row.batch_id,
        is_batch_item: row.is_batch_item,
        patch_success: row.patch_success,
        fallback_used: row.fallback_used,
        content_hash: row.content_hash,
        created_at: row.created_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::open_memory_database;
    use serde_json::json;

    fn new_version(summary: &str) -> NewVersion {
        NewVersion::new(json!({"inci": "GLYCERIN", "NOAEL": []}), summary)
    }

    #[test]
    fn first_version_is_one() {
        let conn = open_memory_database().unwrap();
        let record = insert_next_version(&conn, "conv-1", &new_version("init")).unwrap();
        assert_eq!(record.version, 1);
        assert_eq!(record.modification_summary, "init");
    }

    #[test]
    fn versions_increase_without_gaps() {
        let conn = open_memory_database().unwrap();
        for expected in 1..=4 {
            let record = insert_next_version(&conn, "conv-1", &new_version("edit")).unwrap();
            assert_eq!(record.version, expected);
        }
        let all = list_versions(&conn, "conv-1").unwrap();
        let numbers: Vec<i64> = all.iter().map(|r| r.version).collect();
        assert_eq!(numbers, vec![1, 2, 3, 4]);
        assert_eq!(get_latest_version(&conn, "conv-1").unwrap().unwrap().version, 4);
    }

    #[test]
    fn conversations_are_numbered_independently() {
        let conn = open_memory_database().unwrap();
        insert_next_version(&conn, "a", &new_version("x")).unwrap();
        insert_next_version(&conn, "a", &new_version("x")).unwrap();
        let b = insert_next_version(&conn, "b", &new_version("x")).unwrap();
        assert_eq!(b.version, 1);
    }

    #[test]
    fn unknown_conversation_has_no_latest() {
        let conn = open_memory_database().unwrap();
        assert!(get_latest_version(&conn, "missing").unwrap().is_none());
        assert!(get_version(&conn, "missing", 1).unwrap().is_none());
        assert!(list_versions(&conn, "missing").unwrap().is_empty());
    }

    #[test]
    fn stored_record_round_trips_audit_fields() {
        let conn = open_memory_database().unwrap();
        let new = new_version("add at /NOAEL/-")
            .with_patches(vec![PatchOperation::add("/NOAEL/-", json!(100))])
            .with_inci(Some("glycerin"))
            .with_batch(Some("batch-9"))
            .with_flags(true, false);
        let written = insert_next_version(&conn, "conv-1", &new).unwrap();
        let read = get_version(&conn, "conv-1", 1).unwrap().unwrap();

        assert_eq!(read.data, written.data);
        assert_eq!(read.patch_operations.unwrap().len(), 1);
        assert_eq!(read.inci_name.as_deref(), Some("GLYCERIN"));
        assert_eq!(read.batch_id.as_deref(), Some("batch-9"));
        assert!(read.is_batch_item);
        assert!(read.patch_success);
        assert!(!read.fallback_used);
        assert_eq!(read.content_hash, written.content_hash);
    }

    #[test]
    fn inci_lookup_is_case_insensitive_across_conversations() {
        let conn = open_memory_database().unwrap();
        let tagged = new_version("x").with_inci(Some("L-Menthol"));
        insert_next_version(&conn, "a", &tagged).unwrap();
        insert_next_version(&conn, "b", &tagged).unwrap();
        insert_next_version(&conn, "c", &new_version("x").with_inci(Some("GLYCERIN"))).unwrap();

        let hits = list_versions_by_inci(&conn, "l-menthol").unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].conversation_id, "a");
    }

    #[test]
    fn batch_lookup_filters_by_batch_id() {
        let conn = open_memory_database().unwrap();
        insert_next_version(&conn, "a", &new_version("x").with_batch(Some("b1"))).unwrap();
        insert_next_version(&conn, "b", &new_version("x").with_batch(Some("b1"))).unwrap();
        insert_next_version(&conn, "c", &new_version("x")).unwrap();
        assert_eq!(list_versions_by_batch(&conn, "b1").unwrap().len(), 2);
        assert!(list_versions_by_batch(&conn, "b2").unwrap().is_empty());
    }
}
