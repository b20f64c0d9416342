//! Read-side operations over the version log, plus reset.

use uuid::Uuid;

use super::diff::diff_documents;
use crate::db::{DatabaseError, VersionStore};
use crate::models::{blank_template, document_inci, NewVersion, PatchOperation, VersionRecord};

/// All versions of a conversation, oldest first. Unknown id gives an empty list.
pub fn get_history(
    store: &dyn VersionStore,
    conversation_id: &str,
) -> Result<Vec<VersionRecord>, DatabaseError> {
    store.list_versions(conversation_id)
}

pub fn get_version(
    store: &dyn VersionStore,
    conversation_id: &str,
    version: i64,
) -> Result<VersionRecord, DatabaseError> {
    store
        .get_version(conversation_id, version)?
        .ok_or_else(|| not_found(conversation_id, Some(version)))
}

pub fn get_current(
    store: &dyn VersionStore,
    conversation_id: &str,
) -> Result<VersionRecord, DatabaseError> {
    store
        .get_latest(conversation_id)?
        .ok_or_else(|| not_found(conversation_id, None))
}

/// Changes turning version `from` into version `to`.
pub fn diff_versions(
    store: &dyn VersionStore,
    conversation_id: &str,
    from: i64,
    to: i64,
) -> Result<Vec<PatchOperation>, DatabaseError> {
    let a = get_version(store, conversation_id, from)?;
    let b = get_version(store, conversation_id, to)?;
    Ok(diff_documents(&a.data, &b.data))
}

/// Write a new version holding the blank template, or a copy of
/// `to_version`. Without a conversation id a new conversation is started.
pub fn reset(
    store: &dyn VersionStore,
    conversation_id: Option<&str>,
    to_version: Option<i64>,
) -> Result<VersionRecord, DatabaseError> {
    let conversation_id = conversation_id
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let (data, summary) = match to_version {
        Some(n) => {
            let source = get_version(store, &conversation_id, n)?;
            (source.data, format!("reset to version {n}"))
        }
        None => (blank_template(), "reset to template".to_string()),
    };

    let inci = document_inci(&data).map(str::to_string);
    let record = store.append_version(
        &conversation_id,
        NewVersion::new(data, summary).with_inci(inci.as_deref()),
    )?;
    tracing::info!(
        conversation_id = %record.conversation_id,
        version = record.version,
        summary = %record.modification_summary,
        "Conversation reset"
    );
    Ok(record)
}

/// Versions written by one batch run. When nothing carries that batch id the
/// id is tried as a conversation id.
pub fn versions_by_batch(
    store: &dyn VersionStore,
    batch_id: &str,
) -> Result<Vec<VersionRecord>, DatabaseError> {
    let records = store.list_by_batch(batch_id)?;
    if !records.is_empty() {
        return Ok(records);
    }
    store.list_versions(batch_id)
}

/// Every version ever written for an ingredient, across conversations.
pub fn versions_by_inci(
    store: &dyn VersionStore,
    inci_name: &str,
) -> Result<Vec<VersionRecord>, DatabaseError> {
    store.list_by_inci(inci_name)
}

fn not_found(conversation_id: &str, version: Option<i64>) -> DatabaseError {
    let id = match version {
        Some(v) => format!("{conversation_id}@{v}"),
        None => conversation_id.to_string(),
    };
    DatabaseError::NotFound {
        entity_type: "Version".into(),
        id,
    }
}
