//! Document store contract and engines.
//!
//! A store persists JSON documents keyed by `_id` with revision-based
//! optimistic concurrency: a save must carry the revision it was based on and
//! is rejected with [`StoreError::Conflict`] when another writer got there
//! first.
//!
//! Two engines are provided:
//! - [`MemoryStore`]: process-local, clones share data (tests, dry runs)
//! - [`JsonFileStore`]: one JSON file per document, guarded by a file lock

mod json_file;
mod memory;

pub use json_file::JsonFileStore;
pub use memory::MemoryStore;

use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::errors::StoreError;
use crate::model::fields;

/// Name of the live, UI-facing view.
pub const STATE_STORE: &str = "statestore";
/// Name of the durable, report-facing view.
pub const RUN_STORE: &str = "runstore";

/// Revision-checked document persistence.
pub trait DocumentStore: Send + Sync {
    /// Store name, used in logs and on-disk layout.
    fn name(&self) -> &str;

    /// Fetch a document by id.
    fn get(&self, id: &str) -> Result<Option<Value>, StoreError>;

    /// Save a document, returning its new revision.
    ///
    /// The document's `_rev` must match the stored revision (or be absent
    /// when nothing is stored), otherwise `StoreError::Conflict` is returned.
    fn save(&self, doc: &Value) -> Result<String, StoreError>;

    /// Remove a document. Missing documents are not an error.
    fn delete(&self, id: &str) -> Result<(), StoreError>;
}

/// Read `_id` from a document.
pub fn doc_id(doc: &Value) -> Result<&str, StoreError> {
    doc.get(fields::ID)
        .and_then(Value::as_str)
        .ok_or_else(|| StoreError::NotAnObject("<missing _id>".to_string()))
}

/// Read `_rev` from a document.
pub fn doc_rev(doc: &Value) -> Option<&str> {
    doc.get(fields::REV).and_then(Value::as_str)
}

/// Check the given revision against the stored one.
pub(crate) fn check_revision(
    id: &str,
    stored: Option<&Value>,
    given: Option<&str>,
) -> Result<(), StoreError> {
    let stored_rev = stored.and_then(doc_rev);
    if stored_rev == given {
        return Ok(());
    }
    Err(StoreError::Conflict {
        id: id.to_string(),
        stored: stored_rev.map(str::to_string),
        given: given.map(str::to_string),
    })
}

/// Compute the next revision: `<generation>-<content hash prefix>`.
pub(crate) fn next_revision(previous: Option<&str>, doc: &Value) -> Result<String, StoreError> {
    let generation = previous
        .and_then(|rev| rev.split('-').next())
        .and_then(|g| g.parse::<u64>().ok())
        .unwrap_or(0);

    let mut body = doc.clone();
    if let Some(obj) = body.as_object_mut() {
        obj.remove(fields::REV);
    }
    let bytes = serde_json::to_vec(&body).map_err(|source| StoreError::Serde {
        id: doc_id(doc).unwrap_or_default().to_string(),
        source,
    })?;
    let digest = Sha256::digest(&bytes);
    Ok(format!("{}-{}", generation + 1, &hex::encode(digest)[..16]))
}

/// Return a copy of `doc` carrying `rev`.
pub(crate) fn with_revision(doc: &Value, rev: &str) -> Result<Value, StoreError> {
    let mut stored = doc.clone();
    let obj = stored
        .as_object_mut()
        .ok_or_else(|| StoreError::NotAnObject(doc_id(doc).unwrap_or_default().to_string()))?;
    obj.insert(fields::REV.to_string(), Value::String(rev.to_string()));
    Ok(stored)
}
