use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value;

use super::{DocumentStore, check_revision, doc_id, doc_rev, next_revision, with_revision};
use crate::errors::StoreError;

/// In-memory document store.
///
/// Clones share the same documents, so one clone can play an external writer
/// racing the reporter.
#[derive(Clone, Default)]
pub struct MemoryStore {
    name: String,
    docs: Arc<Mutex<HashMap<String, Value>>>,
}

impl MemoryStore {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            docs: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn docs(&self) -> MutexGuard<'_, HashMap<String, Value>> {
        // A panic while holding the lock cannot leave a map half-updated
        self.docs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl DocumentStore for MemoryStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, id: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.docs().get(id).cloned())
    }

    fn save(&self, doc: &Value) -> Result<String, StoreError> {
        if !doc.is_object() {
            return Err(StoreError::NotAnObject(self.name.clone()));
        }
        let id = doc_id(doc)?.to_string();
        let mut docs = self.docs();
        let given = doc_rev(doc);
        check_revision(&id, docs.get(&id), given)?;
        let rev = next_revision(given, doc)?;
        docs.insert(id, with_revision(doc, &rev)?);
        Ok(rev)
    }

    fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.docs().remove(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_save_and_get() {
        let store = MemoryStore::new("statestore");
        let rev = store.save(&json!({"_id": "current", "name": "a"})).unwrap();
        let doc = store.get("current").unwrap().unwrap();
        assert_eq!(doc["name"], "a");
        assert_eq!(doc["_rev"], rev);
        assert!(store.get("other").unwrap().is_none());
    }

    #[test]
    fn test_stale_revision_conflicts() {
        let store = MemoryStore::new("runstore");
        let rev1 = store.save(&json!({"_id": "current", "n": 1})).unwrap();
        let rev2 = store
            .save(&json!({"_id": "current", "_rev": &rev1, "n": 2}))
            .unwrap();
        assert_ne!(rev1, rev2);

        let err = store
            .save(&json!({"_id": "current", "_rev": &rev1, "n": 3}))
            .unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(store.get("current").unwrap().unwrap()["n"], 2);
    }

    #[test]
    fn test_clones_share_documents() {
        let a = MemoryStore::new("statestore");
        let b = a.clone();
        a.save(&json!({"_id": "current"})).unwrap();
        assert!(b.get("current").unwrap().is_some());
        b.delete("current").unwrap();
        assert!(a.get("current").unwrap().is_none());
    }

    #[test]
    fn test_rejects_non_object() {
        let store = MemoryStore::new("statestore");
        assert!(matches!(
            store.save(&json!([1, 2])),
            Err(StoreError::NotAnObject(_))
        ));
    }
}
