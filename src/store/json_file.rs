use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use serde_json::Value;

use super::{DocumentStore, check_revision, doc_id, doc_rev, next_revision, with_revision};
use crate::errors::StoreError;

/// File-backed document store.
///
/// Layout: `<root>/<name>/<doc id>.json`. Saves hold an exclusive lock on
/// `<root>/<name>/.lock` while comparing and replacing the file, so separate
/// processes sharing the directory get proper conflicts.
pub struct JsonFileStore {
    name: String,
    dir: PathBuf,
}

impl JsonFileStore {
    /// Open (or create) the store directory.
    pub fn open(root: &Path, name: impl Into<String>) -> Result<Self, StoreError> {
        let name = name.into();
        let dir = root.join(&name);
        fs::create_dir_all(&dir).map_err(|source| StoreError::Io {
            path: dir.clone(),
            source,
        })?;
        Ok(Self { name, dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn doc_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }

    fn lock(&self) -> Result<File, StoreError> {
        let path = self.dir.join(".lock");
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|source| StoreError::Io {
                path: path.clone(),
                source,
            })?;
        file.lock_exclusive()
            .map_err(|source| StoreError::Io { path, source })?;
        Ok(file)
    }

    fn read(&self, id: &str) -> Result<Option<Value>, StoreError> {
        let path = self.doc_path(id);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path).map_err(|source| StoreError::Io {
            path: path.clone(),
            source,
        })?;
        let doc = serde_json::from_str(&content).map_err(|source| StoreError::Serde {
            id: id.to_string(),
            source,
        })?;
        Ok(Some(doc))
    }
}

impl DocumentStore for JsonFileStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, id: &str) -> Result<Option<Value>, StoreError> {
        self.read(id)
    }

    fn save(&self, doc: &Value) -> Result<String, StoreError> {
        if !doc.is_object() {
            return Err(StoreError::NotAnObject(self.name.clone()));
        }
        let id = doc_id(doc)?.to_string();
        let lock = self.lock()?;

        let stored = self.read(&id)?;
        let given = doc_rev(doc);
        check_revision(&id, stored.as_ref(), given)?;
        let rev = next_revision(given, doc)?;
        let body = with_revision(doc, &rev)?;

        let json = serde_json::to_string_pretty(&body).map_err(|source| StoreError::Serde {
            id: id.clone(),
            source,
        })?;
        let path = self.doc_path(&id);
        let tmp = self.dir.join(format!(".{}.json.tmp", id));
        fs::write(&tmp, json).map_err(|source| StoreError::Io {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, &path).map_err(|source| StoreError::Io {
            path: path.clone(),
            source,
        })?;

        drop(lock);
        Ok(rev)
    }

    fn delete(&self, id: &str) -> Result<(), StoreError> {
        let path = self.doc_path(id);
        let _lock = self.lock()?;
        if path.exists() {
            fs::remove_file(&path).map_err(|source| StoreError::Io { path, source })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn test_save_creates_file_with_revision() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::open(dir.path(), "runstore").unwrap();
        let rev = store.save(&json!({"_id": "current", "name": "a"})).unwrap();

        let path = dir.path().join("runstore/current.json");
        assert!(path.exists());
        let on_disk: Value = serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(on_disk["_rev"], rev);
        assert_eq!(on_disk["name"], "a");
    }

    #[test]
    fn test_two_handles_conflict() {
        let dir = tempdir().unwrap();
        let a = JsonFileStore::open(dir.path(), "statestore").unwrap();
        let b = JsonFileStore::open(dir.path(), "statestore").unwrap();

        let rev = a.save(&json!({"_id": "current", "n": 1})).unwrap();
        b.save(&json!({"_id": "current", "_rev": &rev, "n": 2})).unwrap();

        let err = a
            .save(&json!({"_id": "current", "_rev": &rev, "n": 3}))
            .unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(a.get("current").unwrap().unwrap()["n"], 2);
    }

    #[test]
    fn test_reopen_reads_existing() {
        let dir = tempdir().unwrap();
        {
            let store = JsonFileStore::open(dir.path(), "runstore").unwrap();
            store.save(&json!({"_id": "current", "status": "passed"})).unwrap();
        }
        let store = JsonFileStore::open(dir.path(), "runstore").unwrap();
        assert_eq!(store.get("current").unwrap().unwrap()["status"], "passed");
    }

    #[test]
    fn test_delete_is_idempotent() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::open(dir.path(), "runstore").unwrap();
        store.save(&json!({"_id": "current"})).unwrap();
        store.delete("current").unwrap();
        store.delete("current").unwrap();
        assert!(store.get("current").unwrap().is_none());
    }
}
