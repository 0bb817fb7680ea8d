//! Buffered two-view document access.

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::errors::{ReporterError, StoreError};
use crate::model::{RunDocument, fields};
use crate::store::{DocumentStore, RUN_STORE, STATE_STORE, doc_rev};

/// Which views a buffered write targets.
///
/// Setting both restrictions at once is a usage error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ViewMask {
    /// Write only to the durable run view
    pub run_only: bool,
    /// Write only to the ephemeral state view
    pub state_only: bool,
}

impl ViewMask {
    pub const BOTH: ViewMask = ViewMask {
        run_only: false,
        state_only: false,
    };
    pub const RUN_ONLY: ViewMask = ViewMask {
        run_only: true,
        state_only: false,
    };
    pub const STATE_ONLY: ViewMask = ViewMask {
        run_only: false,
        state_only: true,
    };

    fn validate(self) -> Result<Self, ReporterError> {
        if self.run_only && self.state_only {
            return Err(ReporterError::ConflictingMask);
        }
        Ok(self)
    }

    fn targets_state(self) -> bool {
        !self.run_only
    }

    fn targets_run(self) -> bool {
        !self.state_only
    }
}

/// Selector for reading one specific view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    State,
    Run,
}

/// One view: the buffered document plus the store it persists to.
struct ViewDoc {
    label: &'static str,
    store: Box<dyn DocumentStore>,
    doc: Value,
}

impl ViewDoc {
    fn new(label: &'static str, store: Box<dyn DocumentStore>, doc_id: &str) -> Self {
        Self {
            label,
            store,
            doc: empty_doc(doc_id, None),
        }
    }

    /// Persist the buffer, reloading the revision and retrying once on conflict.
    fn persist(&mut self, doc_id: &str) -> Result<(), ReporterError> {
        match self.store.save(&self.doc) {
            Ok(rev) => {
                set_rev(&mut self.doc, &rev);
                Ok(())
            }
            Err(err) if err.is_conflict() => {
                warn!(view = self.label, doc = doc_id, "save conflict, reloading revision");
                let stored_rev = self
                    .store
                    .get(doc_id)?
                    .as_ref()
                    .and_then(doc_rev)
                    .map(str::to_string);
                match stored_rev {
                    Some(rev) => set_rev(&mut self.doc, &rev),
                    None => remove_rev(&mut self.doc),
                }
                let rev = self.store.save(&self.doc).map_err(|source| {
                    ReporterError::PersistFailed {
                        view: self.label,
                        source,
                    }
                })?;
                set_rev(&mut self.doc, &rev);
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Replace the buffer with the stored document, if any.
    fn reload(&mut self, doc_id: &str) -> Result<(), StoreError> {
        if let Some(stored) = self.store.get(doc_id)? {
            self.doc = stored;
        }
        Ok(())
    }
}

/// Mediates all reads and writes of the run document.
///
/// Writes are buffered in memory for both views and only become durable on
/// [`Reporter::update_db_by_doc`].
pub struct Reporter {
    doc_id: String,
    state: ViewDoc,
    run: ViewDoc,
}

impl Reporter {
    /// Create a reporter over the two stores and load any stored documents.
    pub fn new(
        doc_id: impl Into<String>,
        state_store: Box<dyn DocumentStore>,
        run_store: Box<dyn DocumentStore>,
    ) -> Result<Self, ReporterError> {
        let doc_id = doc_id.into();
        let mut reporter = Self {
            state: ViewDoc::new(STATE_STORE, state_store, &doc_id),
            run: ViewDoc::new(RUN_STORE, run_store, &doc_id),
            doc_id,
        };
        reporter.update_doc_by_db()?;
        Ok(reporter)
    }

    pub fn doc_id(&self) -> &str {
        &self.doc_id
    }

    /// Join key parts into one addressable path.
    pub fn generate_key<S: AsRef<str>>(parts: &[S]) -> String {
        parts
            .iter()
            .map(AsRef::as_ref)
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Buffer a write into one or both views.
    pub fn set_doc_value(
        &mut self,
        key: &str,
        value: Value,
        mask: ViewMask,
    ) -> Result<(), ReporterError> {
        let mask = mask.validate()?;
        if mask.targets_state() && mask.targets_run() {
            set_path(&mut self.state.doc, key, value.clone())?;
            set_path(&mut self.run.doc, key, value)?;
        } else if mask.targets_state() {
            set_path(&mut self.state.doc, key, value)?;
        } else {
            set_path(&mut self.run.doc, key, value)?;
        }
        Ok(())
    }

    /// Read the buffered value at `key` from the state view.
    pub fn get_field(&self, key: &str) -> Option<Value> {
        get_path(&self.state.doc, key).cloned()
    }

    /// Read the buffered value at `key` from a specific view.
    pub fn get_field_in(&self, view: View, key: &str) -> Option<Value> {
        get_path(self.view(view), key).cloned()
    }

    /// Persist both buffered views.
    pub fn update_db_by_doc(&mut self) -> Result<(), ReporterError> {
        self.state.persist(&self.doc_id)?;
        self.run.persist(&self.doc_id)?;
        debug!(doc = %self.doc_id, "run document persisted");
        Ok(())
    }

    /// Reload both buffered views from their stores.
    pub fn update_doc_by_db(&mut self) -> Result<(), ReporterError> {
        self.state.reload(&self.doc_id)?;
        self.run.reload(&self.doc_id)?;
        Ok(())
    }

    /// Drop all buffered content, keeping only id and revision.
    pub fn clear(&mut self) {
        for view in [&mut self.state, &mut self.run] {
            let rev = doc_rev(&view.doc).map(str::to_string);
            view.doc = empty_doc(&self.doc_id, rev.as_deref());
        }
    }

    /// Raw buffered document of a view.
    pub fn view(&self, view: View) -> &Value {
        match view {
            View::State => &self.state.doc,
            View::Run => &self.run.doc,
        }
    }

    /// Typed snapshot of a view.
    pub fn document(&self, view: View) -> Result<RunDocument, ReporterError> {
        serde_json::from_value(self.view(view).clone()).map_err(ReporterError::Schema)
    }
}

fn empty_doc(doc_id: &str, rev: Option<&str>) -> Value {
    let mut obj = Map::new();
    obj.insert(fields::ID.to_string(), Value::String(doc_id.to_string()));
    if let Some(rev) = rev {
        obj.insert(fields::REV.to_string(), Value::String(rev.to_string()));
    }
    Value::Object(obj)
}

fn set_rev(doc: &mut Value, rev: &str) {
    if let Some(obj) = doc.as_object_mut() {
        obj.insert(fields::REV.to_string(), Value::String(rev.to_string()));
    }
}

fn remove_rev(doc: &mut Value) {
    if let Some(obj) = doc.as_object_mut() {
        obj.remove(fields::REV);
    }
}

/// Set `value` at a dot-separated path, creating intermediate objects.
/// `null` intermediates are replaced by objects; other scalars are an error.
fn set_path(doc: &mut Value, key: &str, value: Value) -> Result<(), ReporterError> {
    let mut segments = key.split('.').peekable();
    let mut current = doc;
    while let Some(segment) = segments.next() {
        if current.is_null() {
            *current = Value::Object(Map::new());
        }
        let obj = current
            .as_object_mut()
            .ok_or_else(|| ReporterError::NotAnObject {
                key: key.to_string(),
                segment: segment.to_string(),
            })?;
        if segments.peek().is_none() {
            obj.insert(segment.to_string(), value);
            return Ok(());
        }
        current = obj
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    Ok(())
}

fn get_path<'a>(doc: &'a Value, key: &str) -> Option<&'a Value> {
    key.split('.').try_fold(doc, |current, segment| current.get(segment))
}
