//! Registry of live document handles, owned by one session.
//!
//! Keys are structured [`DocKey`]s, so `("r1", "a/b")` and `("r1/a", "b")`
//! can never collide. Lookups return `None`, never fail.

use std::collections::HashMap;
use std::sync::Arc;

use covscode_core::DocKey;
use parking_lot::Mutex;

use crate::shared_doc::SharedDoc;

#[derive(Default)]
struct Tables {
    docs: HashMap<DocKey, Arc<SharedDoc>>,
    /// Version at which the local side last produced an edit
    last_versions: HashMap<DocKey, u64>,
}

/// Document handles and per-document local-version bookkeeping.
#[derive(Default)]
pub struct DocRegistry {
    tables: Mutex<Tables>,
}

impl DocRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &DocKey) -> Option<Arc<SharedDoc>> {
        self.tables.lock().docs.get(key).cloned()
    }

    /// Register `doc` under its own key, replacing any previous handle.
    pub fn add(&self, doc: Arc<SharedDoc>) {
        let key = doc.key().clone();
        self.tables.lock().docs.insert(key, doc);
    }

    pub fn remove(&self, key: &DocKey) -> Option<Arc<SharedDoc>> {
        let mut tables = self.tables.lock();
        tables.last_versions.remove(key);
        tables.docs.remove(key)
    }

    // ─── File documents ─────────────────────────────────────────────

    pub fn get_doc(&self, repo_id: &str, path: &str) -> Option<Arc<SharedDoc>> {
        self.get(&DocKey::file(repo_id, path))
    }

    pub fn add_doc(&self, doc: Arc<SharedDoc>) {
        self.add(doc);
    }

    pub fn remove_doc(&self, repo_id: &str, path: &str) -> Option<Arc<SharedDoc>> {
        self.remove(&DocKey::file(repo_id, path))
    }

    // ─── Presence document ──────────────────────────────────────────

    pub fn get_repo_doc(&self, repo_id: &str) -> Option<Arc<SharedDoc>> {
        self.get(&DocKey::presence(repo_id))
    }

    pub fn add_repo_doc(&self, doc: Arc<SharedDoc>) {
        self.add(doc);
    }

    // ─── Local versions ─────────────────────────────────────────────

    /// Record the handle's current version as the last local edit.
    pub fn set_last_version(&self, doc: &SharedDoc) {
        self.record_version(doc.key(), doc.version());
    }

    pub fn record_version(&self, key: &DocKey, version: u64) {
        self.tables.lock().last_versions.insert(key.clone(), version);
    }

    pub fn get_last_version(&self, key: &DocKey) -> Option<u64> {
        self.tables.lock().last_versions.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.tables.lock().docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut tables = self.tables.lock();
        tables.docs.clear();
        tables.last_versions.clear();
    }
}
