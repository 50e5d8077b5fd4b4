// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Token store: the single source of truth for the [`Session`].
//!
//! Backed by a synchronous key/value area. [`FileStore`] keeps it in a JSON
//! file written atomically; [`MemoryStore`] keeps it in process.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::session::{keys, Session, TokenPair};

/// Flat string key/value storage.
///
/// Every mutation is applied as one unit: readers never observe half of a
/// batch.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    /// Apply a batch of writes atomically. `None` removes the key.
    fn apply(&self, entries: &[(&str, Option<String>)]);

    fn set(&self, key: &str, value: String) {
        self.apply(&[(key, Some(value))]);
    }

    fn remove(&self, key: &str) {
        self.apply(&[(key, None)]);
    }

    /// Remove every key.
    fn clear(&self);
}

/// In-process storage, lost on exit.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }

    fn apply(&self, entries: &[(&str, Option<String>)]) {
        let mut map = self.entries.lock();
        apply_entries(&mut map, entries);
    }

    fn clear(&self) {
        self.entries.lock().clear();
    }
}

/// JSON-file storage with atomic writes (write tmp + rename).
///
/// The in-memory map is authoritative; a failed write is logged and the
/// next successful one catches the file up.
pub struct FileStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl FileStore {
    /// Open (or lazily create) the store at `path`.
    ///
    /// A missing or unreadable file starts empty.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match load(&path) {
            Ok(map) => map,
            Err(e) => {
                debug!(path = %path.display(), "no persisted session: {e}");
                BTreeMap::new()
            }
        };
        Self { path, entries: Mutex::new(entries) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, map: &BTreeMap<String, String>) {
        if let Err(e) = save(&self.path, map) {
            warn!(path = %self.path.display(), "failed to persist session: {e:#}");
        }
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }

    fn apply(&self, entries: &[(&str, Option<String>)]) {
        let mut map = self.entries.lock();
        apply_entries(&mut map, entries);
        self.flush(&map);
    }

    fn clear(&self) {
        let mut map = self.entries.lock();
        map.clear();
        self.flush(&map);
    }
}

fn apply_entries(map: &mut BTreeMap<String, String>, entries: &[(&str, Option<String>)]) {
    for (key, value) in entries {
        match value {
            Some(v) => {
                map.insert((*key).to_owned(), v.clone());
            }
            None => {
                map.remove(*key);
            }
        }
    }
}

/// Load a persisted key/value map from a JSON file.
fn load(path: &Path) -> anyhow::Result<BTreeMap<String, String>> {
    let contents = std::fs::read_to_string(path)?;
    let map: BTreeMap<String, String> = serde_json::from_str(&contents)?;
    Ok(map)
}

/// Save the map atomically (unique tmp file + rename).
fn save(path: &Path, map: &BTreeMap<String, String>) -> anyhow::Result<()> {
    use std::sync::atomic::{AtomicU32, Ordering};
    static COUNTER: AtomicU32 = AtomicU32::new(0);

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(map)?;
    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
    let tmp_name = format!(
        "{}.{}.{}.tmp",
        path.file_name().unwrap_or_default().to_string_lossy(),
        std::process::id(),
        seq,
    );
    let tmp_path = path.with_file_name(tmp_name);
    std::fs::write(&tmp_path, json)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Typed access to the session fields of a [`KeyValueStore`].
#[derive(Clone)]
pub struct TokenStore {
    kv: Arc<dyn KeyValueStore>,
}

impl TokenStore {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self::new(Arc::new(FileStore::open(path)))
    }

    /// Write all four session fields. Absent fields are removed.
    pub fn save(&self, session: &Session) {
        self.kv.apply(&[
            (keys::ACCESS_TOKEN, session.access_token.clone()),
            (keys::REFRESH_TOKEN, session.refresh_token.clone()),
            (keys::USER_ID, session.user_id.clone()),
            (keys::USER_ROLE, session.user_role.clone()),
        ]);
    }

    /// Replace both tokens after a refresh, leaving identity untouched.
    pub fn update_tokens(&self, pair: &TokenPair) {
        self.kv.apply(&[
            (keys::ACCESS_TOKEN, Some(pair.access_token.clone())),
            (keys::REFRESH_TOKEN, Some(pair.refresh_token.clone())),
        ]);
    }

    pub fn read(&self) -> Session {
        Session {
            access_token: self.kv.get(keys::ACCESS_TOKEN),
            refresh_token: self.kv.get(keys::REFRESH_TOKEN),
            user_id: self.kv.get(keys::USER_ID),
            user_role: self.kv.get(keys::USER_ROLE),
        }
    }

    pub fn access_token(&self) -> Option<String> {
        self.kv.get(keys::ACCESS_TOKEN)
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.kv.get(keys::REFRESH_TOKEN)
    }

    /// Read a cached application value (selected plan, subscription id...).
    pub fn get(&self, key: &str) -> Option<String> {
        self.kv.get(key)
    }

    /// Write several cached application values at once.
    pub fn set_many(&self, entries: &[(&str, Option<String>)]) {
        self.kv.apply(entries);
    }

    /// Forget the session and every cached application value.
    pub fn clear(&self) {
        self.kv.clear();
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
