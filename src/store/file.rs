//! File-backed store: one JSON object on disk.
//!
//! Used by the CLI and by any context that must survive a restart. Writes
//! from other processes are picked up through a file system watcher and
//! delivered to subscribers like local writes.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use anyhow::{Context, Result};
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use serde_json::Value;

use super::{apply_items, broadcast, diff_snapshots, StorageChange, Store, StoreMap};
use crate::error::StoreError;

#[derive(Default)]
struct FileState {
    /// Last contents this process read or wrote.
    snapshot: StoreMap,
    subscribers: Vec<Sender<StorageChange>>,
}

/// Store persisted as pretty JSON at a fixed path.
pub struct JsonFileStore {
    path: PathBuf,
    state: Arc<Mutex<FileState>>,
    _watcher: Option<RecommendedWatcher>,
}

impl JsonFileStore {
    /// Open the store in the user's config directory.
    pub fn open_default() -> Result<Self> {
        let dir = dirs::config_dir()
            .context("Could not find config directory")?
            .join("chatpin");
        fs::create_dir_all(&dir).context("Failed to create config directory")?;
        Self::open(dir.join("storage.json"))
    }

    /// Open (without creating) the store file at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let snapshot = read_file(&path)
            .with_context(|| format!("Failed to read storage file: {}", path.display()))?;
        Ok(Self {
            path,
            state: Arc::new(Mutex::new(FileState {
                snapshot,
                subscribers: Vec::new(),
            })),
            _watcher: None,
        })
    }

    /// Also notify subscribers about writes made by other processes.
    pub fn watch_external_changes(mut self) -> Result<Self> {
        let dir = self
            .path
            .parent()
            .context("Storage file has no parent directory")?
            .to_path_buf();
        let path = self.path.clone();
        let state = Arc::clone(&self.state);

        let mut watcher = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| {
                if let Ok(event) = res {
                    if (event.kind.is_modify() || event.kind.is_create())
                        && event.paths.iter().any(|p| p == &path)
                    {
                        reload_and_broadcast(&path, &state);
                    }
                }
            },
            Config::default().with_poll_interval(Duration::from_millis(500)),
        )?;
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        self._watcher = Some(watcher);
        Ok(self)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, FileState> {
        lock_state(&self.state)
    }
}

fn lock_state(state: &Mutex<FileState>) -> MutexGuard<'_, FileState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

fn read_file(path: &Path) -> Result<StoreMap, StoreError> {
    if !path.exists() {
        return Ok(StoreMap::new());
    }
    let content = fs::read_to_string(path)?;
    if content.trim().is_empty() {
        return Ok(StoreMap::new());
    }
    match serde_json::from_str::<Value>(&content)? {
        Value::Object(map) => Ok(map),
        _ => Err(StoreError::Unavailable(format!(
            "{} does not contain a JSON object",
            path.display()
        ))),
    }
}

fn reload_and_broadcast(path: &Path, state: &Mutex<FileState>) {
    let fresh = match read_file(path) {
        Ok(fresh) => fresh,
        Err(e) => {
            tracing::debug!("Ignoring unreadable storage update: {}", e);
            return;
        }
    };
    let mut state = lock_state(state);
    let changes = diff_snapshots(&state.snapshot, &fresh);
    state.snapshot = fresh;
    broadcast(&mut state.subscribers, changes);
}

impl Store for JsonFileStore {
    fn get(&self, keys: &[&str]) -> Result<StoreMap, StoreError> {
        let data = read_file(&self.path)?;
        Ok(keys
            .iter()
            .filter_map(|key| data.get(*key).map(|v| ((*key).to_string(), v.clone())))
            .collect())
    }

    fn set(&self, items: StoreMap) -> Result<(), StoreError> {
        let mut data = read_file(&self.path)?;
        let changes = apply_items(&mut data, items);

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(&Value::Object(data.clone()))?;
        fs::write(&self.path, content)?;

        let mut state = self.lock();
        state.snapshot = data;
        broadcast(&mut state.subscribers, changes);
        Ok(())
    }

    fn subscribe(&self) -> Receiver<StorageChange> {
        let (tx, rx) = mpsc::channel();
        self.lock().subscribers.push(tx);
        rx
    }
}
