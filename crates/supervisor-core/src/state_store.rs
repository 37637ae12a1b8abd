//! Persisted playback position state.
//!
//! Provides [`PersistedState`] (the on-disk document) and [`StateStore`]
//! (the in-memory/debounced-write wrapper around it). The store survives
//! config reloads — see `reloadConfig` in the supervisor glue — and is the
//! only component allowed to write the state file.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;

use crate::protocol_constants::STATE_WRITE_DEBOUNCE_MS;

/// A subset of [`PersistedState`] fields to merge into the current document.
///
/// All fields are optional; `None` leaves the corresponding field untouched.
#[derive(Debug, Default, Clone)]
pub struct StateUpdate {
    pub playlist_index: Option<usize>,
    pub video_index: Option<usize>,
    pub video_id: Option<String>,
    pub video_title: Option<String>,
    pub next_video_id: Option<String>,
    pub current_time: Option<f64>,
    pub video_duration: Option<f64>,
}

/// On-disk document describing current playback position.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedState {
    /// Index into the configured playlist list.
    #[serde(default)]
    pub playlist_index: usize,
    /// Index of the current video within the current playlist.
    #[serde(default)]
    pub video_index: usize,
    /// Opaque ID of the current video.
    #[serde(default)]
    pub video_id: String,
    /// Human-readable title of the current video, if known.
    #[serde(default)]
    pub video_title: String,
    /// Opaque ID of the video expected to play next, if known.
    #[serde(default)]
    pub next_video_id: String,
    /// Last observed playback position (seconds).
    #[serde(default)]
    pub current_time: f64,
    /// Last observed video duration (seconds), if known.
    #[serde(default)]
    pub video_duration: f64,
    /// RFC-3339 timestamp of the last mutation.
    #[serde(default = "PersistedState::epoch")]
    pub updated_at: String,
}

impl Default for PersistedState {
    fn default() -> Self {
        Self {
            playlist_index: 0,
            video_index: 0,
            video_id: String::new(),
            video_title: String::new(),
            next_video_id: String::new(),
            current_time: 0.0,
            video_duration: 0.0,
            updated_at: Self::epoch(),
        }
    }
}

impl PersistedState {
    fn epoch() -> String {
        OffsetDateTime::UNIX_EPOCH
            .format(&Rfc3339)
            .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
    }

    fn apply(&mut self, update: &StateUpdate) {
        if let Some(v) = update.playlist_index {
            self.playlist_index = v;
        }
        if let Some(v) = update.video_index {
            self.video_index = v;
        }
        if let Some(ref v) = update.video_id {
            self.video_id = v.clone();
        }
        if let Some(ref v) = update.video_title {
            self.video_title = v.clone();
        }
        if let Some(ref v) = update.next_video_id {
            self.next_video_id = v.clone();
        }
        if let Some(v) = update.current_time {
            self.current_time = v;
        }
        if let Some(v) = update.video_duration {
            self.video_duration = v;
        }
        self.updated_at = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_else(|_| self.updated_at.clone());
    }

    fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_default(),
            Err(_) => Self::default(),
        }
    }

    fn save(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp_path = tmp_path_for(path);
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(&tmp_path, contents)?;
        std::fs::rename(&tmp_path, path)
    }
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "state.json".into());
    name.push(".tmp");
    path.with_file_name(name)
}

/// Global mutex serializing writes for a given state file path.
///
/// Mirrors the config-write discipline used elsewhere in this codebase: a
/// single process-wide lock around load-mutate-save so that a debounced
/// write task and a manual flush can never race each other onto disk.
static WRITE_LOCK: OnceLock<AsyncMutex<()>> = OnceLock::new();

fn write_lock() -> &'static AsyncMutex<()> {
    WRITE_LOCK.get_or_init(|| AsyncMutex::new(()))
}

/// Crash-safe, debounced persistence of playback position.
///
/// `Get` returns a defensive copy from the in-memory cache (reads never
/// fail). `Update` merges fields into the cache and schedules a write
/// `STATE_WRITE_DEBOUNCE_MS` in the future, coalescing with any pending
/// write. `Flush` cancels the pending timer and writes immediately.
pub struct StateStore {
    path: PathBuf,
    cache: Mutex<PersistedState>,
    pending_write: Mutex<Option<JoinHandle<()>>>,
}

impl StateStore {
    /// Opens (or initializes defaults for) the state file at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let initial = PersistedState::load(&path);
        Self {
            path,
            cache: Mutex::new(initial),
            pending_write: Mutex::new(None),
        }
    }

    /// Returns a defensive copy of the current in-memory state.
    pub fn get(&self) -> PersistedState {
        self.cache.lock().clone()
    }

    /// Merges `update` into the in-memory state and schedules a debounced
    /// write. Never fails — write errors are logged, not propagated.
    pub fn update(self: &std::sync::Arc<Self>, update: StateUpdate) {
        {
            let mut cache = self.cache.lock();
            cache.apply(&update);
        }
        self.schedule_write();
    }

    fn schedule_write(self: &std::sync::Arc<Self>) {
        let mut pending = self.pending_write.lock();
        if let Some(handle) = pending.take() {
            handle.abort();
        }
        let this = std::sync::Arc::clone(self);
        *pending = Some(tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(STATE_WRITE_DEBOUNCE_MS)).await;
            this.write_now().await;
        }));
    }

    /// Cancels any pending debounced write and writes the current state
    /// immediately. Called on shutdown and on critical transitions (e.g.
    /// advancing to a new playlist).
    pub async fn flush(&self) {
        {
            let mut pending = self.pending_write.lock();
            if let Some(handle) = pending.take() {
                handle.abort();
            }
        }
        self.write_now().await;
    }

    async fn write_now(&self) {
        let _guard = write_lock().lock().await;
        let snapshot = self.cache.lock().clone();
        let path = self.path.clone();
        let result =
            tokio::task::spawn_blocking(move || snapshot.save(&path)).await;
        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                log::warn!("[StateStore] failed to write state file: {}", e);
            }
            Err(e) => {
                log::warn!("[StateStore] state write task panicked: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::tempdir;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let store = StateStore::open(dir.path().join("state.json"));
        let state = store.get();
        assert_eq!(state.playlist_index, 0);
        assert_eq!(state.video_index, 0);
    }

    #[tokio::test]
    async fn flush_persists_and_reload_reads_it_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        let store = Arc::new(StateStore::open(&path));

        store.update(StateUpdate {
            playlist_index: Some(2),
            video_index: Some(5),
            video_id: Some("abc".into()),
            current_time: Some(42.5),
            ..Default::default()
        });
        store.flush().await;

        let reopened = StateStore::open(&path);
        let state = reopened.get();
        assert_eq!(state.playlist_index, 2);
        assert_eq!(state.video_index, 5);
        assert_eq!(state.video_id, "abc");
        assert_eq!(state.current_time, 42.5);
    }

    #[tokio::test]
    async fn legacy_file_without_playlist_index_defaults_to_zero() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, r#"{"videoIndex": 3, "videoId": "x"}"#).unwrap();

        let store = StateStore::open(&path);
        let state = store.get();
        assert_eq!(state.playlist_index, 0);
        assert_eq!(state.video_index, 3);
    }

    #[tokio::test]
    async fn unparsable_file_falls_back_to_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "not json").unwrap();

        let store = StateStore::open(&path);
        let state = store.get();
        assert_eq!(state.playlist_index, 0);
        assert_eq!(state.video_id, "");
    }

    #[tokio::test]
    async fn update_then_second_update_before_flush_coalesces() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        let store = Arc::new(StateStore::open(&path));

        store.update(StateUpdate {
            video_index: Some(1),
            ..Default::default()
        });
        store.update(StateUpdate {
            video_index: Some(2),
            ..Default::default()
        });
        store.flush().await;

        let reopened = StateStore::open(&path);
        assert_eq!(reopened.get().video_index, 2);
    }
}
