//! Run-state persistence
//!
//! Manages the `.mothball/state.json` file which holds, per trick machine
//! name, the state blob captured by the last conserve run. The file must
//! round-trip exactly what each trick produced; entry order is preserved so
//! re-serialization is deterministic.

use crate::error::{Result, TrickError};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

const STATE_VERSION: u32 = 1;
const STATE_DIR: &str = ".mothball";
const STATE_FILE: &str = "state.json";
const STATE_BACKUP: &str = "state.json.backup";
const LOCK_FILE: &str = "lock.json";

/// One conserved trick's entry in the run state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateEntry {
    /// Opaque blob produced by the trick's own encoder
    pub state: serde_json::Value,

    /// When conserve captured it
    pub captured_at: DateTime<Utc>,

    /// Whether the capture ran under dry-run (no mutations were applied)
    pub dry_run: bool,
}

impl StateEntry {
    pub fn new(state: serde_json::Value, dry_run: bool) -> Self {
        Self {
            state,
            captured_at: Utc::now(),
            dry_run,
        }
    }
}

/// Everything one conserve run captured
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunState {
    /// State file version
    pub version: u32,

    /// Last modified timestamp
    pub updated_at: DateTime<Utc>,

    /// Captured state per trick machine name, in capture order
    pub tricks: IndexMap<String, StateEntry>,
}

impl Default for RunState {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            updated_at: Utc::now(),
            tricks: IndexMap::new(),
        }
    }
}

impl RunState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a trick's entry
    pub fn set(&mut self, machine_name: impl Into<String>, entry: StateEntry) {
        self.tricks.insert(machine_name.into(), entry);
        self.updated_at = Utc::now();
    }

    pub fn get(&self, machine_name: &str) -> Option<&StateEntry> {
        self.tricks.get(machine_name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &StateEntry)> {
        self.tricks.iter()
    }

    pub fn len(&self) -> usize {
        self.tricks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tricks.is_empty()
    }
}

/// Reads and writes the state directory
pub struct StateStore {
    root: PathBuf,
}

impl StateStore {
    /// `root` is the directory under which `.mothball/` lives
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn state_dir(&self) -> PathBuf {
        self.root.join(STATE_DIR)
    }

    pub fn state_path(&self) -> PathBuf {
        self.state_dir().join(STATE_FILE)
    }

    fn backup_path(&self) -> PathBuf {
        self.state_dir().join(STATE_BACKUP)
    }

    fn lock_path(&self) -> PathBuf {
        self.state_dir().join(LOCK_FILE)
    }

    async fn ensure_state_dir(&self) -> Result<()> {
        let dir = self.state_dir();
        if !dir.exists() {
            fs::create_dir_all(&dir).await?;
            tracing::debug!("Created state directory: {}", dir.display());
        }
        Ok(())
    }

    /// Load the persisted run state, or `None` when nothing was conserved
    pub async fn try_load(&self) -> Result<Option<RunState>> {
        let path = self.state_path();
        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&path).await?;
        let state: RunState = serde_json::from_str(&content)?;

        if state.version > STATE_VERSION {
            return Err(TrickError::StateError(format!(
                "state file version {} is newer than supported version {}",
                state.version, STATE_VERSION
            )));
        }

        tracing::debug!("Loaded state with {} trick entries", state.tricks.len());
        Ok(Some(state))
    }

    /// Load the persisted run state; a missing file is an error
    pub async fn load(&self) -> Result<RunState> {
        self.try_load().await?.ok_or_else(|| {
            TrickError::StateError(format!(
                "no conserved state at {} (run `mothball conserve` first)",
                self.state_path().display()
            ))
        })
    }

    /// Persist the run state, rotating any previous file to the backup
    pub async fn save(&self, state: &RunState) -> Result<()> {
        self.ensure_state_dir().await?;

        let path = self.state_path();
        let backup = self.backup_path();

        if path.exists() {
            if backup.exists() {
                fs::remove_file(&backup).await?;
            }
            fs::rename(&path, &backup).await?;
            tracing::debug!("Rotated previous state to backup");
        }

        let content = serde_json::to_string_pretty(state)?;
        fs::write(&path, content).await?;

        tracing::debug!("Saved state with {} trick entries", state.tricks.len());
        Ok(())
    }

    /// Remove the state file after a fully successful restore
    ///
    /// The backup rotated by the last save stays on disk.
    pub async fn clear(&self) -> Result<()> {
        let path = self.state_path();
        if path.exists() {
            fs::remove_file(&path).await?;
            tracing::debug!("Cleared state file");
        }
        Ok(())
    }

    /// Acquire the run lock for exclusive access to the state directory
    pub async fn acquire_lock(&self) -> Result<StateLock> {
        self.ensure_state_dir().await?;

        let lock_path = self.lock_path();

        if lock_path.exists() {
            let content = fs::read_to_string(&lock_path).await?;
            let lock_info: LockInfo = serde_json::from_str(&content)?;

            // Locks older than an hour are considered stale
            let age = Utc::now().signed_duration_since(lock_info.acquired_at);
            if age.num_hours() < 1 {
                return Err(TrickError::LockError(format!(
                    "state is locked by {} since {}",
                    lock_info.holder, lock_info.acquired_at
                )));
            }

            tracing::warn!("Removing stale lock from {}", lock_info.holder);
        }

        let lock_info = LockInfo {
            holder: std::env::var("HOSTNAME")
                .or_else(|_| std::env::var("HOST"))
                .unwrap_or_else(|_| "unknown".to_string()),
            acquired_at: Utc::now(),
        };

        let content = serde_json::to_string_pretty(&lock_info)?;
        fs::write(&lock_path, content).await?;

        tracing::debug!("Acquired state lock");
        Ok(StateLock {
            lock_path,
            released: false,
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct LockInfo {
    holder: String,
    acquired_at: DateTime<Utc>,
}

/// RAII guard for the run lock
pub struct StateLock {
    lock_path: PathBuf,
    released: bool,
}

impl StateLock {
    pub async fn release(mut self) -> Result<()> {
        if !self.released {
            if self.lock_path.exists() {
                fs::remove_file(&self.lock_path).await?;
                tracing::debug!("Released state lock");
            }
            self.released = true;
        }
        Ok(())
    }
}

impl Drop for StateLock {
    fn drop(&mut self) {
        if !self.released && self.lock_path.exists() {
            // Synchronous cleanup in drop - not ideal but necessary
            let _ = std::fs::remove_file(&self.lock_path);
        }
    }
}
