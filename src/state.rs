//! Persisted per-user state.
//!
//! One JSON file maps chat ids to `{tz, creds, reminders}`. Every
//! read-modify-write cycle runs under a single async lock, so a poll cycle
//! updating fired-reminder flags can never race a foreground command editing
//! the same profile: losing a flag update would mean a duplicate
//! notification. Writes go through a temp file and rename, so a crash
//! mid-write never truncates the store.

use anyhow::{anyhow, Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

use crate::oauth::GoogleTokens;
use crate::reminder::tracker::ReminderMap;

// Guard against loading a runaway file as state (10MB).
const MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub tz: String,
    #[serde(default)]
    pub creds: Option<GoogleTokens>,
    #[serde(default)]
    pub reminders: ReminderMap,
}

impl UserProfile {
    pub fn new(tz: &str) -> Self {
        Self { tz: tz.to_string(), creds: None, reminders: ReminderMap::new() }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Store {
    #[serde(default)]
    pub users: BTreeMap<String, UserProfile>,
}

/// The JSON-file-backed user store.
pub struct UserStore {
    path: PathBuf,
    default_tz: String,
    inner: Mutex<Store>,
}

impl UserStore {
    /// Open the store at `path`. A missing file is an empty store; a corrupt
    /// or oversized one is replaced by an empty store with a warning rather
    /// than taking the bot down.
    pub fn open(path: impl Into<PathBuf>, default_tz: &str) -> Self {
        let path = path.into();
        let store = match load_file(&path) {
            Ok(store) => store,
            Err(e) => {
                warn!("could not load state from {}: {e:#}; starting empty", path.display());
                Store::default()
            }
        };
        Self { path, default_tz: default_tz.to_string(), inner: Mutex::new(store) }
    }

    /// A point-in-time copy of the whole store, for iteration outside the lock.
    pub async fn snapshot(&self) -> Store {
        self.inner.lock().await.clone()
    }

    /// A copy of one user's profile, with defaults for users never seen.
    /// Does not create the user on disk.
    pub async fn get_user(&self, chat_id: &str) -> UserProfile {
        let store = self.inner.lock().await;
        store
            .users
            .get(chat_id)
            .cloned()
            .unwrap_or_else(|| UserProfile::new(&self.default_tz))
    }

    /// Mutate one user's profile and persist. The lock spans the whole
    /// read-modify-write, and the profile is created on first touch.
    pub async fn with_user<R>(
        &self,
        chat_id: &str,
        mutate: impl FnOnce(&mut UserProfile) -> R,
    ) -> Result<R> {
        self.with_user_if_changed(chat_id, |user| (mutate(user), true)).await
    }

    /// Like `with_user`, but the closure also reports whether it changed
    /// anything; the file is rewritten only if it did.
    pub async fn with_user_if_changed<R>(
        &self,
        chat_id: &str,
        mutate: impl FnOnce(&mut UserProfile) -> (R, bool),
    ) -> Result<R> {
        let mut store = self.inner.lock().await;
        let user = store
            .users
            .entry(chat_id.to_string())
            .or_insert_with(|| UserProfile::new(&self.default_tz));
        let (result, changed) = mutate(user);
        if changed {
            write_file(&self.path, &store)?;
        }
        Ok(result)
    }
}

fn load_file(path: &Path) -> Result<Store> {
    if !path.exists() {
        return Ok(Store::default());
    }
    let metadata = fs::metadata(path)?;
    if metadata.len() > MAX_FILE_SIZE {
        return Err(anyhow!("state file exceeds size limits"));
    }
    let content = fs::read_to_string(path)?;
    serde_json::from_str(&content).context("failed to parse state file")
}

fn write_file(path: &Path, store: &Store) -> Result<()> {
    let content = serde_json::to_string_pretty(store)?;
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, content).with_context(|| format!("failed to write {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("failed to replace {}", path.display()))?;
    Ok(())
}
