use std::{
    collections::BTreeMap,
    fs, io,
    path::{Path, PathBuf},
    sync::Mutex,
    time::SystemTime,
};

use fslock::LockFile;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::{
    phase::{InstallPhase, InstallStatus},
    windows::InstallType,
};

/// Durable install record of one library item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstallSnapshot {
    pub item_id: String,
    pub rom_id: u64,
    /// Catalog origin the rom id belongs to.
    pub server: String,
    pub platform: String,
    pub file_name: Option<String>,
    pub installed_path: Option<PathBuf>,
    pub launch_path: Option<String>,
    pub launch_args: Option<String>,
    pub archive_path: Option<PathBuf>,
    pub install_root: Option<PathBuf>,
    pub install_type: Option<InstallType>,
    pub is_installed: bool,
    pub status: InstallStatus,
    pub phase: InstallPhase,
    pub message: Option<String>,
    pub installed_at: Option<SystemTime>,
    pub last_validated_at: Option<SystemTime>,
    pub updated_at: Option<SystemTime>,
    pub download_ms: Option<u64>,
    pub extract_ms: Option<u64>,
    pub install_ms: Option<u64>,
}

impl InstallSnapshot {
    #[must_use]
    pub fn new(item_id: impl Into<String>, rom_id: u64, server: impl Into<String>) -> Self {
        Self {
            item_id: item_id.into(),
            rom_id,
            server: server.into(),
            updated_at: Some(SystemTime::now()),
            ..Self::default()
        }
    }

    pub fn mark(&mut self, status: InstallStatus, phase: InstallPhase, message: Option<String>) {
        self.status = status;
        self.phase = phase;
        self.message = message;
        self.updated_at = Some(SystemTime::now());
    }

    /// Clears everything describing local content, keeping the catalog identity.
    pub fn detach(&mut self) {
        *self = Self {
            item_id: std::mem::take(&mut self.item_id),
            rom_id: self.rom_id,
            server: std::mem::take(&mut self.server),
            platform: std::mem::take(&mut self.platform),
            file_name: self.file_name.take(),
            updated_at: Some(SystemTime::now()),
            ..Self::default()
        };
    }
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Lock error. {0}")]
    Lock(#[source] io::Error),
    #[error("Unable to write state file. {0}")]
    Write(#[source] io::Error),
    #[error("Unable to serialize state. {0}")]
    Serialize(#[from] serde_json::Error),
}

pub trait StateStore: Send + Sync {
    fn get(&self, item_id: &str) -> Result<Option<InstallSnapshot>, Error>;

    fn upsert(&self, snapshot: &InstallSnapshot) -> Result<(), Error>;

    fn all(&self) -> Result<Vec<InstallSnapshot>, Error>;
}

#[derive(Default, Serialize, Deserialize)]
struct State {
    #[serde(default)]
    items: BTreeMap<String, InstallSnapshot>,
}

/// State store persisted as a JSON document, guarded by a lock file for writes.
pub struct JsonStateStore {
    path: PathBuf,
    guard: Mutex<()>,
}

impl JsonStateStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            guard: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> Result<LockFile, Error> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(Error::Lock)?;
        }

        let mut lock =
            LockFile::open(&self.path.with_extension("lock")).map_err(Error::Lock)?;
        lock.lock_with_pid().map_err(Error::Lock)?;
        Ok(lock)
    }

    fn read(&self) -> State {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) => {
                debug!("No state file at {}: {err}", self.path.display());
                return State::default();
            }
        };

        serde_json::from_slice(&bytes).unwrap_or_else(|err| {
            warn!("Ignoring unreadable state file {}: {err}", self.path.display());
            State::default()
        })
    }

    fn write(&self, state: &State) -> Result<(), Error> {
        let state = serde_json::to_string_pretty(state)?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, state).map_err(Error::Write)?;
        fs::rename(&tmp, &self.path).map_err(Error::Write)?;
        Ok(())
    }
}

impl StateStore for JsonStateStore {
    fn get(&self, item_id: &str) -> Result<Option<InstallSnapshot>, Error> {
        Ok(self.read().items.remove(item_id))
    }

    fn upsert(&self, snapshot: &InstallSnapshot) -> Result<(), Error> {
        let _guard = self.guard.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let lock = self.lock()?;

        let mut state = self.read();
        state
            .items
            .insert(snapshot.item_id.clone(), snapshot.clone());
        self.write(&state)?;

        drop(lock);
        Ok(())
    }

    fn all(&self) -> Result<Vec<InstallSnapshot>, Error> {
        Ok(self.read().items.into_values().collect())
    }
}
