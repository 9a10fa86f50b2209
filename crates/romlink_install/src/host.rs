use std::io;

use serde::{Deserialize, Serialize};

/// A game entry in the host's library.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryItem {
    pub id: String,
    pub title: String,
    pub platform: String,
    #[serde(default)]
    pub installed: bool,
    #[serde(default)]
    pub application_path: Option<String>,
    #[serde(default)]
    pub command_line: Option<String>,
    #[serde(default)]
    pub emulator: Option<String>,
}

/// Extra launch entry attached to a library item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdditionalApp {
    pub name: String,
    pub application_path: String,
    #[serde(default)]
    pub command_line: Option<String>,
}

#[derive(thiserror::Error, Debug)]
pub enum HostError {
    #[error("Library item `{0}` not found.")]
    NotFound(String),
    #[error("IO error. {0}")]
    Io(#[from] io::Error),
    #[error("Serialization error. {0}")]
    Json(#[from] serde_json::Error),
}

/// The data layer of the host application.
pub trait HostLibrary: Send + Sync {
    fn item(&self, id: &str) -> Option<LibraryItem>;

    fn items(&self) -> Vec<LibraryItem>;

    fn add_item(&self, item: LibraryItem) -> Result<(), HostError>;

    fn update_item(&self, item: &LibraryItem) -> Result<(), HostError>;

    /// Emulator registered in the host as default for a platform.
    fn default_emulator(&self, platform: &str) -> Option<String>;

    fn sync_additional_apps(&self, item_id: &str, apps: &[AdditionalApp])
        -> Result<(), HostError>;

    /// Persists pending changes and reloads so the host reflects them.
    fn save_and_reload(&self) -> Result<(), HostError>;
}
