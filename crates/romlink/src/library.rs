use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    sync::{Mutex, PoisonError},
};

use log::{debug, info};
use romlink_install::host::{AdditionalApp, HostError, HostLibrary, LibraryItem};
use serde::{Deserialize, Serialize};

#[derive(Default, Serialize, Deserialize)]
struct Library {
    #[serde(default)]
    items: Vec<LibraryItem>,
    /// Default emulator per platform.
    #[serde(default)]
    emulators: BTreeMap<String, String>,
    #[serde(default)]
    additional_apps: BTreeMap<String, Vec<AdditionalApp>>,
}

/// A game library kept in a JSON file, standing in for a host application.
pub struct JsonLibrary {
    path: PathBuf,
    library: Mutex<Library>,
}

impl JsonLibrary {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, HostError> {
        let path = path.into();
        let library = read(&path)?;

        Ok(Self {
            path,
            library: Mutex::new(library),
        })
    }

    fn with<T>(&self, f: impl FnOnce(&mut Library) -> T) -> T {
        let mut library = self.library.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut library)
    }

    #[cfg(test)]
    pub fn additional_apps(&self, item_id: &str) -> Vec<AdditionalApp> {
        self.with(|l| l.additional_apps.get(item_id).cloned().unwrap_or_default())
    }
}

fn read(path: &Path) -> Result<Library, HostError> {
    if !path.exists() {
        debug!("No library at {}, starting empty", path.display());
        return Ok(Library::default());
    }

    Ok(serde_json::from_slice(&fs::read(path)?)?)
}

impl HostLibrary for JsonLibrary {
    fn item(&self, id: &str) -> Option<LibraryItem> {
        self.with(|l| l.items.iter().find(|i| i.id == id).cloned())
    }

    fn items(&self) -> Vec<LibraryItem> {
        self.with(|l| l.items.clone())
    }

    fn add_item(&self, item: LibraryItem) -> Result<(), HostError> {
        self.with(|l| l.items.push(item));
        Ok(())
    }

    fn update_item(&self, item: &LibraryItem) -> Result<(), HostError> {
        self.with(|l| -> Result<(), HostError> {
            let existing = l
                .items
                .iter_mut()
                .find(|i| i.id == item.id)
                .ok_or_else(|| HostError::NotFound(item.id.clone()))?;
            *existing = item.clone();
            Ok(())
        })
    }

    fn default_emulator(&self, platform: &str) -> Option<String> {
        self.with(|l| {
            l.emulators
                .iter()
                .find(|(p, _)| p.eq_ignore_ascii_case(platform))
                .map(|(_, emulator)| emulator.clone())
        })
    }

    fn sync_additional_apps(&self, item_id: &str, apps: &[AdditionalApp]) -> Result<(), HostError> {
        self.with(|l| {
            if apps.is_empty() {
                l.additional_apps.remove(item_id);
            } else {
                l.additional_apps.insert(item_id.to_owned(), apps.to_vec());
            }
        });
        Ok(())
    }

    fn save_and_reload(&self) -> Result<(), HostError> {
        self.with(|l| -> Result<(), HostError> {
            if let Some(parent) = self.path.parent() {
                fs::create_dir_all(parent)?;
            }

            let tmp = self.path.with_extension("tmp");
            fs::write(&tmp, serde_json::to_string_pretty(l)?)?;
            fs::rename(&tmp, &self.path)?;

            *l = read(&self.path)?;
            info!("Saved library with {} items", l.items.len());
            Ok(())
        })
    }
}
