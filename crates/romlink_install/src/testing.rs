//! In-memory collaborators shared by the unit tests.

use std::{
    collections::BTreeMap,
    io::{self, Cursor, Write},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
    thread,
    time::Duration,
};

use romlink_catalog::{Catalog, DownloadStream, Error, Platform, Rom, RomPage};
use zip::{write::FileOptions, ZipWriter};

use crate::{
    host::{AdditionalApp, HostError, HostLibrary, LibraryItem},
    store::{Error as StoreError, InstallSnapshot, StateStore},
};

pub const ORIGIN: &str = "http://romm.test";

pub fn zip_bytes(files: &[(&str, &str)]) -> Vec<u8> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));

    for (name, content) in files {
        zip.start_file(*name, FileOptions::default()).unwrap();
        zip.write_all(content.as_bytes()).unwrap();
    }

    zip.finish().unwrap().into_inner()
}

pub fn rom(id: u64, name: &str, fs_name: &str, platform_slug: &str) -> Rom {
    Rom {
        id,
        name: Some(name.to_owned()),
        fs_name: fs_name.to_owned(),
        fs_size_bytes: 0,
        platform_id: 1,
        platform_slug: platform_slug.to_owned(),
        files: vec![],
    }
}

#[derive(Default)]
pub struct FakeCatalog {
    pub platforms: Vec<Platform>,
    pub roms: BTreeMap<u64, Rom>,
    pub content: BTreeMap<u64, Vec<u8>>,
    /// Delay applied to metadata requests.
    pub delay: Option<Duration>,
    pub content_calls: AtomicUsize,
}

impl FakeCatalog {
    pub fn with_rom(mut self, rom: Rom, content: Vec<u8>) -> Self {
        self.content.insert(rom.id, content);
        self.roms.insert(rom.id, rom);
        self
    }

    pub fn content_calls(&self) -> usize {
        self.content_calls.load(Ordering::SeqCst)
    }
}

impl Catalog for FakeCatalog {
    fn origin(&self) -> &str {
        ORIGIN
    }

    fn platforms(&self) -> Result<Vec<Platform>, Error> {
        Ok(self.platforms.clone())
    }

    fn roms(&self, platform_id: u64, offset: u64, limit: u64) -> Result<RomPage, Error> {
        let items = self
            .roms
            .values()
            .filter(|r| r.platform_id == platform_id)
            .cloned()
            .collect::<Vec<_>>();

        Ok(RomPage {
            total: items.len() as u64,
            items: items
                .into_iter()
                .skip(usize::try_from(offset).unwrap())
                .take(usize::try_from(limit).unwrap())
                .collect(),
            offset,
            limit,
        })
    }

    fn rom(&self, id: u64) -> Result<Rom, Error> {
        if let Some(delay) = self.delay {
            thread::sleep(delay);
        }

        self.roms
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("rom {id}")))
    }

    fn content(&self, rom: &Rom) -> Result<DownloadStream<Box<dyn io::Read + Send>>, Error> {
        self.content_calls.fetch_add(1, Ordering::SeqCst);

        let bytes = self
            .content
            .get(&rom.id)
            .cloned()
            .ok_or_else(|| Error::NotFound(rom.fs_name.clone()))?;
        let len = bytes.len() as u64;

        Ok(DownloadStream::new(Cursor::new(bytes), Some(len)).boxed())
    }
}

#[derive(Default)]
pub struct MemoryHost {
    pub items: Mutex<BTreeMap<String, LibraryItem>>,
    pub emulators: BTreeMap<String, String>,
    pub apps: Mutex<BTreeMap<String, Vec<AdditionalApp>>>,
    pub saves: AtomicUsize,
}

impl MemoryHost {
    #[must_use]
    pub fn with_item(self, id: &str, title: &str, platform: &str) -> Self {
        self.items.lock().unwrap().insert(
            id.to_owned(),
            LibraryItem {
                id: id.to_owned(),
                title: title.to_owned(),
                platform: platform.to_owned(),
                ..LibraryItem::default()
            },
        );
        self
    }

    pub fn get(&self, id: &str) -> LibraryItem {
        self.items.lock().unwrap()[id].clone()
    }

    pub fn apps(&self, id: &str) -> Vec<AdditionalApp> {
        self.apps
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .unwrap_or_default()
    }
}

impl HostLibrary for MemoryHost {
    fn item(&self, id: &str) -> Option<LibraryItem> {
        self.items.lock().unwrap().get(id).cloned()
    }

    fn items(&self) -> Vec<LibraryItem> {
        self.items.lock().unwrap().values().cloned().collect()
    }

    fn add_item(&self, item: LibraryItem) -> Result<(), HostError> {
        self.items.lock().unwrap().insert(item.id.clone(), item);
        Ok(())
    }

    fn update_item(&self, item: &LibraryItem) -> Result<(), HostError> {
        let mut items = self.items.lock().unwrap();
        let existing = items
            .get_mut(&item.id)
            .ok_or_else(|| HostError::NotFound(item.id.clone()))?;
        *existing = item.clone();
        Ok(())
    }

    fn default_emulator(&self, platform: &str) -> Option<String> {
        self.emulators.get(platform).cloned()
    }

    fn sync_additional_apps(&self, item_id: &str, apps: &[AdditionalApp]) -> Result<(), HostError> {
        self.apps
            .lock()
            .unwrap()
            .insert(item_id.to_owned(), apps.to_vec());
        Ok(())
    }

    fn save_and_reload(&self) -> Result<(), HostError> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// State store that records every write.
#[derive(Default)]
pub struct MemoryStore {
    pub writes: Mutex<Vec<InstallSnapshot>>,
}

impl MemoryStore {
    #[must_use]
    pub fn with(snapshot: InstallSnapshot) -> Self {
        let store = Self::default();
        store.writes.lock().unwrap().push(snapshot);
        store
    }

    pub fn last(&self, item_id: &str) -> InstallSnapshot {
        self.get(item_id).unwrap().unwrap()
    }
}

impl StateStore for MemoryStore {
    fn get(&self, item_id: &str) -> Result<Option<InstallSnapshot>, StoreError> {
        Ok(self
            .writes
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|s| s.item_id == item_id)
            .cloned())
    }

    fn upsert(&self, snapshot: &InstallSnapshot) -> Result<(), StoreError> {
        self.writes.lock().unwrap().push(snapshot.clone());
        Ok(())
    }

    fn all(&self) -> Result<Vec<InstallSnapshot>, StoreError> {
        let mut latest = BTreeMap::new();
        for snapshot in self.writes.lock().unwrap().iter() {
            latest.insert(snapshot.item_id.clone(), snapshot.clone());
        }
        Ok(latest.into_values().collect())
    }
}
