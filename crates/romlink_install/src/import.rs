use std::collections::{BTreeMap, BTreeSet};

use log::{debug, info};
use romlink_catalog::Catalog;
use romlink_cfg::PlatformMapping;
use uuid::Uuid;

use crate::{
    host::{HostError, HostLibrary, LibraryItem},
    resolver::normalize,
    store::{self, InstallSnapshot, StateStore},
};

#[derive(thiserror::Error, Debug)]
pub enum ImportError {
    #[error("Catalog error. {0}")]
    Catalog(#[from] romlink_catalog::Error),
    #[error("Host error. {0}")]
    Host(#[from] HostError),
    #[error("State error. {0}")]
    Store(#[from] store::Error),
    #[error("Catalog has no platform `{0}`.")]
    UnknownPlatform(String),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ImportSummary {
    /// New library items.
    pub added: usize,
    /// Existing library items that got catalog identifiers by title.
    pub linked: usize,
    /// Roms that were imported before.
    pub skipped: usize,
}

/// Creates library items for the roms of a mapped catalog platform.
///
/// A rom already imported from this catalog is skipped. An item of the same
/// platform with the same normalised title is linked to the rom instead of
/// being duplicated.
pub fn import_platform(
    catalog: &dyn Catalog,
    host: &dyn HostLibrary,
    store: &dyn StateStore,
    host_platform: &str,
    mapping: &PlatformMapping,
) -> Result<ImportSummary, ImportError> {
    let origin = catalog.origin();
    let platform = catalog
        .platforms()?
        .into_iter()
        .find(|p| p.slug == mapping.catalog)
        .ok_or_else(|| ImportError::UnknownPlatform(mapping.catalog.clone()))?;

    let roms = catalog.all_roms(platform.id)?;
    info!(
        "Importing {} roms of `{}` into `{host_platform}`",
        roms.len(),
        platform.name
    );

    let items = host
        .items()
        .into_iter()
        .filter(|i| i.platform.eq_ignore_ascii_case(host_platform))
        .collect::<Vec<_>>();
    let existing = items.iter().map(|i| i.id.as_str()).collect::<BTreeSet<_>>();

    let imported = store
        .all()?
        .into_iter()
        .filter(|s| s.rom_id != 0 && s.server == origin && existing.contains(s.item_id.as_str()))
        .map(|s| s.rom_id)
        .collect::<BTreeSet<_>>();

    let mut unlinked = BTreeMap::new();
    for item in &items {
        if store.get(&item.id)?.map_or(true, |s| s.rom_id == 0) {
            unlinked.entry(normalize(&item.title)).or_insert(item.id.clone());
        }
    }

    let mut summary = ImportSummary::default();
    for rom in roms {
        if imported.contains(&rom.id) {
            summary.skipped += 1;
            continue;
        }

        let id = match unlinked.remove(&normalize(rom.title())) {
            Some(id) => {
                debug!("Linking `{}` to existing item {id}", rom.title());
                summary.linked += 1;
                id
            }
            None => {
                let id = Uuid::new_v4().to_string();
                host.add_item(LibraryItem {
                    id: id.clone(),
                    title: rom.title().to_owned(),
                    platform: host_platform.to_owned(),
                    emulator: mapping.emulator.clone(),
                    ..LibraryItem::default()
                })?;
                summary.added += 1;
                id
            }
        };

        let mut snapshot = InstallSnapshot::new(id, rom.id, origin);
        snapshot.platform = host_platform.to_owned();
        snapshot.file_name = Some(rom.fs_name.clone());
        store.upsert(&snapshot)?;
    }

    host.save_and_reload()?;
    info!(
        "Imported `{host_platform}`: {} added, {} linked, {} skipped",
        summary.added, summary.linked, summary.skipped
    );

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use romlink_catalog::Platform;
    use romlink_cfg::PlatformMapping;

    use crate::{
        host::HostLibrary,
        store::StateStore,
        testing::{rom, FakeCatalog, MemoryHost, MemoryStore, ORIGIN},
    };

    use super::{import_platform, ImportError, ImportSummary};

    fn catalog() -> FakeCatalog {
        FakeCatalog {
            platforms: vec![Platform {
                id: 1,
                slug: "n64".into(),
                name: "Nintendo 64".into(),
                rom_count: 3,
            }],
            ..FakeCatalog::default()
        }
        .with_rom(rom(1, "Super Mario 64", "Super Mario 64.z64", "n64"), vec![])
        .with_rom(rom(2, "GoldenEye 007", "GoldenEye 007.z64", "n64"), vec![])
        .with_rom(rom(3, "Star Fox 64", "Star Fox 64.z64", "n64"), vec![])
    }

    fn mapping() -> PlatformMapping {
        PlatformMapping {
            catalog: "n64".into(),
            install_dir: "/roms/n64".into(),
            ..PlatformMapping::default()
        }
    }

    #[test]
    fn import_links_and_skips() {
        let catalog = catalog();
        let host = MemoryHost::default().with_item("local", "Goldeneye 007", "Nintendo 64");
        let store = MemoryStore::default();

        let summary = import_platform(&catalog, &host, &store, "Nintendo 64", &mapping()).unwrap();
        assert_eq!(
            summary,
            ImportSummary {
                added: 2,
                linked: 1,
                skipped: 0,
            }
        );

        let linked = store.get("local").unwrap().unwrap();
        assert_eq!(linked.rom_id, 2);
        assert_eq!(linked.server, ORIGIN);
        assert_eq!(host.items().len(), 3);

        let again = import_platform(&catalog, &host, &store, "Nintendo 64", &mapping()).unwrap();
        assert_eq!(
            again,
            ImportSummary {
                added: 0,
                linked: 0,
                skipped: 3,
            }
        );
        assert_eq!(host.items().len(), 3);
    }

    #[test]
    fn unknown_platform() {
        let mut mapping = mapping();
        mapping.catalog = "snes".into();

        let err = import_platform(
            &catalog(),
            &MemoryHost::default(),
            &MemoryStore::default(),
            "Nintendo 64",
            &mapping,
        )
        .unwrap_err();
        assert!(matches!(err, ImportError::UnknownPlatform(_)));
    }
}
