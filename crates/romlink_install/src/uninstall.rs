use std::{
    io,
    path::{Path, PathBuf},
    sync::Arc,
};

use log::{error, info, warn};

use crate::{
    host::{HostError, HostLibrary},
    progress::{ProgressEvent, ProgressSink, Stage},
    relocate,
    store::{self, StateStore},
    Settings,
};

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum UninstallStage {
    Resolving,
    Removing,
    Finishing,
}

impl std::fmt::Display for UninstallStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            UninstallStage::Resolving => "Resolving",
            UninstallStage::Removing => "Removing files",
            UninstallStage::Finishing => "Finishing",
        })
    }
}

pub struct UninstallRequest<'a> {
    pub item_id: String,
    pub host: &'a dyn HostLibrary,
    /// Forget the install but leave its files on disk.
    pub keep_files: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UninstallResult {
    pub success: bool,
    pub message: String,
}

#[derive(thiserror::Error, Debug)]
enum Error {
    #[error("Item `{0}` was not imported from the catalog.")]
    NotImported(String),
    #[error("Item `{0}` was imported from {1}, not {2}.")]
    ForeignServer(String, String, String),
    #[error("Library item `{0}` does not exist.")]
    NoItem(String),
    #[error("Refusing to remove {0}, it is not an item directory.")]
    Protected(PathBuf),
    #[error("State error. {0}")]
    Store(#[from] store::Error),
    #[error("Host error. {0}")]
    Host(#[from] HostError),
    #[error("IO error. {0}")]
    Io(#[from] io::Error),
}

/// Removes installed content of catalog items.
pub struct Uninstaller {
    origin: String,
    store: Arc<dyn StateStore>,
    settings: Settings,
}

impl Uninstaller {
    #[must_use]
    pub fn new(origin: impl Into<String>, store: Arc<dyn StateStore>, settings: Settings) -> Self {
        Self {
            origin: origin.into(),
            store,
            settings,
        }
    }

    /// Never fails; problems are logged and reported in the result.
    pub fn run(&self, request: &UninstallRequest<'_>, progress: &dyn ProgressSink) -> UninstallResult {
        match self.uninstall(request, progress) {
            Ok(message) => {
                info!("{message}");
                UninstallResult {
                    success: true,
                    message,
                }
            }
            Err(err) => {
                error!("Uninstall of {} failed: {err}", request.item_id);
                UninstallResult {
                    success: false,
                    message: err.to_string(),
                }
            }
        }
    }

    fn uninstall(
        &self,
        request: &UninstallRequest<'_>,
        progress: &dyn ProgressSink,
    ) -> Result<String, Error> {
        let id = &request.item_id;
        let report = |stage, message: &str| {
            progress.report(ProgressEvent::new(Stage::Uninstall(stage), message));
        };

        report(UninstallStage::Resolving, "Resolving install");
        let mut snapshot = self
            .store
            .get(id)?
            .filter(|s| s.rom_id != 0)
            .ok_or_else(|| Error::NotImported(id.clone()))?;

        if snapshot.server != self.origin {
            return Err(Error::ForeignServer(
                id.clone(),
                snapshot.server.clone(),
                self.origin.clone(),
            ));
        }

        let mut item = request
            .host
            .item(id)
            .ok_or_else(|| Error::NoItem(id.clone()))?;

        report(UninstallStage::Removing, "Removing files");
        if request.keep_files {
            info!("Keeping files of {id}");
        } else {
            let paths = [&snapshot.installed_path, &snapshot.archive_path];
            let mut removed: Vec<&Path> = Vec::new();

            for path in paths.into_iter().flatten() {
                if removed.iter().any(|r| path.starts_with(r)) {
                    continue;
                }

                self.ensure_removable(path, snapshot.install_root.as_deref())?;
                if path.exists() {
                    info!("Removing {}", path.display());
                    relocate::remove_path(path)?;
                } else {
                    warn!("{} is already gone", path.display());
                }
                removed.push(path);
            }
        }

        report(UninstallStage::Finishing, "Updating library");
        item.installed = false;
        item.application_path = None;
        item.command_line = None;
        request.host.update_item(&item)?;

        if let Err(err) = request.host.sync_additional_apps(id, &[]) {
            warn!("Unable to clear additional apps of {id}: {err}");
        }

        snapshot.detach();
        self.store.upsert(&snapshot)?;

        if let Err(err) = request.host.save_and_reload() {
            warn!("Unable to save the library: {err}");
        }

        Ok(format!("Uninstalled {}", item.title))
    }

    /// Only paths strictly below the recorded install root or a configured
    /// platform directory may go, and never one that holds a protected root.
    fn ensure_removable(&self, path: &Path, install_root: Option<&Path>) -> Result<(), Error> {
        let platform_dirs = self
            .settings
            .platforms
            .values()
            .flat_map(|m| [m.install_dir(), m.download_dir()])
            .filter_map(Result::ok)
            .collect::<Vec<_>>();

        let mut protected = platform_dirs.clone();
        protected.extend(self.settings.host_root.clone());
        protected.push(self.settings.temp_root.clone());
        protected.extend(install_root.map(Path::to_path_buf));

        if path.parent().is_none() || protected.iter().any(|root| root.starts_with(path)) {
            return Err(Error::Protected(path.to_path_buf()));
        }

        let contained = install_root
            .into_iter()
            .chain(platform_dirs.iter().map(PathBuf::as_path))
            .any(|dir| path.starts_with(dir) && path != dir);

        if !contained {
            return Err(Error::Protected(path.to_path_buf()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::{fs, path::Path, sync::Arc, time::Duration};

    use indexmap::IndexMap;
    use pretty_assertions::assert_eq;
    use romlink_cfg::PlatformMapping;

    use crate::{
        host::HostLibrary,
        phase::InstallStatus,
        progress::{ProgressEvent, Stage},
        store::{InstallSnapshot, StateStore},
        testing::{MemoryHost, MemoryStore, ORIGIN},
        Settings,
    };

    use super::{UninstallRequest, UninstallStage, Uninstaller};

    fn settings(dir: &Path) -> Settings {
        let mut platforms = IndexMap::new();
        platforms.insert(
            "Windows".to_owned(),
            PlatformMapping {
                catalog: "win".into(),
                native: true,
                install_dir: dir.join("games").to_string_lossy().into_owned(),
                ..PlatformMapping::default()
            },
        );

        Settings {
            temp_root: dir.join("tmp"),
            host_root: None,
            metadata_timeout: Duration::from_secs(1),
            installer_wrapper: vec![],
            platforms,
        }
    }

    fn installed(path: &Path) -> InstallSnapshot {
        let mut snapshot = InstallSnapshot::new("a", 7, ORIGIN);
        snapshot.platform = "Windows".into();
        snapshot.is_installed = true;
        snapshot.installed_path = Some(path.to_path_buf());
        snapshot.status = InstallStatus::Completed;
        snapshot
    }

    fn installed_host() -> MemoryHost {
        let host = MemoryHost::default().with_item("a", "Game", "Windows");
        let mut item = host.get("a");
        item.installed = true;
        item.application_path = Some("games/Game/game.exe".into());
        host.update_item(&item).unwrap();
        host
    }

    #[test]
    fn removes_files() {
        let dir = tempfile::tempdir().unwrap();
        let game = dir.path().join("games").join("Game");
        fs::create_dir_all(&game).unwrap();
        fs::write(game.join("game.exe"), "MZ").unwrap();

        let store = Arc::new(MemoryStore::with(installed(&game)));
        let host = installed_host();
        let uninstaller = Uninstaller::new(ORIGIN, store.clone(), settings(dir.path()));

        let stages = std::sync::Mutex::new(Vec::new());
        let sink = |e: ProgressEvent| stages.lock().unwrap().push(e.stage);

        let result = uninstaller.run(
            &UninstallRequest {
                item_id: "a".into(),
                host: &host,
                keep_files: false,
            },
            &sink,
        );

        assert!(result.success, "{result:?}");
        assert!(!game.exists());
        assert!(dir.path().join("games").exists());

        let item = host.get("a");
        assert!(!item.installed);
        assert_eq!(item.application_path, None);

        let snapshot = store.get("a").unwrap().unwrap();
        assert_eq!(snapshot.status, InstallStatus::NotInstalled);
        assert!(!snapshot.is_installed);
        assert_eq!(snapshot.rom_id, 7);

        assert_eq!(
            stages.into_inner().unwrap(),
            [
                Stage::Uninstall(UninstallStage::Resolving),
                Stage::Uninstall(UninstallStage::Removing),
                Stage::Uninstall(UninstallStage::Finishing),
            ]
        );
    }

    #[test]
    fn keep_files() {
        let dir = tempfile::tempdir().unwrap();
        let game = dir.path().join("games").join("Game");
        fs::create_dir_all(&game).unwrap();

        let store = Arc::new(MemoryStore::with(installed(&game)));
        let host = installed_host();
        let uninstaller = Uninstaller::new(ORIGIN, store.clone(), settings(dir.path()));

        let result = uninstaller.run(
            &UninstallRequest {
                item_id: "a".into(),
                host: &host,
                keep_files: true,
            },
            &crate::progress::NullSink,
        );

        assert!(result.success);
        assert!(game.exists());
        assert!(!host.get("a").installed);
        assert_eq!(store.get("a").unwrap().unwrap().installed_path, None);
    }

    #[test]
    fn refuses_platform_root() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("games");
        fs::create_dir_all(&root).unwrap();

        let store = Arc::new(MemoryStore::with(installed(&root)));
        let host = installed_host();
        let uninstaller = Uninstaller::new(ORIGIN, store.clone(), settings(dir.path()));

        let result = uninstaller.run(
            &UninstallRequest {
                item_id: "a".into(),
                host: &host,
                keep_files: false,
            },
            &crate::progress::NullSink,
        );

        assert!(!result.success);
        assert!(result.message.contains("Refusing"));
        assert!(root.exists());
        assert!(host.get("a").installed);
    }

    #[test]
    fn refuses_ancestor_of_platform_root() {
        let dir = tempfile::tempdir().unwrap();
        let other = dir.path().join("games").join("Other");
        fs::create_dir_all(&other).unwrap();
        fs::write(other.join("keep.exe"), "MZ").unwrap();

        let store = Arc::new(MemoryStore::with(installed(dir.path())));
        let host = installed_host();
        let uninstaller = Uninstaller::new(ORIGIN, store.clone(), settings(dir.path()));

        let result = uninstaller.run(
            &UninstallRequest {
                item_id: "a".into(),
                host: &host,
                keep_files: false,
            },
            &crate::progress::NullSink,
        );

        assert!(!result.success);
        assert!(result.message.contains("Refusing"), "{}", result.message);
        assert!(other.join("keep.exe").exists());
        assert!(store.get("a").unwrap().unwrap().is_installed);
    }

    #[test]
    fn refuses_paths_outside_platform_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let stray = dir.path().join("documents").join("Game");
        fs::create_dir_all(&stray).unwrap();

        let store = Arc::new(MemoryStore::with(installed(&stray)));
        let host = installed_host();
        let uninstaller = Uninstaller::new(ORIGIN, store, settings(dir.path()));

        let result = uninstaller.run(
            &UninstallRequest {
                item_id: "a".into(),
                host: &host,
                keep_files: false,
            },
            &crate::progress::NullSink,
        );

        assert!(!result.success);
        assert!(stray.exists());
    }

    #[test]
    fn foreign_items_fail() {
        let dir = tempfile::tempdir().unwrap();
        let host = installed_host();

        let not_imported = Uninstaller::new(
            ORIGIN,
            Arc::new(MemoryStore::default()),
            settings(dir.path()),
        );
        let request = UninstallRequest {
            item_id: "a".into(),
            host: &host,
            keep_files: false,
        };
        assert!(!not_imported.run(&request, &crate::progress::NullSink).success);

        let other_server = Uninstaller::new(
            "http://elsewhere",
            Arc::new(MemoryStore::with(installed(&dir.path().join("x")))),
            settings(dir.path()),
        );
        let result = other_server.run(&request, &crate::progress::NullSink);
        assert!(!result.success);
        assert!(result.message.contains("elsewhere"));
    }
}
