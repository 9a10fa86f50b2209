use std::{
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use log::{debug, warn};
use romlink_catalog::Rom;
use romlink_cfg::PlatformMapping;
use uuid::Uuid;

use crate::{
    host::{AdditionalApp, HostLibrary, LibraryItem},
    phase::InstallPhase,
    resolver::Candidate,
    store::InstallSnapshot,
    windows::InstallType,
};

/// What to install, and the host library it belongs to.
pub struct InstallRequest<'a> {
    pub item_id: String,
    pub host: &'a dyn HostLibrary,
}

impl<'a> InstallRequest<'a> {
    #[must_use]
    pub fn new(item_id: impl Into<String>, host: &'a dyn HostLibrary) -> Self {
        Self {
            item_id: item_id.into(),
            host,
        }
    }
}

/// Start and end of one measured stretch of the pipeline.
#[derive(Default, Debug)]
pub struct Timing {
    started: Option<Instant>,
    elapsed: Option<Duration>,
}

impl Timing {
    pub fn start(&mut self) {
        self.started = Some(Instant::now());
    }

    pub fn stop(&mut self) {
        if let Some(started) = self.started.take() {
            self.elapsed = Some(started.elapsed());
        }
    }

    #[must_use]
    pub fn millis(&self) -> Option<u64> {
        self.elapsed
            .map(|e| u64::try_from(e.as_millis()).unwrap_or(u64::MAX))
    }
}

/// State of one pipeline run, filled in by the steps in order.
#[derive(Debug)]
pub struct InstallContext {
    pub operation_id: Uuid,
    phase: InstallPhase,

    pub item: Option<LibraryItem>,
    pub rom: Option<Rom>,
    /// Host platform name the mapping was found under.
    pub platform: Option<String>,
    pub mapping: Option<PlatformMapping>,

    /// Per-run directory, removed when the run ends.
    pub temp_root: PathBuf,
    pub download_dir: Option<PathBuf>,
    pub archive_path: Option<PathBuf>,
    pub extracted_path: Option<PathBuf>,
    /// Downloaded content after extraction and relocation.
    pub content_path: Option<PathBuf>,
    /// Platform directory holding all installs of the platform.
    pub install_root: Option<PathBuf>,
    /// Final directory of this item.
    pub install_dir: Option<PathBuf>,
    pub installed_path: Option<PathBuf>,
    pub staging_dir: Option<PathBuf>,

    pub executable: Option<PathBuf>,
    pub launch_args: Option<String>,
    pub install_type: Option<InstallType>,
    pub candidates: Vec<Candidate>,
    pub uninstaller: Option<PathBuf>,
    pub additional_apps: Vec<AdditionalApp>,

    pub download_time: Timing,
    pub extract_time: Timing,
    pub install_time: Timing,

    pub snapshot: InstallSnapshot,
}

impl InstallContext {
    #[must_use]
    pub fn new(temp_base: &Path, snapshot: InstallSnapshot) -> Self {
        let operation_id = Uuid::new_v4();

        Self {
            operation_id,
            phase: InstallPhase::Pending,
            item: None,
            rom: None,
            platform: None,
            mapping: None,
            temp_root: temp_base.join(operation_id.to_string()),
            download_dir: None,
            archive_path: None,
            extracted_path: None,
            content_path: None,
            install_root: None,
            install_dir: None,
            installed_path: None,
            staging_dir: None,
            executable: None,
            launch_args: None,
            install_type: None,
            candidates: Vec::new(),
            uninstaller: None,
            additional_apps: Vec::new(),
            download_time: Timing::default(),
            extract_time: Timing::default(),
            install_time: Timing::default(),
            snapshot,
        }
    }

    #[must_use]
    pub fn phase(&self) -> InstallPhase {
        self.phase
    }

    /// Moves the run to `next`. Backwards moves are ignored.
    pub fn advance(&mut self, next: InstallPhase) {
        if self.phase.can_advance_to(next) {
            debug!("Phase {} -> {next}", self.phase);
            self.phase = next;
        } else if self.phase != next {
            warn!("Ignoring phase change {} -> {next}", self.phase);
        }
    }

    /// Title used for directory names and executable matching.
    #[must_use]
    pub fn title(&self) -> &str {
        match (&self.item, &self.rom) {
            (Some(item), _) if !item.title.trim().is_empty() => &item.title,
            (_, Some(rom)) => rom.title(),
            _ => &self.snapshot.item_id,
        }
    }

    /// Points every path recorded under `from` to the same place under `to`.
    pub fn rewrite_paths(&mut self, from: &Path, to: &Path) {
        let rewrite = |path: &mut Option<PathBuf>| {
            if let Some(rest) = path.as_deref().and_then(|p| p.strip_prefix(from).ok()) {
                *path = Some(to.join(rest));
            }
        };

        rewrite(&mut self.executable);
        rewrite(&mut self.uninstaller);
        rewrite(&mut self.content_path);
        for candidate in &mut self.candidates {
            if let Ok(rest) = candidate.path.strip_prefix(from) {
                candidate.path = to.join(rest);
            }
        }
    }
}

/// Removes characters that are not allowed in directory names on common filesystems.
#[must_use]
pub fn sanitize_directory_name(name: &str) -> String {
    static ILLEGAL: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|'];
    let name = name
        .chars()
        .filter(|&c| !ILLEGAL.contains(&c) && !c.is_control())
        .collect::<String>();

    name.trim().trim_end_matches('.').trim_end().to_owned()
}
