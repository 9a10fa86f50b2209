use std::{path::PathBuf, time::Duration};

use indexmap::IndexMap;
use romlink_cfg::{PlatformMapping, Romlink};

pub use context::{sanitize_directory_name, InstallContext, InstallRequest};
pub use coordinator::Installer;
pub use import::{import_platform, ImportError, ImportSummary};
pub use phase::{InstallPhase, InstallStatus};
pub use progress::{CancellationToken, NullSink, ProgressEvent, ProgressSink, Stage};
pub use uninstall::{UninstallRequest, UninstallResult, UninstallStage, Uninstaller};

pub mod archive;
pub mod host;
pub mod relocate;
pub mod resolver;
pub mod store;
pub mod windows;

mod context;
mod coordinator;
mod import;
mod phase;
mod progress;
mod steps;
mod uninstall;

#[cfg(test)]
mod testing;

/// Everything the pipeline needs from the configuration.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Per-run temp directories are created below it.
    pub temp_root: PathBuf,
    /// Launch paths below it are stored relative to it.
    pub host_root: Option<PathBuf>,
    pub metadata_timeout: Duration,
    pub installer_wrapper: Vec<String>,
    pub platforms: IndexMap<String, PlatformMapping>,
}

impl Settings {
    /// `default_temp` is used when the configuration has no temp directory.
    pub fn from_config(cfg: &Romlink, default_temp: PathBuf) -> Result<Self, romlink_cfg::Error> {
        let temp_root = match &cfg.paths.temp {
            Some(temp) => romlink_cfg::expand(temp)?,
            None => default_temp,
        };

        let host_root = cfg
            .paths
            .host_root
            .as_deref()
            .map(romlink_cfg::expand)
            .transpose()?;

        Ok(Self {
            temp_root,
            host_root,
            metadata_timeout: cfg.metadata_timeout,
            installer_wrapper: cfg.installer.wrapper.clone(),
            platforms: cfg.platforms.clone(),
        })
    }

    /// Mapping for a host platform name, ignoring case.
    #[must_use]
    pub fn platform(&self, host_platform: &str) -> Option<(&str, &PlatformMapping)> {
        self.platforms
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(host_platform))
            .map(|(name, mapping)| (name.as_str(), mapping))
    }
}

/// Outcome of one install run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallResult {
    pub success: bool,
    pub message: String,
    /// `Completed` on success, otherwise the phase the run stopped in.
    pub phase: InstallPhase,
}

impl InstallResult {
    #[must_use]
    pub fn completed(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            phase: InstallPhase::Completed,
        }
    }

    #[must_use]
    pub fn failed(phase: InstallPhase, message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            phase,
        }
    }

    #[must_use]
    pub fn cancelled() -> Self {
        Self {
            success: false,
            message: "Installation was cancelled.".to_owned(),
            phase: InstallPhase::Cancelled,
        }
    }
}
