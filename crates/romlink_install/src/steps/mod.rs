use std::{io, sync::Arc};

use romlink_catalog::Catalog;

use crate::{
    archive,
    context::{InstallContext, InstallRequest},
    host::HostError,
    phase::InstallPhase,
    progress::{CancellationToken, ProgressEvent, ProgressSink, Stage},
    store::StateStore,
    windows::RunError,
    Settings,
};

pub use content::InstallContent;
pub use destination::ResolveDestination;
pub use download::Download;
pub use metadata::ResolveMetadata;
pub use persist::PersistState;
pub use post_process::PostProcess;

mod content;
mod destination;
mod download;
mod metadata;
mod persist;
mod post_process;

#[derive(thiserror::Error, Debug)]
pub enum StepError {
    #[error("{0}")]
    Failed(String),
    #[error("Installation was cancelled.")]
    Cancelled,
    #[error(transparent)]
    Catalog(#[from] romlink_catalog::Error),
    #[error("IO error. {0}")]
    Io(#[from] io::Error),
    #[error("Extraction error. {0}")]
    Archive(archive::Error),
    #[error("Installer error. {0}")]
    Installer(RunError),
    #[error("Host error. {0}")]
    Host(#[from] HostError),
    #[error("Config error. {0}")]
    Config(#[from] romlink_cfg::Error),
}

impl StepError {
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        StepError::Failed(message.into())
    }
}

impl From<archive::Error> for StepError {
    fn from(err: archive::Error) -> Self {
        match err {
            archive::Error::Cancelled => StepError::Cancelled,
            err => StepError::Archive(err),
        }
    }
}

impl From<RunError> for StepError {
    fn from(err: RunError) -> Self {
        match err {
            RunError::Cancelled => StepError::Cancelled,
            err => StepError::Installer(err),
        }
    }
}

/// Collaborators shared by all steps of one run.
pub struct StepEnv<'a> {
    pub request: &'a InstallRequest<'a>,
    pub catalog: &'a Arc<dyn Catalog>,
    pub store: &'a dyn StateStore,
    pub settings: &'a Settings,
    pub progress: &'a dyn ProgressSink,
    pub cancel: &'a CancellationToken,
}

impl StepEnv<'_> {
    pub fn report(&self, phase: InstallPhase, message: impl Into<String>) {
        self.progress
            .report(ProgressEvent::new(Stage::Install(phase), message));
    }

    pub fn report_percent(&self, phase: InstallPhase, message: impl Into<String>, percent: f64) {
        self.progress
            .report(ProgressEvent::new(Stage::Install(phase), message).with_percent(percent));
    }

    pub fn check_cancelled(&self) -> Result<(), StepError> {
        if self.cancel.is_cancelled() {
            Err(StepError::Cancelled)
        } else {
            Ok(())
        }
    }
}

pub trait Step {
    fn name(&self) -> &'static str;

    /// Phase the run is in when the step starts.
    fn phase(&self) -> InstallPhase;

    fn run(&self, ctx: &mut InstallContext, env: &StepEnv<'_>) -> Result<(), StepError>;
}

/// Fetches a context field a previous step must have filled in.
pub(crate) fn required<'a, T>(value: Option<&'a T>, what: &str) -> Result<&'a T, StepError> {
    value.ok_or_else(|| StepError::failed(format!("Internal error: {what} was not resolved.")))
}
