use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use crate::{phase::InstallPhase, uninstall::UninstallStage};

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Stage {
    Install(InstallPhase),
    Uninstall(UninstallStage),
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Install(phase) => phase.fmt(f),
            Stage::Uninstall(stage) => stage.fmt(f),
        }
    }
}

#[derive(Clone, PartialEq, Debug)]
pub struct ProgressEvent {
    pub stage: Stage,
    pub message: String,
    /// 0 to 100, when the stage can measure it.
    pub percent: Option<f64>,
}

impl ProgressEvent {
    #[must_use]
    pub fn new(stage: Stage, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
            percent: None,
        }
    }

    #[must_use]
    pub fn with_percent(mut self, percent: f64) -> Self {
        self.percent = Some(percent.clamp(0.0, 100.0));
        self
    }
}

/// Receives progress events. Implementations marshal them onto whatever thread they need.
pub trait ProgressSink: Sync {
    fn report(&self, event: ProgressEvent);
}

impl<F> ProgressSink for F
where
    F: Fn(ProgressEvent) + Sync,
{
    fn report(&self, event: ProgressEvent) {
        self(event);
    }
}

pub struct NullSink;

impl ProgressSink for NullSink {
    fn report(&self, _event: ProgressEvent) {}
}

/// Cooperative cancellation flag shared between the caller and a running pipeline.
#[derive(Clone, Default, Debug)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
