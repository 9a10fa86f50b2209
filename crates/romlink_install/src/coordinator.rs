use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use log::{debug, error, info, warn};
use romlink_catalog::Catalog;

use crate::{
    context::{InstallContext, InstallRequest},
    phase::{InstallPhase, InstallStatus},
    progress::{CancellationToken, ProgressSink},
    steps::{
        Download, InstallContent, PersistState, PostProcess, ResolveDestination, ResolveMetadata,
        Step, StepEnv, StepError,
    },
    store::{InstallSnapshot, StateStore},
    InstallResult, Settings,
};

/// Runs the install pipeline for library items.
pub struct Installer {
    catalog: Arc<dyn Catalog>,
    store: Arc<dyn StateStore>,
    settings: Settings,
}

impl Installer {
    #[must_use]
    pub fn new(catalog: Arc<dyn Catalog>, store: Arc<dyn StateStore>, settings: Settings) -> Self {
        Self {
            catalog,
            store,
            settings,
        }
    }

    /// Installs one item. Every failure is turned into an unsuccessful result.
    pub fn run(
        &self,
        request: &InstallRequest<'_>,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> InstallResult {
        info!("Installing item {}", request.item_id);

        let snapshot = match self.store.get(&request.item_id) {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => InstallSnapshot::new(request.item_id.clone(), 0, ""),
            Err(err) => {
                warn!("Unable to read install state of {}: {err}", request.item_id);
                InstallSnapshot::new(request.item_id.clone(), 0, "")
            }
        };

        let mut ctx = InstallContext::new(&self.settings.temp_root, snapshot);
        let _temp = TempGuard(ctx.temp_root.clone());

        let env = StepEnv {
            request,
            catalog: &self.catalog,
            store: self.store.as_ref(),
            settings: &self.settings,
            progress,
            cancel,
        };

        self.run_steps(&mut ctx, &env)
    }

    fn run_steps(&self, ctx: &mut InstallContext, env: &StepEnv<'_>) -> InstallResult {
        let steps: [&dyn Step; 6] = [
            &ResolveMetadata,
            &ResolveDestination,
            &Download,
            &InstallContent,
            &PostProcess,
            &PersistState,
        ];

        for step in steps {
            if env.cancel.is_cancelled() {
                return self.cancelled(ctx, env);
            }

            ctx.advance(step.phase());
            let phase = ctx.phase();
            ctx.snapshot.mark(InstallStatus::InProgress, phase, None);
            self.persist(&ctx.snapshot);
            env.report(phase, phase.to_string());

            debug!("Running step {}", step.name());
            match step.run(ctx, env) {
                Ok(()) => {}
                Err(StepError::Cancelled) => return self.cancelled(ctx, env),
                Err(err) => return self.failed(ctx, env, &err),
            }
        }

        ctx.snapshot.download_ms = ctx.download_time.millis();
        ctx.snapshot.extract_ms = ctx.extract_time.millis();
        ctx.snapshot.install_ms = ctx.install_time.millis();

        ctx.advance(InstallPhase::Completed);
        ctx.snapshot
            .mark(InstallStatus::Completed, InstallPhase::Completed, None);
        self.persist(&ctx.snapshot);

        let message = format!("Installed {}", ctx.title());
        info!("{message}");
        env.report(InstallPhase::Completed, message.clone());

        InstallResult::completed(message)
    }

    fn failed(&self, ctx: &mut InstallContext, env: &StepEnv<'_>, err: &StepError) -> InstallResult {
        let phase = ctx.phase();
        let message = err.to_string();
        error!("Install of {} failed while {phase}: {message}", ctx.snapshot.item_id);

        ctx.advance(InstallPhase::Failed);
        ctx.snapshot
            .mark(InstallStatus::Failed, phase, Some(message.clone()));
        self.persist(&ctx.snapshot);
        env.report(InstallPhase::Failed, message.clone());

        InstallResult::failed(phase, message)
    }

    fn cancelled(&self, ctx: &mut InstallContext, env: &StepEnv<'_>) -> InstallResult {
        warn!("Install of {} was cancelled", ctx.snapshot.item_id);
        let result = InstallResult::cancelled();

        ctx.advance(InstallPhase::Cancelled);
        ctx.snapshot.mark(
            InstallStatus::Cancelled,
            InstallPhase::Cancelled,
            Some(result.message.clone()),
        );
        self.persist(&ctx.snapshot);
        env.report(InstallPhase::Cancelled, result.message.clone());

        result
    }

    fn persist(&self, snapshot: &InstallSnapshot) {
        if let Err(err) = self.store.upsert(snapshot) {
            warn!("Unable to store install state of {}: {err}", snapshot.item_id);
        }
    }
}

/// Removes the per-run temp directory when the run ends, however it ends.
struct TempGuard(PathBuf);

impl Drop for TempGuard {
    fn drop(&mut self) {
        remove_temp(&self.0);
    }
}

fn remove_temp(path: &Path) {
    if !path.exists() {
        return;
    }

    debug!("Removing {}", path.display());
    if let Err(err) = fs::remove_dir_all(path) {
        warn!("Unable to remove {}: {err}", path.display());
    }
}
