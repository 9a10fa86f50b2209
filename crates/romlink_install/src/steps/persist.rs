use log::{info, warn};

use crate::{context::InstallContext, phase::InstallPhase};

use super::{Step, StepEnv, StepError};

/// Stores the snapshot and lets the host pick up its changes. A finished
/// install stays successful when any of this fails.
pub struct PersistState;

impl Step for PersistState {
    fn name(&self) -> &'static str {
        "persist-state"
    }

    fn phase(&self) -> InstallPhase {
        InstallPhase::PostProcessing
    }

    fn run(&self, ctx: &mut InstallContext, env: &StepEnv<'_>) -> Result<(), StepError> {
        let item_id = &ctx.snapshot.item_id;

        if let Err(err) = env.store.upsert(&ctx.snapshot) {
            warn!("Unable to store install state of {item_id}: {err}");
        }

        if let Err(err) = env
            .request
            .host
            .sync_additional_apps(item_id, &ctx.additional_apps)
        {
            warn!("Unable to update additional apps of {item_id}: {err}");
        }

        if let Err(err) = env.request.host.save_and_reload() {
            warn!("Unable to save the library: {err}");
        }

        info!("Saved install state of {item_id}");
        Ok(())
    }
}
