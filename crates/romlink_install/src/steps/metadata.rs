use std::{
    sync::{
        mpsc::{self, RecvTimeoutError},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

use log::info;

use crate::{context::InstallContext, phase::InstallPhase};

use super::{Step, StepEnv, StepError};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Loads the catalog record of an imported item.
pub struct ResolveMetadata;

impl Step for ResolveMetadata {
    fn name(&self) -> &'static str {
        "resolve-metadata"
    }

    fn phase(&self) -> InstallPhase {
        InstallPhase::ResolvingMetadata
    }

    fn run(&self, ctx: &mut InstallContext, env: &StepEnv<'_>) -> Result<(), StepError> {
        let snapshot = &ctx.snapshot;
        if snapshot.rom_id == 0 {
            return Err(StepError::failed(format!(
                "Item `{}` was not imported from the catalog.",
                snapshot.item_id
            )));
        }

        let origin = env.catalog.origin();
        if !snapshot.server.is_empty() && snapshot.server != origin {
            return Err(StepError::failed(format!(
                "Item `{}` was imported from {}, not {origin}.",
                snapshot.item_id, snapshot.server
            )));
        }

        env.report(self.phase(), "Fetching metadata");
        let rom = fetch(env, snapshot.rom_id)?;
        info!("Resolved rom {} `{}` ({})", rom.id, rom.title(), rom.fs_name);

        ctx.snapshot.server = origin.to_owned();
        ctx.snapshot.file_name = Some(rom.fs_name.clone());
        ctx.rom = Some(rom);

        Ok(())
    }
}

/// Requests the rom on a worker thread so that the wait can be bounded by the
/// metadata timeout and interrupted by cancellation. A request that outlives
/// the timeout is abandoned; its thread ends whenever the request does.
fn fetch(env: &StepEnv<'_>, rom_id: u64) -> Result<romlink_catalog::Rom, StepError> {
    let timeout = env.settings.metadata_timeout;
    let catalog = Arc::clone(env.catalog);
    let (tx, rx) = mpsc::channel();

    thread::Builder::new()
        .name(format!("metadata-{rom_id}"))
        .spawn(move || {
            let _ = tx.send(catalog.rom(rom_id));
        })?;

    let deadline = Instant::now() + timeout;
    loop {
        env.check_cancelled()?;

        let now = Instant::now();
        if now >= deadline {
            return Err(StepError::failed(format!(
                "Metadata request timed out after {:.1}s.",
                timeout.as_secs_f64()
            )));
        }

        match rx.recv_timeout((deadline - now).min(POLL_INTERVAL)) {
            Ok(rom) => return Ok(rom?),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                return Err(StepError::failed("Metadata request ended without a response."))
            }
        }
    }
}
