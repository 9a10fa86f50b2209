use std::fs;

use log::{info, warn};
use romlink_cfg::Scenario;

use crate::{
    context::{sanitize_directory_name, InstallContext},
    phase::InstallPhase,
};

use super::{required, Step, StepEnv, StepError};

/// Picks the platform mapping of the item and the directories content goes to.
pub struct ResolveDestination;

impl Step for ResolveDestination {
    fn name(&self) -> &'static str {
        "resolve-destination"
    }

    fn phase(&self) -> InstallPhase {
        InstallPhase::ResolvingDestination
    }

    fn run(&self, ctx: &mut InstallContext, env: &StepEnv<'_>) -> Result<(), StepError> {
        let item_id = &env.request.item_id;
        let item = env.request.host.item(item_id).ok_or_else(|| {
            StepError::failed(format!("Library item `{item_id}` does not exist."))
        })?;

        let (platform, mapping) = env.settings.platform(&item.platform).ok_or_else(|| {
            StepError::failed(format!(
                "Platform `{}` is not mapped to a catalog platform.",
                item.platform
            ))
        })?;

        let rom = required(ctx.rom.as_ref(), "metadata")?;
        if !rom.platform_slug.is_empty() && rom.platform_slug != mapping.catalog {
            warn!(
                "Rom {} belongs to catalog platform `{}`, but `{platform}` maps to `{}`",
                rom.id, rom.platform_slug, mapping.catalog
            );
        }

        let install_root = mapping.install_dir()?;
        let download_dir = mapping.download_dir()?;

        let install_dir = if mapping.native || mapping.scenario != Scenario::Basic {
            let name = sanitize_directory_name(&item.title);
            let name = if name.is_empty() {
                sanitize_directory_name(rom.title())
            } else {
                name
            };

            if name.is_empty() {
                return Err(StepError::failed(format!(
                    "Unable to derive a directory name for `{}`.",
                    item.title
                )));
            }

            install_root.join(name)
        } else {
            download_dir.clone()
        };

        for dir in [&install_root, &download_dir] {
            fs::create_dir_all(dir).map_err(|err| {
                StepError::failed(format!("Directory {} is not usable. {err}", dir.display()))
            })?;
        }

        info!(
            "Installing `{}` for `{platform}` into {}",
            item.title,
            install_dir.display()
        );

        ctx.snapshot.platform = platform.to_owned();
        ctx.snapshot.install_root = Some(install_root.clone());
        ctx.platform = Some(platform.to_owned());
        ctx.mapping = Some(mapping.clone());
        ctx.install_root = Some(install_root);
        ctx.download_dir = Some(download_dir);
        ctx.install_dir = Some(install_dir);
        ctx.item = Some(item);

        Ok(())
    }
}
