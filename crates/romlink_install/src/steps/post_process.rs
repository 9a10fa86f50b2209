use std::{
    path::{Path, PathBuf},
    time::SystemTime,
};

use log::info;

use crate::{context::InstallContext, host::AdditionalApp, phase::InstallPhase};

use super::{required, Step, StepEnv, StepError};

/// Points the host item at the installed content and completes the snapshot.
pub struct PostProcess;

impl Step for PostProcess {
    fn name(&self) -> &'static str {
        "post-process"
    }

    fn phase(&self) -> InstallPhase {
        InstallPhase::PostProcessing
    }

    fn run(&self, ctx: &mut InstallContext, env: &StepEnv<'_>) -> Result<(), StepError> {
        let executable = ctx
            .executable
            .clone()
            .ok_or_else(|| StepError::failed("No launch path was resolved."))?;
        let installed_path = required(ctx.installed_path.as_ref(), "installed path")?.clone();
        let mapping = required(ctx.mapping.as_ref(), "platform mapping")?;
        let platform = ctx.platform.clone().unwrap_or_default();

        let host_root = env.settings.host_root.as_deref();
        let application_path = host_relative(&executable, host_root);

        let mut item = required(ctx.item.as_ref(), "library item")?.clone();
        item.installed = true;
        item.application_path = Some(application_path.clone());
        item.command_line.clone_from(&ctx.launch_args);

        let mut apps = Vec::new();
        if mapping.native {
            if let Some(uninstaller) = &ctx.uninstaller {
                apps.push(AdditionalApp {
                    name: format!("Uninstall {}", item.title),
                    application_path: host_relative(uninstaller, host_root),
                    command_line: None,
                });
            }
        } else {
            let emulator = mapping
                .emulator
                .clone()
                .or_else(|| env.request.host.default_emulator(&platform));

            if let Some(emulator) = emulator {
                info!("Launching `{}` with {emulator}", item.title);
                item.emulator = Some(emulator);

                apps.push(AdditionalApp {
                    name: format!("Play {} directly", item.title),
                    application_path: application_path.clone(),
                    command_line: ctx.launch_args.clone(),
                });
            }
        }

        env.request.host.update_item(&item)?;
        ctx.additional_apps = apps;
        ctx.item = Some(item);

        let now = SystemTime::now();
        let snapshot = &mut ctx.snapshot;
        snapshot.is_installed = true;
        snapshot.installed_path = Some(installed_path);
        snapshot.launch_path = Some(application_path);
        snapshot.launch_args.clone_from(&ctx.launch_args);
        snapshot.archive_path = ctx
            .archive_path
            .clone()
            .filter(|p| !p.starts_with(&ctx.temp_root));
        snapshot.install_root.clone_from(&ctx.install_root);
        snapshot.install_type = ctx.install_type;
        snapshot.installed_at = Some(now);
        snapshot.last_validated_at = Some(now);

        Ok(())
    }
}

/// Path as the host stores it: relative to the host root when below it.
fn host_relative(path: &Path, host_root: Option<&Path>) -> String {
    host_root
        .and_then(|root| path.strip_prefix(root).ok())
        .map_or_else(|| PathBuf::from(path), Path::to_path_buf)
        .to_string_lossy()
        .into_owned()
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use pretty_assertions::assert_eq;

    use super::host_relative;

    #[test]
    fn relative_to_host_root() {
        let exe = Path::new("/data/games/Game/game.exe");

        assert_eq!(
            host_relative(exe, Some(Path::new("/data"))),
            Path::new("games").join("Game").join("game.exe").to_string_lossy()
        );
        assert_eq!(
            host_relative(exe, Some(Path::new("/other"))),
            exe.to_string_lossy()
        );
        assert_eq!(host_relative(exe, None), exe.to_string_lossy());
    }
}
