use std::{
    fs,
    path::{Path, PathBuf},
};

use log::{info, warn};
use romlink_cfg::{PlatformMapping, Scenario};
use walkdir::WalkDir;

use crate::{
    context::InstallContext,
    phase::InstallPhase,
    relocate,
    resolver::{Resolution, Resolver},
    windows::{self, Content, InstallType, InstallerRunner, Staging},
};

use super::{required, Step, StepEnv, StepError};

/// Turns downloaded content into a launchable install.
pub struct InstallContent;

impl Step for InstallContent {
    fn name(&self) -> &'static str {
        "install-content"
    }

    fn phase(&self) -> InstallPhase {
        InstallPhase::Installing
    }

    fn run(&self, ctx: &mut InstallContext, env: &StepEnv<'_>) -> Result<(), StepError> {
        let mapping = required(ctx.mapping.as_ref(), "platform mapping")?.clone();

        ctx.install_time.start();
        if mapping.native {
            install_native(ctx, env)?;
        } else {
            match mapping.scenario {
                Scenario::Basic => install_basic(ctx, &mapping)?,
                Scenario::Enhanced => install_enhanced(ctx, env, &mapping)?,
                Scenario::Installer => install_with_installer(ctx, env, &mapping)?,
            }
        }
        ctx.install_time.stop();

        Ok(())
    }
}

/// Windows content, built in a staging directory and swapped into place.
fn install_native(ctx: &mut InstallContext, env: &StepEnv<'_>) -> Result<(), StepError> {
    let content = required(ctx.content_path.as_ref(), "content")?.clone();
    let install_root = required(ctx.install_root.as_ref(), "install root")?.clone();
    let install_dir = required(ctx.install_dir.as_ref(), "install directory")?.clone();

    let staging = Staging::create(&install_root, ctx.operation_id)?;
    ctx.staging_dir = Some(staging.path().to_path_buf());

    let kind = windows::classify(&content)?;
    ctx.install_type = Some(kind.install_type());
    info!("Content of `{}` is {}", ctx.title(), kind.install_type());

    match kind {
        Content::Installer(installer) => {
            env.report(InstallPhase::Installing, "Running installer");

            let runner = InstallerRunner::new(env.settings.installer_wrapper.clone());
            fs::create_dir_all(&install_dir)?;
            let status = runner.install(&installer, &install_dir, env.cancel)?;
            if !status.success() {
                return Err(StepError::failed(exit_message(&installer, status)));
            }

            // The installer wrote straight into the final directory.
            drop(staging);
            resolve_executable(ctx, &install_dir)?;
        }
        Content::Portable | Content::Unknown => {
            env.report(InstallPhase::Installing, "Copying files");

            if content.is_dir() {
                relocate::move_children(&content, staging.path())?;
            } else {
                let name = content.file_name().unwrap_or_default();
                relocate::move_path(&content, &staging.path().join(name))?;
            }

            let staged = staging.path().to_path_buf();
            resolve_executable(ctx, &staged)?;

            staging.commit(&install_dir)?;
            ctx.rewrite_paths(&staged, &install_dir);
        }
    }

    ctx.uninstaller = find_uninstaller(&install_dir);
    ctx.installed_path = Some(install_dir);

    Ok(())
}

fn resolve_executable(ctx: &mut InstallContext, root: &Path) -> Result<(), StepError> {
    let resolution = Resolver::new(ctx.title()).resolve(root)?;

    let executable = resolution.executable().cloned().ok_or_else(|| {
        StepError::failed(format!("No executable found for `{}`.", ctx.title()))
    })?;

    if let Resolution::NeedsConfirmation { candidates, .. } = resolution {
        warn!(
            "{} executables found, using {} without confirmation",
            candidates.len(),
            executable.path.display()
        );
        ctx.candidates = candidates;
    }

    info!("Executable: {}", executable.path.display());
    ctx.executable = Some(executable.path);
    ctx.launch_args = executable.arguments;

    Ok(())
}

/// Plain roms were placed by the download step and are launched as they are.
fn install_basic(ctx: &mut InstallContext, mapping: &PlatformMapping) -> Result<(), StepError> {
    let content = required(ctx.content_path.as_ref(), "content")?.clone();

    let launch = match (&mapping.target_file, content.is_dir()) {
        (Some(pattern), true) => locate(&content, pattern)?,
        _ => content.clone(),
    };

    ctx.executable = Some(launch);
    ctx.installed_path = Some(content);
    Ok(())
}

/// Moves content into the item directory and points at the configured target file.
fn install_enhanced(
    ctx: &mut InstallContext,
    env: &StepEnv<'_>,
    mapping: &PlatformMapping,
) -> Result<(), StepError> {
    let content = required(ctx.content_path.as_ref(), "content")?.clone();
    let install_dir = required(ctx.install_dir.as_ref(), "install directory")?.clone();

    env.report(InstallPhase::Installing, "Copying files");
    place_into(&content, &install_dir)?;
    ctx.content_path = Some(install_dir.clone());

    let pattern = mapping.target_file.as_deref().ok_or_else(|| {
        StepError::failed(format!(
            "No target file configured for `{}`.",
            ctx.platform.as_deref().unwrap_or_default()
        ))
    })?;

    ctx.executable = Some(locate(&install_dir, pattern)?);
    ctx.installed_path = Some(install_dir);
    Ok(())
}

/// Runs an installer shipped with the content, then looks for the file it produced.
fn install_with_installer(
    ctx: &mut InstallContext,
    env: &StepEnv<'_>,
    mapping: &PlatformMapping,
) -> Result<(), StepError> {
    let content = required(ctx.content_path.as_ref(), "content")?.clone();
    let install_dir = required(ctx.install_dir.as_ref(), "install directory")?.clone();

    let installer = match (&mapping.installer_file, content.is_dir()) {
        (Some(pattern), true) => locate(&content, pattern)?,
        (None, true) => {
            return Err(StepError::failed(format!(
                "No installer file configured for `{}`.",
                ctx.platform.as_deref().unwrap_or_default()
            )))
        }
        (_, false) => content.clone(),
    };

    fs::create_dir_all(&install_dir)?;
    let runner = InstallerRunner::new(env.settings.installer_wrapper.clone());

    let mut args = mapping.installer_args.clone();
    if let Some(flag) = &mapping.target_dir_flag {
        args.push(format!("{flag}{}", runner.target_path(&install_dir)));
    }

    env.report(InstallPhase::Installing, "Running installer");
    let status = runner.run(runner.command(&installer, &args), env.cancel)?;
    if !status.success() {
        return Err(StepError::failed(exit_message(&installer, status)));
    }

    ctx.install_type = Some(InstallType::Installer);

    let pattern = mapping
        .target_file
        .as_deref()
        .ok_or_else(|| StepError::failed("No target file configured for the installed content."))?;

    ctx.executable = Some(locate(&install_dir, pattern)?);
    ctx.installed_path = Some(install_dir);
    Ok(())
}

fn exit_message(installer: &Path, status: std::process::ExitStatus) -> String {
    let name = installer.file_name().unwrap_or_default().to_string_lossy();
    match status.code() {
        Some(code) => format!("Installer {name} exited with code {code}."),
        None => format!("Installer {name} was terminated ({status})."),
    }
}

fn place_into(content: &Path, dir: &Path) -> Result<(), StepError> {
    if content.is_dir() {
        relocate::move_children(content, dir)?;
    } else {
        let name = content.file_name().unwrap_or_default();
        relocate::move_path(content, &dir.join(name))?;
    }

    Ok(())
}

/// Shallowest file under `root` whose name matches `pattern`, ties broken by path.
fn locate(root: &Path, pattern: &str) -> Result<PathBuf, StepError> {
    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .filter(|e| matches(pattern, &e.file_name().to_string_lossy()))
        .min_by_key(walkdir::DirEntry::depth)
        .map(walkdir::DirEntry::into_path)
        .ok_or_else(|| {
            StepError::failed(format!(
                "File `{pattern}` was not found in {}.",
                root.display()
            ))
        })
}

/// Case-insensitive wildcard match supporting `*` and `?`.
fn matches(pattern: &str, name: &str) -> bool {
    let pattern = pattern.to_lowercase().chars().collect::<Vec<_>>();
    let name = name.to_lowercase().chars().collect::<Vec<_>>();

    let (mut p, mut n) = (0, 0);
    let mut backtrack = None;

    while n < name.len() {
        match pattern.get(p) {
            Some('*') => {
                backtrack = Some((p, n));
                p += 1;
            }
            Some(&c) if c == '?' || c == name[n] => {
                p += 1;
                n += 1;
            }
            _ => match backtrack {
                Some((bp, bn)) => {
                    backtrack = Some((bp, bn + 1));
                    p = bp + 1;
                    n = bn + 1;
                }
                None => return false,
            },
        }
    }

    pattern[p..].iter().all(|c| *c == '*')
}

/// Top level `unins*.exe` left behind by an installer.
fn find_uninstaller(dir: &Path) -> Option<PathBuf> {
    let mut found = fs::read_dir(dir)
        .ok()?
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| {
            let name = p.file_name().unwrap_or_default().to_string_lossy().to_lowercase();
            name.starts_with("unins") && name.ends_with(".exe")
        })
        .collect::<Vec<_>>();

    found.sort();
    found.into_iter().next()
}
