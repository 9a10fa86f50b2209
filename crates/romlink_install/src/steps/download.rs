use std::{
    fs::{self, File},
    io::{BufWriter, Read, Write},
    path::{Path, PathBuf},
};

use log::{debug, info};
use romlink_cfg::{Extraction, Scenario};

use crate::{
    archive,
    context::{sanitize_directory_name, InstallContext},
    phase::InstallPhase,
    relocate,
};

use super::{required, Step, StepEnv, StepError};

const CHUNK: usize = 64 * 1024;

/// Streams the content into the run's temp directory and unpacks it.
pub struct Download;

impl Step for Download {
    fn name(&self) -> &'static str {
        "download"
    }

    fn phase(&self) -> InstallPhase {
        InstallPhase::Downloading
    }

    fn run(&self, ctx: &mut InstallContext, env: &StepEnv<'_>) -> Result<(), StepError> {
        let rom = required(ctx.rom.as_ref(), "metadata")?.clone();
        let mapping = required(ctx.mapping.as_ref(), "platform mapping")?.clone();

        fs::create_dir_all(&ctx.temp_root)?;

        let file_name = Path::new(&rom.fs_name)
            .file_name()
            .map_or_else(|| format!("rom-{}", rom.id), |n| n.to_string_lossy().into_owned());
        let archive_path = ctx.temp_root.join(&file_name);

        ctx.download_time.start();
        download(env, &rom, &archive_path)?;
        ctx.download_time.stop();
        ctx.archive_path = Some(archive_path.clone());

        let content = if mapping.extraction == Extraction::None {
            archive_path
        } else if !archive::is_archive(&archive_path) {
            info!("{file_name} is not an archive, skipping extraction");
            archive_path
        } else {
            ctx.advance(InstallPhase::Extracting);
            env.report(InstallPhase::Extracting, format!("Extracting {file_name}"));

            ctx.extract_time.start();
            let extracted = extract(env, &archive_path, &ctx.temp_root, mapping.extraction)?;
            ctx.extract_time.stop();

            fs::remove_file(&archive_path)?;
            ctx.extracted_path = Some(extracted.clone());
            extracted
        };

        // Nothing later in the pipeline moves content for plain roms, so it goes to its place now.
        let content = if !mapping.native && mapping.scenario == Scenario::Basic {
            let download_dir = required(ctx.download_dir.as_ref(), "download directory")?;
            let fallback = sanitize_directory_name(ctx.title());
            let fallback = if fallback.is_empty() {
                archive::stem(&content)
            } else {
                fallback
            };

            let placed = relocate::place(&content, mapping.extraction, download_dir, &fallback)?;
            if placed.is_file() && archive::is_archive(&placed) {
                ctx.archive_path = Some(placed.clone());
            }
            ctx.installed_path = Some(placed.clone());
            placed
        } else {
            content
        };

        ctx.content_path = Some(content);
        Ok(())
    }
}

fn download(env: &StepEnv<'_>, rom: &romlink_catalog::Rom, path: &Path) -> Result<(), StepError> {
    let name = path.file_name().unwrap_or_default().to_string_lossy();
    env.report(InstallPhase::Downloading, format!("Downloading {name}"));

    let mut stream = env.catalog.content(rom)?;
    let total = stream.len.filter(|len| *len > 0);

    let mut out = BufWriter::new(File::create(path)?);
    let mut buf = vec![0; CHUNK];
    let mut written = 0u64;
    let mut reported = None;

    loop {
        env.check_cancelled()?;

        let read = stream.body.read(&mut buf)?;
        if read == 0 {
            break;
        }

        out.write_all(&buf[..read])?;
        written += read as u64;

        if let Some(total) = total {
            #[allow(clippy::cast_precision_loss)]
            let percent = (written as f64 / total as f64 * 100.0).floor();
            if reported != Some(percent) {
                reported = Some(percent);
                env.report_percent(InstallPhase::Downloading, format!("Downloading {name}"), percent);
            }
        }
    }

    out.flush()?;
    debug!("Downloaded {written} bytes to {}", path.display());

    Ok(())
}

/// Unpacks into `<temp>/extracted`, or `<temp>/extracted/<archive stem>` for subfolder
/// extraction, and returns the directory holding the content.
fn extract(
    env: &StepEnv<'_>,
    archive_path: &Path,
    temp_root: &Path,
    extraction: Extraction,
) -> Result<PathBuf, StepError> {
    let mut destination = temp_root.join("extracted");
    if extraction == Extraction::Subfolder {
        destination.push(archive::stem(archive_path));
    }

    archive::extract(archive_path, &destination, env.cancel)?;
    archive::flatten_single_directory(&destination)?;

    Ok(destination)
}
