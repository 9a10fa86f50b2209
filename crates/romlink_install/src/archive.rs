use std::{
    fs::{self, File},
    io::{self, BufReader},
    path::{Path, PathBuf},
    process::{Command, Stdio},
};

use flate2::read::GzDecoder;
use log::{debug, info};
use tar::Archive;
use xz2::read::XzDecoder;
use zstd::stream::Decoder as ZstDecoder;

use crate::progress::CancellationToken;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO error. {0}")]
    Io(#[from] io::Error),
    #[error("Zip error. {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("Unknown archive format for file {0}.")]
    UnknownFormat(String),
    #[error("7-Zip is required to extract {0} but was not found. {1}")]
    SevenZipMissing(String, which::Error),
    #[error("7-Zip exited with {0}.")]
    SevenZip(std::process::ExitStatus),
    #[error("Extraction was cancelled.")]
    Cancelled,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
enum Format {
    Zip,
    Tar,
    TarGz,
    TarXz,
    TarZst,
    SevenZip,
}

impl Format {
    fn of(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_string_lossy().to_lowercase();

        Some(match name {
            n if n.ends_with(".zip") => Format::Zip,
            n if n.ends_with(".tar.gz") || n.ends_with(".tgz") => Format::TarGz,
            n if n.ends_with(".tar.xz") => Format::TarXz,
            n if n.ends_with(".tar.zst") => Format::TarZst,
            n if n.ends_with(".tar") => Format::Tar,
            n if n.ends_with(".7z") => Format::SevenZip,
            _ => return None,
        })
    }
}

#[must_use]
pub fn is_archive(path: &Path) -> bool {
    Format::of(path).is_some()
}

/// File name without archive extensions, `Game.tar.gz` becomes `Game`.
#[must_use]
pub fn stem(path: &Path) -> String {
    let name = path.file_name().unwrap_or_default().to_string_lossy();
    let lower = name.to_lowercase();

    [".tar.gz", ".tar.xz", ".tar.zst", ".tgz", ".tar", ".zip", ".7z"]
        .iter()
        .find(|ext| lower.ends_with(*ext))
        .map_or_else(
            || {
                Path::new(name.as_ref())
                    .file_stem()
                    .unwrap_or_default()
                    .to_string_lossy()
                    .into_owned()
            },
            |ext| name[..name.len() - ext.len()].to_owned(),
        )
}

fn untar(tar: impl io::Read, destination: &Path, cancel: &CancellationToken) -> Result<(), Error> {
    let mut archive = Archive::new(tar);

    for entry in archive.entries()? {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        entry?.unpack_in(destination)?;
    }

    Ok(())
}

fn unzip(file: File, destination: &Path, cancel: &CancellationToken) -> Result<(), Error> {
    let mut archive = zip::ZipArchive::new(BufReader::new(file))?;

    for i in 0..archive.len() {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let mut entry = archive.by_index(i)?;
        let Some(path) = entry.enclosed_name().map(|p| destination.join(p)) else {
            debug!("Skipping unsafe zip entry {}", entry.name());
            continue;
        };

        if entry.is_dir() {
            fs::create_dir_all(&path)?;
            continue;
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut out = File::create(&path)?;
        io::copy(&mut entry, &mut out)?;
    }

    Ok(())
}

fn un7z(archive: &Path, destination: &Path) -> Result<(), Error> {
    let name = archive.display().to_string();
    let binary = which::which("7z")
        .or_else(|_| which::which("7za"))
        .map_err(|e| Error::SevenZipMissing(name, e))?;

    let mut output = std::ffi::OsString::from("-o");
    output.push(destination);

    let status = Command::new(binary)
        .arg("x")
        .arg("-y")
        .arg(output)
        .arg(archive)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::inherit())
        .status()?;

    if !status.success() {
        return Err(Error::SevenZip(status));
    }

    Ok(())
}

/// Extracts an archive into `destination`, which is created if needed.
pub fn extract(archive: &Path, destination: &Path, cancel: &CancellationToken) -> Result<(), Error> {
    let format = Format::of(archive)
        .ok_or_else(|| Error::UnknownFormat(archive.display().to_string()))?;

    info!(
        "Extracting {} ({format:?}) into {}",
        archive.display(),
        destination.display()
    );
    fs::create_dir_all(destination)?;

    let open = || File::open(archive).map(BufReader::new);

    match format {
        Format::Zip => unzip(File::open(archive)?, destination, cancel),
        Format::Tar => untar(open()?, destination, cancel),
        Format::TarGz => untar(GzDecoder::new(open()?), destination, cancel),
        Format::TarXz => untar(XzDecoder::new(open()?), destination, cancel),
        Format::TarZst => untar(ZstDecoder::new(open()?)?, destination, cancel),
        Format::SevenZip => un7z(archive, destination),
    }
}

/// Returns the only entry of `path` when it is a directory.
fn single_directory(path: &Path) -> Result<Option<PathBuf>, io::Error> {
    let mut entries = fs::read_dir(path)?;

    let Some(entry) = entries.next() else {
        return Ok(None);
    };
    let entry_path = entry?.path();

    if entry_path.is_dir() && entries.next().is_none() {
        Ok(Some(entry_path))
    } else {
        Ok(None)
    }
}

/// Archives often wrap everything in one top level directory. Moves its
/// contents up a level so `path` holds the content directly.
pub fn flatten_single_directory(path: &Path) -> Result<bool, io::Error> {
    let Some(inner) = single_directory(path)? else {
        return Ok(false);
    };

    debug!("Flattening {}", inner.display());

    let temp_path = path.join(uuid::Uuid::new_v4().to_string());
    fs::rename(&inner, &temp_path)?;
    let _guard = DirGuard::new(&temp_path);

    for entry in fs::read_dir(&temp_path)? {
        let entry = entry?;
        fs::rename(entry.path(), path.join(entry.file_name()))?;
    }

    Ok(true)
}

struct DirGuard<'a> {
    path: &'a Path,
}

impl<'a> DirGuard<'a> {
    fn new(path: &'a Path) -> Self {
        Self { path }
    }
}

impl Drop for DirGuard<'_> {
    fn drop(&mut self) {
        debug!("Removing {path}", path = self.path.display());
        let _ = fs::remove_dir_all(self.path);
    }
}
