//! Classification and installation of Windows game content.

use std::{
    fs::{self, File},
    io::{self, Read},
    path::{Path, PathBuf},
};

use log::debug;
use serde::{Deserialize, Serialize};

pub use runner::{InstallerRunner, RunError};
pub use staging::Staging;

mod runner;
mod staging;

/// Bytes of an installer inspected for family markers.
const SNIFF_LEN: u64 = 4 * 1024 * 1024;

#[derive(Serialize, Deserialize, Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum InstallType {
    Portable,
    Installer,
    Unknown,
}

impl std::fmt::Display for InstallType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            InstallType::Portable => "portable",
            InstallType::Installer => "installer",
            InstallType::Unknown => "unknown",
        })
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum InstallerFamily {
    Inno,
    Nsis,
    Msi,
    Unknown,
}

impl InstallerFamily {
    /// Detects the installer family from the file extension and embedded markers.
    pub fn detect(path: &Path) -> Result<Self, io::Error> {
        if has_extension(path, "msi") {
            return Ok(InstallerFamily::Msi);
        }

        let mut head = Vec::new();
        File::open(path)?.take(SNIFF_LEN).read_to_end(&mut head)?;

        let family = if contains(&head, b"Inno Setup") {
            InstallerFamily::Inno
        } else if contains(&head, b"Nullsoft") || contains(&head, b"NSIS") {
            InstallerFamily::Nsis
        } else {
            InstallerFamily::Unknown
        };

        debug!("Installer {} detected as {family:?}", path.display());
        Ok(family)
    }

    /// Arguments for an unattended install into `target`.
    #[must_use]
    pub fn silent_args(self, target: &str) -> Vec<String> {
        match self {
            InstallerFamily::Inno => vec![
                "/VERYSILENT".to_owned(),
                "/SUPPRESSMSGBOXES".to_owned(),
                "/NORESTART".to_owned(),
                "/SP-".to_owned(),
                format!("/DIR={target}"),
            ],
            InstallerFamily::Msi => vec![
                "/qn".to_owned(),
                format!("TARGETDIR={target}"),
                format!("INSTALLDIR={target}"),
            ],
            // NSIS requires `/D=` to be the last argument.
            InstallerFamily::Nsis | InstallerFamily::Unknown => {
                vec!["/S".to_owned(), format!("/D={target}")]
            }
        }
    }
}

/// What downloaded Windows content turned out to be.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Content {
    Installer(PathBuf),
    Portable,
    Unknown,
}

impl Content {
    #[must_use]
    pub fn install_type(&self) -> InstallType {
        match self {
            Content::Installer(_) => InstallType::Installer,
            Content::Portable => InstallType::Portable,
            Content::Unknown => InstallType::Unknown,
        }
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

pub(crate) fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .is_some_and(|e| e.to_string_lossy().eq_ignore_ascii_case(ext))
}

pub(crate) fn is_executable(path: &Path) -> bool {
    has_extension(path, "exe")
}

/// `setup.exe`, `setup_game_1.0.exe`, `install.exe` and any `.msi`.
pub(crate) fn is_installer_name(path: &Path) -> bool {
    if has_extension(path, "msi") {
        return true;
    }

    if !is_executable(path) {
        return false;
    }

    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    stem.starts_with("setup") || stem.starts_with("install")
}

/// Classifies content as installer based or portable.
///
/// Any executable that does not look like an installer makes the content portable.
/// Otherwise an installer at the top level is picked, preferring `.exe` over `.msi`.
pub fn classify(content: &Path) -> Result<Content, io::Error> {
    if content.is_file() {
        return Ok(if is_installer_name(content) {
            Content::Installer(content.to_path_buf())
        } else if is_executable(content) {
            Content::Portable
        } else {
            Content::Unknown
        });
    }

    let portable = walkdir::WalkDir::new(content)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .any(|e| is_executable(e.path()) && !is_installer_name(e.path()));

    if portable {
        return Ok(Content::Portable);
    }

    let mut installers = fs::read_dir(content)?
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| p.is_file() && is_installer_name(p))
        .collect::<Vec<_>>();

    installers.sort_by_key(|p| (has_extension(p, "msi"), p.clone()));

    Ok(installers
        .into_iter()
        .next()
        .map_or(Content::Unknown, Content::Installer))
}

#[cfg(test)]
mod tests {
    use std::{fs, path::Path};

    use pretty_assertions::assert_eq;

    use super::{classify, is_installer_name, Content, InstallerFamily};

    fn touch(path: &Path, content: &[u8]) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn installer_names() {
        assert!(is_installer_name(Path::new("setup.exe")));
        assert!(is_installer_name(Path::new("setup_outer_wilds_1.0.exe")));
        assert!(is_installer_name(Path::new("Install.EXE")));
        assert!(is_installer_name(Path::new("game.msi")));
        assert!(!is_installer_name(Path::new("game.exe")));
        assert!(!is_installer_name(Path::new("setup.bin")));
    }

    #[test]
    fn classify_directories() {
        let dir = tempfile::tempdir().unwrap();

        let portable = dir.path().join("portable");
        touch(&portable.join("bin").join("game.exe"), b"MZ");
        touch(&portable.join("setup.exe"), b"MZ");
        assert_eq!(classify(&portable).unwrap(), Content::Portable);

        let installer = dir.path().join("installer");
        touch(&installer.join("setup_game.exe"), b"MZ");
        touch(&installer.join("setup_game-1.bin"), b"");
        touch(&installer.join("game.msi"), b"");
        assert_eq!(
            classify(&installer).unwrap(),
            Content::Installer(installer.join("setup_game.exe"))
        );

        let unknown = dir.path().join("unknown");
        touch(&unknown.join("readme.txt"), b"");
        assert_eq!(classify(&unknown).unwrap(), Content::Unknown);
    }

    #[test]
    fn classify_files() {
        let dir = tempfile::tempdir().unwrap();
        let exe = dir.path().join("game.exe");
        let setup = dir.path().join("setup.exe");
        touch(&exe, b"MZ");
        touch(&setup, b"MZ");

        assert_eq!(classify(&exe).unwrap(), Content::Portable);
        assert_eq!(classify(&setup).unwrap(), Content::Installer(setup.clone()));
    }

    #[test]
    fn installer_family() {
        let dir = tempfile::tempdir().unwrap();
        let inno = dir.path().join("inno.exe");
        let nsis = dir.path().join("nsis.exe");
        let other = dir.path().join("other.exe");
        touch(&inno, b"MZ....Inno Setup Setup Data (6.2.0)");
        touch(&nsis, b"MZ....NullsoftInst");
        touch(&other, b"MZ");

        assert_eq!(InstallerFamily::detect(&inno).unwrap(), InstallerFamily::Inno);
        assert_eq!(InstallerFamily::detect(&nsis).unwrap(), InstallerFamily::Nsis);
        assert_eq!(
            InstallerFamily::detect(&other).unwrap(),
            InstallerFamily::Unknown
        );
        assert_eq!(
            InstallerFamily::detect(Path::new("x.msi")).unwrap(),
            InstallerFamily::Msi
        );

        assert_eq!(
            InstallerFamily::Nsis.silent_args("C:\\Games\\X").last().unwrap(),
            "/D=C:\\Games\\X"
        );
    }
}
