//! Finds the executable that launches an installed game.
//!
//! Resolution order:
//! 1. a GOG `goggame-*.info` manifest with a primary play task,
//! 2. when exactly one `.exe` exists, that executable,
//! 3. otherwise every candidate is scored and the caller is asked to confirm
//!    the best one. Scoring looks at depth below the root, edit distance between
//!    the file name and the title, architecture, names hinted by `.lnk` shortcuts,
//!    and penalises uninstallers, setups and redistributables.

use std::{
    collections::BTreeSet,
    fs, io,
    path::{Path, PathBuf},
};

use log::{debug, warn};
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use serde::Deserialize;
use walkdir::WalkDir;

use crate::windows::is_executable;

const MAX_DEPTH: usize = 6;

const PENALISED_NAMES: &[&str] = &[
    "unins",
    "uninstall",
    "setup",
    "install",
    "redist",
    "vcredist",
    "dxsetup",
    "dxwebsetup",
    "directx",
    "dotnet",
    "crashhandler",
    "crashreport",
    "crashpad",
    "prereq",
    "updater",
    "patcher",
    "config",
];

const PENALISED_DIRS: &[&str] = &[
    "redist",
    "_commonredist",
    "__installer",
    "directx",
    "support",
    "installers",
];

#[derive(Copy, Clone, Hash, PartialEq, Eq, Debug)]
pub enum Arch {
    X86,
    X64,
}

impl Arch {
    #[must_use]
    pub fn native() -> Self {
        if cfg!(target_pointer_width = "64") {
            Arch::X64
        } else {
            Arch::X86
        }
    }

    /// Architecture suggested by the directory names or file name of a path.
    fn of(relative: &Path) -> Option<Self> {
        relative.iter().rev().find_map(|part| {
            let part = part.to_string_lossy().to_lowercase();
            let stem = part.strip_suffix(".exe").unwrap_or(&part);

            if ["x64", "win64", "bin64", "amd64"].contains(&stem) || stem.ends_with("64") {
                Some(Arch::X64)
            } else if ["x86", "win32", "bin32", "i386"].contains(&stem) || stem.ends_with("32")
            {
                Some(Arch::X86)
            } else {
                None
            }
        })
    }
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Executable {
    pub path: PathBuf,
    pub arguments: Option<String>,
}

impl Executable {
    fn plain(path: PathBuf) -> Self {
        Self {
            path,
            arguments: None,
        }
    }
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Candidate {
    pub path: PathBuf,
    pub score: i64,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Resolution {
    Resolved(Executable),
    /// Several plausible executables; `preferred` is the best scored one.
    NeedsConfirmation {
        preferred: Executable,
        candidates: Vec<Candidate>,
    },
    NotFound,
}

impl Resolution {
    /// The executable to use, confirmed or not.
    #[must_use]
    pub fn executable(&self) -> Option<&Executable> {
        match self {
            Resolution::Resolved(executable)
            | Resolution::NeedsConfirmation {
                preferred: executable,
                ..
            } => Some(executable),
            Resolution::NotFound => None,
        }
    }
}

pub struct Resolver<'a> {
    title: &'a str,
    arch: Arch,
}

impl<'a> Resolver<'a> {
    #[must_use]
    pub fn new(title: &'a str) -> Self {
        Self {
            title,
            arch: Arch::native(),
        }
    }

    #[cfg(test)]
    #[must_use]
    pub fn with_arch(mut self, arch: Arch) -> Self {
        self.arch = arch;
        self
    }

    pub fn resolve(&self, root: &Path) -> Result<Resolution, io::Error> {
        if let Some(executable) = manifest(root)? {
            debug!("Resolved {} from manifest", executable.path.display());
            return Ok(Resolution::Resolved(executable));
        }

        let executables = WalkDir::new(root)
            .max_depth(MAX_DEPTH)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file() && is_executable(e.path()))
            .map(walkdir::DirEntry::into_path)
            .collect::<Vec<_>>();

        match executables.len() {
            0 => return Ok(Resolution::NotFound),
            1 => {
                let path = executables.into_iter().next().unwrap_or_default();
                return Ok(Resolution::Resolved(Executable::plain(path)));
            }
            _ => {}
        }

        let hints = shortcut_hints(root);
        let title = normalize(self.title);

        let mut candidates = executables
            .par_iter()
            .map(|path| Candidate {
                path: path.clone(),
                score: self.score(root, path, &title, &hints),
            })
            .collect::<Vec<_>>();

        candidates.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.path.cmp(&b.path)));
        debug!("Executable candidates: {candidates:#?}");

        let preferred = Executable::plain(candidates[0].path.clone());
        Ok(Resolution::NeedsConfirmation {
            preferred,
            candidates,
        })
    }

    fn score(&self, root: &Path, path: &Path, title: &str, hints: &BTreeSet<String>) -> i64 {
        let relative = path.strip_prefix(root).unwrap_or(path);
        let file_name = path
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .to_lowercase();
        let stem = normalize(file_name.strip_suffix(".exe").unwrap_or(&file_name));

        let depth = i64::try_from(relative.components().count()).unwrap_or(i64::MAX / 2);
        let mut score = -15 * (depth - 1);

        score += similarity(&stem, title);
        if !stem.is_empty() && !title.is_empty() && (title.contains(&stem) || stem.contains(title))
        {
            score += 20;
        }

        match Arch::of(relative) {
            Some(arch) if arch == self.arch => score += 10,
            Some(_) => score -= 5,
            None => {}
        }

        if hints.contains(&file_name) {
            score += 40;
        }

        if PENALISED_NAMES.iter().any(|n| stem.contains(n)) {
            score -= 100;
        }

        let dirs = relative.parent().map(Path::iter).into_iter().flatten();
        if dirs
            .map(|d| d.to_string_lossy().to_lowercase())
            .any(|d| PENALISED_DIRS.contains(&d.as_str()))
        {
            score -= 60;
        }

        score
    }
}

/// Lowercase alphanumerics only, `The Witcher 3: Wild Hunt` becomes `thewitcher3wildhunt`.
pub(crate) fn normalize(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// 0 for unrelated names, 60 for identical ones.
fn similarity(a: &str, b: &str) -> i64 {
    let len = a.chars().count().max(b.chars().count());
    if len == 0 {
        return 0;
    }

    let distance = levenshtein(a, b);
    let len = i64::try_from(len).unwrap_or(i64::MAX);
    let distance = i64::try_from(distance).unwrap_or(i64::MAX);
    60 * (len - distance) / len
}

fn levenshtein(a: &str, b: &str) -> usize {
    let b = b.chars().collect::<Vec<_>>();
    let mut row = (0..=b.len()).collect::<Vec<_>>();

    for (i, ca) in a.chars().enumerate() {
        let mut diagonal = row[0];
        row[0] = i + 1;

        for (j, cb) in b.iter().enumerate() {
            let above = row[j + 1];
            row[j + 1] = if ca == *cb {
                diagonal
            } else {
                1 + diagonal.min(above).min(row[j])
            };
            diagonal = above;
        }
    }

    row[b.len()]
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GogManifest {
    #[serde(default)]
    play_tasks: Vec<GogPlayTask>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GogPlayTask {
    #[serde(default)]
    is_primary: bool,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

fn manifest(root: &Path) -> Result<Option<Executable>, io::Error> {
    let Ok(entries) = fs::read_dir(root) else {
        return Ok(None);
    };

    let mut manifests = entries
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| {
            let name = p.file_name().unwrap_or_default().to_string_lossy();
            name.starts_with("goggame-") && name.ends_with(".info")
        })
        .collect::<Vec<_>>();
    manifests.sort();

    for path in manifests {
        let manifest: GogManifest = match serde_json::from_slice(&fs::read(&path)?) {
            Ok(manifest) => manifest,
            Err(err) => {
                warn!("Ignoring unreadable manifest {}: {err}", path.display());
                continue;
            }
        };

        let task = manifest
            .play_tasks
            .into_iter()
            .find(|t| t.is_primary && t.path.is_some());

        if let Some(GogPlayTask {
            path: Some(task_path),
            arguments,
            ..
        }) = task
        {
            let executable = root.join(task_path.replace('\\', "/"));
            if executable.is_file() {
                return Ok(Some(Executable {
                    path: executable,
                    arguments: arguments.filter(|a| !a.trim().is_empty()),
                }));
            }
        }
    }

    Ok(None)
}

/// Lowercase executable names referenced by `.lnk` shortcuts in `root`.
fn shortcut_hints(root: &Path) -> BTreeSet<String> {
    WalkDir::new(root)
        .max_depth(2)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| {
            e.path()
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("lnk"))
        })
        .filter_map(|e| fs::read(e.path()).ok())
        .flat_map(|bytes| shortcut_targets(&bytes))
        .collect()
}

/// Extracts `.exe` file names from the raw bytes of a shortcut. Shortcuts store
/// their target both as ANSI and UTF-16 strings, so both views are searched.
fn shortcut_targets(bytes: &[u8]) -> Vec<String> {
    let ansi = String::from_utf8_lossy(bytes).into_owned();
    let wide = bytes
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .collect::<Vec<_>>();
    let wide = String::from_utf16_lossy(&wide);

    let mut targets = Vec::new();
    for text in [ansi, wide] {
        let lower = text.to_lowercase();
        let chars = lower.chars().collect::<Vec<_>>();

        let mut i = 0;
        while i + 4 <= chars.len() {
            if chars[i..i + 4] == ['.', 'e', 'x', 'e'] {
                let start = chars[..i]
                    .iter()
                    .rposition(|c| matches!(c, '\\' | '/' | ':') || c.is_control())
                    .map_or(0, |p| p + 1);

                let name = chars[start..i + 4].iter().collect::<String>();
                if name.len() > 4 {
                    targets.push(name);
                }
            }
            i += 1;
        }
    }

    targets
}
