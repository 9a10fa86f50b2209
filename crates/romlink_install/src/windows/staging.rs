use std::{
    fs, io,
    path::{Path, PathBuf},
};

use log::{error, info, warn};
use uuid::Uuid;

/// Per-run directory an install is built in before it replaces the final directory.
///
/// The directory is removed on drop unless it was committed.
pub struct Staging {
    path: PathBuf,
    committed: bool,
}

impl Staging {
    /// Creates `<root>/.staging-<operation id>`.
    pub fn create(root: &Path, operation_id: Uuid) -> Result<Self, io::Error> {
        let path = root.join(format!(".staging-{operation_id}"));
        fs::create_dir_all(&path)?;

        info!("Created staging directory {}", path.display());
        Ok(Self {
            path,
            committed: false,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Swaps the staged directory into `target`.
    ///
    /// An existing `target` is first renamed to a `.previous` sibling and deleted
    /// after the staged tree is in place. These are two separate renames: a crash
    /// between them can leave neither version at `target`.
    pub fn commit(mut self, target: &Path) -> Result<(), io::Error> {
        let previous = previous_path(target);

        if previous.exists() {
            warn!("Removing stale {}", previous.display());
            fs::remove_dir_all(&previous)?;
        }

        let replacing = target.exists();
        if replacing {
            fs::rename(target, &previous)?;
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }

        if let Err(err) = fs::rename(&self.path, target) {
            if replacing {
                if let Err(restore) = fs::rename(&previous, target) {
                    error!(
                        "Unable to restore {} from {}: {restore}",
                        target.display(),
                        previous.display()
                    );
                }
            }
            return Err(err);
        }

        self.committed = true;
        info!("Committed {} to {}", self.path.display(), target.display());

        if replacing {
            if let Err(err) = fs::remove_dir_all(&previous) {
                warn!("Unable to remove {}: {err}", previous.display());
            }
        }

        Ok(())
    }
}

impl Drop for Staging {
    fn drop(&mut self) {
        if !self.committed && self.path.exists() {
            info!("Removing {path}", path = self.path.display());
            let _ = fs::remove_dir_all(&self.path);
        }
    }
}

fn previous_path(target: &Path) -> PathBuf {
    let mut name = target.file_name().unwrap_or_default().to_os_string();
    name.push(".previous");
    target.with_file_name(name)
}
