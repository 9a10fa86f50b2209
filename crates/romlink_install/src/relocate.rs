//! Moves downloaded content out of the per-run temp tree into its final location.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use log::{debug, info};
use romlink_cfg::Extraction;
use walkdir::WalkDir;

/// Moves a file or directory, replacing whatever is at `to`.
///
/// Falls back to copy and delete when a rename is not possible, e.g. across filesystems.
pub fn move_path(from: &Path, to: &Path) -> Result<(), io::Error> {
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent)?;
    }

    if to.is_dir() {
        fs::remove_dir_all(to)?;
    } else if to.exists() {
        fs::remove_file(to)?;
    }

    if let Err(err) = fs::rename(from, to) {
        debug!("Rename {} failed ({err}), copying instead", from.display());
        copy_recursive(from, to)?;
        remove_path(from)?;
    }

    Ok(())
}

pub fn remove_path(path: &Path) -> Result<(), io::Error> {
    if path.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}

fn copy_recursive(from: &Path, to: &Path) -> Result<(), io::Error> {
    if from.is_file() {
        fs::copy(from, to)?;
        return Ok(());
    }

    for entry in WalkDir::new(from) {
        let entry = entry?;
        let relative = entry
            .path()
            .strip_prefix(from)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        let target = to.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }

    Ok(())
}

/// Moves the entries of `from` into `to` and returns their new paths, sorted.
pub fn move_children(from: &Path, to: &Path) -> Result<Vec<PathBuf>, io::Error> {
    fs::create_dir_all(to)?;

    let mut moved = Vec::new();
    for entry in fs::read_dir(from)? {
        let entry = entry?;
        let target = to.join(entry.file_name());
        move_path(&entry.path(), &target)?;
        moved.push(target);
    }

    moved.sort();
    Ok(moved)
}

/// Places content into `dest_dir` according to the extraction policy it was unpacked with,
/// returning the path of the placed content.
///
/// * an unextracted file keeps its name,
/// * a subfolder extraction keeps its folder,
/// * a direct extraction with a single entry places that entry, several entries
///   are grouped under `fallback_name` so the content never spills into `dest_dir`.
pub fn place(
    content: &Path,
    extraction: Extraction,
    dest_dir: &Path,
    fallback_name: &str,
) -> Result<PathBuf, io::Error> {
    let name = content
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "Content has no file name"))?;

    let placed = if content.is_file() || extraction != Extraction::Direct {
        let target = dest_dir.join(name);
        move_path(content, &target)?;
        target
    } else {
        let mut entries = fs::read_dir(content)?.collect::<Result<Vec<_>, _>>()?;

        if entries.len() == 1 {
            let entry = entries.remove(0);
            let target = dest_dir.join(entry.file_name());
            move_path(&entry.path(), &target)?;
            target
        } else {
            let target = dest_dir.join(fallback_name);
            move_path(content, &target)?;
            target
        }
    };

    info!("Placed content at {}", placed.display());
    Ok(placed)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use pretty_assertions::assert_eq;
    use romlink_cfg::Extraction;

    use super::{move_children, place};

    #[test]
    fn place_single_file() {
        let dir = tempfile::tempdir().unwrap();
        let rom = dir.path().join("tmp").join("Game.z64");
        fs::create_dir_all(rom.parent().unwrap()).unwrap();
        fs::write(&rom, "rom").unwrap();

        let dest = dir.path().join("roms");
        let placed = place(&rom, Extraction::None, &dest, "Game").unwrap();

        assert_eq!(placed, dest.join("Game.z64"));
        assert!(!rom.exists());
        assert_eq!(fs::read_to_string(placed).unwrap(), "rom");
    }

    #[test]
    fn place_direct_groups_many_entries() {
        let dir = tempfile::tempdir().unwrap();
        let extracted = dir.path().join("extracted");
        fs::create_dir_all(&extracted).unwrap();
        fs::write(extracted.join("Game.cue"), "").unwrap();
        fs::write(extracted.join("Game.bin"), "").unwrap();

        let dest = dir.path().join("roms");
        fs::create_dir_all(&dest).unwrap();
        fs::write(dest.join("Other.z64"), "").unwrap();

        let placed = place(&extracted, Extraction::Direct, &dest, "Game").unwrap();

        assert_eq!(placed, dest.join("Game"));
        assert!(placed.join("Game.cue").exists());
        assert!(dest.join("Other.z64").exists());
    }

    #[test]
    fn place_direct_single_entry() {
        let dir = tempfile::tempdir().unwrap();
        let extracted = dir.path().join("extracted");
        fs::create_dir_all(&extracted).unwrap();
        fs::write(extracted.join("Game.iso"), "").unwrap();

        let dest = dir.path().join("roms");
        let placed = place(&extracted, Extraction::Direct, &dest, "Game").unwrap();

        assert_eq!(placed, dest.join("Game.iso"));
    }

    #[test]
    fn children_replace_existing() {
        let dir = tempfile::tempdir().unwrap();
        let from = dir.path().join("from");
        let to = dir.path().join("to");
        fs::create_dir_all(from.join("sub")).unwrap();
        fs::write(from.join("a"), "new").unwrap();
        fs::create_dir_all(&to).unwrap();
        fs::write(to.join("a"), "old").unwrap();

        let moved = move_children(&from, &to).unwrap();

        assert_eq!(moved, vec![to.join("a"), to.join("sub")]);
        assert_eq!(fs::read_to_string(to.join("a")).unwrap(), "new");
    }
}
