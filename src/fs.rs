//! Whole-file helpers and byte-exact comparison used by the pipelines and
//! their tests.

use crate::{
    error::{Error, ErrorKind, Result},
    strings,
};
use std::{
    collections::HashMap,
    io::{BufReader, Read},
    path::{Path, PathBuf},
};
use walkdir::WalkDir;

pub fn read_file(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|source| {
        Error::new(ErrorKind::FailedToReadFile {
            path: path.to_owned(),
            source: source.into(),
        })
    })
}

pub fn write_file(path: &Path, data: &[u8]) -> Result<()> {
    std::fs::write(path, data).map_err(|source| {
        Error::new(ErrorKind::FailedToWriteFile {
            path: path.to_owned(),
            source: source.into(),
        })
    })
}

/// Byte-exact comparison of two files.
#[must_use]
pub fn compare_files(lhs: &Path, rhs: &Path) -> bool {
    let Ok(lhs_meta) = std::fs::metadata(lhs) else {
        return false;
    };
    let Ok(rhs_meta) = std::fs::metadata(rhs) else {
        return false;
    };
    if lhs_meta.len() != rhs_meta.len() {
        return false;
    }

    let Ok(lhs_file) = std::fs::File::open(lhs) else {
        return false;
    };
    let Ok(rhs_file) = std::fs::File::open(rhs) else {
        return false;
    };

    let mut lhs_reader = BufReader::new(lhs_file);
    let mut rhs_reader = BufReader::new(rhs_file);
    let mut lhs_buf = [0u8; 8192];
    let mut rhs_buf = [0u8; 8192];
    loop {
        let Ok(read) = lhs_reader.read(&mut lhs_buf) else {
            return false;
        };
        if read == 0 {
            return true;
        }
        if rhs_reader.read_exact(&mut rhs_buf[..read]).is_err() {
            return false;
        }
        if lhs_buf[..read] != rhs_buf[..read] {
            return false;
        }
    }
}

fn sorted_entries(dir: &Path) -> Option<Vec<(PathBuf, bool)>> {
    let mut entries = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1) {
        let entry = entry.ok()?;
        let relative = entry.path().strip_prefix(dir).ok()?.to_owned();
        entries.push((relative, entry.file_type().is_dir()));
    }
    entries.sort();
    Some(entries)
}

/// Byte-exact comparison of two directory trees: same relative layout, same
/// file contents.
#[must_use]
pub fn compare_directories(lhs: &Path, rhs: &Path) -> bool {
    let (Some(lhs_entries), Some(rhs_entries)) = (sorted_entries(lhs), sorted_entries(rhs)) else {
        return false;
    };
    if lhs_entries != rhs_entries {
        return false;
    }

    lhs_entries
        .iter()
        .filter(|(_, is_dir)| !is_dir)
        .all(|(relative, _)| compare_files(&lhs.join(relative), &rhs.join(relative)))
}

/// Hard links `from` to `to`, falling back to a plain copy when linking is
/// not possible (different filesystems, exotic mounts). Directories are
/// recreated and their files linked one by one.
pub fn hard_link_or_copy(from: &Path, to: &Path) -> Result<()> {
    if !from.is_dir() {
        if std::fs::hard_link(from, to).is_err() {
            std::fs::copy(from, to).map_err(|source| {
                Error::new(ErrorKind::FailedToWriteFile {
                    path: to.to_owned(),
                    source: source.into(),
                })
            })?;
        }
        return Ok(());
    }

    std::fs::create_dir_all(to)?;
    for entry in WalkDir::new(from).min_depth(1) {
        let entry = entry.map_err(|source| {
            Error::new(ErrorKind::FailedToReadFile {
                path: from.to_owned(),
                source: source.into(),
            })
        })?;
        let relative = entry
            .path()
            .strip_prefix(from)
            .expect("walked entries live under their root");
        let target = to.join(relative);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else {
            hard_link_or_copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// Resolves relative lower-case paths against `directory` without assuming a
/// case-insensitive filesystem. Only paths that exist are returned.
#[must_use]
pub fn find_matching_paths_icase(directory: &Path, relative_lowercase: &[PathBuf]) -> Vec<PathBuf> {
    if !directory.exists() {
        return Vec::new();
    }

    let files_in_directory: HashMap<String, PathBuf> = WalkDir::new(directory)
        .min_depth(1)
        .into_iter()
        .filter_map(std::result::Result::ok)
        .filter_map(|entry| {
            let relative = entry.path().strip_prefix(directory).ok()?;
            let key = strings::to_lower(&relative.to_string_lossy());
            Some((key, entry.path().to_owned()))
        })
        .collect();

    relative_lowercase
        .iter()
        .filter_map(|path| {
            let key = strings::to_lower(&path.to_string_lossy());
            files_in_directory.get(&key).cloned()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{
        compare_directories, compare_files, find_matching_paths_icase, hard_link_or_copy,
        read_file, write_file,
    };
    use std::path::PathBuf;

    #[test]
    fn file_round_trip_and_compare() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let a = dir.path().join("a.bin");
        let b = dir.path().join("b.bin");
        write_file(&a, b"payload")?;
        write_file(&b, b"payload")?;
        assert_eq!(read_file(&a)?, b"payload");
        assert!(compare_files(&a, &b));

        write_file(&b, b"payloae")?;
        assert!(!compare_files(&a, &b));
        Ok(())
    }

    #[test]
    fn directory_comparison() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let lhs = dir.path().join("lhs");
        let rhs = dir.path().join("rhs");
        for root in [&lhs, &rhs] {
            std::fs::create_dir_all(root.join("meshes"))?;
            write_file(&root.join("meshes/pot.nif"), b"nif")?;
        }
        assert!(compare_directories(&lhs, &rhs));

        write_file(&rhs.join("meshes/extra.nif"), b"nif")?;
        assert!(!compare_directories(&lhs, &rhs));
        Ok(())
    }

    #[test]
    fn link_or_copy_recurses() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let from = dir.path().join("from");
        std::fs::create_dir_all(from.join("sound"))?;
        write_file(&from.join("sound/voice.fuz"), b"fuz")?;

        let to = dir.path().join("to");
        hard_link_or_copy(&from, &to)?;
        assert!(compare_directories(&from, &to));
        Ok(())
    }

    #[test]
    fn icase_resolution() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        std::fs::create_dir_all(dir.path().join("Meshes"))?;
        write_file(&dir.path().join("Meshes/Pot.NIF"), b"nif")?;

        let found =
            find_matching_paths_icase(dir.path(), &[PathBuf::from("meshes/pot.nif")]);
        assert_eq!(found, vec![dir.path().join("Meshes/Pot.NIF")]);

        let missing = find_matching_paths_icase(dir.path(), &[PathBuf::from("meshes/cup.nif")]);
        assert!(missing.is_empty());
        Ok(())
    }
}
