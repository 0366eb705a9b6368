//! Extracting an archive back into a loose-file tree.

use crate::{
    archive::Archive,
    error::{Error, ErrorKind, Result},
    parallel, plugin,
    settings::Settings,
};
use std::{
    collections::BTreeMap,
    path::PathBuf,
    sync::Mutex,
};
use tracing::{debug, warn};

/// The request driving one unpack run.
#[derive(Clone, Debug, Default)]
pub struct UnpackSettings {
    pub file_path: PathBuf,
    pub remove_arch: bool,
    pub overwrite_existing_files: bool,
    pub extract_to_dir: Option<PathBuf>,
}

/// Unpacks one archive. The archive failing to open is fatal; individual
/// files failing to write are collected into the returned map and do not
/// stop the other workers.
pub fn unpack(settings: &UnpackSettings) -> Result<BTreeMap<String, Error>> {
    let errors = Mutex::new(BTreeMap::new());
    {
        let archive = Archive::open(&settings.file_path)?;
        let root = settings
            .extract_to_dir
            .clone()
            .or_else(|| settings.file_path.parent().map(PathBuf::from))
            .unwrap_or_default();

        debug!(
            "unpacking {} files from {:?} into {root:?}",
            archive.len(),
            settings.file_path
        );

        let entries: Vec<_> = archive.into_iter().collect();
        let overwrite = settings.overwrite_existing_files;
        let write_one = |(name, file): &(String, crate::file::File)| {
            let target = root.join(name);
            if !overwrite && target.exists() {
                // existing loose files win over archive contents
                return;
            }
            let result = (|| -> Result<()> {
                if let Some(parent) = target.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                file.write(&target)
            })();
            if let Err(err) = result {
                warn!("failed to extract {name}: {err}");
                errors.lock().unwrap().insert(name.clone(), err);
            }
        };

        let outcome: std::result::Result<(), Error> = parallel::for_each_par(&entries, |entry| {
            write_one(entry);
            Ok(())
        });
        outcome?;
    }

    if settings.remove_arch {
        std::fs::remove_file(&settings.file_path).map_err(|source| {
            Error::new(ErrorKind::FailedToRemoveArchive {
                path: settings.file_path.clone(),
                source,
            })
        })?;
    }

    Ok(errors.into_inner().unwrap())
}

/// Unpacks every archive with the settings' extension found directly in
/// `dir` into `out`.
pub fn unpack_all(dir: &std::path::Path, out: &std::path::Path, settings: &Settings) -> Result<()> {
    for archive_path in plugin::list_archive(dir, settings) {
        let per_file = unpack(&UnpackSettings {
            file_path: archive_path.clone(),
            remove_arch: false,
            overwrite_existing_files: true,
            extract_to_dir: Some(out.to_owned()),
        })?;
        for (name, err) in per_file {
            warn!("{archive_path:?}: failed to extract {name}: {err}");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{unpack, UnpackSettings};
    use crate::{
        archive::Archive,
        error::ErrorKind,
        file::File,
        settings::{ArchiveType, ArchiveVersion},
    };
    use std::path::Path;

    fn build_archive(path: &Path) -> anyhow::Result<()> {
        let mut archive = Archive::new(ArchiveVersion::Sse, ArchiveType::Standard);
        for (name, data) in [
            ("meshes/clutter/pot.nif", b"pot bytes".to_vec()),
            ("meshes/clutter/pan.nif", b"pan bytes".to_vec()),
            ("interface/map.swf", b"swf bytes".to_vec()),
        ] {
            let file = File::from_bytes(data, ArchiveVersion::Sse, ArchiveType::Standard)?;
            assert!(archive.insert(name.into(), file));
        }
        archive.write(path)?;
        Ok(())
    }

    #[test]
    fn extracts_every_entry() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let archive_path = dir.path().join("test.bsa");
        build_archive(&archive_path)?;

        let errors = unpack(&UnpackSettings {
            file_path: archive_path.clone(),
            ..Default::default()
        })?;
        assert!(errors.is_empty());
        assert_eq!(
            std::fs::read(dir.path().join("meshes/clutter/pot.nif"))?,
            b"pot bytes"
        );
        assert_eq!(
            std::fs::read(dir.path().join("interface/map.swf"))?,
            b"swf bytes"
        );
        // the source archive stays by default
        assert!(archive_path.exists());
        Ok(())
    }

    #[test]
    fn existing_files_are_preserved_unless_overwriting() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let archive_path = dir.path().join("test.bsa");
        build_archive(&archive_path)?;

        std::fs::create_dir_all(dir.path().join("meshes/clutter"))?;
        std::fs::write(dir.path().join("meshes/clutter/pot.nif"), b"loose override")?;

        unpack(&UnpackSettings {
            file_path: archive_path.clone(),
            ..Default::default()
        })?;
        assert_eq!(
            std::fs::read(dir.path().join("meshes/clutter/pot.nif"))?,
            b"loose override"
        );

        unpack(&UnpackSettings {
            file_path: archive_path,
            overwrite_existing_files: true,
            ..Default::default()
        })?;
        assert_eq!(
            std::fs::read(dir.path().join("meshes/clutter/pot.nif"))?,
            b"pot bytes"
        );
        Ok(())
    }

    #[test]
    fn remove_arch_deletes_the_source() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let archive_path = dir.path().join("test.bsa");
        build_archive(&archive_path)?;

        unpack(&UnpackSettings {
            file_path: archive_path.clone(),
            remove_arch: true,
            ..Default::default()
        })?;
        assert!(!archive_path.exists());
        Ok(())
    }

    #[test]
    fn unreadable_archives_are_fatal() {
        let result = unpack(&UnpackSettings {
            file_path: "/nonexistent/archive.bsa".into(),
            ..Default::default()
        });
        assert!(matches!(
            result.map(|_| ()).map_err(|err| matches!(
                err.kind(),
                ErrorKind::FailedToReadArchive { .. }
            )),
            Err(true)
        ));
    }
}
