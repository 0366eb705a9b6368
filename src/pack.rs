//! Walking a directory tree and bin packing its files into archives that
//! stay under the per-game size cap.

use crate::{
    archive::Archive,
    error::Error,
    file::File,
    parallel,
    settings::{classify, ArchiveType, FileKind, Settings},
};
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::mpsc::Receiver,
    thread::JoinHandle,
};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Whether the packer compresses what it packs.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Compression {
    #[default]
    Yes,
    No,
}

/// A caller-supplied veto over which files are packed. Receives the
/// absolute path of each candidate.
pub type AllowFilePred = Box<dyn Fn(&Path) -> bool>;

/// The request driving one pack run.
pub struct PackSettings {
    pub input_dir: PathBuf,
    pub game_settings: &'static Settings,
    pub compress: Compression,
    pub allow_file_pred: Option<AllowFilePred>,
}

struct PackGroup {
    standard: Vec<PathBuf>,
    texture: Vec<PathBuf>,
}

/// Lists every packable file under `dir`, sorted by size with the largest
/// first, split into the standard and texture streams.
fn list_packable_files(settings: &PackSettings) -> PackGroup {
    let dir = &settings.input_dir;
    let mut files: Vec<(PathBuf, u64)> = WalkDir::new(dir)
        .min_depth(2) // files at the root of the tree cannot be packed
        .into_iter()
        .filter_map(std::result::Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            settings
                .allow_file_pred
                .as_ref()
                .map_or(true, |allowed| allowed(entry.path()))
        })
        .filter(|entry| {
            matches!(
                classify(entry.path(), dir, settings.game_settings),
                FileKind::Standard | FileKind::Texture | FileKind::Incompressible
            )
        })
        .filter_map(|entry| {
            let len = entry.metadata().ok()?.len();
            // empty files would produce empty archive members
            (len > 0).then(|| (entry.into_path(), len))
        })
        .collect();

    // largest first improves the packing
    files.sort_by(|lhs, rhs| rhs.1.cmp(&lhs.1).then_with(|| lhs.0.cmp(&rhs.0)));
    let files: Vec<PathBuf> = files.into_iter().map(|(path, _)| path).collect();

    if settings.game_settings.texture_version.is_some() {
        let (texture, standard): (Vec<PathBuf>, Vec<PathBuf>) = files
            .into_iter()
            .partition(|path| classify(path, dir, settings.game_settings) == FileKind::Texture);
        PackGroup { standard, texture }
    } else {
        PackGroup {
            standard: files,
            texture: Vec::new(),
        }
    }
}

/// Reads and optionally compresses one file, yielding its archive name and
/// decoded form.
fn prepare_file(
    absolute_path: &Path,
    input_dir: &Path,
    game_settings: &Settings,
    compress: Compression,
    kind: ArchiveType,
) -> Result<(String, File), (String, Error)> {
    let relative_name = relative_archive_name(absolute_path, input_dir);
    let version = game_settings.version_for(kind);

    let mut file = File::read(absolute_path, version, kind)
        .map_err(|err| (relative_name.clone(), err))?;

    // texture archives of the newer games must compress every chunk
    let dx = version.is_fo4_family() && kind == ArchiveType::Textures;
    let compressible =
        classify(absolute_path, input_dir, game_settings) != FileKind::Incompressible;
    if (compress == Compression::Yes && compressible) || dx {
        file.compress().map_err(|err| (relative_name.clone(), err))?;
    }

    Ok((relative_name, file))
}

#[must_use]
fn relative_archive_name(absolute_path: &Path, input_dir: &Path) -> String {
    let relative = absolute_path.strip_prefix(input_dir).unwrap_or(absolute_path);
    relative
        .to_string_lossy()
        .replace(std::path::MAIN_SEPARATOR, "/")
}

type Prepared = Result<(String, File), (String, Error)>;

struct Stream {
    kind: ArchiveType,
    producer: JoinHandle<()>,
    receiver: Receiver<Prepared>,
}

/// A lazy sequence of filled archives. Drop it early to cancel the
/// producer; collect [`errors`](Packer::errors) after iteration for the
/// files that could not be read.
pub struct Packer {
    input_dir: PathBuf,
    game_settings: &'static Settings,
    compress: Compression,
    pending_streams: Vec<(ArchiveType, Vec<PathBuf>)>,
    active: Option<Stream>,
    current: Option<Archive>,
    carried: Option<(String, File)>,
    errors: BTreeMap<String, Error>,
}

impl Packer {
    /// The files that failed to read or encode, keyed by relative path.
    /// Complete once iteration has finished.
    #[must_use]
    pub fn errors(&self) -> &BTreeMap<String, Error> {
        &self.errors
    }

    fn start_next_stream(&mut self) -> bool {
        loop {
            let Some((kind, paths)) = self.pending_streams.pop() else {
                return false;
            };
            if paths.is_empty() {
                continue;
            }

            debug!(
                "packing {} files into {kind:?} archives",
                paths.len()
            );
            let input_dir = self.input_dir.clone();
            let game_settings = self.game_settings;
            let compress = self.compress;
            let (producer, receiver) = parallel::make_producer(paths, move |path: PathBuf| {
                prepare_file(&path, &input_dir, game_settings, compress, kind)
            });
            self.active = Some(Stream {
                kind,
                producer,
                receiver,
            });
            return true;
        }
    }

    fn fresh_archive(&self, kind: ArchiveType) -> Archive {
        Archive::new(self.game_settings.version_for(kind), kind)
    }

    fn push_into_current(&mut self, name: String, file: File, kind: ArchiveType) {
        if self.current.is_none() {
            self.current = Some(self.fresh_archive(kind));
        }
        let archive = self.current.as_mut().expect("just ensured above");
        let accepted = archive.insert(name, file);
        assert!(accepted, "prepared file was rejected by its own archive");
    }

    fn finish_stream(&mut self, stream: Stream) {
        // the channel is closed; the producer has nothing left to send
        if stream.producer.join().is_err() {
            warn!("a pack producer thread panicked");
        }
    }
}

impl Iterator for Packer {
    type Item = Archive;

    fn next(&mut self) -> Option<Archive> {
        loop {
            if self.active.is_none() && !self.start_next_stream() {
                // all streams done; flush the final archive if any
                return self.current.take().filter(|archive| !archive.is_empty());
            }

            let kind = self.active.as_ref().expect("stream was just started").kind;

            if let Some((name, file)) = self.carried.take() {
                self.push_into_current(name, file, kind);
            }

            let received = {
                let stream = self.active.as_ref().expect("stream was just started");
                stream.receiver.recv()
            };
            match received {
                Ok(Ok((name, file))) => {
                    let fits = match &self.current {
                        Some(archive) => {
                            archive.file_size() + file.size() as u64
                                <= self.game_settings.max_size
                        }
                        None => true,
                    };
                    if fits {
                        self.push_into_current(name, file, kind);
                        continue;
                    }

                    // the file opens a new archive; yield the filled one
                    let finished = self.current.take().expect("a non-fitting file implies a current archive");
                    self.carried = Some((name, file));
                    if finished.file_size() > self.game_settings.max_size {
                        warn!(
                            "an archive exceeds the size cap because a single file is larger than it"
                        );
                    }
                    return Some(finished);
                }
                Ok(Err((name, err))) => {
                    warn!("skipping {name}: {err}");
                    self.errors.insert(name, err);
                }
                Err(_) => {
                    // channel closed: stream is complete
                    let stream = self.active.take().expect("an active stream was being drained");
                    self.finish_stream(stream);
                    if let Some(archive) = self.current.take() {
                        if !archive.is_empty() {
                            if archive.file_size() > self.game_settings.max_size {
                                warn!(
                                    "an archive exceeds the size cap because a single file is larger than it"
                                );
                            }
                            return Some(archive);
                        }
                    }
                }
            }
        }
    }
}

impl Drop for Packer {
    fn drop(&mut self) {
        if let Some(stream) = self.active.take() {
            // closing the receiver makes the producer stop sending
            drop(stream.receiver);
            if stream.producer.join().is_err() {
                warn!("a pack producer thread panicked");
            }
        }
    }
}

/// Packs `settings.input_dir` into a lazy sequence of archives, each kept
/// under the game's size cap by first-fit-decreasing binning.
#[must_use]
pub fn pack(settings: PackSettings) -> Packer {
    let group = list_packable_files(&settings);

    // streams run in order: standard first, then textures
    let mut pending_streams = Vec::new();
    if !group.texture.is_empty() {
        pending_streams.push((ArchiveType::Textures, group.texture));
    }
    pending_streams.push((ArchiveType::Standard, group.standard));

    Packer {
        input_dir: settings.input_dir,
        game_settings: settings.game_settings,
        compress: settings.compress,
        pending_streams,
        active: None,
        current: None,
        carried: None,
        errors: BTreeMap::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::{pack, Compression, PackSettings};
    use crate::settings::{ArchiveType, Game, Settings};
    use std::path::Path;

    fn write(root: &Path, relative: &str, data: &[u8]) {
        let path = root.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, data).unwrap();
    }

    fn settings(dir: &Path, game: Game, compress: Compression) -> PackSettings {
        PackSettings {
            input_dir: dir.to_owned(),
            game_settings: Settings::get(game),
            compress,
            allow_file_pred: None,
        }
    }

    #[test]
    fn rejects_root_empty_and_blacklisted() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        write(dir.path(), "meshes/pot.nif", b"mesh data");
        write(dir.path(), "meshes/empty.nif", b"");
        write(dir.path(), "rootfile.nif", b"at the root");
        write(dir.path(), "docs/readme.md", b"not packable");

        let archives: Vec<_> =
            pack(settings(dir.path(), Game::Sse, Compression::No)).collect();
        assert_eq!(archives.len(), 1);
        assert_eq!(archives[0].len(), 1);
        assert!(archives[0].get("meshes/pot.nif").is_some());
        Ok(())
    }

    #[test]
    fn predicate_vetoes_files() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        write(dir.path(), "meshes/keep.nif", b"kept");
        write(dir.path(), "meshes/drop.nif", b"dropped");

        let mut config = settings(dir.path(), Game::Sse, Compression::No);
        config.allow_file_pred = Some(Box::new(|path| {
            !path.to_string_lossy().contains("drop")
        }));
        let archives: Vec<_> = pack(config).collect();
        assert_eq!(archives.len(), 1);
        assert!(archives[0].get("meshes/keep.nif").is_some());
        assert!(archives[0].get("meshes/drop.nif").is_none());
        Ok(())
    }

    #[test]
    fn textures_split_into_their_own_archives() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        write(dir.path(), "meshes/pot.nif", b"mesh data");
        write(dir.path(), "textures/pot.dds", b"texture data");

        let archives: Vec<_> =
            pack(settings(dir.path(), Game::Sse, Compression::No)).collect();
        assert_eq!(archives.len(), 2);
        let kinds: Vec<ArchiveType> = archives.iter().map(|a| a.kind()).collect();
        assert!(kinds.contains(&ArchiveType::Standard));
        assert!(kinds.contains(&ArchiveType::Textures));
        Ok(())
    }

    #[test]
    fn incompressible_files_stay_uncompressed() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let compressible: Vec<u8> = (0..2048u32).flat_map(u32::to_le_bytes).collect();
        write(dir.path(), "meshes/pot.nif", &compressible);
        write(dir.path(), "sound/voice.fuz", &compressible);

        let archives: Vec<_> =
            pack(settings(dir.path(), Game::Sse, Compression::Yes)).collect();
        assert_eq!(archives.len(), 1);
        let archive = &archives[0];
        assert!(archive.get("meshes/pot.nif").unwrap().compressed());
        assert!(!archive.get("sound/voice.fuz").unwrap().compressed());
        Ok(())
    }

    #[test]
    fn dropping_the_packer_stops_the_producer() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        for i in 0..64 {
            write(dir.path(), &format!("meshes/m{i}.nif"), &[1u8; 128]);
        }
        let mut packer = pack(settings(dir.path(), Game::Sse, Compression::No));
        // force the stream to spin up, then abandon it
        let _ = packer.next();
        drop(packer);
        Ok(())
    }
}
