//! The version-polymorphic archive: an insertion-ordered mapping from
//! virtual paths to files, parsed from and serialized to any of the
//! supported dialects.

use crate::{
    error::{Error, ErrorKind, Result},
    file::{File, Payload},
    fo4,
    guess::{self, FileFormat},
    io::{Endian, MappedSource, Source as _},
    settings::{ArchiveType, ArchiveVersion},
    strings, tes3, tes4,
};
use std::{
    collections::HashMap,
    io::{BufWriter, Write},
    path::Path,
};
use tracing::debug;

mod overhead {
    // per-dialect constants used to predict the on-disk footprint
    pub(super) const TES3_HEADER: u64 = 0xC;
    pub(super) const TES3_FILE: u64 = 8 + 4 + 8; // size/offset + name offset + hash

    pub(super) const TES4_HEADER: u64 = 0x24;
    pub(super) const TES4_FILE: u64 = 0x10;
    pub(super) const TES4_DIR_X86: u64 = 0x10;
    pub(super) const TES4_DIR_X64: u64 = 0x18;

    pub(super) const FO4_HEADER_V1: u64 = 0x18;
    pub(super) const FO4_HEADER_V2: u64 = 0x20;
    pub(super) const FO4_FILE_GNRL: u64 = 0x10;
    pub(super) const FO4_FILE_DX10: u64 = 0x18;
    pub(super) const FO4_CHUNK_GNRL: u64 = 0x14;
    pub(super) const FO4_CHUNK_DX10: u64 = 0x18;
}

/// A single `.bsa`/`.ba2` container, independent of dialect.
///
/// Entries keep their insertion order; lookups fold ASCII case. An archive
/// is not clonable: it owns every member, and duplicating one is a heavy
/// operation that callers must spell out themselves. Writing consumes it.
pub struct Archive {
    version: ArchiveVersion,
    kind: ArchiveType,
    entries: Vec<(String, File)>,
    index: HashMap<String, usize>,
    // running totals backing file_size()
    packed_len: u64,
    full_names_len: u64,
    file_names_len: u64,
    strings_len: u64,
    chunk_count: u64,
    dirs: HashMap<String, u64>,
    dir_names_len: u64,
}

impl Archive {
    #[must_use]
    pub fn new(version: ArchiveVersion, kind: ArchiveType) -> Self {
        Self {
            version,
            kind,
            entries: Vec::new(),
            index: HashMap::new(),
            packed_len: 0,
            full_names_len: 0,
            file_names_len: 0,
            strings_len: 0,
            chunk_count: 0,
            dirs: HashMap::new(),
            dir_names_len: 0,
        }
    }

    /// Opens an archive on disk, sniffing its dialect from the leading
    /// magic.
    pub fn open(path: &Path) -> Result<Self> {
        let wrap = |source: Box<dyn std::error::Error + Send + Sync>| {
            Error::new(ErrorKind::FailedToReadArchive {
                path: path.to_owned(),
                source,
            })
        };

        let file = std::fs::File::open(path).map_err(|err| wrap(err.into()))?;
        let mut source = MappedSource::try_from(&file).map_err(|err| wrap(err.into()))?;
        let magic: u32 = source
            .read(Endian::Little)
            .map_err(|err| wrap(err.into()))?;
        source.seek_absolute(0).map_err(|err| wrap(err.into()))?;

        let Some(format) = guess::format_from_magic(magic) else {
            return Err(Error::new(ErrorKind::UnknownFormat {
                path: path.to_owned(),
            }));
        };

        let result = match format {
            FileFormat::TES3 => {
                let archive = tes3::Archive::read_source(&mut source)
                    .map_err(|err| wrap(err.into()))?;
                let mut result = Self::new(ArchiveVersion::Tes3, ArchiveType::Standard);
                for (key, file) in archive {
                    let name = strings::virtual_to_local(key.name());
                    result.insert_read(name, Payload::Tes3(file));
                }
                result
            }
            FileFormat::TES4 => {
                let (archive, options) = tes4::Archive::read_source(&mut source)
                    .map_err(|err| wrap(err.into()))?;
                let version = match options.version {
                    tes4::Version::v103 => ArchiveVersion::Tes4,
                    tes4::Version::v104 => ArchiveVersion::Tes5,
                    tes4::Version::v105 => ArchiveVersion::Sse,
                };
                let kind = if options.types == tes4::ArchiveTypes::TEXTURES {
                    ArchiveType::Textures
                } else {
                    ArchiveType::Standard
                };
                let mut result = Self::new(version, kind);
                for (directory_key, directory) in archive {
                    let directory_name = strings::virtual_to_local(directory_key.name());
                    for (file_key, file) in directory {
                        let file_name = strings::virtual_to_local(file_key.name());
                        let name = if directory_name == "." || directory_name.is_empty() {
                            file_name
                        } else {
                            format!("{directory_name}/{file_name}")
                        };
                        result.insert_read(name, Payload::Tes4(file));
                    }
                }
                result
            }
            FileFormat::FO4 => {
                let (archive, options) = fo4::Archive::read_source(&mut source)
                    .map_err(|err| wrap(err.into()))?;
                let (version, kind) = match (options.version, options.format) {
                    (fo4::Version::v1, fo4::Format::GNRL) => {
                        (ArchiveVersion::Fo4, ArchiveType::Standard)
                    }
                    (fo4::Version::v1, fo4::Format::DX10) => {
                        (ArchiveVersion::Fo4Dx, ArchiveType::Textures)
                    }
                    (_, fo4::Format::GNRL) => (ArchiveVersion::Starfield, ArchiveType::Standard),
                    (_, fo4::Format::DX10) => (ArchiveVersion::Starfield, ArchiveType::Textures),
                };
                let mut result = Self::new(version, kind);
                for (key, file) in archive {
                    let name = strings::virtual_to_local(key.name());
                    result.insert_read(name, Payload::Fo4(file));
                }
                result
            }
        };

        Ok(result)
    }

    #[must_use]
    pub fn version(&self) -> ArchiveVersion {
        self.version
    }

    #[must_use]
    pub fn kind(&self) -> ArchiveType {
        self.kind
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Inserts a file under a virtual path. Rejects files whose version does
    /// not match the archive, and duplicate paths (compared case
    /// insensitively).
    #[must_use = "an insert rejection means the file was dropped"]
    pub fn insert(&mut self, name: String, file: File) -> bool {
        if file.version() != self.version {
            return false;
        }
        let folded = strings::to_lower(&name);
        if self.index.contains_key(&folded) {
            return false;
        }

        self.account(&name, &file);
        self.index.insert(folded, self.entries.len());
        self.entries.push((name, file));
        true
    }

    fn insert_read(&mut self, name: String, payload: Payload) {
        let file = File::from_payload(payload, self.version, self.kind);
        if !self.insert(name.clone(), file) {
            debug!("dropping duplicate archive member {name:?}");
        }
    }

    /// Case-insensitive lookup.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&File> {
        let folded = strings::to_lower(name);
        self.index
            .get(&folded)
            .map(|&position| &self.entries[position].1)
    }

    /// Iterates entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &File)> {
        self.entries.iter().map(|(name, file)| (name.as_str(), file))
    }

    /// Re-tags the archive and every file in it with a new dialect.
    pub fn set_version(&mut self, version: ArchiveVersion) -> Result<()> {
        for (_, file) in &mut self.entries {
            file.set_version(version)?;
        }
        self.version = version;
        self.rebuild_totals();
        Ok(())
    }

    /// The predicted on-disk size of the archive as currently filled.
    #[must_use]
    pub fn file_size(&self) -> u64 {
        let file_count = self.entries.len() as u64;
        match self.version {
            ArchiveVersion::Tes3 => {
                overhead::TES3_HEADER
                    + overhead::TES3_FILE * file_count
                    + self.full_names_len
                    + self.packed_len
            }
            v if v.is_tes4_family() => {
                let dir_entry = if v == ArchiveVersion::Sse {
                    overhead::TES4_DIR_X64
                } else {
                    overhead::TES4_DIR_X86
                };
                overhead::TES4_HEADER
                    + dir_entry * self.dirs.len() as u64
                    + self.dir_names_len
                    + overhead::TES4_FILE * file_count
                    + self.file_names_len
                    + self.packed_len
            }
            v => {
                let header = if v == ArchiveVersion::Starfield {
                    overhead::FO4_HEADER_V2
                } else {
                    overhead::FO4_HEADER_V1
                };
                let (file_entry, chunk_entry) = if self.is_dx() {
                    (overhead::FO4_FILE_DX10, overhead::FO4_CHUNK_DX10)
                } else {
                    (overhead::FO4_FILE_GNRL, overhead::FO4_CHUNK_GNRL)
                };
                header
                    + file_entry * file_count
                    + chunk_entry * self.chunk_count
                    + self.packed_len
                    + self.strings_len
            }
        }
    }

    /// Serializes the archive in the dialect of its version. Empty archives
    /// are skipped: no file is created.
    pub fn write(self, path: &Path) -> Result<()> {
        if self.is_empty() {
            debug!("skipping write of empty archive to {path:?}");
            return Ok(());
        }

        let wrap = |source: Box<dyn std::error::Error + Send + Sync>| {
            Error::new(ErrorKind::FailedToWriteFile {
                path: path.to_owned(),
                source,
            })
        };

        let out = std::fs::File::create(path).map_err(|err| wrap(err.into()))?;
        let mut stream = BufWriter::new(out);

        let version = self.version;
        let dx = self.is_dx();
        let any_compressed = self.entries.iter().any(|(_, file)| file.compressed());

        match version {
            ArchiveVersion::Tes3 => {
                let mut archive = tes3::Archive::new();
                for (name, file) in self.entries {
                    let Payload::Tes3(payload) = file.into_payload() else {
                        return Err(mismatched_payload());
                    };
                    archive.insert(tes3::ArchiveKey::from(name), payload);
                }
                archive.write(&mut stream).map_err(|err| wrap(err.into()))?;
            }
            v if v.is_tes4_family() => {
                let mut archive = tes4::Archive::new();
                let mut types = tes4::ArchiveTypes::empty();
                for (name, file) in self.entries {
                    let Payload::Tes4(payload) = file.into_payload() else {
                        return Err(mismatched_payload());
                    };
                    types |= content_types(&name);
                    let (directory_name, file_name) = split_virtual_path(&name);
                    let directory_key = tes4::ArchiveKey::from(directory_name);
                    if archive.get(directory_key.hash()).is_none() {
                        archive.insert(directory_key.clone(), tes4::Directory::new());
                    }
                    // recompute lookup because insert consumed the key
                    let directory = archive
                        .map
                        .get_mut(&directory_key)
                        .expect("directory was just inserted");
                    directory.insert(tes4::DirectoryKey::from(file_name), payload);
                }

                let tes4_version = match v {
                    ArchiveVersion::Tes4 => tes4::Version::v103,
                    ArchiveVersion::Sse => tes4::Version::v105,
                    _ => tes4::Version::v104,
                };
                let mut flags = tes4::ArchiveFlags::default();
                if any_compressed {
                    flags |= tes4::ArchiveFlags::COMPRESSED;
                }
                let options = tes4::ArchiveOptions {
                    version: tes4_version,
                    flags,
                    types,
                };
                archive
                    .write(&mut stream, &options)
                    .map_err(|err| wrap(err.into()))?;
            }
            v => {
                let mut archive = fo4::Archive::new();
                for (name, file) in self.entries {
                    let Payload::Fo4(payload) = file.into_payload() else {
                        return Err(mismatched_payload());
                    };
                    payload.require_format(dx).map_err(|err| wrap(err.into()))?;
                    archive.insert(fo4::ArchiveKey::from(name), payload);
                }

                let options = fo4::ArchiveOptions {
                    format: if dx {
                        fo4::Format::DX10
                    } else {
                        fo4::Format::GNRL
                    },
                    version: if v == ArchiveVersion::Starfield {
                        fo4::Version::v2
                    } else {
                        fo4::Version::v1
                    },
                    compression_format: fo4::CompressionFormat::Zip,
                    strings: true,
                };
                archive
                    .write(&mut stream, &options)
                    .map_err(|err| wrap(err.into()))?;
            }
        }

        stream.flush().map_err(|err| wrap(err.into()))?;
        Ok(())
    }

    fn is_dx(&self) -> bool {
        matches!(self.version, ArchiveVersion::Fo4Dx)
            || (matches!(self.version, ArchiveVersion::Starfield)
                && self.kind == ArchiveType::Textures)
    }

    fn account(&mut self, name: &str, file: &File) {
        let data_len = file.size() as u64;
        let name_len = name.len() as u64;

        self.packed_len += data_len;
        if file.version().is_tes4_family() && file.compressed() {
            self.packed_len += 4;
        }

        self.full_names_len += name_len + 1;
        self.strings_len += name_len + 2;
        if let Payload::Fo4(payload) = file.payload() {
            self.chunk_count += payload.len() as u64;
        }

        let (directory, file_name) = split_virtual_path(name);
        self.file_names_len += file_name.len() as u64 + 1;
        let folded_directory = strings::to_lower(directory);
        if !self.dirs.contains_key(&folded_directory) {
            self.dir_names_len += directory.len() as u64 + 2;
        }
        *self.dirs.entry(folded_directory).or_insert(0) += 1;
    }

    fn rebuild_totals(&mut self) {
        self.packed_len = 0;
        self.full_names_len = 0;
        self.file_names_len = 0;
        self.strings_len = 0;
        self.chunk_count = 0;
        self.dirs.clear();
        self.dir_names_len = 0;

        let entries = core::mem::take(&mut self.entries);
        for (name, file) in &entries {
            self.account(name, file);
        }
        self.entries = entries;
    }
}

impl IntoIterator for Archive {
    type Item = (String, File);
    type IntoIter = std::vec::IntoIter<(String, File)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

fn mismatched_payload() -> Error {
    Error::new(ErrorKind::BadUserInput(
        "archive member payload does not match the archive version".into(),
    ))
}

/// Splits a slash separated virtual path into (directory, file name),
/// using `.` for the root directory as the TES4 dialect expects.
#[must_use]
fn split_virtual_path(name: &str) -> (&str, &str) {
    match name.rsplit_once('/') {
        Some((directory, file_name)) => (directory, file_name),
        None => (".", name),
    }
}

/// Derives the TES4 content classification bits from a file name.
#[must_use]
fn content_types(name: &str) -> tes4::ArchiveTypes {
    use tes4::ArchiveTypes as T;
    let extension = name.rsplit_once('.').map(|(_, ext)| ext).unwrap_or_default();
    match strings::to_lower(extension).as_str() {
        "nif" | "bto" | "btr" | "btt" | "tri" | "egm" => T::MESHES,
        "dds" | "png" | "tga" => T::TEXTURES,
        "swf" | "gfx" => T::MENUS,
        "wav" | "xwm" | "lip" => T::SOUNDS,
        "fuz" => T::VOICES,
        "fxp" => T::SHADERS,
        "lst" => T::TREES,
        "fnt" | "tex" => T::FONTS,
        _ => T::MISC,
    }
}
