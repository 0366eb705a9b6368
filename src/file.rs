//! The version-polymorphic file: one archive member, whatever the dialect.

use crate::{
    error::{Error, ErrorKind, Result},
    fo4, fs,
    settings::{ArchiveType, ArchiveVersion},
    tes3, tes4,
};
use std::{
    io::{self, BufWriter, Write},
    path::Path,
};

fn wrap_read(path: &Path, source: impl std::error::Error + Send + Sync + 'static) -> Error {
    Error::new(ErrorKind::FailedToReadFile {
        path: path.to_owned(),
        source: source.into(),
    })
}

fn wrap_system(source: impl std::error::Error + Send + Sync + 'static) -> Error {
    Error::new(ErrorKind::System(io::Error::new(
        io::ErrorKind::Other,
        source,
    )))
}

/// The dialect-specific representation of a file's contents.
pub enum Payload {
    Tes3(tes3::File<'static>),
    Tes4(tes4::File<'static>),
    Fo4(fo4::File<'static>),
}

/// One archive member, tagged with the dialect it was decoded under and the
/// kind of archive it belongs to.
pub struct File {
    version: ArchiveVersion,
    kind: ArchiveType,
    payload: Payload,
}

impl File {
    /// An empty file of the dialect matching `version`.
    #[must_use]
    pub fn new(version: ArchiveVersion, kind: ArchiveType) -> Self {
        let payload = match version {
            ArchiveVersion::Tes3 => Payload::Tes3(tes3::File::new()),
            v if v.is_tes4_family() => Payload::Tes4(tes4::File::new()),
            _ => Payload::Fo4(fo4::File::new()),
        };
        Self {
            version,
            kind,
            payload,
        }
    }

    pub(crate) fn from_payload(
        payload: Payload,
        version: ArchiveVersion,
        kind: ArchiveType,
    ) -> Self {
        Self {
            version,
            kind,
            payload,
        }
    }

    /// Reads a loose file from disk into the dialect matching `version`.
    pub fn read(path: &Path, version: ArchiveVersion, kind: ArchiveType) -> Result<Self> {
        let bytes = fs::read_file(path)?;
        Self::from_bytes(bytes, version, kind).map_err(|err| wrap_read(path, err))
    }

    /// Decodes raw loose-file bytes into the dialect matching `version`.
    /// For texture archives of the Fallout 4 family this parses the DDS
    /// header and cuts the mip chain into chunks.
    pub fn from_bytes(bytes: Vec<u8>, version: ArchiveVersion, kind: ArchiveType) -> Result<Self> {
        let payload = match version {
            ArchiveVersion::Tes3 => Payload::Tes3(tes3::File::from(bytes)),
            v if v.is_tes4_family() => Payload::Tes4(tes4::File::from_decompressed(bytes)),
            v => {
                let dx = matches!(v, ArchiveVersion::Fo4Dx)
                    || (matches!(v, ArchiveVersion::Starfield) && kind == ArchiveType::Textures);
                if dx {
                    Payload::Fo4(fo4::File::from_dds(&bytes).map_err(wrap_system)?)
                } else {
                    Payload::Fo4(fo4::File::from_bytes(bytes))
                }
            }
        };
        Ok(Self {
            version,
            kind,
            payload,
        })
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
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub(crate) fn into_payload(self) -> Payload {
        self.payload
    }

    /// True when at least one underlying chunk holds compressed bytes.
    #[must_use]
    pub fn compressed(&self) -> bool {
        match &self.payload {
            Payload::Tes3(_) => false,
            Payload::Tes4(file) => file.is_compressed(),
            Payload::Fo4(file) => file.is_compressed(),
        }
    }

    /// The in-memory byte length: the packed length of the blob, or the sum
    /// of chunk lengths for the Fallout 4 family.
    #[must_use]
    pub fn size(&self) -> usize {
        match &self.payload {
            Payload::Tes3(file) => file.len(),
            Payload::Tes4(file) => file.len(),
            Payload::Fo4(file) => file.data_len(),
        }
    }

    /// Compresses the payload. Idempotent; a no-op for dialects without
    /// compression.
    pub fn compress(&mut self) -> Result<()> {
        let options = self.tes4_compression();
        match &mut self.payload {
            Payload::Tes3(_) => Ok(()),
            Payload::Tes4(file) => {
                if !file.is_compressed() {
                    *file = file.compress(&options).map_err(wrap_system)?;
                }
                Ok(())
            }
            Payload::Fo4(file) => file.compress().map_err(wrap_system),
        }
    }

    /// Decompresses the payload. Idempotent.
    pub fn decompress(&mut self) -> Result<()> {
        let options = self.tes4_compression();
        match &mut self.payload {
            Payload::Tes3(_) => Ok(()),
            Payload::Tes4(file) => {
                if file.is_compressed() {
                    *file = file.decompress(&options).map_err(wrap_system)?;
                }
                Ok(())
            }
            Payload::Fo4(file) => file.decompress().map_err(wrap_system),
        }
    }

    /// Writes the loose representation of the file to `stream`.
    pub fn write_stream<Out>(&self, stream: &mut Out) -> Result<()>
    where
        Out: ?Sized + Write,
    {
        match &self.payload {
            Payload::Tes3(file) => file.write(stream).map_err(wrap_system),
            Payload::Tes4(file) => {
                let options = self.tes4_compression();
                file.write(stream, &options).map_err(wrap_system)
            }
            Payload::Fo4(file) => file.write(stream).map_err(wrap_system),
        }
    }

    /// Writes the loose representation of the file to `path`.
    pub fn write(&self, path: &Path) -> Result<()> {
        let wrap = |source: Error| {
            Error::new(ErrorKind::FailedToWriteFile {
                path: path.to_owned(),
                source: source.into(),
            })
        };
        let file = std::fs::File::create(path).map_err(|source| {
            Error::new(ErrorKind::FailedToWriteFile {
                path: path.to_owned(),
                source: source.into(),
            })
        })?;
        let mut stream = BufWriter::new(file);
        self.write_stream(&mut stream).map_err(wrap)?;
        stream.flush().map_err(Error::from)
    }

    /// Re-tags the file with a new dialect. Conversions are cheap and only
    /// permitted where the payload representation carries over: within the
    /// TES4 family, within the general Fallout 4 family, and between raw
    /// TES3 blobs and decompressed TES4 blobs.
    pub(crate) fn set_version(&mut self, version: ArchiveVersion) -> Result<()> {
        if version == self.version {
            return Ok(());
        }

        let reject = || {
            Error::new(ErrorKind::BadUserInput(format!(
                "cannot convert a file from {:?} to {version:?}",
                self.version
            )))
        };

        enum Action {
            Retag,
            ToTes3,
            ToTes4,
        }

        let action = match &self.payload {
            Payload::Tes4(file) if version.is_tes4_family() => {
                // compressed payloads are codec-bound: zlib up to 104, lz4 at 105
                let codec_change =
                    (self.version == ArchiveVersion::Sse) != (version == ArchiveVersion::Sse);
                if file.is_compressed() && codec_change {
                    return Err(reject());
                }
                Action::Retag
            }
            Payload::Tes4(file) if version == ArchiveVersion::Tes3 => {
                if file.is_compressed() {
                    return Err(reject());
                }
                Action::ToTes3
            }
            Payload::Tes3(_) if version.is_tes4_family() => Action::ToTes4,
            Payload::Fo4(file) if version.is_fo4_family() => {
                let dx_target = matches!(version, ArchiveVersion::Fo4Dx)
                    || (matches!(version, ArchiveVersion::Starfield)
                        && self.kind == ArchiveType::Textures);
                if !file.matches_format(dx_target) {
                    return Err(reject());
                }
                Action::Retag
            }
            _ => return Err(reject()),
        };

        match action {
            Action::Retag => (),
            Action::ToTes3 => {
                let Payload::Tes4(file) = &self.payload else {
                    unreachable!();
                };
                let bytes = file.as_bytes().to_vec();
                self.payload = Payload::Tes3(tes3::File::from(bytes));
            }
            Action::ToTes4 => {
                let Payload::Tes3(file) = &self.payload else {
                    unreachable!();
                };
                let bytes = file.as_bytes().to_vec();
                self.payload = Payload::Tes4(tes4::File::from_decompressed(bytes));
            }
        }

        self.version = version;
        Ok(())
    }

    fn tes4_compression(&self) -> tes4::FileCompressionOptions {
        let version = match self.version {
            ArchiveVersion::Tes4 => tes4::Version::TES4,
            ArchiveVersion::Sse => tes4::Version::SSE,
            _ => tes4::Version::TES5,
        };
        tes4::FileCompressionOptions::from(version)
    }
}

#[cfg(test)]
mod tests {
    use super::File;
    use crate::settings::{ArchiveType, ArchiveVersion};

    #[test]
    fn compression_is_idempotent() -> anyhow::Result<()> {
        let payload: Vec<u8> = (0..1024u32).flat_map(u32::to_le_bytes).collect();
        let mut file =
            File::from_bytes(payload.clone(), ArchiveVersion::Sse, ArchiveType::Standard)?;
        assert!(!file.compressed());

        file.compress()?;
        assert!(file.compressed());
        let compressed_size = file.size();
        file.compress()?;
        assert_eq!(file.size(), compressed_size);

        file.decompress()?;
        assert!(!file.compressed());
        assert_eq!(file.size(), payload.len());
        file.decompress()?;
        assert!(!file.compressed());
        Ok(())
    }

    #[test]
    fn tes3_files_never_compress() -> anyhow::Result<()> {
        let mut file = File::from_bytes(
            b"raw bytes".to_vec(),
            ArchiveVersion::Tes3,
            ArchiveType::Standard,
        )?;
        file.compress()?;
        assert!(!file.compressed());
        Ok(())
    }

    #[test]
    fn version_conversion() -> anyhow::Result<()> {
        let mut file = File::from_bytes(
            b"blob".to_vec(),
            ArchiveVersion::Tes3,
            ArchiveType::Standard,
        )?;
        file.set_version(ArchiveVersion::Tes4)?;
        assert_eq!(file.version(), ArchiveVersion::Tes4);
        file.set_version(ArchiveVersion::Sse)?;
        assert_eq!(file.version(), ArchiveVersion::Sse);
        assert!(file.set_version(ArchiveVersion::Fo4).is_err());
        Ok(())
    }

    #[test]
    fn compressed_files_do_not_cross_codecs() -> anyhow::Result<()> {
        let payload: Vec<u8> = vec![42; 4096];
        let mut file = File::from_bytes(payload, ArchiveVersion::Tes5, ArchiveType::Standard)?;
        file.compress()?;
        assert!(file.set_version(ArchiveVersion::Sse).is_err());
        assert!(file.set_version(ArchiveVersion::Tes4).is_ok());
        Ok(())
    }
}
