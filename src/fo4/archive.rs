use crate::{
    derive,
    fo4::{
        hashing, Chunk, ChunkMips, CompressionFormat, Error, File, FileDX10, FileHeader, Format,
        Hash, Result, Version,
    },
    io::{BorrowedSource, Endian, Sink, Source},
    protocols::WString,
};
use bstr::BString;
use std::{collections::BTreeMap, io::Write};

mod constants {
    use crate::cc;

    pub(super) const MAGIC: u32 = cc::make_four(b"BTDX");

    pub(super) const GNRL: u32 = cc::make_four(b"GNRL");
    pub(super) const DX10: u32 = cc::make_four(b"DX10");

    pub(super) const HEADER_SIZE_V1: usize = 0x18;
    pub(super) const HEADER_SIZE_V2: usize = 0x20;
    pub(super) const HEADER_SIZE_V3: usize = 0x24;

    pub(super) const FILE_HEADER_SIZE_GNRL: usize = 0x10;
    pub(super) const FILE_HEADER_SIZE_DX10: usize = 0x18;

    pub(super) const CHUNK_SIZE_GNRL: u16 = 0x14;
    pub(super) const CHUNK_SIZE_DX10: u16 = 0x18;

    pub(super) const CHUNK_SENTINEL: u32 = 0xBAAD_F00D;
}

struct Header {
    version: Version,
    format: Format,
    file_count: u32,
    string_table_offset: u64,
    compression_format: CompressionFormat,
}

/// The options governing how an archive is written, and what was learned
/// from its header when it was read.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, Default)]
pub struct Options {
    pub format: Format,
    pub version: Version,
    pub compression_format: CompressionFormat,
    pub strings: bool,
}

struct Offsets {
    file_data: usize,
    strings: usize,
}

impl Offsets {
    #[must_use]
    fn new(archive: &Archive<'_>, options: &Options) -> Self {
        let chunks_offset = match options.version {
            Version::v1 => constants::HEADER_SIZE_V1,
            Version::v2 => constants::HEADER_SIZE_V2,
            Version::v3 => constants::HEADER_SIZE_V3,
        };

        let file_data = {
            let (file_header_size, chunk_size) = match options.format {
                Format::GNRL => (constants::FILE_HEADER_SIZE_GNRL, constants::CHUNK_SIZE_GNRL),
                Format::DX10 => (constants::FILE_HEADER_SIZE_DX10, constants::CHUNK_SIZE_DX10),
            };
            let chunks_count: usize = archive.values().map(File::len).sum();
            chunks_offset
                + archive.len() * file_header_size
                + chunks_count * usize::from(chunk_size)
        };

        let strings = {
            let data_len: usize = archive.values().map(File::data_len).sum();
            file_data + data_len
        };

        Self { file_data, strings }
    }
}

derive::key!(Key: Hash, hashing::hash_file_in_place);

/// A Fallout 4 era archive: a mapping from hashed paths to chunked files.
pub struct Archive<'bytes> {
    pub(crate) map: BTreeMap<Key, File<'bytes>>,
}

derive::mapping!(Archive: Key => File);

impl<'bytes> Archive<'bytes> {
    /// Parses an archive out of a byte buffer.
    pub fn read_bytes(bytes: &'bytes [u8]) -> Result<(Self, Options)> {
        let mut source = BorrowedSource::from(bytes);
        Self::read_source(&mut source)
    }

    pub(crate) fn read_source<In>(source: &mut In) -> Result<(Self, Options)>
    where
        In: ?Sized + Source<'bytes>,
    {
        let header = Self::read_header(source)?;
        let mut map = BTreeMap::new();
        let mut strings: usize = header.string_table_offset.try_into()?;
        for _ in 0..header.file_count {
            let (key, value) = Self::read_file(source, &header, &mut strings)?;
            map.insert(key, value);
        }

        Ok((
            Self { map },
            Options {
                format: header.format,
                version: header.version,
                compression_format: header.compression_format,
                strings: header.string_table_offset != 0,
            },
        ))
    }

    pub fn write<Out>(&self, stream: &mut Out, options: &Options) -> Result<()>
    where
        Out: Write,
    {
        let mut sink = Sink::new(stream);
        let (header, mut offsets) = self.make_header(options)?;
        Self::write_header(&mut sink, &header)?;

        for (key, file) in &self.map {
            Self::write_file(&mut sink, &header, &mut offsets, &key.hash, file)?;
        }

        for file in self.values() {
            for chunk in file.iter() {
                sink.write_bytes(chunk.as_bytes())?;
            }
        }

        if options.strings {
            for key in self.keys() {
                sink.write_protocol::<WString>(key.name.as_ref(), Endian::Little)?;
            }
        }

        Ok(())
    }

    fn make_header(&self, options: &Options) -> Result<(Header, Offsets)> {
        let offsets = Offsets::new(self, options);
        Ok((
            Header {
                version: options.version,
                format: options.format,
                file_count: self.len().try_into()?,
                string_table_offset: if options.strings {
                    offsets.strings as u64
                } else {
                    0
                },
                compression_format: options.compression_format,
            },
            offsets,
        ))
    }

    fn write_header<Out>(sink: &mut Sink<'_, Out>, header: &Header) -> Result<()>
    where
        Out: Write,
    {
        let format = match header.format {
            Format::GNRL => constants::GNRL,
            Format::DX10 => constants::DX10,
        };

        sink.write(
            &(
                constants::MAGIC,
                header.version.code(),
                format,
                header.file_count,
                header.string_table_offset,
            ),
            Endian::Little,
        )?;

        if header.version >= Version::v2 {
            sink.write(&1u64, Endian::Little)?;
        }

        if header.version >= Version::v3 {
            let compression: u32 = match header.compression_format {
                CompressionFormat::Zip => 0,
                CompressionFormat::LZ4 => 3,
            };
            sink.write(&compression, Endian::Little)?;
        }

        Ok(())
    }

    fn write_file<Out>(
        sink: &mut Sink<'_, Out>,
        header: &Header,
        offsets: &mut Offsets,
        hash: &Hash,
        file: &File<'bytes>,
    ) -> Result<()>
    where
        Out: Write,
    {
        Self::write_hash(sink, hash)?;

        let chunk_count: u8 = file.len().try_into()?;
        let chunk_size = match header.format {
            Format::GNRL => constants::CHUNK_SIZE_GNRL,
            Format::DX10 => constants::CHUNK_SIZE_DX10,
        };
        sink.write(&(0u8, chunk_count, chunk_size), Endian::Little)?;

        match (header.format, &file.header) {
            (Format::GNRL, FileHeader::GNRL) => (),
            (Format::DX10, FileHeader::DX10(x)) => {
                sink.write(
                    &(
                        x.height,
                        x.width,
                        x.mip_count,
                        x.format,
                        x.flags,
                        x.tile_mode,
                    ),
                    Endian::Little,
                )?;
            }
            _ => {
                return Err(Error::FormatMismatch);
            }
        }

        for chunk in file.iter() {
            Self::write_chunk(sink, header, offsets, chunk)?;
        }

        Ok(())
    }

    fn write_chunk<Out>(
        sink: &mut Sink<'_, Out>,
        header: &Header,
        offsets: &mut Offsets,
        chunk: &Chunk<'bytes>,
    ) -> Result<()>
    where
        Out: Write,
    {
        let data_offset: u64 = offsets.file_data.try_into()?;
        offsets.file_data += chunk.len();
        let (compressed_size, decompressed_size): (u32, u32) =
            if let Some(decompressed_len) = chunk.decompressed_len() {
                (chunk.len().try_into()?, decompressed_len.try_into()?)
            } else {
                (0, chunk.len().try_into()?)
            };
        sink.write(
            &(data_offset, compressed_size, decompressed_size),
            Endian::Little,
        )?;

        match (header.format, chunk.mips) {
            (Format::GNRL, _) => (),
            (Format::DX10, Some(mips)) => {
                sink.write(&(mips.first, mips.last), Endian::Little)?;
            }
            (Format::DX10, None) => {
                return Err(Error::FormatMismatch);
            }
        }

        sink.write(&constants::CHUNK_SENTINEL, Endian::Little)?;
        Ok(())
    }

    fn write_hash<Out>(sink: &mut Sink<'_, Out>, hash: &Hash) -> Result<()>
    where
        Out: Write,
    {
        sink.write(&(hash.file, hash.extension, hash.directory), Endian::Little)?;
        Ok(())
    }

    fn read_header<In>(source: &mut In) -> Result<Header>
    where
        In: ?Sized + Source<'bytes>,
    {
        let (magic, version, contents_format, file_count, string_table_offset): (
            u32,
            u32,
            u32,
            u32,
            u64,
        ) = source.read(Endian::Little)?;

        if magic != constants::MAGIC {
            return Err(Error::InvalidMagic(magic));
        }

        let format = match contents_format {
            constants::GNRL => Format::GNRL,
            constants::DX10 => Format::DX10,
            _ => return Err(Error::InvalidFormat(contents_format)),
        };

        let version = match version {
            1 => Version::v1,
            2 => Version::v2,
            3 => Version::v3,
            _ => return Err(Error::InvalidVersion(version)),
        };

        if version >= Version::v2 {
            source.read::<u64>(Endian::Little)?;
        }

        let compression_format = if version >= Version::v3 {
            let format: u32 = source.read(Endian::Little)?;
            if format == 3 {
                CompressionFormat::LZ4
            } else {
                CompressionFormat::Zip
            }
        } else {
            CompressionFormat::Zip
        };

        Ok(Header {
            version,
            format,
            file_count,
            string_table_offset,
            compression_format,
        })
    }

    fn read_file<In>(
        source: &mut In,
        header: &Header,
        strings: &mut usize,
    ) -> Result<(Key, File<'bytes>)>
    where
        In: ?Sized + Source<'bytes>,
    {
        let name = if *strings == 0 {
            BString::default()
        } else {
            source.save_restore_position(|source| -> Result<BString> {
                source.seek_absolute(*strings)?;
                let name = source.read_protocol::<WString>(Endian::Little)?;
                *strings = source.stream_position();
                Ok(name)
            })??
        };

        let hash = Self::read_hash(source)?;
        let (_, chunk_count, chunk_size): (u8, u8, u16) = source.read(Endian::Little)?;
        if !matches!(
            (header.format, chunk_size),
            (Format::GNRL, constants::CHUNK_SIZE_GNRL) | (Format::DX10, constants::CHUNK_SIZE_DX10)
        ) {
            return Err(Error::InvalidChunkSize(chunk_size));
        }

        let file_header = match header.format {
            Format::GNRL => FileHeader::GNRL,
            Format::DX10 => {
                let (height, width, mip_count, format, flags, tile_mode) =
                    source.read(Endian::Little)?;
                FileHeader::DX10(FileDX10 {
                    height,
                    width,
                    mip_count,
                    format,
                    flags,
                    tile_mode,
                })
            }
        };

        let mut chunks = Vec::with_capacity(chunk_count.into());
        for _ in 0..chunk_count {
            let chunk = Self::read_chunk(source, header)?;
            chunks.push(chunk);
        }

        Ok((
            Key { hash, name },
            File {
                header: file_header,
                chunks,
                compression_format: header.compression_format,
            },
        ))
    }

    fn read_chunk<In>(source: &mut In, header: &Header) -> Result<Chunk<'bytes>>
    where
        In: ?Sized + Source<'bytes>,
    {
        let (data_offset, compressed_size, decompressed_size): (u64, u32, u32) =
            source.read(Endian::Little)?;
        let mips = match header.format {
            Format::GNRL => None,
            Format::DX10 => {
                let (first, last) = source.read(Endian::Little)?;
                Some(ChunkMips { first, last })
            }
        };

        let sentinel = source.read(Endian::Little)?;
        if sentinel != constants::CHUNK_SENTINEL {
            return Err(Error::InvalidChunkSentinel(sentinel));
        }

        let bytes = source.save_restore_position(|source| -> Result<crate::containers::Bytes<'bytes>> {
            source.seek_absolute(data_offset.try_into()?)?;
            let len = if compressed_size == 0 {
                decompressed_size
            } else {
                compressed_size
            };
            Ok(source.read_bytes(len as usize)?)
        })??;
        let decompressed_len = (compressed_size != 0).then_some(decompressed_size as usize);

        Ok(Chunk {
            bytes: bytes.into_compressable(decompressed_len),
            mips,
        })
    }

    fn read_hash<In>(source: &mut In) -> Result<Hash>
    where
        In: ?Sized + Source<'bytes>,
    {
        let (file, extension, directory) = source.read(Endian::Little)?;
        Ok(Hash {
            file,
            extension,
            directory,
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::fo4::{
        Archive, ArchiveKey, ArchiveOptions, Error, File, Format, Version,
    };

    fn general_archive<'bytes>(compress: bool) -> anyhow::Result<Archive<'bytes>> {
        let mut archive = Archive::new();
        for (name, data) in [
            ("interface/hud.swf", b"swf bytes".to_vec()),
            ("scripts/quest.pex", b"pex bytes".to_vec()),
        ] {
            let mut file = File::from_bytes(data);
            if compress {
                file.compress()?;
            }
            archive.insert(ArchiveKey::from(name), file);
        }
        Ok(archive)
    }

    #[test]
    fn default_state() {
        let ba2 = Archive::new();
        assert!(ba2.is_empty());
        assert_eq!(ba2.len(), 0);
    }

    #[test]
    fn invalid_magic() {
        let bytes = b"XDTB\x01\x00\x00\x00GNRL\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00";
        assert!(matches!(
            Archive::read_bytes(&bytes[..]),
            Err(Error::InvalidMagic(_))
        ));
    }

    #[test]
    fn general_round_trip() -> anyhow::Result<()> {
        for (version, compress) in [
            (Version::v1, false),
            (Version::v1, true),
            (Version::v2, true),
        ] {
            let archive = general_archive(compress)?;
            let options = ArchiveOptions {
                version,
                strings: true,
                ..Default::default()
            };
            let mut buffer = Vec::new();
            archive.write(&mut buffer, &options)?;

            let (read_back, read_options) = Archive::read_bytes(&buffer)?;
            assert_eq!(read_options.format, Format::GNRL);
            assert_eq!(read_options.version, version);
            assert!(read_options.strings);
            assert_eq!(read_back.len(), 2);

            let key = ArchiveKey::from("interface/hud.swf");
            let file = read_back.get(key.hash()).expect("missing member");
            assert_eq!(file.is_compressed(), compress);
            let mut loose = Vec::new();
            file.write(&mut loose)?;
            assert_eq!(loose, b"swf bytes");
        }
        Ok(())
    }

    #[test]
    fn dx10_round_trip() -> anyhow::Result<()> {
        // reuse the dds fixture from the dds module tests
        let dds = {
            let header = crate::fo4::FileDX10 {
                height: 8,
                width: 8,
                mip_count: 4,
                format: 71,
                flags: 0,
                tile_mode: 8,
            };
            let mut buffer = Vec::new();
            super::super::dds::write_header(&mut buffer, &header)?;
            buffer.resize(buffer.len() + 56, 0xCD);
            buffer
        };

        let mut file = File::from_dds(&dds)?;
        file.compress()?;
        assert!(file.is_compressed());

        let mut archive = Archive::new();
        archive.insert(ArchiveKey::from("textures/stone.dds"), file);

        let options = ArchiveOptions {
            format: Format::DX10,
            strings: true,
            ..Default::default()
        };
        let mut buffer = Vec::new();
        archive.write(&mut buffer, &options)?;

        let (read_back, read_options) = Archive::read_bytes(&buffer)?;
        assert_eq!(read_options.format, Format::DX10);
        let key = ArchiveKey::from("textures/stone.dds");
        let file = read_back.get(key.hash()).expect("missing texture");
        let mut loose = Vec::new();
        file.write(&mut loose)?;
        assert_eq!(loose, dds);
        Ok(())
    }

    #[test]
    fn format_mismatch_is_rejected() -> anyhow::Result<()> {
        let archive = general_archive(false)?;
        let options = ArchiveOptions {
            format: Format::DX10,
            ..Default::default()
        };
        let mut buffer = Vec::new();
        assert!(matches!(
            archive.write(&mut buffer, &options),
            Err(Error::FormatMismatch)
        ));
        Ok(())
    }
}
