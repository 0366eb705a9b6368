use crate::{
    containers::CompressableBytes,
    derive,
    io::{BorrowedSource, Endian, Sink, Source},
    protocols::{self, BZString, ZString},
    tes4::{hashing, Directory, DirectoryKey, Error, File, Hash, Result, Version},
};
use bstr::BString;
use core::mem;
use std::{collections::BTreeMap, io::Write};

bitflags::bitflags! {
    /// The archive flag word stored in the header.
    #[repr(transparent)]
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct Flags: u32 {
        const DIRECTORY_STRINGS = 1 << 0;
        const FILE_STRINGS = 1 << 1;
        const COMPRESSED = 1 << 2;
        const RETAIN_DIRECTORY_NAMES = 1 << 3;
        const RETAIN_FILE_NAMES = 1 << 4;
        const RETAIN_FILE_NAME_OFFSETS = 1 << 5;
        const XBOX_ARCHIVE = 1 << 6;
        const RETAIN_STRINGS_DURING_STARTUP = 1 << 7;
        const EMBEDDED_FILE_NAMES = 1 << 8;
        const XBOX_COMPRESSED = 1 << 9;
    }
}

impl Default for Flags {
    fn default() -> Self {
        Self::DIRECTORY_STRINGS | Self::FILE_STRINGS
    }
}

impl Flags {
    #[must_use]
    pub fn directory_strings(&self) -> bool {
        self.contains(Self::DIRECTORY_STRINGS)
    }

    #[must_use]
    pub fn file_strings(&self) -> bool {
        self.contains(Self::FILE_STRINGS)
    }

    #[must_use]
    pub fn compressed(&self) -> bool {
        self.contains(Self::COMPRESSED)
    }

    #[must_use]
    pub fn xbox_archive(&self) -> bool {
        self.contains(Self::XBOX_ARCHIVE)
    }

    #[must_use]
    pub fn embedded_file_names(&self) -> bool {
        self.contains(Self::EMBEDDED_FILE_NAMES)
    }
}

bitflags::bitflags! {
    /// The content classification word stored in the header.
    #[repr(transparent)]
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct Types: u16 {
        const MESHES = 1 << 0;
        const TEXTURES = 1 << 1;
        const MENUS = 1 << 2;
        const SOUNDS = 1 << 3;
        const VOICES = 1 << 4;
        const SHADERS = 1 << 5;
        const TREES = 1 << 6;
        const FONTS = 1 << 7;
        const MISC = 1 << 8;
    }
}

mod constants {
    use crate::cc;

    pub(super) const BSA: u32 = cc::make_four(b"BSA");

    pub(super) const HEADER_SIZE: u32 = 0x24;
    pub(super) const DIRECTORY_ENTRY_SIZE_X86: usize = 0x10;
    pub(super) const DIRECTORY_ENTRY_SIZE_X64: usize = 0x18;
    pub(super) const FILE_ENTRY_SIZE: usize = 0x10;

    pub(super) const FILE_FLAG_COMPRESSION: u32 = 1 << 30;
    pub(super) const FILE_FLAG_CHECKED: u32 = 1 << 31;
    pub(super) const FILE_FLAG_SECONDARY_ARCHIVE: u32 = 1 << 31;
}

struct Offsets {
    file_entries: usize,
    file_names: usize,
}

struct Header {
    version: Version,
    archive_flags: Flags,
    directory_count: u32,
    file_count: u32,
    directory_names_len: u32,
    file_names_len: u32,
    archive_types: Types,
}

impl Header {
    #[must_use]
    fn hash_endian(&self) -> Endian {
        if self.archive_flags.xbox_archive() {
            Endian::Big
        } else {
            Endian::Little
        }
    }

    #[must_use]
    fn directory_entry_size(&self) -> usize {
        match self.version {
            Version::v103 | Version::v104 => constants::DIRECTORY_ENTRY_SIZE_X86,
            Version::v105 => constants::DIRECTORY_ENTRY_SIZE_X64,
        }
    }

    #[must_use]
    fn compute_offsets(&self) -> Offsets {
        let file_entries = constants::HEADER_SIZE as usize
            + self.directory_entry_size() * self.directory_count as usize;
        let file_names = {
            let directory_names_len = if self.archive_flags.directory_strings() {
                // directory names are stored using a bzstring;
                // directory_names_len includes the lengths of the strings
                // and their null terminators, but not their prefix bytes
                self.directory_names_len as usize + self.directory_count as usize
            } else {
                0
            };
            file_entries
                + directory_names_len
                + constants::FILE_ENTRY_SIZE * self.file_count as usize
        };
        Offsets {
            file_entries,
            file_names,
        }
    }
}

derive::key!(Key: Hash, hashing::hash_directory_in_place);

/// The options governing how an archive is written, and what was learned
/// from its header when it was read.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, Default)]
pub struct Options {
    pub version: Version,
    pub flags: Flags,
    pub types: Types,
}

/// An Oblivion era archive: a mapping from hashed directory names to
/// directories, ordered by hash as the format requires.
pub struct Archive<'bytes> {
    pub(crate) map: BTreeMap<Key, Directory<'bytes>>,
}

derive::mapping!(Archive: Key => Directory);

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
        let mut offsets = header.compute_offsets();
        let mut map = BTreeMap::new();

        for _ in 0..header.directory_count {
            let (key, value) = Self::read_directory(source, &header, &mut offsets)?;
            map.insert(key, value);
        }

        Ok((
            Self { map },
            Options {
                version: header.version,
                flags: header.archive_flags,
                types: header.archive_types,
            },
        ))
    }

    pub fn write<Out>(&self, stream: &mut Out, options: &Options) -> Result<()>
    where
        Out: Write,
    {
        let mut sink = Sink::new(stream);
        let header = self.make_header(options)?;
        Self::write_header(&mut sink, &header)?;
        self.write_directory_entries(&mut sink, &header)?;
        self.write_file_entries(&mut sink, &header)?;
        if header.archive_flags.file_strings() {
            self.write_file_names(&mut sink)?;
        }
        self.write_file_data(&mut sink)?;
        Ok(())
    }

    fn make_header(&self, options: &Options) -> Result<Header> {
        let file_count: usize = self.map.values().map(Directory::len).sum();
        let directory_names_len: usize = self.map.keys().map(|key| key.name.len() + 1).sum();
        let file_names_len: usize = self
            .map
            .values()
            .flat_map(Directory::keys)
            .map(|key| key.name.len() + 1)
            .sum();
        Ok(Header {
            version: options.version,
            archive_flags: options.flags,
            directory_count: self.map.len().try_into()?,
            file_count: file_count.try_into()?,
            directory_names_len: directory_names_len.try_into()?,
            file_names_len: if options.flags.file_strings() {
                file_names_len.try_into()?
            } else {
                0
            },
            archive_types: options.types,
        })
    }

    #[must_use]
    fn data_block_len(file: &File<'bytes>) -> usize {
        file.len() + if file.is_compressed() { 4 } else { 0 }
    }

    #[must_use]
    fn file_block_len(&self, header: &Header, key: &Key) -> usize {
        let directory = &self.map[key];
        let name_len = if header.archive_flags.directory_strings() {
            // length prefix + string + null terminator
            key.name.len() + 2
        } else {
            0
        };
        name_len + constants::FILE_ENTRY_SIZE * directory.len()
    }

    fn write_header<Out>(sink: &mut Sink<'_, Out>, header: &Header) -> Result<()>
    where
        Out: Write,
    {
        sink.write(
            &(
                constants::BSA,
                header.version.code(),
                constants::HEADER_SIZE,
                header.archive_flags.bits(),
                header.directory_count,
                header.file_count,
                header.directory_names_len,
                header.file_names_len,
                header.archive_types.bits(),
                0u16,
            ),
            Endian::Little,
        )?;
        Ok(())
    }

    fn write_directory_entries<Out>(&self, sink: &mut Sink<'_, Out>, header: &Header) -> Result<()>
    where
        Out: Write,
    {
        let mut block_offset = constants::HEADER_SIZE as usize
            + header.directory_entry_size() * self.map.len();
        for key in self.map.keys() {
            let directory = &self.map[key];
            Self::write_hash(sink, &key.hash)?;
            let file_count: u32 = directory.len().try_into()?;
            sink.write(&file_count, Endian::Little)?;

            // the stored offset includes the total length of the file name
            // block, a quirk every reader has to undo
            let offset = block_offset + header.file_names_len as usize;
            match header.version {
                Version::v103 | Version::v104 => {
                    sink.write(&u32::try_from(offset)?, Endian::Little)?;
                }
                Version::v105 => {
                    sink.write(&(0u32, u64::try_from(offset)?), Endian::Little)?;
                }
            }
            block_offset += self.file_block_len(header, key);
        }
        Ok(())
    }

    fn write_file_entries<Out>(&self, sink: &mut Sink<'_, Out>, header: &Header) -> Result<()>
    where
        Out: Write,
    {
        let blocks_start = constants::HEADER_SIZE as usize
            + header.directory_entry_size() * self.map.len();
        let names_start: usize = blocks_start
            + self
                .map
                .keys()
                .map(|key| self.file_block_len(header, key))
                .sum::<usize>();
        let mut data_offset = names_start + header.file_names_len as usize;

        for (key, directory) in &self.map {
            if header.archive_flags.directory_strings() {
                sink.write_protocol::<BZString>(key.name.as_ref(), Endian::Little)?;
            }
            for (file_key, file) in directory.iter() {
                Self::write_hash(sink, &file_key.hash)?;
                let block_len = Self::data_block_len(file);
                let mut size: u32 = block_len.try_into()?;
                if file.is_compressed() != header.archive_flags.compressed() {
                    size |= constants::FILE_FLAG_COMPRESSION;
                }
                sink.write(&(size, u32::try_from(data_offset)?), Endian::Little)?;
                data_offset += block_len;
            }
        }
        Ok(())
    }

    fn write_file_names<Out>(&self, sink: &mut Sink<'_, Out>) -> Result<()>
    where
        Out: Write,
    {
        for directory in self.map.values() {
            for key in directory.keys() {
                sink.write_protocol::<ZString>(key.name.as_ref(), Endian::Little)?;
            }
        }
        Ok(())
    }

    fn write_file_data<Out>(&self, sink: &mut Sink<'_, Out>) -> Result<()>
    where
        Out: Write,
    {
        for directory in self.map.values() {
            for file in directory.values() {
                if let Some(decompressed_len) = file.decompressed_len() {
                    sink.write(&u32::try_from(decompressed_len)?, Endian::Little)?;
                }
                sink.write_bytes(file.as_bytes())?;
            }
        }
        Ok(())
    }

    fn write_hash<Out>(sink: &mut Sink<'_, Out>, hash: &Hash) -> Result<()>
    where
        Out: Write,
    {
        sink.write(
            &(hash.last, hash.last2, hash.length, hash.first, hash.crc),
            Endian::Little,
        )?;
        Ok(())
    }

    fn read_header<In>(source: &mut In) -> Result<Header>
    where
        In: ?Sized + Source<'bytes>,
    {
        let (
            magic,
            version,
            header_size,
            archive_flags,
            directory_count,
            file_count,
            directory_names_len,
            file_names_len,
            archive_types,
            padding,
        ): (u32, u32, u32, u32, u32, u32, u32, u32, u16, u16) = source.read(Endian::Little)?;
        let _: u16 = padding;

        if magic != constants::BSA {
            return Err(Error::InvalidMagic(magic));
        }

        let version = match version {
            103 => Version::v103,
            104 => Version::v104,
            105 => Version::v105,
            _ => return Err(Error::InvalidVersion(version)),
        };

        if header_size != constants::HEADER_SIZE {
            return Err(Error::InvalidHeaderSize(header_size));
        }

        // valid archives may set extra bits, so it is not worth validating
        let archive_flags = Flags::from_bits_truncate(archive_flags);
        let archive_types = Types::from_bits_truncate(archive_types);

        Ok(Header {
            version,
            archive_flags,
            directory_count,
            file_count,
            directory_names_len,
            file_names_len,
            archive_types,
        })
    }

    fn read_directory<In>(
        source: &mut In,
        header: &Header,
        offsets: &mut Offsets,
    ) -> Result<(Key, Directory<'bytes>)>
    where
        In: ?Sized + Source<'bytes>,
    {
        let hash = Self::read_hash(source, header.hash_endian())?;
        let file_count: u32 = source.read(Endian::Little)?;
        #[allow(clippy::cast_possible_wrap)]
        match header.version {
            Version::v103 | Version::v104 => {
                source.seek_relative(mem::size_of::<u32>() as isize)?;
            }
            Version::v105 => source.seek_relative((mem::size_of::<u32>() * 3) as isize)?,
        }

        let mut map = BTreeMap::new();
        let (name, directory) =
            source.save_restore_position(|source| -> Result<(BString, Directory<'bytes>)> {
                source.seek_absolute(offsets.file_entries)?;
                let mut name = if header.archive_flags.directory_strings() {
                    Some(source.read_protocol::<BZString>(Endian::Little)?)
                } else {
                    None
                };
                for _ in 0..file_count {
                    let (key, value) = Self::read_file_entry(source, header, offsets, &mut name)?;
                    map.insert(key, value);
                }
                offsets.file_entries = source.stream_position();
                Ok((name.unwrap_or_default(), Directory { map }))
            })??;

        Ok((Key { hash, name }, directory))
    }

    fn read_file_entry<In>(
        source: &mut In,
        header: &Header,
        offsets: &mut Offsets,
        directory_name: &mut Option<BString>,
    ) -> Result<(DirectoryKey, File<'bytes>)>
    where
        In: ?Sized + Source<'bytes>,
    {
        let hash = Self::read_hash(source, header.hash_endian())?;
        let (compression_flipped, mut data_size, data_offset) = {
            let (size, offset): (u32, u32) = source.read(Endian::Little)?;
            (
                (size & constants::FILE_FLAG_COMPRESSION) != 0,
                (size & !(constants::FILE_FLAG_COMPRESSION | constants::FILE_FLAG_CHECKED))
                    as usize,
                (offset & !constants::FILE_FLAG_SECONDARY_ARCHIVE) as usize,
            )
        };

        let mut name = if header.archive_flags.file_strings() {
            source.save_restore_position(|source| -> Result<Option<BString>> {
                source.seek_absolute(offsets.file_names)?;
                let result = source.read_protocol::<ZString>(Endian::Little)?;
                offsets.file_names = source.stream_position();
                Ok(Some(result))
            })??
        } else {
            None
        };

        let bytes =
            source.save_restore_position(|source| -> Result<CompressableBytes<'bytes>> {
                source.seek_absolute(data_offset)?;

                match header.version {
                    Version::v104 | Version::v105 if header.archive_flags.embedded_file_names() => {
                        let mut s = source.read_protocol::<protocols::BString>(Endian::Little)?;
                        data_size -= s.len() + 1; // include prefix byte
                        if let Some(pos) = s.iter().rposition(|&x| x == b'\\' || x == b'/') {
                            if directory_name.is_none() {
                                *directory_name = Some(s[..pos].into());
                            }
                            s.drain(..=pos);
                        }
                        if name.is_none() {
                            name = Some(s);
                        }
                    }
                    _ => (),
                }

                let decompressed_len =
                    match (header.archive_flags.compressed(), compression_flipped) {
                        (true, false) | (false, true) => {
                            let result: u32 = source.read(Endian::Little)?;
                            data_size -= mem::size_of::<u32>();
                            Some(result as usize)
                        }
                        (true, true) | (false, false) => None,
                    };

                let bytes = source.read_bytes(data_size)?;
                Ok(bytes.into_compressable(decompressed_len))
            })??;

        Ok((
            DirectoryKey {
                hash,
                name: name.unwrap_or_default(),
            },
            File { bytes },
        ))
    }

    fn read_hash<In>(source: &mut In, endian: Endian) -> Result<Hash>
    where
        In: ?Sized + Source<'bytes>,
    {
        let (last, last2, length, first, crc) = source.read(endian)?;
        Ok(Hash {
            last,
            last2,
            length,
            first,
            crc,
        })
    }
}
