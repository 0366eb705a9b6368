use crate::{
    containers::Bytes,
    derive,
    io::{BorrowedSource, Endian, Sink, Source},
    protocols::ZString,
    tes3::{hashing, Error, File, Hash, Result},
};
use std::{collections::BTreeMap, io::Write};

mod constants {
    pub(super) const FILE_ENTRY_SIZE: usize = 0x8;
    pub(super) const HASH_SIZE: usize = 0x8;
    pub(super) const HEADER_MAGIC: u32 = 0x100;
    pub(super) const HEADER_SIZE: usize = 0xC;
}

struct Offsets {
    name_offsets: usize,
    names: usize,
    hashes: usize,
    file_data: usize,
}

struct Header {
    hash_offset: u32,
    file_count: u32,
}

impl Header {
    #[must_use]
    fn compute_offsets(&self) -> Offsets {
        let file_count = self.file_count as usize;
        let name_offsets = constants::HEADER_SIZE + constants::FILE_ENTRY_SIZE * file_count;
        let names = name_offsets + 0x4 * file_count;
        let hashes = constants::HEADER_SIZE + self.hash_offset as usize;
        let file_data = hashes + constants::HASH_SIZE * file_count;
        Offsets {
            name_offsets,
            names,
            hashes,
            file_data,
        }
    }
}

derive::key!(Key: Hash, hashing::hash_file_in_place);

/// A Morrowind archive: a mapping from hashed names to raw files, ordered by
/// hash as the format requires.
pub struct Archive<'bytes> {
    pub(crate) map: BTreeMap<Key, File<'bytes>>,
}

derive::mapping!(Archive: Key => File);

impl<'bytes> Archive<'bytes> {
    /// Parses an archive out of a byte buffer.
    pub fn read_bytes(bytes: &'bytes [u8]) -> Result<Self> {
        let mut source = BorrowedSource::from(bytes);
        Self::read_source(&mut source)
    }

    pub(crate) fn read_source<In>(source: &mut In) -> Result<Self>
    where
        In: ?Sized + Source<'bytes>,
    {
        let header = Self::read_header(source)?;
        let offsets = header.compute_offsets();
        let mut map = BTreeMap::new();

        for i in 0..header.file_count as usize {
            let (key, value) = Self::read_file(source, i, &offsets)?;
            map.insert(key, value);
        }

        Ok(Self { map })
    }

    pub fn write<Out>(&self, stream: &mut Out) -> Result<()>
    where
        Out: Write,
    {
        let mut sink = Sink::new(stream);
        let header = self.make_header()?;
        Self::write_header(&mut sink, &header)?;
        self.write_files(&mut sink)?;
        self.write_name_offsets(&mut sink)?;
        self.write_names(&mut sink)?;
        self.write_hashes(&mut sink)?;
        self.write_file_data(&mut sink)?;
        Ok(())
    }

    fn read_header<In>(source: &mut In) -> Result<Header>
    where
        In: ?Sized + Source<'bytes>,
    {
        let (magic, hash_offset, file_count) = source.read(Endian::Little)?;
        match magic {
            constants::HEADER_MAGIC => Ok(Header {
                hash_offset,
                file_count,
            }),
            _ => Err(Error::InvalidMagic(magic)),
        }
    }

    fn read_file<In>(source: &mut In, idx: usize, offsets: &Offsets) -> Result<(Key, File<'bytes>)>
    where
        In: ?Sized + Source<'bytes>,
    {
        let hash = source.save_restore_position(|source| -> Result<Hash> {
            source.seek_absolute(offsets.hashes + constants::HASH_SIZE * idx)?;
            let (lo, hi) = source.read(Endian::Little)?;
            Ok(Hash { lo, hi })
        })??;

        let name = source.save_restore_position(|source| -> Result<bstr::BString> {
            source.seek_absolute(offsets.name_offsets + 0x4 * idx)?;
            let offset: u32 = source.read(Endian::Little)?;
            source.seek_absolute(offsets.names + offset as usize)?;
            Ok(source.read_protocol::<ZString>(Endian::Little)?)
        })??;

        let (size, offset): (u32, u32) = source.read(Endian::Little)?;
        let bytes = source.save_restore_position(|source| -> Result<Bytes<'bytes>> {
            source.seek_absolute(offsets.file_data + offset as usize)?;
            Ok(source.read_bytes(size as usize)?)
        })??;

        Ok((Key { hash, name }, File { bytes }))
    }

    fn make_header(&self) -> Result<Header> {
        let names_len: usize = self.map.keys().map(|key| key.name.len() + 1).sum();
        Ok(Header {
            file_count: self.map.len().try_into()?,
            hash_offset: (0xC * self.map.len() + names_len).try_into()?,
        })
    }

    fn write_header<Out>(sink: &mut Sink<'_, Out>, header: &Header) -> Result<()>
    where
        Out: Write,
    {
        sink.write(
            &(
                constants::HEADER_MAGIC,
                header.hash_offset,
                header.file_count,
            ),
            Endian::Little,
        )?;
        Ok(())
    }

    fn write_files<Out>(&self, sink: &mut Sink<'_, Out>) -> Result<()>
    where
        Out: Write,
    {
        let mut offset: u32 = 0;
        for file in self.map.values() {
            let size: u32 = file.len().try_into()?;
            sink.write(&(size, offset), Endian::Little)?;
            offset += size;
        }
        Ok(())
    }

    fn write_name_offsets<Out>(&self, sink: &mut Sink<'_, Out>) -> Result<()>
    where
        Out: Write,
    {
        let mut offset: u32 = 0;
        for key in self.map.keys() {
            sink.write(&offset, Endian::Little)?;
            offset += u32::try_from(key.name.len() + 1)?;
        }
        Ok(())
    }

    fn write_names<Out>(&self, sink: &mut Sink<'_, Out>) -> Result<()>
    where
        Out: Write,
    {
        for key in self.map.keys() {
            sink.write_protocol::<ZString>(key.name.as_ref(), Endian::Little)?;
        }
        Ok(())
    }

    fn write_hashes<Out>(&self, sink: &mut Sink<'_, Out>) -> Result<()>
    where
        Out: Write,
    {
        for key in self.map.keys() {
            sink.write(&(key.hash.lo, key.hash.hi), Endian::Little)?;
        }
        Ok(())
    }

    fn write_file_data<Out>(&self, sink: &mut Sink<'_, Out>) -> Result<()>
    where
        Out: Write,
    {
        for file in self.map.values() {
            sink.write_bytes(file.as_bytes())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::tes3::{Archive, ArchiveKey, Error, File, Hash};

    #[test]
    fn default_state() {
        let bsa = Archive::new();
        assert!(bsa.is_empty());
        assert_eq!(bsa.len(), 0);
    }

    #[test]
    fn invalid_magic() {
        let bytes = b"\x00\x02\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00";
        assert!(matches!(
            Archive::read_bytes(&bytes[..]),
            Err(Error::InvalidMagic(0x200))
        ));
    }

    #[test]
    fn truncated_archive_is_rejected() {
        let bytes = b"\x00\x01\x00\x00\xFF\x00\x00\x00\x04\x00\x00\x00";
        assert!(matches!(
            Archive::read_bytes(&bytes[..]),
            Err(Error::Io(_))
        ));
    }

    #[test]
    fn round_trip() -> anyhow::Result<()> {
        let members: &[(&str, &[u8])] = &[
            ("meshes/clutter/pot.nif", b"pot bytes"),
            ("textures/tx_rope_woven.dds", b"rope bytes"),
            ("icons/m/misc_prongs00.dds", b"prong bytes"),
        ];

        let mut archive = Archive::new();
        for (name, data) in members {
            let file = File::from(*data);
            assert!(archive.insert(ArchiveKey::from(*name), file).is_none());
        }

        let mut buffer = Vec::new();
        archive.write(&mut buffer)?;

        let read_back = Archive::read_bytes(&buffer)?;
        assert_eq!(read_back.len(), members.len());
        for (name, data) in members {
            let key = ArchiveKey::from(*name);
            let file = read_back
                .get(key.hash())
                .unwrap_or_else(|| panic!("missing member {name}"));
            assert_eq!(file.as_bytes(), *data);
        }
        Ok(())
    }

    #[test]
    fn duplicate_insert_replaces() {
        let mut archive = Archive::new();
        assert!(archive
            .insert(ArchiveKey::from("a.nif"), File::from(&b"one"[..]))
            .is_none());
        assert!(archive
            .insert(ArchiveKey::from("A.NIF"), File::from(&b"two"[..]))
            .is_some());
        assert_eq!(archive.len(), 1);
    }

    #[test]
    fn lookup_by_hash_or_key() {
        let mut archive = Archive::new();
        let key = ArchiveKey::from("meshes/pot.nif");
        let hash: Hash = *key.hash();
        archive.insert(key, File::from(&b"data"[..]));
        assert!(archive.get(&hash).is_some());
    }
}
