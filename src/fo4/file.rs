use crate::fo4::{dds, Chunk, CompressionFormat, Error, Result};
use std::io::Write;

/// The DDS metadata carried by a texture file record.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct DX10 {
    pub height: u16,
    pub width: u16,
    pub mip_count: u8,
    pub format: u8,
    pub flags: u8,
    pub tile_mode: u8,
}

/// Discriminates general files from chunked textures.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Header {
    #[default]
    GNRL,
    DX10(DX10),
}

/// One member of a Fallout 4 era archive: a run of chunks plus the header
/// data its record carries.
#[derive(Default)]
pub struct File<'bytes> {
    pub(crate) header: Header,
    pub(crate) chunks: Vec<Chunk<'bytes>>,
    pub(crate) compression_format: CompressionFormat,
}

impl<'bytes> File<'bytes> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn header(&self) -> &Header {
        &self.header
    }

    #[must_use]
    pub fn compression_format(&self) -> CompressionFormat {
        self.compression_format
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// The summed in-memory length of every chunk.
    #[must_use]
    pub fn data_len(&self) -> usize {
        self.chunks.iter().map(Chunk::len).sum()
    }

    #[must_use]
    pub fn is_compressed(&self) -> bool {
        self.chunks.iter().any(Chunk::is_compressed)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Chunk<'bytes>> {
        self.chunks.iter()
    }

    #[must_use]
    pub fn into_owned(self) -> File<'static> {
        File {
            header: self.header,
            chunks: self.chunks.into_iter().map(Chunk::into_owned).collect(),
            compression_format: self.compression_format,
        }
    }

    /// Builds a general file holding `bytes` as its single chunk.
    #[must_use]
    pub fn from_bytes(bytes: Vec<u8>) -> File<'static> {
        File {
            header: Header::GNRL,
            chunks: vec![Chunk::from_decompressed(bytes)],
            compression_format: CompressionFormat::default(),
        }
    }

    /// Builds a texture file by parsing `bytes` as a `.dds` and cutting its
    /// mip chain into chunks.
    pub fn from_dds(bytes: &[u8]) -> Result<File<'static>> {
        let layout = dds::split(bytes)?;
        let chunks = layout
            .chunks
            .into_iter()
            .map(|(range, mips)| {
                let mut chunk = Chunk::from_decompressed(bytes[range].to_vec());
                chunk.mips = Some(mips);
                chunk
            })
            .collect();
        Ok(File {
            header: Header::DX10(layout.header),
            chunks,
            compression_format: CompressionFormat::default(),
        })
    }

    /// Compresses every chunk that is not already compressed.
    pub fn compress(&mut self) -> Result<()> {
        for chunk in &mut self.chunks {
            if !chunk.is_compressed() {
                *chunk = chunk.compress(self.compression_format)?;
            }
        }
        Ok(())
    }

    /// Decompresses every chunk that is compressed.
    pub fn decompress(&mut self) -> Result<()> {
        for chunk in &mut self.chunks {
            if chunk.is_compressed() {
                *chunk = chunk.decompress(self.compression_format)?;
            }
        }
        Ok(())
    }

    /// Writes the file back to its loose representation: raw bytes for
    /// general files, a reconstructed `.dds` for textures.
    pub fn write<Out>(&self, stream: &mut Out) -> Result<()>
    where
        Out: ?Sized + Write,
    {
        if let Header::DX10(header) = &self.header {
            dds::write_header(stream, header)?;
        }
        for chunk in &self.chunks {
            if chunk.is_compressed() {
                let decompressed = chunk.decompress(self.compression_format)?;
                stream.write_all(decompressed.as_bytes())?;
            } else {
                stream.write_all(chunk.as_bytes())?;
            }
        }
        Ok(())
    }

    pub(crate) fn matches_format(&self, dx10: bool) -> bool {
        match (&self.header, dx10) {
            (Header::GNRL, false) | (Header::DX10(_), true) => true,
            _ => false,
        }
    }

    pub(crate) fn require_format(&self, dx10: bool) -> Result<()> {
        if self.matches_format(dx10) {
            Ok(())
        } else {
            Err(Error::FormatMismatch)
        }
    }
}

impl<'bytes> FromIterator<Chunk<'bytes>> for File<'bytes> {
    fn from_iter<I>(iter: I) -> Self
    where
        I: IntoIterator<Item = Chunk<'bytes>>,
    {
        Self {
            header: Header::default(),
            chunks: iter.into_iter().collect(),
            compression_format: CompressionFormat::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::fo4::{File, FileHeader};

    #[test]
    fn default_state() {
        let f = File::default();
        assert!(f.is_empty());
        assert_eq!(f.len(), 0);
        assert_eq!(*f.header(), FileHeader::GNRL);
        assert!(!f.is_compressed());
    }

    #[test]
    fn general_files_hold_one_chunk() {
        let f = File::from_bytes(b"general data".to_vec());
        assert_eq!(f.len(), 1);
        assert_eq!(f.data_len(), 12);
    }

    #[test]
    fn compress_and_restore() -> anyhow::Result<()> {
        let payload: Vec<u8> = (0..1024u32).flat_map(u32::to_le_bytes).collect();
        let mut f = File::from_bytes(payload.clone());
        f.compress()?;
        assert!(f.is_compressed());

        let mut out = Vec::new();
        f.write(&mut out)?;
        assert_eq!(out, payload);

        f.decompress()?;
        assert!(!f.is_compressed());
        Ok(())
    }
}
