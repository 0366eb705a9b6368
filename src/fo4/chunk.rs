use crate::{
    containers::CompressableBytes,
    fo4::{CompressionFormat, Error, Result},
};
use flate2::{
    write::{ZlibDecoder, ZlibEncoder},
    Compression,
};
use lzzzz::{lz4, lz4_hc};
use std::io::Write;

/// The inclusive range of mip levels a texture chunk covers.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ChunkMips {
    pub first: u16,
    pub last: u16,
}

/// One chunk of a file. General files hold a single chunk; textures are cut
/// into several, each covering a run of mip levels.
#[derive(Default)]
pub struct Chunk<'bytes> {
    pub(crate) bytes: CompressableBytes<'bytes>,
    pub(crate) mips: Option<ChunkMips>,
}

impl<'bytes> Chunk<'bytes> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        self.bytes.as_bytes()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[must_use]
    pub fn is_compressed(&self) -> bool {
        self.bytes.is_compressed()
    }

    #[must_use]
    pub fn decompressed_len(&self) -> Option<usize> {
        self.bytes.decompressed_len()
    }

    #[must_use]
    pub fn mips(&self) -> Option<ChunkMips> {
        self.mips
    }

    #[must_use]
    pub fn from_decompressed(bytes: Vec<u8>) -> Chunk<'static> {
        Chunk {
            bytes: CompressableBytes::from_owned(bytes, None),
            mips: None,
        }
    }

    #[must_use]
    pub fn into_owned(self) -> Chunk<'static> {
        Chunk {
            bytes: self.bytes.into_owned(),
            mips: self.mips,
        }
    }

    pub fn compress(&self, format: CompressionFormat) -> Result<Chunk<'static>> {
        let mut out = Vec::new();
        self.compress_into(&mut out, format)?;
        out.shrink_to_fit();
        Ok(Chunk {
            bytes: CompressableBytes::from_owned(out, Some(self.len())),
            mips: self.mips,
        })
    }

    pub fn compress_into(&self, out: &mut Vec<u8>, format: CompressionFormat) -> Result<()> {
        if self.is_compressed() {
            return Err(Error::AlreadyCompressed);
        }
        match format {
            CompressionFormat::Zip => self.compress_into_zlib(out),
            CompressionFormat::LZ4 => self.compress_into_lz4(out),
        }
    }

    pub fn decompress(&self, format: CompressionFormat) -> Result<Chunk<'static>> {
        let mut out = Vec::new();
        self.decompress_into(&mut out, format)?;
        out.shrink_to_fit();
        Ok(Chunk {
            bytes: CompressableBytes::from_owned(out, None),
            mips: self.mips,
        })
    }

    pub fn decompress_into(&self, out: &mut Vec<u8>, format: CompressionFormat) -> Result<()> {
        let Some(decompressed_len) = self.decompressed_len() else {
            return Err(Error::AlreadyDecompressed);
        };

        let out_len = match format {
            CompressionFormat::Zip => self.decompress_into_zlib(out)?,
            CompressionFormat::LZ4 => {
                out.resize(decompressed_len, 0);
                lz4::decompress(self.as_bytes(), &mut out[..])?
            }
        };

        if out_len == decompressed_len {
            Ok(())
        } else {
            Err(Error::DecompressionSizeMismatch {
                expected: decompressed_len,
                actual: out_len,
            })
        }
    }

    fn compress_into_zlib(&self, out: &mut Vec<u8>) -> Result<()> {
        let mut encoder = ZlibEncoder::new(out, Compression::default());
        encoder.write_all(self.as_bytes())?;
        encoder.finish()?;
        Ok(())
    }

    fn compress_into_lz4(&self, out: &mut Vec<u8>) -> Result<()> {
        lz4_hc::compress_to_vec(self.as_bytes(), out, lz4_hc::CLEVEL_MAX)?;
        Ok(())
    }

    fn decompress_into_zlib(&self, out: &mut Vec<u8>) -> Result<usize> {
        let mut decoder = ZlibDecoder::new(out);
        decoder.write_all(self.as_bytes())?;
        Ok(decoder.total_out().try_into()?)
    }
}

#[cfg(test)]
mod tests {
    use super::Chunk;
    use crate::fo4::CompressionFormat;

    #[test]
    fn default_state() {
        let c = Chunk::default();
        assert!(c.is_empty());
        assert!(!c.is_compressed());
        assert_eq!(c.len(), 0);
        assert_eq!(c.mips(), None);
    }

    #[test]
    fn compression_round_trips() -> anyhow::Result<()> {
        let payload: Vec<u8> = (0..2048u32).flat_map(u32::to_le_bytes).collect();
        for format in [CompressionFormat::Zip, CompressionFormat::LZ4] {
            let chunk = Chunk::from_decompressed(payload.clone());
            let compressed = chunk.compress(format)?;
            assert!(compressed.is_compressed());
            assert_eq!(compressed.decompressed_len(), Some(payload.len()));
            let restored = compressed.decompress(format)?;
            assert_eq!(restored.as_bytes(), &payload[..]);
        }
        Ok(())
    }

    #[test]
    fn double_compression_is_an_error() -> anyhow::Result<()> {
        let chunk = Chunk::from_decompressed(b"payload".to_vec());
        let compressed = chunk.compress(CompressionFormat::Zip)?;
        assert!(compressed.compress(CompressionFormat::Zip).is_err());
        assert!(chunk.decompress(CompressionFormat::Zip).is_err());
        Ok(())
    }
}
