use crate::{
    containers::CompressableBytes,
    tes4::{Error, Result, Version},
};
use flate2::{
    write::{ZlibDecoder, ZlibEncoder},
    Compression,
};
use lzzzz::lz4f::{self, AutoFlush, PreferencesBuilder};
use std::io::Write;

/// Selects the codec used when compressing or decompressing a file. The
/// codec is dictated by the archive version the file belongs to.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, Default)]
pub struct CompressionOptions {
    pub version: Version,
}

impl From<Version> for CompressionOptions {
    fn from(version: Version) -> Self {
        Self { version }
    }
}

/// One member of an Oblivion era archive: a blob which may or may not be
/// compressed.
#[derive(Default)]
pub struct File<'bytes> {
    pub(crate) bytes: CompressableBytes<'bytes>,
}

impl<'bytes> File<'bytes> {
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
    pub fn from_decompressed(bytes: Vec<u8>) -> File<'static> {
        File {
            bytes: CompressableBytes::from_owned(bytes, None),
        }
    }

    #[must_use]
    pub fn from_compressed(bytes: Vec<u8>, decompressed_len: usize) -> File<'static> {
        File {
            bytes: CompressableBytes::from_owned(bytes, Some(decompressed_len)),
        }
    }

    #[must_use]
    pub fn into_owned(self) -> File<'static> {
        File {
            bytes: self.bytes.into_owned(),
        }
    }

    pub fn compress(&self, options: &CompressionOptions) -> Result<File<'static>> {
        let mut bytes = Vec::new();
        self.compress_into(&mut bytes, options)?;
        bytes.shrink_to_fit();
        Ok(File {
            bytes: CompressableBytes::from_owned(bytes, Some(self.len())),
        })
    }

    pub fn compress_into(&self, out: &mut Vec<u8>, options: &CompressionOptions) -> Result<()> {
        if self.is_compressed() {
            return Err(Error::AlreadyCompressed);
        }
        match options.version {
            Version::v103 | Version::v104 => self.compress_into_zlib(out),
            Version::v105 => self.compress_into_lz4(out),
        }
    }

    pub fn decompress(&self, options: &CompressionOptions) -> Result<File<'static>> {
        let mut bytes = Vec::new();
        self.decompress_into(&mut bytes, options)?;
        bytes.shrink_to_fit();
        Ok(File {
            bytes: CompressableBytes::from_owned(bytes, None),
        })
    }

    pub fn decompress_into(&self, out: &mut Vec<u8>, options: &CompressionOptions) -> Result<()> {
        let Some(decompressed_len) = self.decompressed_len() else {
            return Err(Error::AlreadyDecompressed);
        };

        out.reserve_exact(decompressed_len);
        let out_len = match options.version {
            Version::v103 | Version::v104 => self.decompress_into_zlib(out),
            Version::v105 => self.decompress_into_lz4(out),
        }?;

        if out_len == decompressed_len {
            Ok(())
        } else {
            Err(Error::DecompressionSizeMismatch {
                expected: decompressed_len,
                actual: out_len,
            })
        }
    }

    /// Writes the decompressed contents to `stream`.
    pub fn write<Out>(&self, stream: &mut Out, options: &CompressionOptions) -> Result<()>
    where
        Out: ?Sized + Write,
    {
        if self.is_compressed() {
            let mut bytes = Vec::new();
            self.decompress_into(&mut bytes, options)?;
            stream.write_all(&bytes)?;
        } else {
            stream.write_all(self.as_bytes())?;
        }
        Ok(())
    }

    fn compress_into_zlib(&self, out: &mut Vec<u8>) -> Result<()> {
        let mut encoder = ZlibEncoder::new(out, Compression::default());
        encoder.write_all(self.as_bytes())?;
        encoder.finish()?;
        Ok(())
    }

    fn compress_into_lz4(&self, out: &mut Vec<u8>) -> Result<()> {
        let preferences = PreferencesBuilder::new()
            .compression_level(9)
            .auto_flush(AutoFlush::Enabled)
            .build();
        lz4f::compress_to_vec(self.as_bytes(), out, &preferences)?;
        Ok(())
    }

    fn decompress_into_zlib(&self, out: &mut Vec<u8>) -> Result<usize> {
        let mut decoder = ZlibDecoder::new(out);
        decoder.write_all(self.as_bytes())?;
        Ok(decoder.total_out().try_into()?)
    }

    fn decompress_into_lz4(&self, out: &mut Vec<u8>) -> Result<usize> {
        let len = lz4f::decompress_to_vec(self.as_bytes(), out)?;
        Ok(len)
    }
}

#[cfg(test)]
mod tests {
    use crate::tes4::{File, FileCompressionOptions, Version};

    #[test]
    fn default_state() {
        let f = File::new();
        assert!(!f.is_compressed());
        assert!(f.is_empty());
        assert_eq!(f.len(), 0);
    }

    #[test]
    fn compression_round_trips() -> anyhow::Result<()> {
        let payload: Vec<u8> = (0..4096u32).flat_map(u32::to_le_bytes).collect();
        for version in [Version::v103, Version::v104, Version::v105] {
            let options = FileCompressionOptions::from(version);
            let decompressed = File::from_decompressed(payload.clone());
            let compressed = decompressed.compress(&options)?;
            assert!(compressed.is_compressed());
            assert_eq!(compressed.decompressed_len(), Some(payload.len()));

            let restored = compressed.decompress(&options)?;
            assert!(!restored.is_compressed());
            assert_eq!(restored.as_bytes(), &payload[..]);
        }
        Ok(())
    }

    #[test]
    fn double_compression_is_an_error() -> anyhow::Result<()> {
        let options = FileCompressionOptions::from(Version::v104);
        let file = File::from_decompressed(b"payload".to_vec());
        let compressed = file.compress(&options)?;
        assert!(compressed.compress(&options).is_err());
        assert!(file.decompress(&options).is_err());
        Ok(())
    }
}
