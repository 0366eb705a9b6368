//! The Fallout 4 / Starfield archive dialect.
//!
//! Files are split into independently compressed chunks. Texture archives
//! carry DDS metadata in their file records and store the pixel data itself,
//! so packing a `.dds` means parsing its header and cutting the mip chain
//! into chunks.

mod archive;
mod chunk;
mod dds;
mod file;
pub(crate) mod hashing;

pub use self::{
    archive::{Archive, Key as ArchiveKey, Options as ArchiveOptions},
    chunk::{Chunk, ChunkMips},
    file::{File, Header as FileHeader, DX10 as FileDX10},
    hashing::{hash_file, hash_file_in_place, Hash},
};

use core::num::TryFromIntError;
use std::io;

#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("can not compress the given chunk because it is already compressed")]
    AlreadyCompressed,

    #[error("can not decompress the given chunk because it is already decompressed")]
    AlreadyDecompressed,

    #[error("buffer failed to decompress to the expected size... expected {expected} bytes, but got {actual} bytes")]
    DecompressionSizeMismatch { expected: usize, actual: usize },

    #[error(
        "attempted to write an archive in a format that does not match a file/chunk in the archive"
    )]
    FormatMismatch,

    #[error("an operation on an integer would have truncated and corrupted data")]
    IntegralTruncation,

    #[error("invalid sentinel read from chunk: {0}")]
    InvalidChunkSentinel(u32),

    #[error("invalid chunk size read from file header: {0}")]
    InvalidChunkSize(u16),

    #[error("invalid dds data: {0}")]
    InvalidDds(&'static str),

    #[error("invalid format read from archive header: {0}")]
    InvalidFormat(u32),

    #[error("invalid magic read from archive header: {0}")]
    InvalidMagic(u32),

    #[error("invalid version read from archive header: {0}")]
    InvalidVersion(u32),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    LZ4(#[from] lzzzz::Error),
}

impl From<TryFromIntError> for Error {
    fn from(_: TryFromIntError) -> Self {
        Self::IntegralTruncation
    }
}

pub type Result<T> = core::result::Result<T, Error>;

/// The compression codec used by every chunk of an archive.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum CompressionFormat {
    /// zlib; understood by every game using this dialect.
    #[default]
    Zip,

    /// lz4 block compression; Starfield only.
    LZ4,
}

/// Whether an archive stores general data or chunked DDS textures.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Format {
    #[default]
    GNRL,
    DX10,
}

/// The container version stored in the header.
#[allow(non_camel_case_types)]
#[derive(Clone, Copy, Debug, Default, Eq, Ord, PartialEq, PartialOrd)]
pub enum Version {
    /// Fallout 4.
    #[default]
    v1 = 1,

    /// Starfield.
    v2 = 2,

    /// Starfield, with a selectable compression format.
    v3 = 3,
}

impl Version {
    #[must_use]
    pub fn code(self) -> u32 {
        self as u32
    }
}
