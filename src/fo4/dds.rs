//! Just enough DDS surgery to cut a texture into archive chunks and to put
//! it back together again.
//!
//! A `.dds` file is a 128 byte header (magic plus `DDS_HEADER`), optionally
//! a 20 byte `DDS_HEADER_DXT10` extension, then the pixel data of every mip
//! level, tightly packed. The archive stores only the pixel data; the header
//! fields travel in the file record instead.

use crate::{
    cc,
    fo4::{ChunkMips, Error, FileDX10, Result},
    io::{Endian, Sink},
};
use core::ops::Range;
use std::io::Write;

const MAGIC: u32 = cc::make_four(b"DDS ");
const FOURCC_DX10: u32 = cc::make_four(b"DX10");
const HEADER_SIZE: usize = 0x80;
const DX10_HEADER_SIZE: usize = 0x14;

const DDSD_MIPMAPCOUNT: u32 = 0x2_0000;
const DDSD_LINEARSIZE: u32 = 0x8_0000;
const DDPF_FOURCC: u32 = 0x4;
const DDSCAPS_COMPLEX: u32 = 0x8;
const DDSCAPS_TEXTURE: u32 = 0x1000;
const DDSCAPS_MIPMAP: u32 = 0x40_0000;
const DDSCAPS2_CUBEMAP: u32 = 0x200;
const DDSCAPS2_CUBEMAP_ALL_FACES: u32 = 0xFE00;
const DDSCAPS2_VOLUME: u32 = 0x20_0000;

/// Mips at or below this dimension are streamed together in one chunk.
const MIP_CUTOFF: u32 = 512;
const MAX_CHUNKS: usize = 4;

mod dxgi {
    pub(super) const R8G8B8A8_UNORM: u32 = 28;
    pub(super) const R8G8B8A8_UNORM_SRGB: u32 = 29;
    pub(super) const R8_UNORM: u32 = 61;
    pub(super) const BC1_UNORM: u32 = 71;
    pub(super) const BC1_UNORM_SRGB: u32 = 72;
    pub(super) const BC2_UNORM: u32 = 74;
    pub(super) const BC2_UNORM_SRGB: u32 = 75;
    pub(super) const BC3_UNORM: u32 = 77;
    pub(super) const BC3_UNORM_SRGB: u32 = 78;
    pub(super) const BC4_UNORM: u32 = 80;
    pub(super) const BC4_SNORM: u32 = 81;
    pub(super) const BC5_UNORM: u32 = 83;
    pub(super) const BC5_SNORM: u32 = 84;
    pub(super) const B5G6R5_UNORM: u32 = 85;
    pub(super) const B8G8R8A8_UNORM: u32 = 87;
    pub(super) const B8G8R8X8_UNORM: u32 = 88;
    pub(super) const BC6H_UF16: u32 = 95;
    pub(super) const BC6H_SF16: u32 = 96;
    pub(super) const BC7_UNORM: u32 = 98;
    pub(super) const BC7_UNORM_SRGB: u32 = 99;
}

/// (block dimension, bytes per block) for the formats games actually ship.
#[must_use]
fn block_info(format: u32) -> Option<(u32, u32)> {
    use dxgi::*;
    match format {
        BC1_UNORM | BC1_UNORM_SRGB | BC4_UNORM | BC4_SNORM => Some((4, 8)),
        BC2_UNORM | BC2_UNORM_SRGB | BC3_UNORM | BC3_UNORM_SRGB | BC5_UNORM | BC5_SNORM
        | BC6H_UF16 | BC6H_SF16 | BC7_UNORM | BC7_UNORM_SRGB => Some((4, 16)),
        R8G8B8A8_UNORM | R8G8B8A8_UNORM_SRGB | B8G8R8A8_UNORM | B8G8R8X8_UNORM => Some((1, 4)),
        B5G6R5_UNORM => Some((1, 2)),
        R8_UNORM => Some((1, 1)),
        _ => None,
    }
}

#[must_use]
fn mip_len(format: u32, width: u32, height: u32, mip: u32) -> usize {
    let (block_dim, block_len) = block_info(format).unwrap_or((1, 4));
    let w = u32::max(1, width >> mip);
    let h = u32::max(1, height >> mip);
    let blocks_w = w.div_ceil(block_dim);
    let blocks_h = h.div_ceil(block_dim);
    (blocks_w * blocks_h * block_len) as usize
}

#[must_use]
fn map_legacy_fourcc(fourcc: u32, pf_flags: u32, bit_count: u32, r_mask: u32) -> Option<u32> {
    if pf_flags & DDPF_FOURCC != 0 {
        match fourcc {
            x if x == cc::make_four(b"DXT1") => Some(dxgi::BC1_UNORM),
            x if x == cc::make_four(b"DXT2") || x == cc::make_four(b"DXT3") => {
                Some(dxgi::BC2_UNORM)
            }
            x if x == cc::make_four(b"DXT4") || x == cc::make_four(b"DXT5") => {
                Some(dxgi::BC3_UNORM)
            }
            x if x == cc::make_four(b"ATI1") || x == cc::make_four(b"BC4U") => {
                Some(dxgi::BC4_UNORM)
            }
            x if x == cc::make_four(b"ATI2") || x == cc::make_four(b"BC5U") => {
                Some(dxgi::BC5_UNORM)
            }
            _ => None,
        }
    } else {
        match (bit_count, r_mask) {
            (32, 0x0000_00FF) => Some(dxgi::R8G8B8A8_UNORM),
            (32, 0x00FF_0000) => Some(dxgi::B8G8R8A8_UNORM),
            (8, _) => Some(dxgi::R8_UNORM),
            _ => None,
        }
    }
}

#[must_use]
fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    let mut buffer = [0u8; 4];
    buffer.copy_from_slice(&bytes[offset..offset + 4]);
    u32::from_le_bytes(buffer)
}

/// How the pixel data of one `.dds` buffer maps onto archive chunks.
pub(crate) struct Layout {
    pub(crate) header: FileDX10,
    pub(crate) chunks: Vec<(Range<usize>, ChunkMips)>,
}

/// Parses a `.dds` byte buffer and computes its chunk layout.
pub(crate) fn split(bytes: &[u8]) -> Result<Layout> {
    if bytes.len() < HEADER_SIZE {
        return Err(Error::InvalidDds("file is smaller than a dds header"));
    }
    if read_u32(bytes, 0x0) != MAGIC {
        return Err(Error::InvalidDds("bad magic"));
    }
    if read_u32(bytes, 0x4) != 124 {
        return Err(Error::InvalidDds("bad header size"));
    }

    let height = read_u32(bytes, 0xC);
    let width = read_u32(bytes, 0x10);
    let depth = read_u32(bytes, 0x18);
    let mip_count = u32::max(1, read_u32(bytes, 0x1C));
    let pf_flags = read_u32(bytes, 0x50);
    let fourcc = read_u32(bytes, 0x54);
    let bit_count = read_u32(bytes, 0x58);
    let r_mask = read_u32(bytes, 0x5C);
    let caps2 = read_u32(bytes, 0x70);

    let cubemap = caps2 & DDSCAPS2_CUBEMAP != 0;
    let volume = caps2 & DDSCAPS2_VOLUME != 0 || depth > 1;

    let (format, data_offset) = if pf_flags & DDPF_FOURCC != 0 && fourcc == FOURCC_DX10 {
        if bytes.len() < HEADER_SIZE + DX10_HEADER_SIZE {
            return Err(Error::InvalidDds("truncated extension header"));
        }
        (read_u32(bytes, 0x80), HEADER_SIZE + DX10_HEADER_SIZE)
    } else {
        let Some(format) = map_legacy_fourcc(fourcc, pf_flags, bit_count, r_mask) else {
            return Err(Error::InvalidDds("unsupported pixel format"));
        };
        (format, HEADER_SIZE)
    };
    if block_info(format).is_none() {
        return Err(Error::InvalidDds("unsupported pixel format"));
    }

    let mip_sizes: Vec<usize> = (0..mip_count)
        .map(|mip| mip_len(format, width, height, mip))
        .collect();
    let face_len: usize = mip_sizes.iter().sum();
    let faces = if cubemap { 6 } else { 1 };
    if data_offset + face_len * faces > bytes.len() {
        return Err(Error::InvalidDds("pixel data is truncated"));
    }

    let last_mip: u16 = u16::try_from(mip_count - 1)?;
    let header = FileDX10 {
        height: height.try_into().map_err(|_| Error::IntegralTruncation)?,
        width: width.try_into().map_err(|_| Error::IntegralTruncation)?,
        mip_count: mip_count.try_into().map_err(|_| Error::IntegralTruncation)?,
        format: format.try_into().map_err(|_| Error::IntegralTruncation)?,
        flags: u8::from(cubemap),
        tile_mode: 8,
    };

    // cubemaps and volumes keep their face interleaving intact
    if cubemap || volume {
        let total = face_len * faces;
        return Ok(Layout {
            header,
            chunks: vec![(
                data_offset..data_offset + total,
                ChunkMips {
                    first: 0,
                    last: last_mip,
                },
            )],
        });
    }

    // one chunk per large mip, then everything at or below the cutoff
    // streams together
    let mut cut = (0..mip_count)
        .take_while(|&mip| u32::max(width >> mip, height >> mip) > MIP_CUTOFF)
        .count();
    cut = usize::min(cut, MAX_CHUNKS - 1);

    let mut chunks = Vec::new();
    let mut offset = data_offset;
    if cut == 0 {
        chunks.push((
            offset..offset + face_len,
            ChunkMips {
                first: 0,
                last: last_mip,
            },
        ));
    } else {
        for (mip, len) in mip_sizes.iter().enumerate().take(cut) {
            let mip = u16::try_from(mip)?;
            chunks.push((offset..offset + len, ChunkMips { first: mip, last: mip }));
            offset += len;
        }
        let tail: usize = mip_sizes[cut..].iter().sum();
        if tail > 0 {
            chunks.push((
                offset..offset + tail,
                ChunkMips {
                    first: u16::try_from(cut)?,
                    last: last_mip,
                },
            ));
        }
    }

    Ok(Layout { header, chunks })
}

/// Writes a `.dds` header matching `file`, always with the DX10 extension.
pub(crate) fn write_header<Out>(stream: &mut Out, file: &FileDX10) -> Result<()>
where
    Out: ?Sized + Write,
{
    let mut sink = Sink::new(stream);
    let width = u32::from(file.width);
    let height = u32::from(file.height);
    let mip_count = u32::from(file.mip_count);
    let format = u32::from(file.format);
    let cubemap = file.flags != 0;

    let mut flags = 0x1 | 0x2 | 0x4 | 0x1000 | DDSD_LINEARSIZE;
    if mip_count > 1 {
        flags |= DDSD_MIPMAPCOUNT;
    }

    let mut caps = DDSCAPS_TEXTURE;
    if mip_count > 1 {
        caps |= DDSCAPS_MIPMAP | DDSCAPS_COMPLEX;
    }
    if cubemap {
        caps |= DDSCAPS_COMPLEX;
    }
    let caps2 = if cubemap {
        DDSCAPS2_CUBEMAP | DDSCAPS2_CUBEMAP_ALL_FACES
    } else {
        0
    };

    sink.write(
        &(
            MAGIC,
            124u32,
            flags,
            height,
            width,
            u32::try_from(mip_len(format, width, height, 0))?,
            0u32, // depth
            mip_count,
        ),
        Endian::Little,
    )?;
    for _ in 0..11 {
        sink.write(&0u32, Endian::Little)?; // reserved
    }
    sink.write(
        &(32u32, DDPF_FOURCC, FOURCC_DX10, 0u32, 0u32, 0u32, 0u32, 0u32),
        Endian::Little,
    )?;
    sink.write(&(caps, caps2, 0u32, 0u32, 0u32), Endian::Little)?;

    // DDS_HEADER_DXT10
    sink.write(
        &(
            format,
            3u32, // DDS_DIMENSION_TEXTURE2D
            if cubemap { 0x4u32 } else { 0 },
            1u32, // array size
            0u32,
        ),
        Endian::Little,
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{split, write_header};
    use crate::fo4::FileDX10;

    /// A minimal BC1 texture header with the DX10 extension.
    fn make_dds(width: u32, height: u32, mips: u32, data_len: usize) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(b"DDS ");
        out.extend_from_slice(&124u32.to_le_bytes());
        out.extend_from_slice(&(0x1 | 0x2 | 0x4 | 0x1000 | 0x2_0000u32).to_le_bytes());
        out.extend_from_slice(&height.to_le_bytes());
        out.extend_from_slice(&width.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes()); // pitch
        out.extend_from_slice(&0u32.to_le_bytes()); // depth
        out.extend_from_slice(&mips.to_le_bytes());
        out.extend_from_slice(&[0u8; 11 * 4]); // reserved
        out.extend_from_slice(&32u32.to_le_bytes());
        out.extend_from_slice(&0x4u32.to_le_bytes()); // fourcc flag
        out.extend_from_slice(b"DX10");
        out.extend_from_slice(&[0u8; 5 * 4]); // bit count + masks
        out.extend_from_slice(&[0u8; 4 * 4]); // caps .. caps4
        out.extend_from_slice(&0u32.to_le_bytes()); // reserved2
        out.extend_from_slice(&71u32.to_le_bytes()); // BC1_UNORM
        out.extend_from_slice(&3u32.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&1u32.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        out.resize(out.len() + data_len, 0xAB);
        out
    }

    #[test]
    fn small_texture_is_one_chunk() -> anyhow::Result<()> {
        // 8x8 BC1: mips 8, 4, 2, 1 -> 32 + 8 + 8 + 8 bytes
        let dds = make_dds(8, 8, 4, 56);
        let layout = split(&dds)?;
        assert_eq!(layout.header.width, 8);
        assert_eq!(layout.header.height, 8);
        assert_eq!(layout.header.mip_count, 4);
        assert_eq!(layout.header.format, 71);
        assert_eq!(layout.chunks.len(), 1);
        assert_eq!(layout.chunks[0].0, 148..148 + 56);
        assert_eq!(layout.chunks[0].1.first, 0);
        assert_eq!(layout.chunks[0].1.last, 3);
        Ok(())
    }

    #[test]
    fn large_texture_splits_per_mip() -> anyhow::Result<()> {
        // 2048x2048 BC1: mips 2048..1, 12 levels
        let mip0 = 2048usize * 2048 / 2;
        let data_len: usize = (0..12u32)
            .map(|m| {
                let dim = usize::max(1, 2048 >> m);
                let blocks = usize::max(1, dim / 4);
                blocks * blocks * 8
            })
            .sum();
        let dds = make_dds(2048, 2048, 12, data_len);
        let layout = split(&dds)?;
        // 2048 and 1024 get their own chunks, everything from 512 down shares
        assert_eq!(layout.chunks.len(), 3);
        assert_eq!(layout.chunks[0].0.len(), mip0);
        assert_eq!(layout.chunks[0].1.first, 0);
        assert_eq!(layout.chunks[0].1.last, 0);
        assert_eq!(layout.chunks[2].1.first, 2);
        assert_eq!(layout.chunks[2].1.last, 11);

        let total: usize = layout.chunks.iter().map(|(range, _)| range.len()).sum();
        assert_eq!(total, data_len);
        Ok(())
    }

    #[test]
    fn truncated_data_is_rejected() {
        let dds = make_dds(8, 8, 4, 10);
        assert!(split(&dds).is_err());
    }

    #[test]
    fn header_write_parses_back() -> anyhow::Result<()> {
        let header = FileDX10 {
            height: 16,
            width: 32,
            mip_count: 2,
            format: 77,
            flags: 0,
            tile_mode: 8,
        };
        let mut buffer = Vec::new();
        write_header(&mut buffer, &header)?;
        // 16x32 BC3: mip0 = 8x4 blocks? width 32 -> 8 blocks, height 16 -> 4 blocks, *16
        buffer.resize(buffer.len() + 8 * 4 * 16 + 4 * 2 * 16, 0);
        let layout = split(&buffer)?;
        assert_eq!(layout.header.height, 16);
        assert_eq!(layout.header.width, 32);
        assert_eq!(layout.header.mip_count, 2);
        assert_eq!(layout.header.format, 77);
        Ok(())
    }
}
