use crate::hashing;
use bstr::{BStr, BString, ByteSlice as _};
use core::cmp::Ordering;

/// The hash identifying a directory or file name inside an Oblivion era
/// archive: four bytes sampled from the normalized name, then a checksum of
/// everything in between.
///
/// The exact bit patterns are load-bearing; the engine computes the same
/// values at runtime to look names up, so every quirk below (truncated
/// lengths included) has to be reproduced as is.
#[derive(Clone, Copy, Debug, Default)]
#[repr(C)]
pub struct Hash {
    pub last: u8,
    pub last2: u8,
    pub length: u8,
    pub first: u8,
    pub crc: u32,
}

impl Hash {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The hash packed into one integer, low bytes first, the way records
    /// compare on disk.
    #[must_use]
    pub fn numeric(&self) -> u64 {
        let [c0, c1, c2, c3] = self.crc.to_le_bytes();
        u64::from_le_bytes([
            self.last,
            self.last2,
            self.length,
            self.first,
            c0,
            c1,
            c2,
            c3,
        ])
    }
}

impl PartialEq for Hash {
    fn eq(&self, other: &Self) -> bool {
        self.numeric() == other.numeric()
    }
}

impl Eq for Hash {}

impl PartialOrd for Hash {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Hash {
    fn cmp(&self, other: &Self) -> Ordering {
        // field-wise from the most significant byte of numeric() down
        (self.crc, self.first, self.length, self.last2, self.last).cmp(&(
            other.crc,
            other.first,
            other.length,
            other.last2,
            other.last,
        ))
    }
}

fn crc32(bytes: &[u8]) -> u32 {
    bytes
        .iter()
        .fold(0u32, |crc, &b| u32::from(b).wrapping_add(crc.wrapping_mul(0x1003F)))
}

#[must_use]
pub fn hash_directory(path: &BStr) -> (Hash, BString) {
    let mut path = path.to_owned();
    (hash_directory_in_place(&mut path), path)
}

#[must_use]
pub fn hash_directory_in_place(path: &mut BString) -> Hash {
    hashing::normalize_path(path);
    let len = path.len();

    let mut hash = Hash::new();
    // the engine stores the length truncated to a byte, and keys the crc
    // decision off the truncated value
    #[allow(clippy::cast_possible_truncation)]
    {
        hash.length = len as u8;
    }
    if let (Some(&first), Some(&last)) = (path.first(), path.last()) {
        hash.first = first;
        hash.last = last;
    }
    if len >= 3 {
        hash.last2 = path[len - 2];
    }
    if hash.length > 3 {
        // everything between the first byte and the final two
        hash.crc = crc32(&path[1..len - 2]);
    }

    hash
}

#[must_use]
pub fn hash_file(path: &BStr) -> (Hash, BString) {
    let mut path = path.to_owned();
    (hash_file_in_place(&mut path), path)
}

#[must_use]
pub fn hash_file_in_place(path: &mut BString) -> Hash {
    hashing::normalize_path(path);
    if let Some(separator) = path.iter().rposition(|&b| b == b'\\') {
        path.drain(..=separator);
    }

    let (stem, extension) = match path.iter().rposition(|&b| b == b'.') {
        Some(dot) => (&path[..dot], &path[dot..]),
        None => (&path[..], b"".as_slice()),
    };

    if stem.is_empty() || stem.len() >= 260 || extension.len() >= 16 {
        return Hash::default();
    }

    let mut hash = hash_directory(stem.as_bstr()).0;
    hash.crc = hash.crc.wrapping_add(crc32(extension));

    // a handful of extensions are also folded into the sampled name bytes;
    // the engine matches on the zero-padded first four bytes only, and the
    // shift-and-mask arithmetic it performs on the table index reduces,
    // modulo 256, to these bumps
    let mut code = [0u8; 4];
    for (slot, &byte) in code.iter_mut().zip(extension) {
        *slot = byte;
    }
    let (first, last, last2) = match &code {
        b".nif" => (0x00, 0x00, 0x80),
        b".kf\0" => (0x00, 0x80, 0x00),
        b".dds" => (0x00, 0x80, 0x80),
        b".wav" => (0x80, 0x00, 0x00),
        b".adp" => (0x80, 0x00, 0x80),
        _ => (0x00, 0x00, 0x00),
    };
    hash.first = hash.first.wrapping_add(first);
    hash.last = hash.last.wrapping_add(last);
    hash.last2 = hash.last2.wrapping_add(last2);

    hash
}
