use crate::hashing;
use bstr::{BStr, BString};

/// The hash identifying one file inside a Fallout 4 era archive: separate
/// checksums of the directory and the stem, with the extension packed into
/// four bytes between them. Archives are not sorted by it, so the derived
/// ordering is good enough.
#[derive(Clone, Copy, Debug, Default, Eq, Ord, PartialEq, PartialOrd)]
#[repr(C)]
pub struct Hash {
    pub file: u32,
    pub extension: u32,
    pub directory: u32,
}

impl Hash {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

/// The classic reflected CRC-32 table, generated instead of spelled out.
#[must_use]
const fn build_crc32_table() -> [u32; 256] {
    const POLYNOMIAL: u32 = 0xEDB8_8320;
    let mut table = [0u32; 256];
    let mut index = 0;
    while index < 256 {
        let mut crc = index as u32;
        let mut round = 0;
        while round < 8 {
            crc = if crc & 1 == 0 {
                crc >> 1
            } else {
                (crc >> 1) ^ POLYNOMIAL
            };
            round += 1;
        }
        table[index] = crc;
        index += 1;
    }
    table
}

#[must_use]
fn crc32(bytes: &[u8]) -> u32 {
    const TABLE: [u32; 256] = build_crc32_table();
    bytes.iter().fold(0u32, |crc, &b| {
        (crc >> 8) ^ TABLE[((crc ^ u32::from(b)) & 0xFF) as usize]
    })
}

#[must_use]
pub fn hash_file(path: &BStr) -> (Hash, BString) {
    let mut path = path.to_owned();
    (hash_file_in_place(&mut path), path)
}

#[must_use]
pub fn hash_file_in_place(path: &mut BString) -> Hash {
    hashing::normalize_path(path);

    // split on the last separator and the last dot of the whole path; a
    // stem range that comes out backwards collapses to empty
    let separator = path.iter().rposition(|&b| b == b'\\');
    let dot = path.iter().rposition(|&b| b == b'.');

    let directory = separator.map_or(b"".as_slice(), |position| &path[..position]);
    let extension = dot
        .and_then(|position| path.get(position + 1..))
        .unwrap_or_default();
    let stem_start = separator.map_or(0, |position| position + 1);
    let stem_end = dot.unwrap_or(path.len());
    let stem = path.get(stem_start..stem_end).unwrap_or_default();

    let packed_extension = extension
        .iter()
        .take(4)
        .enumerate()
        .fold(0u32, |acc, (index, &b)| acc | u32::from(b) << (index * 8));

    Hash {
        file: crc32(stem),
        extension: packed_extension,
        directory: crc32(directory),
    }
}

#[cfg(test)]
mod tests {
    use crate::fo4::{self, Hash};
    use bstr::ByteSlice as _;

    #[test]
    fn default_state() {
        let hash = Hash::default();
        assert_eq!(hash.file, 0);
        assert_eq!(hash.extension, 0);
        assert_eq!(hash.directory, 0);
    }

    #[test]
    fn generated_table_matches_the_reference_polynomial() {
        let table = super::build_crc32_table();
        assert_eq!(table[0], 0);
        assert_eq!(table[1], 0x7707_3096);
        assert_eq!(table[2], 0xEE0E_612C);
        // index 128 is the lone top bit, which shifts straight out and
        // picks up exactly one polynomial xor
        assert_eq!(table[128], 0xEDB8_8320);
        assert_eq!(table[255], 0x2D02_EF8D);
    }

    #[test]
    fn hash_decomposes_into_directory_stem_and_extension() {
        let wall = fo4::hash_file(br"Textures\Stone\wall_d.DDS".as_bstr()).0;
        assert_eq!(wall.extension, u32::from_le_bytes(*b"dds\0"));

        // same directory, different stem
        let floor = fo4::hash_file(br"textures\stone\floor_n.dds".as_bstr()).0;
        assert_eq!(wall.directory, floor.directory);
        assert_ne!(wall.file, floor.file);

        // same stem, different directory
        let moved = fo4::hash_file(br"meshes\stone\wall_d.dds".as_bstr()).0;
        assert_eq!(wall.file, moved.file);
        assert_ne!(wall.directory, moved.directory);
    }

    #[test]
    fn extensions_pack_little_endian_and_truncate() {
        let long = fo4::hash_file(b"strings/game_en.dlstrings".as_bstr()).0;
        assert_eq!(long.extension, u32::from_le_bytes(*b"dlst"));

        let short = fo4::hash_file(b"meshes/pot.kf".as_bstr()).0;
        assert_eq!(short.extension, u32::from_le_bytes(*b"kf\0\0"));

        let bare = fo4::hash_file(b"interface/credits".as_bstr()).0;
        assert_eq!(bare.extension, 0);
    }

    #[test]
    fn separators_and_case_fold_together() {
        assert_eq!(
            fo4::hash_file(b"Interface/HUDMenu.swf".as_bstr()),
            fo4::hash_file(br"interface\hudmenu.swf".as_bstr())
        );
    }

    #[test]
    fn top_level_files_have_an_empty_directory_hash() {
        let rootless = fo4::hash_file(b"settings.ini".as_bstr()).0;
        assert_eq!(rootless.directory, 0);
        assert_ne!(rootless.file, 0);
    }

    #[test]
    fn known_engine_hashes() {
        // ground truth sampled from real archives
        let l = |path: &[u8]| fo4::hash_file(path.as_bstr()).0;
        let r = |file: u32, extension: u32, directory: u32| Hash {
            file,
            extension,
            directory,
        };

        assert_eq!(
            l(br"Strings\ccBGSFO4001-PipBoy(Black)_en.DLSTRINGS"),
            r(0x1985_075C, 0x7473_6C64, 0x29F6_B58B)
        );
        assert_eq!(
            l(br"Textures\CreationClub\BGSFO4001\AnimObjects\PipBoy\PipBoy02(Black)_d.DDS"),
            r(0x69E1_E82C, 0x0073_6464, 0x2315_7A84)
        );
        assert_eq!(
            l(br"Meshes\Weapons\HandmadeShotgun\HandmadeShotgun_GlowSights.nif"),
            r(0x4E08_0CE2, 0x0066_696E, 0xCCD4_7ECF)
        );
        assert_eq!(
            l(br"Interface\Pipboy_StatsPage.swf"),
            r(0x2F26_E4D0, 0x0066_7773, 0xD2FD_F873)
        );
        assert_eq!(
            l(br"scripts\MinRadiantOwnedBuildResourceScript.pex"),
            r(0xA2DA_D4FD, 0x0078_6570, 0x4072_4840)
        );
    }
}
