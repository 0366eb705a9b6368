//! End-to-end scenarios: pack a tree, write the archives, unpack them, and
//! compare the result byte for byte.

use bsapack::{
    find_archive_name, fs, pack, unpack, Archive, Compression, Game, PackSettings, Settings,
    UnpackSettings,
};
use std::path::{Path, PathBuf};

fn write(root: &Path, relative: &str, data: &[u8]) {
    let path = root.join(relative);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, data).unwrap();
}

/// A deterministic blob that actually exercises the compressors.
fn blob(seed: u32, len: usize) -> Vec<u8> {
    (0..len)
        .map(|i| ((i as u32).wrapping_mul(seed).wrapping_add(seed) >> 3) as u8)
        .collect()
}

/// A `.dds` in the exact canonical form the unpacker reconstructs, so the
/// round trip is byte-exact. BC1, with a full mip chain.
fn make_dds(width: u32, height: u32, mips: u32, seed: u32) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"DDS ");
    out.extend_from_slice(&124u32.to_le_bytes());
    let mut flags = 0x1u32 | 0x2 | 0x4 | 0x1000 | 0x8_0000;
    if mips > 1 {
        flags |= 0x2_0000;
    }
    out.extend_from_slice(&flags.to_le_bytes());
    out.extend_from_slice(&height.to_le_bytes());
    out.extend_from_slice(&width.to_le_bytes());
    let mip0 = (width.div_ceil(4) * height.div_ceil(4) * 8) as usize;
    out.extend_from_slice(&u32::try_from(mip0).unwrap().to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes()); // depth
    out.extend_from_slice(&mips.to_le_bytes());
    out.extend_from_slice(&[0u8; 11 * 4]); // reserved
    out.extend_from_slice(&32u32.to_le_bytes());
    out.extend_from_slice(&0x4u32.to_le_bytes()); // fourcc flag
    out.extend_from_slice(b"DX10");
    out.extend_from_slice(&[0u8; 5 * 4]); // bit count + masks
    let mut caps = 0x1000u32;
    if mips > 1 {
        caps |= 0x40_0000 | 0x8;
    }
    out.extend_from_slice(&caps.to_le_bytes());
    out.extend_from_slice(&[0u8; 4 * 4]); // caps2 .. reserved2
    out.extend_from_slice(&71u32.to_le_bytes()); // BC1_UNORM
    out.extend_from_slice(&3u32.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&1u32.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());

    let data_len: usize = (0..mips)
        .map(|m| {
            let w = u32::max(1, width >> m);
            let h = u32::max(1, height >> m);
            (w.div_ceil(4) * h.div_ceil(4) * 8) as usize
        })
        .sum();
    out.extend_from_slice(&blob(seed, data_len));
    out
}

/// Packs `input`, writes every archive into `input` itself with a derived
/// name, and returns the written archive paths.
fn pack_and_write(input: &Path, game: Game, compress: Compression) -> Vec<PathBuf> {
    let settings = Settings::get(game);
    let mut packer = pack(PackSettings {
        input_dir: input.to_owned(),
        game_settings: settings,
        compress,
        allow_file_pred: None,
    });

    let mut written = Vec::new();
    for archive in packer.by_ref() {
        let out_path =
            find_archive_name(input, settings, archive.kind()).expect("no archive name found");
        archive.write(&out_path).expect("archive write failed");
        written.push(out_path);
    }
    assert!(
        packer.errors().is_empty(),
        "pack reported per-file errors: {:?}",
        packer.errors()
    );
    written
}

fn unpack_into(archives: &[PathBuf], out: &Path) {
    for archive_path in archives {
        let errors = unpack(&UnpackSettings {
            file_path: archive_path.clone(),
            remove_arch: false,
            overwrite_existing_files: true,
            extract_to_dir: Some(out.to_owned()),
        })
        .expect("unpack failed");
        assert!(errors.is_empty(), "unpack reported errors: {errors:?}");
    }
}

#[test]
fn sse_pack_unpack_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("input");

    // lower case on disk: archive name tables are case folded
    let tree: &[(&str, Vec<u8>)] = &[
        ("meshes/clutter/pot.nif", blob(3, 4096)),
        ("meshes/clutter/pan.nif", blob(5, 1024)),
        ("meshes/armor/cuirass.nif", blob(7, 8192)),
        ("textures/clutter/pot.dds", blob(11, 2048)),
        ("textures/armor/cuirass.dds", blob(13, 6144)),
        ("sound/fx/clang.wav", blob(17, 3000)),
        ("interface/map.swf", blob(19, 500)),
    ];
    for (name, data) in tree {
        write(&input, name, data);
    }
    // rejected: root file, empty file, blacklisted extension
    write(&input, "root.nif", b"root");
    write(&input, "meshes/empty.nif", b"");
    write(&input, "docs/readme.md", b"skip me");

    let archives = pack_and_write(&input, Game::Sse, Compression::Yes);
    // one standard archive plus one texture archive
    assert_eq!(archives.len(), 2);
    assert!(archives.iter().any(|path| path
        .file_name()
        .unwrap()
        .to_string_lossy()
        .contains("Textures")));

    let out = dir.path().join("out");
    unpack_into(&archives, &out);

    let expected = dir.path().join("expected");
    for (name, data) in tree {
        write(&expected, name, data);
    }
    assert!(
        fs::compare_directories(&out, &expected),
        "unpacked tree differs from the packable input"
    );
}

#[test]
fn fo4_pack_unpack_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("input");

    let pot_dds = make_dds(64, 64, 7, 23);
    let wall_dds = make_dds(2048, 2048, 12, 29);
    let tree: &[(&str, Vec<u8>)] = &[
        ("meshes/clutter/pot.nif", blob(3, 4096)),
        ("interface/hud.swf", blob(19, 640)),
        ("textures/clutter/pot.dds", pot_dds.clone()),
        ("textures/architecture/wall.dds", wall_dds.clone()),
    ];
    for (name, data) in tree {
        write(&input, name, data);
    }

    let archives = pack_and_write(&input, Game::Fo4, Compression::Yes);
    assert_eq!(archives.len(), 2);
    assert!(archives
        .iter()
        .all(|path| path.extension().unwrap().to_string_lossy() == "ba2"));

    let out = dir.path().join("out");
    unpack_into(&archives, &out);

    let expected = dir.path().join("expected");
    for (name, data) in tree {
        write(&expected, name, data);
    }
    assert!(
        fs::compare_directories(&out, &expected),
        "unpacked tree differs from the packable input"
    );
}

#[test]
fn load_save_is_byte_exact() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("input");
    write(&input, "meshes/clutter/pot.nif", &blob(3, 4096));
    write(&input, "meshes/clutter/pan.nif", &blob(5, 512));
    write(&input, "sound/fx/clang.wav", &blob(17, 3000));

    let archives = pack_and_write(&input, Game::Sse, Compression::Yes);
    assert_eq!(archives.len(), 1);

    let copy = dir.path().join("copy.bsa");
    let archive = Archive::open(&archives[0]).expect("reopen failed");
    archive.write(&copy).expect("rewrite failed");
    assert!(
        fs::compare_files(&archives[0], &copy),
        "load + save is not byte identical"
    );
}

fn leaked_settings_with_cap(game: Game, max_size: u64) -> &'static Settings {
    let mut settings = Settings::get(game).clone();
    settings.max_size = max_size;
    Box::leak(Box::new(settings))
}

#[test]
fn overflowing_input_splits_into_two_archives() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("input");

    // 100 files with strictly decreasing sizes, summing past the cap
    for i in 0..100u32 {
        let len = 1500 - (i as usize) * 2;
        write(&input, &format!("meshes/m{i:03}.nif"), &blob(i + 1, len));
    }

    let settings = leaked_settings_with_cap(Game::Sse, 100_000);
    let mut packer = pack(PackSettings {
        input_dir: input.clone(),
        game_settings: settings,
        compress: Compression::No,
        allow_file_pred: None,
    });
    let archives: Vec<Archive> = packer.by_ref().collect();
    assert!(packer.errors().is_empty());
    assert_eq!(archives.len(), 2);
    assert_eq!(archives[0].len() + archives[1].len(), 100);
    assert!(archives[0].file_size() <= settings.max_size);
    assert!(archives[1].file_size() <= settings.max_size);

    // first-fit-decreasing: the first archive holds the large prefix
    let min_first = archives[0]
        .iter()
        .map(|(_, file)| file.size())
        .min()
        .unwrap();
    let max_second = archives[1]
        .iter()
        .map(|(_, file)| file.size())
        .max()
        .unwrap();
    assert!(min_first > max_second);
    assert!(archives[0].len() > archives[1].len());
}

#[test]
fn oversized_file_is_packed_alone() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("input");
    write(&input, "meshes/huge.nif", &blob(1, 200_000));
    write(&input, "meshes/small.nif", &blob(2, 100));

    let settings = leaked_settings_with_cap(Game::Sse, 100_000);
    let archives: Vec<Archive> = pack(PackSettings {
        input_dir: input.clone(),
        game_settings: settings,
        compress: Compression::No,
        allow_file_pred: None,
    })
    .collect();

    assert_eq!(archives.len(), 2);
    assert_eq!(archives[0].len(), 1);
    assert!(archives[0].get("meshes/huge.nif").is_some());
    assert!(archives[1].get("meshes/small.nif").is_some());
}

#[test]
fn packed_multiset_matches_the_input() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("input");
    let names: Vec<String> = (0..40).map(|i| format!("meshes/part{i:02}.nif")).collect();
    for (i, name) in names.iter().enumerate() {
        write(&input, name, &blob(i as u32 + 1, 300 + i));
    }

    let archives: Vec<Archive> = pack(PackSettings {
        input_dir: input.clone(),
        game_settings: Settings::get(Game::Sse),
        compress: Compression::No,
        allow_file_pred: None,
    })
    .collect();

    let mut seen: Vec<(String, Vec<u8>)> = archives
        .iter()
        .flat_map(|archive| {
            archive.iter().map(|(name, file)| {
                let mut loose = Vec::new();
                file.write_stream(&mut loose).unwrap();
                (name.to_owned(), loose)
            })
        })
        .collect();
    seen.sort();

    let mut expected: Vec<(String, Vec<u8>)> = names
        .iter()
        .map(|name| (name.clone(), std::fs::read(input.join(name)).unwrap()))
        .collect();
    expected.sort();

    assert_eq!(seen, expected);
}
