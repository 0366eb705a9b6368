//! Per-game packing rules: formats, size caps, classification tables, and
//! the dummy plugins used to force orphan archives to load.

use once_cell::sync::Lazy;
use std::path::Path;

use crate::strings;

/// The games whose archives this crate understands.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Game {
    Tes3,
    Tes4,
    Fnv,
    Sle,
    Sse,
    Fo4,
    Starfield,
}

/// The on-disk dialect of an archive.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ArchiveVersion {
    Tes3,
    Tes4,
    Fo3,
    Tes5,
    Sse,
    Fo4,
    Fo4Dx,
    Starfield,
}

impl ArchiveVersion {
    /// The version code stored on disk. TES3 uses its header magic; the FO4
    /// family stores a container version next to a format fourcc instead.
    #[must_use]
    pub fn code(self) -> u32 {
        match self {
            Self::Tes3 => 0x100,
            Self::Tes4 => 103,
            Self::Fo3 | Self::Tes5 => 104,
            Self::Sse => 105,
            Self::Fo4 | Self::Fo4Dx => 1,
            Self::Starfield => 2,
        }
    }

    #[must_use]
    pub fn is_tes4_family(self) -> bool {
        matches!(self, Self::Tes4 | Self::Fo3 | Self::Tes5 | Self::Sse)
    }

    #[must_use]
    pub fn is_fo4_family(self) -> bool {
        matches!(self, Self::Fo4 | Self::Fo4Dx | Self::Starfield)
    }
}

/// Whether an archive holds general data or textures. Games without a
/// dedicated texture dialect only ever use [`ArchiveType::Standard`].
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ArchiveType {
    Standard,
    Textures,
}

/// What a loose file is, as far as packing is concerned.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum FileKind {
    Standard,
    Texture,
    Incompressible,
    Plugin,
    Bsa,
    Blacklist,
}

/// An extension plus the set of top level directories it may live in.
/// The special directory `root` admits files directly at the tree root.
#[derive(Clone, Debug)]
pub struct AllowedPath {
    pub extension: &'static str,
    pub directories: &'static [&'static str],
}

impl AllowedPath {
    pub const ROOT: &'static str = "root";

    #[must_use]
    fn check(&self, path: &Path, root: &Path) -> bool {
        let Some(extension) = path.extension() else {
            return false;
        };
        let extension = format!(".{}", extension.to_string_lossy());
        if !strings::str_compare(self.extension, &extension, false) {
            return false;
        }

        let relative = path.strip_prefix(root).unwrap_or(path);
        let mut components = relative.components();
        let first = components.next();
        let directory = match (first, components.next()) {
            // a bare file name sits at the root of the tree
            (_, None) | (None, _) => Self::ROOT.to_owned(),
            (Some(first), Some(_)) => strings::to_lower(&first.as_os_str().to_string_lossy()),
        };
        self.directories.iter().any(|allowed| *allowed == directory)
    }
}

/// The frozen packing rules of one game.
#[derive(Clone, Debug)]
pub struct Settings {
    pub game: Game,
    pub max_size: u64,
    pub version: ArchiveVersion,
    pub texture_version: Option<ArchiveVersion>,
    pub suffix: Option<&'static str>,
    pub texture_suffix: Option<&'static str>,
    pub extension: &'static str,
    pub plugin_extensions: &'static [&'static str],
    pub dummy_extension: &'static str,
    pub dummy_plugin: Option<&'static [u8]>,
    pub standard_files: Vec<AllowedPath>,
    pub texture_files: Vec<AllowedPath>,
    pub incompressible_files: Vec<AllowedPath>,
}

impl Settings {
    /// The settings for `game`. These are process-wide frozen values.
    #[must_use]
    pub fn get(game: Game) -> &'static Settings {
        match game {
            Game::Tes3 => &TES3,
            Game::Tes4 => &TES4,
            Game::Fnv => &FNV,
            Game::Sle => &SLE,
            Game::Sse => &SSE,
            Game::Fo4 => &FO4,
            Game::Starfield => &STARFIELD,
        }
    }

    /// The dialect used for archives of `kind` under these settings.
    #[must_use]
    pub fn version_for(&self, kind: ArchiveType) -> ArchiveVersion {
        match kind {
            ArchiveType::Standard => self.version,
            ArchiveType::Textures => self.texture_version.unwrap_or(self.version),
        }
    }

    /// The filename suffix marking archives of `kind`, e.g. ` - Textures`.
    #[must_use]
    pub fn suffix_for(&self, kind: ArchiveType) -> &'static str {
        match kind {
            ArchiveType::Standard => self.suffix.unwrap_or_default(),
            ArchiveType::Textures => self.texture_suffix.unwrap_or_default(),
        }
    }
}

/// Classifies a loose file. This is the sole authority on whether a file is
/// packed, into which stream, and whether it may be compressed.
#[must_use]
pub fn classify(path: &Path, root: &Path, settings: &Settings) -> FileKind {
    let tables = [
        (&settings.standard_files, FileKind::Standard),
        (&settings.texture_files, FileKind::Texture),
        (&settings.incompressible_files, FileKind::Incompressible),
    ];
    for (table, kind) in tables {
        if table.iter().any(|allowed| allowed.check(path, root)) {
            return kind;
        }
    }

    let extension = path
        .extension()
        .map(|extension| format!(".{}", extension.to_string_lossy()))
        .unwrap_or_default();
    if settings
        .plugin_extensions
        .iter()
        .any(|plugin| strings::str_compare(plugin, &extension, false))
    {
        return FileKind::Plugin;
    }
    if strings::str_compare(settings.extension, &extension, false) {
        return FileKind::Bsa;
    }

    FileKind::Blacklist
}

mod dummy {
    pub(super) static TES5: &[u8] = &[
        0x54, 0x45, 0x53, 0x34, 0x19, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        0x00, 0x00, 0x00, 0x00, 0x00, 0x2B, 0x00, 0x00, 0x00, 0x48, 0x45, 0x44, 0x52, 0x0C, 0x00,
        0x9A, 0x99, 0xD9, 0x3F, 0x00, 0x00, 0x00, 0x00, 0x00, 0x08, 0x00, 0x00, 0x43, 0x4E, 0x41,
        0x4D, 0x01, 0x00, 0x00,
    ];

    pub(super) static SSE: &[u8] = &[
        0x54, 0x45, 0x53, 0x34, 0x19, 0x00, 0x00, 0x00, 0x00, 0x02, 0x00, 0x00, 0x00, 0x00, 0x00,
        0x00, 0x00, 0x00, 0x00, 0x00, 0x2C, 0x00, 0x00, 0x00, 0x48, 0x45, 0x44, 0x52, 0x0C, 0x00,
        0x9A, 0x99, 0xD9, 0x3F, 0x00, 0x00, 0x00, 0x00, 0x00, 0x08, 0x00, 0x00, 0x43, 0x4E, 0x41,
        0x4D, 0x01, 0x00, 0x00,
    ];

    pub(super) static OBLIVION: &[u8] = &[
        0x54, 0x45, 0x53, 0x34, 0x20, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        0x00, 0x00, 0x00, 0x00, 0x00, 0x48, 0x45, 0x44, 0x52, 0x0C, 0x00, 0x00, 0x00, 0x80, 0x3F,
        0x00, 0x00, 0x00, 0x00, 0x00, 0x08, 0x00, 0x00, 0x43, 0x4E, 0x41, 0x4D, 0x08, 0x00, 0x44,
        0x45, 0x46, 0x41, 0x55, 0x4C, 0x54, 0x00,
    ];

    pub(super) static FNV: &[u8] = &[
        0x54, 0x45, 0x53, 0x34, 0x19, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        0x00, 0x00, 0x00, 0x00, 0x00, 0x0F, 0x00, 0x00, 0x00, 0x48, 0x45, 0x44, 0x52, 0x0C, 0x00,
        0x1F, 0x85, 0xAB, 0x3F, 0x00, 0x00, 0x00, 0x00, 0x00, 0x08, 0x00, 0x00, 0x43, 0x4E, 0x41,
        0x4D, 0x01, 0x00, 0x00,
    ];

    pub(super) static FO4: &[u8] = &[
        0x54, 0x45, 0x53, 0x34, 0x19, 0x00, 0x00, 0x00, 0x00, 0x02, 0x00, 0x00, 0x00, 0x00, 0x00,
        0x00, 0x00, 0x00, 0x00, 0x00, 0x83, 0x00, 0x00, 0x00, 0x48, 0x45, 0x44, 0x52, 0x0C, 0x00,
        0x33, 0x33, 0x73, 0x3F, 0x00, 0x00, 0x00, 0x00, 0x00, 0x08, 0x00, 0x00, 0x43, 0x4E, 0x41,
        0x4D, 0x01, 0x00, 0x00,
    ];
}

const GIGABYTE: u64 = 1024 * 1024 * 1024;

const fn scaled_gigabytes(factor_tenths: u64) -> u64 {
    GIGABYTE / 10 * factor_tenths
}

fn standard_files() -> Vec<AllowedPath> {
    vec![
        AllowedPath { extension: ".bto", directories: &["meshes"] },
        AllowedPath { extension: ".btr", directories: &["meshes"] },
        AllowedPath { extension: ".btt", directories: &["meshes"] },
        AllowedPath { extension: ".dlodsettings", directories: &["lodsettings"] },
        AllowedPath { extension: ".dtl", directories: &["meshes"] },
        AllowedPath { extension: ".egm", directories: &["meshes"] },
        AllowedPath { extension: ".jpg", directories: &[AllowedPath::ROOT] },
        AllowedPath { extension: ".hkx", directories: &["meshes"] },
        AllowedPath { extension: ".lst", directories: &["meshes"] },
        AllowedPath { extension: ".nif", directories: &["meshes"] },
        AllowedPath { extension: ".png", directories: &["textures"] },
        AllowedPath { extension: ".tga", directories: &["textures"] },
        AllowedPath { extension: ".tri", directories: &["meshes"] },
    ]
}

fn texture_files() -> Vec<AllowedPath> {
    vec![AllowedPath { extension: ".dds", directories: &["textures"] }]
}

fn incompressible_files() -> Vec<AllowedPath> {
    vec![
        AllowedPath { extension: ".dds", directories: &["interface"] },
        AllowedPath { extension: ".dlstrings", directories: &["strings"] },
        AllowedPath { extension: ".fuz", directories: &["sound"] },
        AllowedPath { extension: ".fxp", directories: &["shadersfx"] },
        AllowedPath { extension: ".gid", directories: &["grass"] },
        AllowedPath { extension: ".gfx", directories: &["interface"] },
        AllowedPath { extension: ".hkc", directories: &["meshes"] },
        AllowedPath { extension: ".hkt", directories: &["meshes"] },
        AllowedPath { extension: ".ilstrings", directories: &["strings"] },
        AllowedPath { extension: ".ini", directories: &["meshes"] },
        AllowedPath { extension: ".lip", directories: &["sound"] },
        AllowedPath { extension: ".lnk", directories: &["grass"] },
        AllowedPath { extension: ".lod", directories: &["lodsettings"] },
        AllowedPath { extension: ".ogg", directories: &["sound"] },
        AllowedPath { extension: ".pex", directories: &["scripts"] },
        AllowedPath { extension: ".psc", directories: &["scripts"] },
        AllowedPath { extension: ".seq", directories: &["seq"] },
        AllowedPath { extension: ".strings", directories: &["strings"] },
        AllowedPath { extension: ".swf", directories: &["interface"] },
        AllowedPath { extension: ".txt", directories: &["interface", "meshes", "scripts"] },
        AllowedPath { extension: ".wav", directories: &["sound"] },
        AllowedPath { extension: ".xml", directories: &["dialogueviews"] },
        AllowedPath { extension: ".xwm", directories: &["music", "sound"] },
    ]
}

// SSE is the reference; the other games overlay it.
static SSE: Lazy<Settings> = Lazy::new(|| Settings {
    game: Game::Sse,
    max_size: scaled_gigabytes(17),
    version: ArchiveVersion::Sse,
    texture_version: Some(ArchiveVersion::Sse),
    suffix: None,
    texture_suffix: Some("Textures"),
    extension: ".bsa",
    plugin_extensions: &[".esl", ".esm", ".esp"],
    dummy_extension: ".esp",
    dummy_plugin: Some(dummy::SSE),
    standard_files: standard_files(),
    texture_files: texture_files(),
    incompressible_files: incompressible_files(),
});

static TES3: Lazy<Settings> = Lazy::new(|| Settings {
    game: Game::Tes3,
    version: ArchiveVersion::Tes3,
    texture_version: None,
    texture_suffix: None,
    plugin_extensions: &[".esm", ".esp"],
    dummy_plugin: None,
    ..SSE.clone()
});

static TES4: Lazy<Settings> = Lazy::new(|| Settings {
    game: Game::Tes4,
    version: ArchiveVersion::Tes4,
    texture_version: None,
    texture_suffix: None,
    plugin_extensions: &[".esm", ".esp"],
    dummy_plugin: Some(dummy::OBLIVION),
    ..SSE.clone()
});

static FNV: Lazy<Settings> = Lazy::new(|| Settings {
    game: Game::Fnv,
    version: ArchiveVersion::Tes5,
    texture_version: None,
    texture_suffix: None,
    plugin_extensions: &[".esm", ".esp"],
    dummy_plugin: Some(dummy::FNV),
    ..SSE.clone()
});

static SLE: Lazy<Settings> = Lazy::new(|| Settings {
    game: Game::Sle,
    version: ArchiveVersion::Tes5,
    texture_version: None,
    texture_suffix: None,
    plugin_extensions: &[".esm", ".esp"],
    dummy_plugin: Some(dummy::TES5),
    ..SSE.clone()
});

static FO4: Lazy<Settings> = Lazy::new(|| Settings {
    game: Game::Fo4,
    version: ArchiveVersion::Fo4,
    texture_version: Some(ArchiveVersion::Fo4Dx),
    suffix: Some("Main"),
    texture_suffix: Some("Textures"),
    extension: ".ba2",
    dummy_plugin: Some(dummy::FO4),
    ..SSE.clone()
});

static STARFIELD: Lazy<Settings> = Lazy::new(|| Settings {
    game: Game::Starfield,
    version: ArchiveVersion::Starfield,
    texture_version: Some(ArchiveVersion::Starfield),
    suffix: Some("Main"),
    texture_suffix: Some("Textures"),
    extension: ".ba2",
    plugin_extensions: &[".esm"],
    dummy_plugin: None,
    ..SSE.clone()
});
