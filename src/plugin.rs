//! Deriving archive names from plugin names, and the dummy plugins that
//! make the game load archives nothing references.

use crate::{
    fs,
    settings::{ArchiveType, FileKind, Settings},
    strings,
};
use rand::{distributions::Alphanumeric, Rng as _};
use std::path::{Path, PathBuf};
use tracing::warn;

const SUFFIX_SEPARATOR: &str = " - ";

/// An archive or plugin filename decomposed into its naming grammar:
/// `dir/name{counter}{ - suffix}{ext}`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FilePath {
    pub dir: PathBuf,
    pub name: String,
    pub counter: Option<u32>,
    pub suffix: String,
    pub ext: String,
    pub kind: FileKind,
}

impl FilePath {
    #[must_use]
    pub fn new(dir: PathBuf, name: String, suffix: String, ext: String, kind: FileKind) -> Self {
        Self {
            dir,
            name,
            counter: None,
            suffix,
            ext,
            kind,
        }
    }

    /// Parses `path` as a plugin or archive name. Returns `None` for
    /// directories and for extensions that do not match `kind`.
    #[must_use]
    pub fn parse(path: &Path, settings: &Settings, kind: FileKind) -> Option<Self> {
        if path.is_dir() {
            return None;
        }

        let dir = path.parent().unwrap_or_else(|| Path::new("")).to_owned();
        let mut name = path.file_stem()?.to_string_lossy().into_owned();
        let ext = path
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_default();

        if kind == FileKind::Plugin
            && !settings
                .plugin_extensions
                .iter()
                .any(|plugin| strings::str_compare(plugin, &ext, false))
        {
            return None;
        }
        if kind == FileKind::Bsa && !strings::str_compare(settings.extension, &ext, false) {
            return None;
        }

        let mut counter = eat_digits(&mut name);
        let suffix = eat_suffix(&mut name, settings);

        // `Name - Textures03` and `Name03 - Textures` parse identically
        if counter.is_none() {
            counter = eat_digits(&mut name);
        }

        Some(Self {
            dir,
            name,
            counter,
            suffix,
            ext,
            kind,
        })
    }

    #[must_use]
    pub fn full_name(&self) -> String {
        let counter = self
            .counter
            .map(|counter| counter.to_string())
            .unwrap_or_default();
        let suffix = if self.suffix.is_empty() {
            String::new()
        } else {
            format!("{SUFFIX_SEPARATOR}{}", self.suffix)
        };
        format!("{}{counter}{suffix}{}", self.name, self.ext)
    }

    #[must_use]
    pub fn full_path(&self) -> PathBuf {
        self.dir.join(self.full_name())
    }
}

/// Strips a trailing run of ASCII digits off `name`.
fn eat_digits(name: &mut String) -> Option<u32> {
    let first_digit = name
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_ascii_digit())
        .last()
        .map_or(name.len(), |(position, _)| position);
    if first_digit == name.len() {
        return None;
    }

    let counter = name[first_digit..].parse().ok()?;
    name.truncate(first_digit);
    Some(counter)
}

/// Strips a trailing ` - <suffix>` off `name` when the suffix is one the
/// settings recognize.
fn eat_suffix(name: &mut String, settings: &Settings) -> String {
    let Some(position) = name.rfind(SUFFIX_SEPARATOR) else {
        return String::new();
    };

    let suffix = name[position + SUFFIX_SEPARATOR.len()..].to_owned();
    let known = [settings.suffix, settings.texture_suffix]
        .into_iter()
        .flatten()
        .any(|candidate| candidate == suffix);
    if !known {
        return String::new();
    }

    name.truncate(position);
    suffix
}

fn list_by_extensions(dir: &Path, extensions: &[&str]) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut result: Vec<PathBuf> = entries
        .filter_map(std::result::Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| {
            let ext = path
                .extension()
                .map(|ext| format!(".{}", ext.to_string_lossy()))
                .unwrap_or_default();
            extensions
                .iter()
                .any(|candidate| strings::str_compare(candidate, &ext, false))
        })
        .collect();
    result.sort();
    result
}

/// The plugins directly inside `dir`.
#[must_use]
pub fn list_plugins(dir: &Path, settings: &Settings) -> Vec<PathBuf> {
    list_by_extensions(dir, settings.plugin_extensions)
}

/// The archives directly inside `dir`.
#[must_use]
pub fn list_archive(dir: &Path, settings: &Settings) -> Vec<PathBuf> {
    list_by_extensions(dir, &[settings.extension])
}

/// True when a plugin exists that would make the game load `archive`.
#[must_use]
pub fn is_loaded(archive: &FilePath, settings: &Settings) -> bool {
    settings.plugin_extensions.iter().any(|ext| {
        let mut candidate = archive.clone();
        candidate.ext = (*ext).to_owned();
        let exact = candidate.full_path().exists();
        candidate.suffix = String::new();
        let approximate = candidate.full_path().exists();
        exact || approximate
    })
}

fn find_unused_name(plugins: &[FilePath], settings: &Settings, kind: ArchiveType) -> Option<PathBuf> {
    let suffix = settings.suffix_for(kind);

    let prepare = |plugin: &FilePath| {
        let mut candidate = plugin.clone();
        candidate.ext = settings.extension.to_owned();
        candidate.suffix = suffix.to_owned();
        candidate
    };

    for plugin in plugins {
        let candidate = prepare(plugin);
        if !candidate.full_path().exists() {
            return Some(candidate.full_path());
        }
    }

    // counter 0 would render to the uncounted name checked above
    let first = plugins.first()?;
    let mut candidate = prepare(first);
    for counter in 1..=u32::from(u8::MAX) {
        candidate.counter = Some(counter);
        if !candidate.full_path().exists() {
            return Some(candidate.full_path());
        }
    }

    None
}

/// Finds a free name for a new archive in `directory`: first from the
/// plugins living there, then the directory name itself, then counters,
/// then random names.
#[must_use]
pub fn find_archive_name(
    directory: &Path,
    settings: &Settings,
    kind: ArchiveType,
) -> Option<PathBuf> {
    let mut plugins: Vec<FilePath> = list_plugins(directory, settings)
        .iter()
        .filter_map(|path| FilePath::parse(path, settings, FileKind::Plugin))
        .collect();
    if plugins.is_empty() {
        let stem = directory
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        plugins.push(FilePath::new(
            directory.to_owned(),
            stem,
            String::new(),
            settings.dummy_extension.to_owned(),
            FileKind::Plugin,
        ));
    }

    if let Some(found) = find_unused_name(&plugins, settings, kind) {
        return Some(found);
    }

    // very unlikely to ever run, but better than giving up
    const MAX_ATTEMPTS: u32 = u16::MAX as u32;
    for _ in 0..MAX_ATTEMPTS {
        let random: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(8)
            .map(char::from)
            .collect();
        let candidate = FilePath::new(
            directory.to_owned(),
            format!("archive{SUFFIX_SEPARATOR}{random}"),
            String::new(),
            settings.extension.to_owned(),
            FileKind::Bsa,
        );
        if !candidate.full_path().exists() {
            return Some(candidate.full_path());
        }
    }

    None
}

/// Deletes every plugin whose size matches the embedded dummy blob. The
/// dummies are the smallest valid plugins, so a size check is reliable.
pub fn clean_dummy_plugins(plugins: &[PathBuf], settings: &Settings) {
    let Some(dummy) = settings.dummy_plugin else {
        return;
    };

    for plugin in plugins {
        let is_dummy = std::fs::metadata(plugin)
            .map(|metadata| metadata.len() == dummy.len() as u64)
            .unwrap_or(false);
        if is_dummy {
            if let Err(err) = std::fs::remove_file(plugin) {
                warn!("failed to remove dummy plugin {plugin:?}: {err}");
            }
        }
    }
}

/// Writes a dummy plugin next to every archive that no plugin loads.
pub fn make_dummy_plugins(archives: &[PathBuf], settings: &Settings) {
    let Some(dummy) = settings.dummy_plugin else {
        return;
    };

    for archive in archives {
        let Some(parsed) = FilePath::parse(archive, settings, FileKind::Bsa) else {
            continue;
        };
        if is_loaded(&parsed, settings) {
            continue;
        }

        let mut plugin = parsed;
        plugin.ext = settings.dummy_extension.to_owned();
        plugin.suffix = String::new();
        plugin.counter = None;
        if let Err(err) = fs::write_file(&plugin.full_path(), dummy) {
            // the game still works without it, archives just stay unloaded
            warn!("failed to write dummy plugin for {archive:?}: {err}");
        }
    }
}

/// Removes stale dummy plugins and recreates the ones still needed.
pub fn remake_dummy_plugins(directory: &Path, settings: &Settings) {
    clean_dummy_plugins(&list_plugins(directory, settings), settings);
    make_dummy_plugins(&list_archive(directory, settings), settings);
}
