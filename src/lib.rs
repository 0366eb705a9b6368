#![warn(clippy::pedantic, clippy::std_instead_of_core)]
#![allow(
    clippy::enum_glob_use,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions
)]

mod cc;
mod containers;
mod derive;
mod guess;
mod hashing;
mod io;
mod protocols;

pub mod archive;
pub mod error;
pub mod file;
pub mod fo4;
pub mod fs;
pub mod pack;
pub mod parallel;
pub mod plugin;
pub mod settings;
pub mod strings;
pub mod tes3;
pub mod tes4;
pub mod unpack;

pub use self::{
    archive::Archive,
    error::{Error, ErrorKind, Result},
    file::File,
    guess::{guess_format, FileFormat},
    pack::{pack, Compression, PackSettings, Packer},
    plugin::{find_archive_name, remake_dummy_plugins, FilePath},
    settings::{ArchiveType, ArchiveVersion, FileKind, Game, Settings},
    unpack::{unpack, unpack_all, UnpackSettings},
};

pub use bstr::{BStr, BString};
