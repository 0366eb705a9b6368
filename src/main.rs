use bsapack::{
    find_archive_name, pack, plugin, unpack, Archive, Compression, Game, PackSettings, Settings,
    UnpackSettings,
};
use clap::{Parser, Subcommand, ValueEnum};
use std::{path::PathBuf, process::ExitCode};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum GameArg {
    Tes3,
    Tes4,
    Fnv,
    Sle,
    Sse,
    Fo4,
    Starfield,
}

impl From<GameArg> for Game {
    fn from(value: GameArg) -> Self {
        match value {
            GameArg::Tes3 => Game::Tes3,
            GameArg::Tes4 => Game::Tes4,
            GameArg::Fnv => Game::Fnv,
            GameArg::Sle => Game::Sle,
            GameArg::Sse => Game::Sse,
            GameArg::Fo4 => Game::Fo4,
            GameArg::Starfield => Game::Starfield,
        }
    }
}

/// Pack and unpack Bethesda game archives.
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// The game whose archive rules apply.
    #[arg(long, value_enum, default_value = "sse", global = true)]
    game: GameArg,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Pack the loose files of a directory into archives.
    Pack {
        /// The directory to pack. Defaults to the current directory.
        dir: Option<PathBuf>,

        /// Store files without compressing them.
        #[arg(long)]
        no_compression: bool,

        /// Write dummy plugins so the game loads the new archives.
        #[arg(long)]
        dummy_plugins: bool,
    },
    /// Unpack every archive found in a directory.
    Unpack {
        /// The directory holding the archives. Defaults to the current
        /// directory.
        dir: Option<PathBuf>,
    },
    /// List the contents of every archive found in a directory.
    List {
        dir: Option<PathBuf>,
    },
}

fn run(cli: Cli) -> Result<(), bsapack::Error> {
    let settings = Settings::get(cli.game.into());

    match cli.command {
        Command::Pack {
            dir,
            no_compression,
            dummy_plugins,
        } => {
            let dir = resolve_dir(dir)?;
            let compress = if no_compression {
                Compression::No
            } else {
                Compression::Yes
            };
            let mut packer = pack(PackSettings {
                input_dir: dir.clone(),
                game_settings: settings,
                compress,
                allow_file_pred: None,
            });

            for archive in packer.by_ref() {
                let Some(out_path) = find_archive_name(&dir, settings, archive.kind()) else {
                    error!("ran out of names for archives in {dir:?}");
                    return Err(bsapack::Error::new(bsapack::ErrorKind::BadUserInput(
                        "no usable archive name".into(),
                    )));
                };
                info!("writing {out_path:?}");
                archive.write(&out_path)?;
            }

            let errors = packer.errors();
            for (name, err) in errors {
                error!("failed to pack {name}: {err}");
            }
            if dummy_plugins {
                plugin::remake_dummy_plugins(&dir, settings);
            }
            if errors.is_empty() {
                Ok(())
            } else {
                Err(bsapack::Error::new(bsapack::ErrorKind::BadUserInput(
                    format!("{} files failed to pack", errors.len()),
                )))
            }
        }
        Command::Unpack { dir } => {
            let dir = resolve_dir(dir)?;
            for archive_path in plugin::list_archive(&dir, settings) {
                info!("unpacking {archive_path:?}");
                let per_file = unpack(&UnpackSettings {
                    file_path: archive_path.clone(),
                    remove_arch: false,
                    overwrite_existing_files: false,
                    extract_to_dir: None,
                })?;
                for (name, err) in per_file {
                    error!("{archive_path:?}: failed to extract {name}: {err}");
                }
            }
            Ok(())
        }
        Command::List { dir } => {
            let dir = resolve_dir(dir)?;
            for archive_path in plugin::list_archive(&dir, settings) {
                println!("{}:", archive_path.display());
                let archive = Archive::open(&archive_path)?;
                for (name, _) in archive.iter() {
                    println!("  {name}");
                }
            }
            Ok(())
        }
    }
}

fn resolve_dir(dir: Option<PathBuf>) -> Result<PathBuf, bsapack::Error> {
    match dir {
        Some(dir) => Ok(dir),
        None => std::env::current_dir().map_err(bsapack::Error::from),
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            // clap renders its own help and error output
            let _ = err.print();
            return if err.use_stderr() {
                ExitCode::from(1)
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            ExitCode::from(2)
        }
    }
}
