use core::{
    fmt::{self, Display, Formatter},
    panic::Location,
};
use std::{io, path::PathBuf};

type Source = Box<dyn std::error::Error + Send + Sync>;

#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum ErrorKind {
    #[error("failed to read archive at {path:?}")]
    FailedToReadArchive {
        path: PathBuf,
        #[source]
        source: Source,
    },

    #[error("failed to remove archive at {path:?}")]
    FailedToRemoveArchive {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("unknown archive format at {path:?}")]
    UnknownFormat { path: PathBuf },

    #[error("failed to read file at {path:?}")]
    FailedToReadFile {
        path: PathBuf,
        #[source]
        source: Source,
    },

    #[error("failed to write file at {path:?}")]
    FailedToWriteFile {
        path: PathBuf,
        #[source]
        source: Source,
    },

    #[error("invalid user request: {0}")]
    BadUserInput(String),

    #[error(transparent)]
    System(#[from] io::Error),
}

/// An [`ErrorKind`] plus the source location that raised it.
#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    location: &'static Location<'static>,
}

impl Error {
    #[must_use]
    #[track_caller]
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            location: Location::caller(),
        }
    }

    #[must_use]
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    #[must_use]
    pub fn location(&self) -> &'static Location<'static> {
        self.location
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}:{})",
            self.kind,
            self.location.file(),
            self.location.line()
        )
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        std::error::Error::source(&self.kind)
    }
}

impl From<ErrorKind> for Error {
    #[track_caller]
    fn from(kind: ErrorKind) -> Self {
        Self::new(kind)
    }
}

impl From<io::Error> for Error {
    #[track_caller]
    fn from(source: io::Error) -> Self {
        Self::new(ErrorKind::System(source))
    }
}

pub type Result<T> = core::result::Result<T, Error>;
