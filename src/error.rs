// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ErrorKind {
    /// A required launch parameter was missing or unusable
    #[error("invalid launch parameters: {0}")]
    Validation(&'static str),
    /// The application directory did not exist when it was checked
    #[error("application directory not found: {0}")]
    NotFound(PathBuf),
    #[error("io error: {0}")]
    IoError(#[from] io::Error),
    #[error("nix error: {0}")]
    NixError(#[from] nix::Error),
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("no such user: {0}")]
    UnknownUser(String),
    #[error("process reported neither an exit code nor a terminating signal")]
    IndeterminateExit,
    #[error("an error occured: {0}")]
    ErrorMsg(String),
    #[error("an error occured: {0}")]
    ErrorStr(&'static str),
}

/// Error type for all launch and supervision failures.
///
/// Cloning is cheap, the same error is handed to every observer of a worker's exit.
#[derive(Clone, Debug)]
pub struct Error(Arc<ErrorKind>);

impl Error {
    fn from_kind(kind: ErrorKind) -> Self {
        Self(Arc::new(kind))
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.0
    }

    pub fn is_validation(&self) -> bool {
        matches!(*self.0, ErrorKind::Validation(_))
    }

    /// The application directory was missing, upstream this is a "404"
    pub fn is_not_found(&self) -> bool {
        matches!(*self.0, ErrorKind::NotFound(_))
    }

    pub fn is_spawn(&self) -> bool {
        matches!(*self.0, ErrorKind::Spawn { .. } | ErrorKind::UnknownUser(_))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.0, f)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        std::error::Error::source(&*self.0)
    }
}

impl<E> From<E> for Error
where
    E: Into<ErrorKind>,
{
    fn from(err: E) -> Self {
        Self::from_kind(err.into())
    }
}

impl From<&'static str> for Error {
    fn from(err: &'static str) -> Self {
        Self::from_kind(ErrorKind::ErrorStr(err))
    }
}

impl From<String> for Error {
    fn from(err: String) -> Self {
        Self::from_kind(ErrorKind::ErrorMsg(err))
    }
}
