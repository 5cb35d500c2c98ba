// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::convert::TryFrom;
use std::fmt;
use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;

use nix::sys::signal::Signal;
use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;
use crate::Error;

/// How a child process terminated, exactly one of the two fields is set
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawExitResult")]
pub struct ExitResult {
    exit_code: Option<i32>,
    terminating_signal: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawExitResult {
    exit_code: Option<i32>,
    terminating_signal: Option<String>,
}

impl TryFrom<RawExitResult> for ExitResult {
    type Error = &'static str;

    fn try_from(raw: RawExitResult) -> Result<Self, Self::Error> {
        match (raw.exit_code, raw.terminating_signal) {
            (Some(code), None) => Ok(Self::exited(code)),
            (None, Some(signal)) => Ok(Self::signaled(signal)),
            (None, None) => Err("neither exitCode nor terminatingSignal is set"),
            (Some(_), Some(_)) => Err("only one of exitCode and terminatingSignal may be set"),
        }
    }
}

impl ExitResult {
    pub fn exited(code: i32) -> Self {
        Self {
            exit_code: Some(code),
            terminating_signal: None,
        }
    }

    pub fn signaled<S: Into<String>>(signal: S) -> Self {
        Self {
            exit_code: None,
            terminating_signal: Some(signal.into()),
        }
    }

    /// Interprets the status reported by the OS
    ///
    /// A status with neither an exit code nor a signal is not a valid termination.
    pub fn from_status(status: ExitStatus) -> Result<Self, Error> {
        match (status.code(), status.signal()) {
            (Some(code), _) => Ok(Self::exited(code)),
            (None, Some(signo)) => Ok(Self::signaled(signal_name(signo))),
            (None, None) => Err(ErrorKind::IndeterminateExit.into()),
        }
    }

    pub fn code(&self) -> Option<i32> {
        self.exit_code
    }

    /// Name of the terminating signal, e.g. `SIGTERM`
    pub fn signal(&self) -> Option<&str> {
        self.terminating_signal.as_deref()
    }

    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

impl fmt::Display for ExitResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.exit_code, &self.terminating_signal) {
            (Some(code), _) => write!(f, "exited with code {}", code),
            (None, Some(signal)) => write!(f, "terminated by {}", signal),
            (None, None) => write!(f, "terminated for an unknown reason"),
        }
    }
}

fn signal_name(signo: i32) -> String {
    Signal::try_from(signo)
        .map(|signal| signal.as_str().to_string())
        .unwrap_or_else(|_| format!("SIG{}", signo))
}
