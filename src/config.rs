// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Supervisor wide configuration, resolved once at startup

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::Error;

/// Location of the adapter script, relative to the install directory
pub const ADAPTER_SCRIPT: &str = "adapter/run_app.R";
pub const DEFAULT_RUNTIME: &str = "R";
pub const DEFAULT_SU: &str = "su";

/// How the child process assumes the identity of the target user
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IdentitySwitch {
    /// Run through `su`, which requires a shell hop for the runtime command
    Su { program: PathBuf },
    /// Resolve the user locally and set uid/gid on the child directly, no shell involved
    ///
    /// When the supervisor runs as root the child also gets the user's supplementary groups.
    SetUid,
}

impl Default for IdentitySwitch {
    fn default() -> Self {
        IdentitySwitch::Su {
            program: PathBuf::from(DEFAULT_SU),
        }
    }
}

/// Immutable settings shared by every launch from this supervisor
#[derive(Clone, Debug)]
pub struct SupervisorConfig {
    identity: IdentitySwitch,
    runtime: PathBuf,
    runtime_args: Vec<OsString>,
    adapter_script: PathBuf,
}

impl SupervisorConfig {
    /// Configuration for an installation rooted at `install_dir`
    ///
    /// The runtime is invoked non-interactively, without saving a workspace and silently,
    ///  i.e. `R --no-save --slave -f <install_dir>/adapter/run_app.R`.
    pub fn from_install_dir<P: AsRef<Path>>(install_dir: P) -> Self {
        Self {
            identity: IdentitySwitch::default(),
            runtime: PathBuf::from(DEFAULT_RUNTIME),
            runtime_args: vec!["--no-save".into(), "--slave".into(), "-f".into()],
            adapter_script: install_dir.as_ref().join(ADAPTER_SCRIPT),
        }
    }

    /// Resolves the install directory from the location of the running executable
    pub fn resolve() -> Result<Self, Error> {
        let exe = std::env::current_exe()?;
        let install_dir = exe
            .parent()
            .ok_or("the current executable has no parent directory")?;

        Ok(Self::from_install_dir(install_dir))
    }

    pub fn with_identity(mut self, identity: IdentitySwitch) -> Self {
        self.identity = identity;
        self
    }

    pub fn with_runtime<P: Into<PathBuf>>(mut self, runtime: P) -> Self {
        self.runtime = runtime.into();
        self
    }

    pub fn with_runtime_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.runtime_args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_adapter_script<P: Into<PathBuf>>(mut self, script: P) -> Self {
        self.adapter_script = script.into();
        self
    }

    pub fn identity(&self) -> &IdentitySwitch {
        &self.identity
    }

    pub fn runtime(&self) -> &Path {
        &self.runtime
    }

    pub fn runtime_args(&self) -> &[OsString] {
        &self.runtime_args
    }

    pub fn adapter_script(&self) -> &Path {
        &self.adapter_script
    }
}
