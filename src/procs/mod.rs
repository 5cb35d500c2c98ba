// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

mod launcher;
mod logger;
mod worker;

pub use launcher::Launcher;
pub use logger::LogTarget;
pub use worker::{Exit, Worker, WorkerState};

use std::collections::HashMap;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;
use crate::Error;

/// Setting holding the analytics tracking id passed to the application
pub const TRACKING_ID_SETTING: &str = "gaTrackingId";

/// Parameters for launching one application instance
///
/// The user and directory are optional here so that incomplete requests can be represented,
///  they are checked before anything is opened or spawned.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchSpec {
    #[serde(default)]
    target_user: Option<String>,
    #[serde(default)]
    app_directory: Option<PathBuf>,
    #[serde(default)]
    listen_port: u16,
    #[serde(default)]
    settings: HashMap<String, String>,
}

/// The required fields of a spec, after validation
#[derive(Clone, Copy, Debug)]
pub(crate) struct Validated<'a> {
    pub user: &'a str,
    pub app_directory: &'a Path,
}

impl LaunchSpec {
    pub fn new<U: Into<String>, P: Into<PathBuf>>(
        target_user: U,
        app_directory: P,
        listen_port: u16,
    ) -> Self {
        Self {
            target_user: Some(target_user.into()),
            app_directory: Some(app_directory.into()),
            listen_port,
            settings: HashMap::new(),
        }
    }

    pub fn with_target_user<U: Into<String>>(mut self, target_user: U) -> Self {
        self.target_user = Some(target_user.into());
        self
    }

    pub fn with_app_directory<P: Into<PathBuf>>(mut self, app_directory: P) -> Self {
        self.app_directory = Some(app_directory.into());
        self
    }

    pub fn with_listen_port(mut self, listen_port: u16) -> Self {
        self.listen_port = listen_port;
        self
    }

    pub fn with_setting<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.settings.insert(key.into(), value.into());
        self
    }

    /// The user to run as, an empty name counts as absent
    pub fn target_user(&self) -> Option<&str> {
        self.target_user.as_deref().filter(|u| !u.is_empty())
    }

    /// The application directory, an empty path counts as absent
    pub fn app_directory(&self) -> Option<&Path> {
        self.app_directory
            .as_deref()
            .filter(|p| !p.as_os_str().is_empty())
    }

    pub fn listen_port(&self) -> u16 {
        self.listen_port
    }

    /// Looks up a setting, missing keys are the empty string
    pub fn setting(&self, key: &str) -> &str {
        self.settings.get(key).map(String::as_str).unwrap_or("")
    }

    pub fn tracking_id(&self) -> &str {
        self.setting(TRACKING_ID_SETTING)
    }

    /// Checks the required fields, this performs no io
    pub(crate) fn validate(&self) -> Result<Validated<'_>, Error> {
        let user = self
            .target_user()
            .ok_or(ErrorKind::Validation("targetUser is required"))?;
        let app_directory = self
            .app_directory()
            .ok_or(ErrorKind::Validation("appDirectory is required"))?;

        // each value is one line of the startup payload
        if app_directory.as_os_str().as_bytes().contains(&b'\n') {
            return Err(ErrorKind::Validation("appDirectory must not contain a newline").into());
        }
        if self.tracking_id().contains('\n') {
            return Err(ErrorKind::Validation("gaTrackingId must not contain a newline").into());
        }

        Ok(Validated {
            user,
            app_directory,
        })
    }
}
