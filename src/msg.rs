// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::io;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use log::debug;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::procs::LaunchSpec;

/// The startup parameters handed to the adapter over its stdin
///
/// Three `\n` terminated lines: application directory, listen port, tracking id (possibly empty).
///  The stream is closed after the last line, which tells the adapter nothing more follows.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StartupPayload {
    app_directory: PathBuf,
    listen_port: u16,
    tracking_id: String,
}

impl StartupPayload {
    pub fn new<P: Into<PathBuf>, S: Into<String>>(
        app_directory: P,
        listen_port: u16,
        tracking_id: S,
    ) -> Self {
        Self {
            app_directory: app_directory.into(),
            listen_port,
            tracking_id: tracking_id.into(),
        }
    }

    /// Payload for an already validated spec
    pub fn from_spec(app_directory: &Path, spec: &LaunchSpec) -> Self {
        Self::new(app_directory, spec.listen_port(), spec.tracking_id())
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let port = self.listen_port.to_string();
        let dir = self.app_directory.as_os_str().as_bytes();

        let mut bytes = Vec::with_capacity(dir.len() + port.len() + self.tracking_id.len() + 3);
        bytes.extend_from_slice(dir);
        bytes.push(b'\n');
        bytes.extend_from_slice(port.as_bytes());
        bytes.push(b'\n');
        bytes.extend_from_slice(self.tracking_id.as_bytes());
        bytes.push(b'\n');
        bytes
    }

    /// Writes the payload and then shuts the writer down
    pub async fn send<W: AsyncWrite + Unpin>(&self, mut writer: W) -> io::Result<()> {
        let bytes = self.to_bytes();
        writer.write_all(&bytes).await?;
        writer.shutdown().await?;

        debug!("sent {} byte startup payload", bytes.len());
        Ok(())
    }
}
