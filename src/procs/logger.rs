// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::fs::File;
use std::io;
use std::os::unix::io::{AsRawFd, IntoRawFd};
use std::path::{Path, PathBuf};
use std::process::Stdio;

use log::{debug, warn};
use nix::unistd::close;
use tokio::fs::OpenOptions;

use crate::Error;

/// The application log, which becomes the stderr of the child process.
///
/// Rules:
///  - opened for append, created if missing
///  - owned by exactly one worker
///  - closed once, after the child has exited
#[derive(Debug)]
pub struct LogTarget {
    file: File,
    path: PathBuf,
}

impl LogTarget {
    /// Opens `path` for appending, creating it if it does not exist
    pub async fn open_append<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?
            .into_std()
            .await;

        debug!("opened log {} fd: {}", path.display(), file.as_raw_fd());
        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A duplicate of the log descriptor to hand to the child as its stderr
    ///
    /// The duplicate is owned by the spawned command, this target keeps the original.
    pub fn stderr(&self) -> io::Result<Stdio> {
        Ok(Stdio::from(self.file.try_clone()?))
    }

    /// Closes the log, consuming the target so it can only happen once
    pub fn close(self) -> nix::Result<()> {
        let LogTarget { file, path } = self;
        let raw_fd = file.into_raw_fd();

        debug!("closing log {} fd: {}", path.display(), raw_fd);
        close(raw_fd).map_err(|e| {
            warn!("error closing log {} ({}): {}", path.display(), raw_fd, e);
            e
        })
    }
}
