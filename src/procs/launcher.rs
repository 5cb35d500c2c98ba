// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::io;
use std::path::Path;

use log::{debug, info};

use crate::config::SupervisorConfig;
use crate::error::ErrorKind;
use crate::exit::ExitResult;
use crate::procs::{LaunchSpec, LogTarget, Worker};
use crate::Error;

/// Launch applications
///
/// Rules:
/// - validates the request before touching the filesystem
/// - the application directory must exist, otherwise nothing is opened or started
/// - opens the log, then hands it to exactly one Worker
#[derive(Clone, Debug)]
pub struct Launcher {
    config: SupervisorConfig,
}

impl Launcher {
    pub fn new(config: SupervisorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    /// Starts the application, returning once the Worker exists (not when the process exits)
    ///
    /// Spawn failures are not returned here, they are reported by [`Worker::exit`].
    pub async fn launch<P: AsRef<Path>>(
        &self,
        spec: &LaunchSpec,
        log_path: P,
    ) -> Result<Worker, Error> {
        let valid = spec.validate()?;

        match tokio::fs::metadata(valid.app_directory).await {
            Ok(_) => (),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(ErrorKind::NotFound(valid.app_directory.to_path_buf()).into())
            }
            Err(e) => return Err(e.into()),
        }

        let log = LogTarget::open_append(log_path).await?;
        debug!("launching {} as {}", valid.app_directory.display(), valid.user);

        let worker = Worker::new(&self.config, spec, log);
        info!(
            "worker for {} on port {}: {:?}",
            valid.app_directory.display(),
            spec.listen_port(),
            worker.state()
        );

        Ok(worker)
    }

    /// Launches the application and waits for it to exit
    pub async fn run<P: AsRef<Path>>(
        &self,
        spec: &LaunchSpec,
        log_path: P,
    ) -> Result<ExitResult, Error> {
        self.launch(spec, log_path).await?.exit().await
    }
}
