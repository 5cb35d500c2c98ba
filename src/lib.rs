// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Launch and supervise one application process as another user
//!
//! ```no_run
//! # async fn example() -> Result<(), appworker::Error> {
//! use appworker::{LaunchSpec, Launcher, SupervisorConfig};
//!
//! let launcher = Launcher::new(SupervisorConfig::resolve()?);
//! let spec = LaunchSpec::new("alice", "/srv/app", 3838);
//!
//! let worker = launcher.launch(&spec, "/var/log/app.log").await?;
//! let result = worker.exit().await?;
//! println!("app {}", result);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod exec;
pub mod exit;
pub mod msg;
pub mod procs;

mod error;

pub use config::{IdentitySwitch, SupervisorConfig};
pub use error::{Error, ErrorKind};
pub use exit::ExitResult;
pub use procs::{Exit, LaunchSpec, Launcher, LogTarget, Worker, WorkerState, TRACKING_ID_SETTING};

pub use nix::sys::signal::Signal;
