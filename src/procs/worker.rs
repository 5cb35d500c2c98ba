// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::fmt;
use std::io;
use std::process::ExitStatus;

use futures::future::{BoxFuture, FutureExt, Shared};
use log::{debug, error, info, warn};
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tokio::process::{Child, ChildStdin};
use tokio::sync::{mpsc, oneshot, watch};

use crate::config::SupervisorConfig;
use crate::exec::{self, StdIoConf};
use crate::exit::ExitResult;
use crate::msg::StartupPayload;
use crate::procs::{LaunchSpec, LogTarget};
use crate::Error;

/// The exit notification of a worker, every clone resolves to the same result
pub type Exit = Shared<BoxFuture<'static, Result<ExitResult, Error>>>;

type Closed = Shared<BoxFuture<'static, ()>>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WorkerState {
    Spawning,
    Running { pid: u32 },
    Exited(ExitResult),
    SpawnFailed,
}

/// Supervises exactly one application process.
///
/// Rules:
///  - the process handle is owned by a single task, which is the only thing that resolves the exit
///  - the exit is published after the OS reports termination, the log is closed after that
///  - signals are only delivered while the child has not been reaped
pub struct Worker {
    exit: Exit,
    closed: Closed,
    state: watch::Receiver<WorkerState>,
    signals: mpsc::UnboundedSender<Signal>,
}

/// Halves held by the supervising task
struct Lifecycle {
    log: LogTarget,
    state: watch::Sender<WorkerState>,
    exit: oneshot::Sender<Result<ExitResult, Error>>,
    closed: oneshot::Sender<()>,
}

impl Worker {
    /// Spawns the application described by `spec` with stderr going to `log`
    ///
    /// The spawn is attempted before this returns, a failure is reported through [`Worker::exit`].
    ///  This must be called from within a tokio runtime.
    pub fn new(config: &SupervisorConfig, spec: &LaunchSpec, log: LogTarget) -> Self {
        let (exit_tx, exit_rx) = oneshot::channel();
        let (closed_tx, closed_rx) = oneshot::channel();
        let (state_tx, state_rx) = watch::channel(WorkerState::Spawning);
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();

        let exit = exit_rx
            .map(|result| match result {
                Ok(result) => result,
                Err(_) => Err(Error::from("worker stopped before the exit was observed")),
            })
            .boxed()
            .shared();
        let closed = closed_rx.map(|_| ()).boxed().shared();

        let lifecycle = Lifecycle {
            log,
            state: state_tx,
            exit: exit_tx,
            closed: closed_tx,
        };

        match start(config, spec, &lifecycle.log) {
            Ok((child, payload)) => {
                let pid = child.id().unwrap_or_default();
                info!(
                    "started {} for {} pid: {}",
                    config.adapter_script().display(),
                    spec.target_user().unwrap_or_default(),
                    pid
                );

                lifecycle.state.send_replace(WorkerState::Running { pid });
                tokio::spawn(supervise(child, payload, signal_rx, lifecycle));
            }
            Err(err) => {
                error!("failed to start worker: {}", err);

                lifecycle.state.send_replace(WorkerState::SpawnFailed);
                lifecycle.finish(Err(err));
            }
        }

        Self {
            exit,
            closed,
            state: state_rx,
            signals: signal_tx,
        }
    }

    /// The exit notification, the same future is returned on every call
    pub fn exit(&self) -> Exit {
        self.exit.clone()
    }

    /// Resolves once the log has been closed after the exit notification
    pub fn closed(&self) -> impl std::future::Future<Output = ()> {
        self.closed.clone()
    }

    pub fn state(&self) -> WorkerState {
        self.state.borrow().clone()
    }

    /// The pid of the child while it is running
    pub fn pid(&self) -> Option<u32> {
        match *self.state.borrow() {
            WorkerState::Running { pid } => Some(pid),
            _ => None,
        }
    }

    /// Asks the process to terminate with `signal`
    ///
    /// This does not wait, and it does not resolve the exit; the exit is still reported by the OS.
    pub fn kill(&self, signal: Signal) {
        if self.signals.send(signal).is_err() {
            debug!("worker already finished, dropping {}", signal);
        }
    }
}

impl fmt::Debug for Worker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Worker")
            .field("state", &*self.state.borrow())
            .finish()
    }
}

impl Lifecycle {
    /// Publishes the exit, then closes the log
    fn finish(self, result: Result<ExitResult, Error>) {
        let Lifecycle {
            log,
            state,
            exit,
            closed,
        } = self;

        if let Ok(ref exit_result) = result {
            state.send_replace(WorkerState::Exited(exit_result.clone()));
        }

        // the receiver may already be gone, there is nobody left to notify then
        exit.send(result).ok();

        log.close().ok();
        closed.send(()).ok();
    }
}

fn start(
    config: &SupervisorConfig,
    spec: &LaunchSpec,
    log: &LogTarget,
) -> Result<(Child, StartupPayload), Error> {
    let valid = spec.validate()?;
    let stdio = StdIoConf::worker(log.stderr()?);
    let child = exec::spawn(config, valid.user, stdio)?;

    Ok((child, StartupPayload::from_spec(valid.app_directory, spec)))
}

async fn supervise(
    mut child: Child,
    payload: StartupPayload,
    signals: mpsc::UnboundedReceiver<Signal>,
    lifecycle: Lifecycle,
) {
    let pid = child.id().unwrap_or_default();
    let stdin = child.stdin.take();

    let (_, status) = futures::join!(
        send_payload(stdin, payload),
        wait_for_exit(&mut child, signals)
    );

    let result = match status {
        Ok(status) => ExitResult::from_status(status),
        Err(err) => Err(Error::from(err)),
    };

    match result {
        Ok(ref exit) => info!("pid {} {}", pid, exit),
        Err(ref err) => error!("failed waiting on pid {}: {}", pid, err),
    }

    lifecycle.finish(result);
}

/// Failures are logged and otherwise ignored, the exit is reported from the OS regardless
async fn send_payload(stdin: Option<ChildStdin>, payload: StartupPayload) {
    let stdin = match stdin {
        Some(stdin) => stdin,
        None => {
            warn!("no stdin available for the startup payload");
            return;
        }
    };

    if let Err(err) = payload.send(stdin).await {
        warn!("failed to send startup payload: {}", err);
    }
}

async fn wait_for_exit(
    child: &mut Child,
    mut signals: mpsc::UnboundedReceiver<Signal>,
) -> io::Result<ExitStatus> {
    loop {
        tokio::select! {
            status = child.wait() => return status,
            Some(signal) = signals.recv() => deliver(child, signal),
        }
    }
}

fn deliver(child: &Child, signal: Signal) {
    // the id is cleared once the child is reaped, after that the pid may belong to someone else
    let pid = match child.id() {
        Some(pid) => pid,
        None => {
            debug!("child already reaped, dropping {}", signal);
            return;
        }
    };

    debug!("sending {} to {}", signal, pid);
    if let Err(err) = kill(Pid::from_raw(pid as i32), signal) {
        warn!("failed to send {} to {}: {}", signal, pid, err);
    }
}
