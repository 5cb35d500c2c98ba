// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Identity switching process creation

use std::borrow::Cow;
use std::ffi::{CString, OsStr};
use std::path::Path;
use std::process::Stdio;

use log::debug;
use nix::unistd::{initgroups, setgid, setuid, Uid, User};
use shell_escape::escape;
use tokio::process::{Child, Command};

use crate::config::{IdentitySwitch, SupervisorConfig};
use crate::error::ErrorKind;
use crate::Error;

pub struct StdIoConf {
    pub stdin: Stdio,
    pub stderr: Stdio,
    pub stdout: Stdio,
}

impl StdIoConf {
    /// The configuration for an application worker
    pub fn worker(stderr: Stdio) -> Self {
        StdIoConf {
            // startup parameters are only ever passed over stdin
            stdin: Stdio::piped(),
            // stderr goes to the application log
            stderr,
            stdout: Stdio::null(),
        }
    }
}

/// Builds the command that runs the adapter script as `user`
///
/// Nothing from the launch request other than the user name ends up in the arguments,
///  the application directory and port travel over stdin.
pub fn command(config: &SupervisorConfig, user: &str) -> Result<Command, Error> {
    match config.identity() {
        IdentitySwitch::Su { program } => {
            let script = shell_command(config)?;
            debug!("su command for {}: {}", user, script);

            let mut command = Command::new(program);
            command.arg("-c").arg(script).arg("--").arg(user);
            Ok(command)
        }
        IdentitySwitch::SetUid => {
            let passwd = User::from_name(user)?
                .ok_or_else(|| ErrorKind::UnknownUser(user.to_string()))?;
            debug!(
                "running {} as {} (uid: {} gid: {})",
                config.runtime().display(),
                passwd.name,
                passwd.uid,
                passwd.gid
            );

            let name = CString::new(passwd.name.as_str())
                .map_err(|_| format!("user name contains a nul byte: {}", passwd.name))?;
            let (uid, gid) = (passwd.uid, passwd.gid);
            // only root may replace the group list, other callers can only keep their own ids
            let init_groups = Uid::effective().is_root();

            let mut command = Command::new(config.runtime());
            command
                .args(config.runtime_args())
                .arg(config.adapter_script())
                .env("HOME", &passwd.dir)
                .env("USER", &passwd.name)
                .env("LOGNAME", &passwd.name);

            // SAFETY: runs in the forked child before exec, and only switches credentials.
            //  Groups must be set while still privileged, then gid before uid.
            unsafe {
                command.pre_exec(move || {
                    if init_groups {
                        initgroups(&name, gid)?;
                    }
                    setgid(gid)?;
                    setuid(uid)?;
                    Ok(())
                });
            }
            Ok(command)
        }
    }
}

/// Spawns the adapter for `user` with the given standard io
pub fn spawn(config: &SupervisorConfig, user: &str, stdio: StdIoConf) -> Result<Child, Error> {
    let mut command = command(config, user)?;
    let program = command
        .as_std()
        .get_program()
        .to_string_lossy()
        .into_owned();

    // the child gets its own process group, so terminal signals reach it only when forwarded
    command
        .kill_on_drop(true)
        .process_group(0)
        .stdin(stdio.stdin)
        .stdout(stdio.stdout)
        .stderr(stdio.stderr)
        .spawn()
        .map_err(|source| ErrorKind::Spawn { program, source }.into())
}

/// `su -c` hands its argument to a shell, so every part is escaped
fn shell_command(config: &SupervisorConfig) -> Result<String, Error> {
    let mut parts = Vec::with_capacity(config.runtime_args().len() + 2);
    parts.push(escape_os(config.runtime().as_os_str())?);
    for arg in config.runtime_args() {
        parts.push(escape_os(arg)?);
    }
    parts.push(escape_path(config.adapter_script())?);

    Ok(parts.join(" "))
}

fn escape_path(path: &Path) -> Result<String, Error> {
    escape_os(path.as_os_str())
}

fn escape_os(value: &OsStr) -> Result<String, Error> {
    let value = value
        .to_str()
        .ok_or_else(|| format!("not valid utf-8: {}", value.to_string_lossy()))?;
    Ok(escape(Cow::Borrowed(value)).into_owned())
}
