// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::path::{Path, PathBuf};

use clap::{App, Arg, ArgMatches, SubCommand};
use log::{error, info};
use tokio::runtime;
use tokio::signal::unix::{signal, SignalKind};

use appworker::{
    Error, ExitResult, IdentitySwitch, LaunchSpec, Launcher, Signal, SupervisorConfig,
};

const RUN: &str = "run";
const USER: &str = "user";
const APP_DIR: &str = "app-dir";
const PORT: &str = "port";
const LOG: &str = "log";
const SETTING: &str = "setting";
const INSTALL_DIR: &str = "install-dir";
const SETUID: &str = "setuid";

trait SetupClapApp {
    fn setup_clap_app(self) -> Self;
}

impl<'a, 'b> SetupClapApp for App<'a, 'b> {
    fn setup_clap_app(self) -> Self {
        self.version(env!("CARGO_PKG_VERSION"))
            .author(env!("CARGO_PKG_AUTHORS"))
    }
}

fn run_sub_command() -> App<'static, 'static> {
    SubCommand::with_name(RUN)
        .about("run one application until it exits")
        .arg(
            Arg::with_name(USER)
                .short("u")
                .long(USER)
                .value_name("USER")
                .help("user to run the application as")
                .takes_value(true)
                .required(true),
        )
        .arg(
            Arg::with_name(APP_DIR)
                .short("d")
                .long(APP_DIR)
                .value_name("DIR")
                .help("directory of the application")
                .takes_value(true)
                .required(true),
        )
        .arg(
            Arg::with_name(PORT)
                .short("p")
                .long(PORT)
                .value_name("NUMBER")
                .validator(|p| {
                    p.parse::<u16>()
                        .map(|_| ())
                        .map_err(|_| String::from("a port number was expected"))
                })
                .help("port the application should listen on")
                .takes_value(true)
                .required(true),
        )
        .arg(
            Arg::with_name(LOG)
                .short("l")
                .long(LOG)
                .value_name("FILE")
                .help("file the application's stderr is appended to")
                .takes_value(true)
                .required(true),
        )
        .arg(
            Arg::with_name(SETTING)
                .short("s")
                .long(SETTING)
                .value_name("KEY=VALUE")
                .validator(|s| {
                    if s.contains('=') {
                        Ok(())
                    } else {
                        Err(String::from("KEY=VALUE was expected"))
                    }
                })
                .help("application setting, e.g. gaTrackingId=UA-12345-1")
                .takes_value(true)
                .multiple(true)
                .number_of_values(1),
        )
        .arg(
            Arg::with_name(INSTALL_DIR)
                .long(INSTALL_DIR)
                .value_name("DIR")
                .help("directory holding the adapter, defaults to the directory of this executable")
                .takes_value(true),
        )
        .arg(
            Arg::with_name(SETUID)
                .long(SETUID)
                .help("switch user by setting the uid/gid of the child directly instead of using su"),
        )
}

fn main() {
    env_logger::init();

    let args = App::new(env!("CARGO_PKG_NAME"))
        .setup_clap_app()
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .subcommand(run_sub_command().setup_clap_app())
        .get_matches();

    let runtime = match runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("failed to initialize Tokio Runtime: {}", e);
            std::process::exit(1);
        }
    };

    let code = match args.subcommand() {
        (RUN, Some(args)) => runtime.block_on(run(args)),
        ("", None) => {
            println!("command required");
            println!("{}", args.usage());
            2
        }
        (arg, _) => {
            println!("unexpected argument: {}", arg);
            println!("{}", args.usage());
            2
        }
    };

    std::process::exit(code)
}

async fn run(args: &ArgMatches<'_>) -> i32 {
    let (launcher, spec, log) = match parse(args) {
        Ok(parsed) => parsed,
        Err(e) => {
            eprintln!("{}", e);
            return 2;
        }
    };

    match run_app(&launcher, &spec, &log).await {
        Ok(result) => {
            match serde_json::to_string(&result) {
                Ok(json) => println!("{}", json),
                Err(e) => error!("failed to serialize exit result: {}", e),
            }
            exit_code(&result)
        }
        Err(e) => {
            eprintln!("{}", e);
            1
        }
    }
}

fn parse(args: &ArgMatches<'_>) -> Result<(Launcher, LaunchSpec, PathBuf), Error> {
    let mut config = match args.value_of_os(INSTALL_DIR) {
        Some(dir) => SupervisorConfig::from_install_dir(dir),
        None => SupervisorConfig::resolve()?,
    };
    if args.is_present(SETUID) {
        config = config.with_identity(IdentitySwitch::SetUid);
    }

    // presence and format are enforced by clap
    let port = args
        .value_of(PORT)
        .unwrap_or_default()
        .parse::<u16>()
        .map_err(|_| "a port number was expected")?;

    let mut spec = LaunchSpec::default().with_listen_port(port);
    if let Some(user) = args.value_of(USER) {
        spec = spec.with_target_user(user);
    }
    if let Some(dir) = args.value_of_os(APP_DIR) {
        spec = spec.with_app_directory(dir);
    }
    for setting in args.values_of(SETTING).into_iter().flatten() {
        if let Some((key, value)) = setting.split_once('=') {
            spec = spec.with_setting(key, value);
        }
    }

    let log = args
        .value_of_os(LOG)
        .map(PathBuf::from)
        .ok_or("log is a required parameter")?;

    Ok((Launcher::new(config), spec, log))
}

/// Runs the app, forwarding SIGTERM and SIGINT received here to the child
async fn run_app(
    launcher: &Launcher,
    spec: &LaunchSpec,
    log: &Path,
) -> Result<ExitResult, Error> {
    // registered before the launch so nothing is missed while the child starts
    let mut terminate = signal(SignalKind::terminate())?;
    let mut interrupt = signal(SignalKind::interrupt())?;

    let worker = launcher.launch(spec, log).await?;
    let mut exit = worker.exit();

    let result = loop {
        tokio::select! {
            result = &mut exit => break result,
            _ = terminate.recv() => {
                info!("forwarding SIGTERM");
                worker.kill(Signal::SIGTERM);
            }
            _ = interrupt.recv() => {
                info!("forwarding SIGINT");
                worker.kill(Signal::SIGINT);
            }
        }
    };

    worker.closed().await;
    result
}

/// The child's exit code, or the shell convention of 128 + signal
fn exit_code(result: &ExitResult) -> i32 {
    if let Some(code) = result.code() {
        return code;
    }

    result
        .signal()
        .and_then(|name| name.parse::<Signal>().ok())
        .map(|signal| 128 + signal as i32)
        .unwrap_or(1)
}
