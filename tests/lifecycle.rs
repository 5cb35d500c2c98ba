// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Runs workers as the current user, with `/bin/sh` standing in for the application runtime

use std::ffi::{CString, OsString};
use std::path::PathBuf;
use std::time::Duration;

use nix::unistd::{getgrouplist, getpgid, Gid, Pid, Uid, User};
use tempfile::TempDir;
use tokio::time::timeout;

use appworker::{
    ExitResult, IdentitySwitch, LaunchSpec, Launcher, Signal, SupervisorConfig, WorkerState,
    TRACKING_ID_SETTING,
};

const ECHO_ADAPTER: &str = r#"read dir; read port; read tid
echo "dir=$dir port=$port tid=$tid" >&2
echo "this goes nowhere"
if read extra; then echo "unexpected input: $extra" >&2; exit 3; fi
exit 0
"#;

const FAILING_ADAPTER: &str = r#"cat > /dev/null
echo "failing" >&2
exit 7
"#;

const SLEEPING_ADAPTER: &str = "exec sleep 30\n";

const GROUPS_ADAPTER: &str = r#"cat > /dev/null
id -G >&2
"#;

const WAIT: Duration = Duration::from_secs(10);

struct Fixture {
    _dir: TempDir,
    launcher: Launcher,
    app_dir: PathBuf,
    log_path: PathBuf,
    user: String,
}

fn fixture(adapter: &str) -> Fixture {
    let dir = tempfile::tempdir().expect("tempdir");
    let app_dir = dir.path().join("app");
    std::fs::create_dir(&app_dir).expect("create app dir");

    let script = dir.path().join("adapter.sh");
    std::fs::write(&script, adapter).expect("write adapter");

    let config = SupervisorConfig::from_install_dir(dir.path())
        .with_identity(IdentitySwitch::SetUid)
        .with_runtime("/bin/sh")
        .with_runtime_args(Vec::<OsString>::new())
        .with_adapter_script(script);

    let user = User::from_uid(Uid::current())
        .expect("getpwuid")
        .expect("current user has a passwd entry")
        .name;

    Fixture {
        log_path: dir.path().join("app.log"),
        launcher: Launcher::new(config),
        app_dir,
        user,
        _dir: dir,
    }
}

fn read_log(fixture: &Fixture) -> String {
    std::fs::read_to_string(&fixture.log_path).expect("read log")
}

#[tokio::test]
async fn test_run_sends_payload_and_reports_exit_code() {
    let fixture = fixture(ECHO_ADAPTER);
    let spec = LaunchSpec::new(fixture.user.as_str(), &fixture.app_dir, 3838);

    let result = timeout(WAIT, fixture.launcher.run(&spec, &fixture.log_path))
        .await
        .expect("timed out")
        .expect("run failed");

    assert_eq!(result, ExitResult::exited(0));

    let log = read_log(&fixture);
    assert_eq!(
        log,
        format!("dir={} port=3838 tid=\n", fixture.app_dir.display())
    );
}

#[tokio::test]
async fn test_tracking_id_is_third_line() {
    let fixture = fixture(ECHO_ADAPTER);
    let spec = LaunchSpec::new(fixture.user.as_str(), &fixture.app_dir, 10001)
        .with_setting(TRACKING_ID_SETTING, "UA-12345-1")
        .with_setting("unrelated", "ignored");

    let result = timeout(WAIT, fixture.launcher.run(&spec, &fixture.log_path))
        .await
        .expect("timed out")
        .expect("run failed");

    assert!(result.success());
    assert!(read_log(&fixture).contains("port=10001 tid=UA-12345-1\n"));
}

#[tokio::test]
async fn test_exit_is_idempotent() {
    let fixture = fixture(FAILING_ADAPTER);
    let spec = LaunchSpec::new(fixture.user.as_str(), &fixture.app_dir, 3838);

    let worker = fixture
        .launcher
        .launch(&spec, &fixture.log_path)
        .await
        .expect("launch failed");

    let first = timeout(WAIT, worker.exit())
        .await
        .expect("timed out")
        .expect("exit failed");
    let second = worker.exit().await.expect("exit failed");

    assert_eq!(first, ExitResult::exited(7));
    assert_eq!(first, second);
    assert_eq!(worker.state(), WorkerState::Exited(first));
    assert_eq!(worker.pid(), None);
}

#[tokio::test]
async fn test_log_is_appended_and_closed_after_exit() {
    let fixture = fixture(FAILING_ADAPTER);
    std::fs::write(&fixture.log_path, "previous run\n").unwrap();
    let spec = LaunchSpec::new(fixture.user.as_str(), &fixture.app_dir, 3838);

    let worker = fixture
        .launcher
        .launch(&spec, &fixture.log_path)
        .await
        .expect("launch failed");

    let result = timeout(WAIT, worker.exit()).await.expect("timed out");
    assert_eq!(result.expect("exit failed").code(), Some(7));

    timeout(WAIT, worker.closed()).await.expect("log never closed");
    assert_eq!(read_log(&fixture), "previous run\nfailing\n");
}

#[tokio::test]
async fn test_kill_reports_signal() {
    let fixture = fixture(SLEEPING_ADAPTER);
    let spec = LaunchSpec::new(fixture.user.as_str(), &fixture.app_dir, 3838);

    let worker = fixture
        .launcher
        .launch(&spec, &fixture.log_path)
        .await
        .expect("launch failed");
    assert!(worker.pid().is_some());

    worker.kill(Signal::SIGTERM);

    let result = timeout(WAIT, worker.exit())
        .await
        .expect("timed out")
        .expect("exit failed");
    assert_eq!(result, ExitResult::signaled("SIGTERM"));
    assert_eq!(result.code(), None);

    // the child is gone, this is dropped without effect
    worker.kill(Signal::SIGKILL);
    assert_eq!(worker.exit().await.unwrap(), result);
}

#[tokio::test]
async fn test_missing_runtime_rejects_exit() {
    let mut fixture = fixture(ECHO_ADAPTER);
    fixture.launcher = Launcher::new(
        fixture
            .launcher
            .config()
            .clone()
            .with_runtime(fixture.app_dir.join("no-such-runtime")),
    );
    let spec = LaunchSpec::new(fixture.user.as_str(), &fixture.app_dir, 3838);

    let worker = fixture
        .launcher
        .launch(&spec, &fixture.log_path)
        .await
        .expect("launch failed");

    let err = worker.exit().await.unwrap_err();
    assert!(err.is_spawn());
    assert_eq!(worker.state(), WorkerState::SpawnFailed);

    // the log was opened and is closed, even though nothing ran
    timeout(WAIT, worker.closed()).await.expect("log never closed");
    assert_eq!(read_log(&fixture), "");
}

#[tokio::test]
async fn test_unknown_user_rejects_exit() {
    let fixture = fixture(ECHO_ADAPTER);
    let spec = LaunchSpec::new("no-such-user-for-appworker", &fixture.app_dir, 3838);

    let err = fixture
        .launcher
        .run(&spec, &fixture.log_path)
        .await
        .unwrap_err();

    assert!(err.is_spawn());
    assert!(fixture.log_path.exists());
}

#[tokio::test]
async fn test_nonexistent_app_directory_creates_no_log() {
    let fixture = fixture(ECHO_ADAPTER);
    let spec = LaunchSpec::new(
        fixture.user.as_str(),
        fixture.app_dir.join("does-not-exist"),
        3838,
    );

    let err = fixture
        .launcher
        .launch(&spec, &fixture.log_path)
        .await
        .unwrap_err();

    assert!(err.is_not_found());
    assert!(!fixture.log_path.exists());
}

#[tokio::test]
async fn test_child_has_its_own_process_group() {
    let fixture = fixture(SLEEPING_ADAPTER);
    let spec = LaunchSpec::new(fixture.user.as_str(), &fixture.app_dir, 3838);

    let worker = fixture
        .launcher
        .launch(&spec, &fixture.log_path)
        .await
        .expect("launch failed");
    let pid = Pid::from_raw(worker.pid().expect("running") as i32);

    let pgid = getpgid(Some(pid)).expect("getpgid");
    worker.kill(Signal::SIGKILL);

    assert_eq!(pgid, pid);
    assert_ne!(pgid, getpgid(None).expect("getpgid"));

    let result = timeout(WAIT, worker.exit())
        .await
        .expect("timed out")
        .expect("exit failed");
    assert_eq!(result, ExitResult::signaled("SIGKILL"));
}

#[tokio::test]
async fn test_setuid_keeps_supplementary_groups() {
    // replacing the group list needs root
    if !Uid::effective().is_root() {
        return;
    }

    let fixture = fixture(GROUPS_ADAPTER);
    let spec = LaunchSpec::new(fixture.user.as_str(), &fixture.app_dir, 3838);

    let result = timeout(WAIT, fixture.launcher.run(&spec, &fixture.log_path))
        .await
        .expect("timed out")
        .expect("run failed");
    assert!(result.success());

    let user = User::from_name(&fixture.user).unwrap().unwrap();
    let name = CString::new(user.name.as_str()).unwrap();
    let mut expected: Vec<u32> = getgrouplist(&name, user.gid)
        .expect("getgrouplist")
        .into_iter()
        .map(Gid::as_raw)
        .collect();
    expected.sort_unstable();
    expected.dedup();

    let mut actual: Vec<u32> = read_log(&fixture)
        .split_whitespace()
        .map(|gid| gid.parse().expect("numeric gid"))
        .collect();
    actual.sort_unstable();
    actual.dedup();

    assert_eq!(actual, expected);
}
