#![cfg(unix)]

use std::fs;
use std::net::TcpListener;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tempfile::TempDir;

use stackup::core::options::{ConfigLoadOptions, DownOptions, StatusOptions, UpOptions};
use stackup::core::outcome::TunnelState;
use stackup::core::readiness::ProbeStatus;
use stackup::core::tunnel::ShutdownStatus;
use stackup::core::{down, status, up};

fn write_config(dir: &Path, contents: &str) -> PathBuf {
    let path = dir.join("stackup.toml");
    fs::write(&path, contents).expect("write config");
    path
}

fn write_stub(dir: &Path, name: &str, script: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, script).expect("write stub");
    let mut perms = fs::metadata(&path).expect("stat stub").permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&path, perms).expect("chmod stub");
    path
}

fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    listener.local_addr().expect("addr").port()
}

#[test]
fn up_runs_the_full_sequence_and_reports_endpoints() {
    let temp = TempDir::new().expect("temp dir");
    let port = free_port();
    let path = write_config(
        temp.path(),
        &format!(
            r#"
version = "0.1.0"

[project]
name = "integration"

[run]
max_readiness_attempts = 1
readiness_interval_secs = 0
ready_grace_secs = 0
launcher = "detached"

[[services]]
name = "api"
port = {port}
command = "true"
"#
        ),
    );

    let options = UpOptions {
        config: ConfigLoadOptions::explicit(path),
    };
    let output = up(options, None).expect("up always completes");
    let outcome = output.value;

    // `true` exits without listening, so the probe must time out, as a
    // warning rather than a failure.
    assert_eq!(outcome.services.len(), 1);
    assert_eq!(
        outcome.services[0].probe,
        ProbeStatus::TimedOut { attempts: 1 }
    );
    assert!(
        output
            .diagnostics
            .iter()
            .any(|diag| diag.message.contains("never opened port"))
    );

    // The endpoint report is produced regardless.
    assert_eq!(outcome.report.rows.len(), 1);
    assert_eq!(
        outcome.report.rows[0].local,
        format!("http://127.0.0.1:{port}")
    );

    // State directories are created next to the config.
    assert_eq!(outcome.state_root, temp.path().join(".stackup"));
    assert!(outcome.log_root.is_dir());
    assert!(
        outcome
            .log_root
            .join("service-api.log")
            .exists(),
        "detached launch must capture output"
    );
}

#[test]
fn tunnel_lifecycle_survives_up_down_status() {
    let temp = TempDir::new().expect("temp dir");
    write_stub(temp.path(), "fake-tunnel", "#!/bin/sh\nexec sleep 30\n");
    let port = free_port();
    let path = write_config(
        temp.path(),
        &format!(
            r#"
version = "0.1.0"

[project]
name = "integration"

[run]
max_readiness_attempts = 1
readiness_interval_secs = 0
ready_grace_secs = 0
launcher = "detached"

[tunnel]
binary = "{tunnel}"

[[services]]
name = "api"
port = {port}
command = "true"
public_hostname = "api.example.dev"
"#,
            tunnel = temp.path().join("fake-tunnel").display()
        ),
    );

    let up_options = UpOptions {
        config: ConfigLoadOptions::explicit(path.clone()),
    };
    let output = up(up_options, None).expect("up");
    let tunnel_status = output.value.services[0]
        .tunnel
        .as_ref()
        .expect("tunnel attempted");
    let pid = match tunnel_status {
        stackup::core::tunnel::TunnelStatus::Started { pid } => *pid,
        other => panic!("expected a started tunnel, got {other:?}"),
    };

    let pid_file = temp.path().join(".stackup/logs/tunnel-api.pid");
    assert!(pid_file.exists());

    // status sees the running tunnel.
    let status_output = status(
        StatusOptions {
            config: ConfigLoadOptions::explicit(path.clone()),
        },
        None,
    )
    .expect("status");
    assert_eq!(
        status_output.value.rows[0].tunnel,
        TunnelState::Running { pid: pid as i32 }
    );

    // down stops it and clears the record.
    let down_output = down(
        DownOptions {
            config: ConfigLoadOptions::explicit(path.clone()),
        },
        None,
    )
    .expect("down");
    assert_eq!(down_output.value.stopped.len(), 1);
    assert_eq!(down_output.value.stopped[0].status, ShutdownStatus::Stopped);
    assert!(!pid_file.exists());

    // A second down has nothing left to do.
    let second = down(
        DownOptions {
            config: ConfigLoadOptions::explicit(path),
        },
        None,
    )
    .expect("second down");
    assert!(second.value.stopped.is_empty());
}

#[test]
fn up_restart_replaces_the_prior_tunnel() {
    let temp = TempDir::new().expect("temp dir");
    write_stub(temp.path(), "fake-tunnel", "#!/bin/sh\nexec sleep 30\n");
    let port = free_port();
    let path = write_config(
        temp.path(),
        &format!(
            r#"
version = "0.1.0"

[project]
name = "integration"

[run]
max_readiness_attempts = 1
readiness_interval_secs = 0
ready_grace_secs = 0
launcher = "detached"

[tunnel]
binary = "{tunnel}"

[[services]]
name = "api"
port = {port}
command = "true"
public_hostname = "api.example.dev"
"#,
            tunnel = temp.path().join("fake-tunnel").display()
        ),
    );

    let first = up(
        UpOptions {
            config: ConfigLoadOptions::explicit(path.clone()),
        },
        None,
    )
    .expect("first up");
    let first_pid = started_pid(&first.value);

    let second = up(
        UpOptions {
            config: ConfigLoadOptions::explicit(path.clone()),
        },
        None,
    )
    .expect("second up");
    let second_pid = started_pid(&second.value);
    assert_ne!(first_pid, second_pid);

    // Exactly one recorded tunnel remains, and it is the new one.
    let pid_file = temp.path().join(".stackup/logs/tunnel-api.pid");
    let recorded: u32 = fs::read_to_string(&pid_file)
        .expect("pid file")
        .trim()
        .parse()
        .expect("pid");
    assert_eq!(recorded, second_pid);

    // Clean up the lingering stub process.
    let _ = down(
        DownOptions {
            config: ConfigLoadOptions::explicit(path),
        },
        None,
    );
    std::thread::sleep(Duration::from_millis(100));
}

fn started_pid(outcome: &stackup::core::outcome::UpOutcome) -> u32 {
    match outcome.services[0].tunnel.as_ref().expect("tunnel") {
        stackup::core::tunnel::TunnelStatus::Started { pid } => *pid,
        other => panic!("expected a started tunnel, got {other:?}"),
    }
}
