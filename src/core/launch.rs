use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use super::context::{RunContext, find_executable};
use crate::config::{LauncherKind, ServiceSpec};

/// How a service command actually got spawned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchMethod {
    /// A new terminal window owns the process; output stays visible there.
    Terminal,
    /// Detached child with output appended to a per-service log file.
    Detached,
}

impl LaunchMethod {
    pub fn describe(&self) -> &'static str {
        match self {
            LaunchMethod::Terminal => "terminal window",
            LaunchMethod::Detached => "detached process",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchStatus {
    Launched { method: LaunchMethod },
    Failed { reason: String },
}

#[derive(Debug)]
pub struct LaunchOutcome {
    pub service: String,
    pub status: LaunchStatus,
    /// Log capturing the service output, for detached launches only.
    pub log_path: Option<PathBuf>,
}

/// Hand a service's start command its own execution context. The spawned
/// process is not tracked afterwards; the readiness probe on its port is the
/// only success signal.
pub fn launch(ctx: &RunContext, service: &ServiceSpec, launcher: LauncherKind) -> LaunchOutcome {
    match launcher {
        LauncherKind::Terminal => match launch_in_terminal(service) {
            Ok(()) => LaunchOutcome {
                service: service.name.clone(),
                status: LaunchStatus::Launched {
                    method: LaunchMethod::Terminal,
                },
                log_path: None,
            },
            // No terminal emulator on this host; a detached spawn still gets
            // the service running.
            Err(_) => launch_detached(ctx, service),
        },
        LauncherKind::Detached => launch_detached(ctx, service),
    }
}

fn launch_in_terminal(service: &ServiceSpec) -> Result<(), String> {
    if cfg!(target_os = "macos") {
        return launch_macos_terminal(service);
    }
    launch_linux_terminal(service)
}

fn launch_macos_terminal(service: &ServiceSpec) -> Result<(), String> {
    let osascript =
        find_executable(&["osascript"]).ok_or_else(|| "osascript not found".to_string())?;

    let script = format!(
        "tell application \"Terminal\" to do script \"{}\"",
        applescript_escape(&terminal_command(service))
    );

    Command::new(osascript)
        .arg("-e")
        .arg(script)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map(|_| ())
        .map_err(|err| format!("osascript failed: {err}"))
}

fn launch_linux_terminal(service: &ServiceSpec) -> Result<(), String> {
    let command = terminal_command(service);

    if let Some(gnome) = find_executable(&["gnome-terminal"]) {
        return Command::new(gnome)
            .arg("--")
            .arg("sh")
            .arg("-c")
            .arg(&command)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map(|_| ())
            .map_err(|err| format!("gnome-terminal failed: {err}"));
    }

    if let Some(emulator) = find_executable(&["x-terminal-emulator", "xterm"]) {
        return Command::new(emulator)
            .arg("-e")
            .arg("sh")
            .arg("-c")
            .arg(&command)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map(|_| ())
            .map_err(|err| format!("terminal emulator failed: {err}"));
    }

    Err("no terminal emulator found".to_string())
}

/// One shell line that enters the workdir, exports the env, and runs the
/// service command. Used for terminal launches where env cannot be passed
/// through the emulator reliably.
fn terminal_command(service: &ServiceSpec) -> String {
    let mut parts = vec![format!("cd {}", shell_quote(&service.workdir.display().to_string()))];
    for (key, value) in &service.env {
        parts.push(format!("export {key}={}", shell_quote(value)));
    }
    parts.push(service.command.clone());
    parts.join(" && ")
}

fn launch_detached(ctx: &RunContext, service: &ServiceSpec) -> LaunchOutcome {
    let log_path = ctx.log_root.join(format!("service-{}.log", service.name));

    let status = match spawn_detached(service, &log_path) {
        Ok(()) => LaunchStatus::Launched {
            method: LaunchMethod::Detached,
        },
        Err(reason) => LaunchStatus::Failed { reason },
    };

    LaunchOutcome {
        service: service.name.clone(),
        status,
        log_path: Some(log_path),
    }
}

fn spawn_detached(service: &ServiceSpec, log_path: &Path) -> Result<(), String> {
    let log = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .map_err(|err| format!("failed to open {}: {err}", log_path.display()))?;
    let log_err = log
        .try_clone()
        .map_err(|err| format!("failed to clone log handle: {err}"))?;

    let mut command = Command::new("sh");
    command
        .arg("-c")
        .arg(format!("exec {}", service.command))
        .current_dir(&service.workdir)
        .stdin(Stdio::null())
        .stdout(Stdio::from(log))
        .stderr(Stdio::from(log_err));
    for (key, value) in &service.env {
        command.env(key, value);
    }

    // The child is deliberately not waited on; it outlives this process.
    command
        .spawn()
        .map(|_| ())
        .map_err(|err| format!("failed to spawn `{}`: {err}", service.command))
}

fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "'\\''"))
}

fn applescript_escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::fs;
    use std::thread;
    use std::time::Duration;
    use tempfile::tempdir;

    fn detached_context(log_root: &Path) -> RunContext {
        RunContext {
            state_root: log_root.parent().map(Path::to_path_buf).unwrap_or_default(),
            log_root: log_root.to_path_buf(),
            compose: None,
            tunnel_binary: None,
            pg_isready: None,
        }
    }

    fn service_with_command(temp: &Path, command: &str) -> ServiceSpec {
        ServiceSpec {
            name: "api".to_string(),
            group: None,
            port: 3001,
            command: command.to_string(),
            workdir: temp.to_path_buf(),
            env: BTreeMap::new(),
            public_hostname: None,
        }
    }

    #[test]
    fn detached_launch_runs_the_command_in_its_workdir() {
        let temp = tempdir().expect("temp dir");
        let logs = temp.path().join("logs");
        fs::create_dir_all(&logs).expect("logs dir");
        let ctx = detached_context(&logs);

        let service = service_with_command(temp.path(), "touch spawned-marker");
        let outcome = launch(&ctx, &service, LauncherKind::Detached);
        assert_eq!(
            outcome.status,
            LaunchStatus::Launched {
                method: LaunchMethod::Detached
            }
        );

        let marker = temp.path().join("spawned-marker");
        for _ in 0..50 {
            if marker.exists() {
                return;
            }
            thread::sleep(Duration::from_millis(100));
        }
        panic!("detached command never ran");
    }

    #[test]
    fn detached_launch_captures_output_and_env() {
        let temp = tempdir().expect("temp dir");
        let logs = temp.path().join("logs");
        fs::create_dir_all(&logs).expect("logs dir");
        let ctx = detached_context(&logs);

        let mut service = service_with_command(temp.path(), "echo \"greeting=$GREETING\"");
        service.env.insert("GREETING".to_string(), "hello".to_string());

        let outcome = launch(&ctx, &service, LauncherKind::Detached);
        let log_path = outcome.log_path.expect("log path");

        for _ in 0..50 {
            if let Ok(contents) = fs::read_to_string(&log_path) {
                if contents.contains("greeting=hello") {
                    return;
                }
            }
            thread::sleep(Duration::from_millis(100));
        }
        panic!("service output never reached the log");
    }

    #[test]
    fn terminal_command_enters_workdir_and_exports_env() {
        let temp = tempdir().expect("temp dir");
        let mut service = service_with_command(temp.path(), "npm run dev");
        service.env.insert("PORT".to_string(), "3001".to_string());

        let line = terminal_command(&service);
        assert!(line.starts_with("cd '"));
        assert!(line.contains("export PORT='3001'"));
        assert!(line.ends_with("npm run dev"));
    }

    #[test]
    fn shell_quote_handles_embedded_quotes() {
        assert_eq!(shell_quote("plain"), "'plain'");
        assert_eq!(shell_quote("it's"), "'it'\\''s'");
    }
}
