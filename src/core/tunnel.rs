use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

use libc::pid_t;

use super::context::RunContext;
use super::process::{self, Liveness};
use crate::config::ServiceSpec;

/// Grace given to a prior tunnel after SIGTERM before SIGKILL follows.
const STOP_GRACE: Duration = Duration::from_secs(2);

/// A persisted tunnel record: the pid written at spawn time plus the log the
/// tunnel's output streams into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelHandle {
    pub pid: i32,
    pub log_path: PathBuf,
}

/// Pid files under the log root, one per service. Single writer assumed: only
/// one `up` or `down` runs against a state root at a time, so no locking.
pub struct TunnelStore {
    log_root: PathBuf,
}

impl TunnelStore {
    pub fn new(log_root: impl Into<PathBuf>) -> Self {
        Self {
            log_root: log_root.into(),
        }
    }

    pub fn pid_path(&self, service: &str) -> PathBuf {
        self.log_root.join(format!("tunnel-{service}.pid"))
    }

    pub fn log_path(&self, service: &str) -> PathBuf {
        self.log_root.join(format!("tunnel-{service}.log"))
    }

    /// Read the recorded handle for a service. A malformed or empty pid file
    /// is treated as absent and removed, with a warning describing why.
    pub fn load(&self, service: &str, warnings: &mut Vec<String>) -> Option<TunnelHandle> {
        let pid_path = self.pid_path(service);
        let contents = match fs::read_to_string(&pid_path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return None,
            Err(err) => {
                warnings.push(format!(
                    "Failed to read tunnel pid file {}: {err}",
                    pid_path.display()
                ));
                return None;
            }
        };

        match contents.trim().parse::<i32>() {
            Ok(pid) if pid > 0 => Some(TunnelHandle {
                pid,
                log_path: self.log_path(service),
            }),
            _ => {
                warnings.push(format!(
                    "Tunnel pid file {} did not contain a valid pid; removing it.",
                    pid_path.display()
                ));
                let _ = fs::remove_file(&pid_path);
                None
            }
        }
    }

    pub fn persist(&self, service: &str, pid: u32) -> std::io::Result<()> {
        fs::write(self.pid_path(service), format!("{pid}\n"))
    }

    pub fn remove(&self, service: &str) {
        let _ = fs::remove_file(self.pid_path(service));
    }

    /// Services with a pid file on disk, from the recorded file names.
    pub fn recorded_services(&self) -> Vec<String> {
        let mut services = Vec::new();
        let entries = match fs::read_dir(&self.log_root) {
            Ok(entries) => entries,
            Err(_) => return services,
        };
        for entry in entries.flatten() {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if let Some(rest) = name.strip_prefix("tunnel-") {
                if let Some(service) = rest.strip_suffix(".pid") {
                    services.push(service.to_string());
                }
            }
        }
        services.sort();
        services
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TunnelStatus {
    Started { pid: u32 },
    Failed { reason: String },
}

#[derive(Debug)]
pub struct TunnelOutcome {
    pub service: String,
    pub status: TunnelStatus,
    /// Pid of a prior live tunnel that was stopped before this one started.
    pub replaced: Option<i32>,
    pub log_path: PathBuf,
    pub warnings: Vec<String>,
}

/// Start (or restart) the tunnel for one service. Any prior recorded tunnel is
/// stopped first so exactly one tunnel per service survives.
pub fn start_tunnel(ctx: &RunContext, service: &ServiceSpec, hostname: &str) -> TunnelOutcome {
    let store = TunnelStore::new(&ctx.log_root);
    let mut warnings = Vec::new();
    let mut replaced = None;

    if let Some(prior) = store.load(&service.name, &mut warnings) {
        match process::liveness(prior.pid as pid_t) {
            Liveness::Alive => {
                stop_pid(prior.pid, &mut warnings);
                replaced = Some(prior.pid);
            }
            Liveness::Gone => {}
            Liveness::Unknown { errno } => {
                warnings.push(format!(
                    "Could not determine state of prior tunnel pid {} (errno {errno}); \
                     starting a replacement anyway.",
                    prior.pid
                ));
            }
        }
        store.remove(&service.name);
    }

    let binary = match &ctx.tunnel_binary {
        Some(binary) => binary.clone(),
        None => {
            return TunnelOutcome {
                service: service.name.clone(),
                status: TunnelStatus::Failed {
                    reason: "tunnel binary not found on PATH".to_string(),
                },
                replaced,
                log_path: store.log_path(&service.name),
                warnings,
            };
        }
    };

    let log_path = store.log_path(&service.name);
    let status = spawn_tunnel(&binary, service.port, hostname, &log_path).and_then(|pid| {
        store
            .persist(&service.name, pid)
            .map_err(|err| format!("tunnel started (pid {pid}) but pid file write failed: {err}"))?;
        Ok(pid)
    });

    let status = match status {
        Ok(pid) => TunnelStatus::Started { pid },
        Err(reason) => TunnelStatus::Failed { reason },
    };

    TunnelOutcome {
        service: service.name.clone(),
        status,
        replaced,
        log_path,
        warnings,
    }
}

fn spawn_tunnel(
    binary: &Path,
    port: u16,
    hostname: &str,
    log_path: &Path,
) -> Result<u32, String> {
    let log = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .map_err(|err| format!("failed to open {}: {err}", log_path.display()))?;
    let log_err = log
        .try_clone()
        .map_err(|err| format!("failed to clone log handle: {err}"))?;

    let child = Command::new(binary)
        .arg("tunnel")
        .arg("--url")
        .arg(format!("http://127.0.0.1:{port}"))
        .arg("--hostname")
        .arg(hostname)
        .stdin(Stdio::null())
        .stdout(Stdio::from(log))
        .stderr(Stdio::from(log_err))
        .spawn()
        .map_err(|err| format!("failed to spawn {}: {err}", binary.display()))?;

    Ok(child.id())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownStatus {
    /// The recorded process was signaled and exited.
    Stopped,
    /// No live process was behind the record; the stale file was cleared.
    AlreadyGone,
}

#[derive(Debug)]
pub struct TunnelShutdownOutcome {
    pub service: String,
    pub pid: i32,
    pub status: ShutdownStatus,
    pub warnings: Vec<String>,
}

/// Stop the recorded tunnel for a service, removing its pid file either way.
pub fn stop_tunnel(store: &TunnelStore, service: &str) -> Option<TunnelShutdownOutcome> {
    let mut warnings = Vec::new();
    let handle = store.load(service, &mut warnings)?;

    let status = match process::liveness(handle.pid as pid_t) {
        Liveness::Alive => {
            stop_pid(handle.pid, &mut warnings);
            ShutdownStatus::Stopped
        }
        _ => ShutdownStatus::AlreadyGone,
    };
    store.remove(service);

    Some(TunnelShutdownOutcome {
        service: service.to_string(),
        pid: handle.pid,
        status,
        warnings,
    })
}

/// SIGTERM, wait out the grace period, then SIGKILL if it is still running.
fn stop_pid(pid: i32, warnings: &mut Vec<String>) {
    match process::send_signal(pid as pid_t, libc::SIGTERM) {
        Ok(true) => {
            if !process::wait_for_exit(pid as pid_t, STOP_GRACE) {
                if let Err(err) = process::send_signal(pid as pid_t, libc::SIGKILL) {
                    warnings.push(format!("Failed to SIGKILL tunnel pid {pid}: {err}"));
                } else {
                    process::wait_for_exit(pid as pid_t, STOP_GRACE);
                }
            }
        }
        Ok(false) => {}
        Err(err) => warnings.push(format!("Failed to SIGTERM tunnel pid {pid}: {err}")),
    }
}
