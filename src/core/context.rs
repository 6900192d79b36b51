use std::fs;
use std::net::{IpAddr, UdpSocket};
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::config::ProjectConfig;
use crate::error::{Error, Result};

/// Per-run context: prepared state directories plus the external tools that
/// were discovered on this host. Detection happens once per run.
pub struct RunContext {
    pub state_root: PathBuf,
    pub log_root: PathBuf,
    /// Compose tool for dependency bootstrap, when any variant is installed.
    pub compose: Option<ComposeTool>,
    /// Tunnel binary resolved from the configuration, when present on PATH.
    pub tunnel_binary: Option<PathBuf>,
    /// `pg_isready` for the database readiness variant, when installed.
    pub pg_isready: Option<PathBuf>,
}

/// Which declarative-compose variant is available on the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComposeTool {
    /// `docker compose` plugin.
    DockerPlugin,
    /// Standalone `docker-compose` binary.
    DockerComposeBin(PathBuf),
    /// `podman-compose` binary.
    PodmanCompose(PathBuf),
}

impl ComposeTool {
    /// Build the bring-up command for a manifest, ready for args to be appended.
    pub fn up_command(&self, manifest: &Path) -> Command {
        let mut command = match self {
            ComposeTool::DockerPlugin => {
                let mut command = Command::new("docker");
                command.arg("compose");
                command
            }
            ComposeTool::DockerComposeBin(path) => Command::new(path),
            ComposeTool::PodmanCompose(path) => Command::new(path),
        };
        command.arg("-f").arg(manifest).arg("up").arg("-d");
        command
    }

    pub fn describe(&self) -> &'static str {
        match self {
            ComposeTool::DockerPlugin => "docker compose",
            ComposeTool::DockerComposeBin(_) => "docker-compose",
            ComposeTool::PodmanCompose(_) => "podman-compose",
        }
    }
}

pub fn prepare_run_context(project: &ProjectConfig) -> Result<RunContext> {
    let state_root = project.state_root.clone();
    fs::create_dir_all(&state_root).map_err(|source| Error::StateDirUnavailable {
        path: state_root.clone(),
        source,
    })?;

    let log_root = state_root.join("logs");
    fs::create_dir_all(&log_root).map_err(|source| Error::StateDirUnavailable {
        path: log_root.clone(),
        source,
    })?;

    Ok(RunContext {
        state_root,
        log_root,
        compose: detect_compose_tool(),
        tunnel_binary: find_executable(&[&project.tunnel.binary]),
        pg_isready: find_executable(&["pg_isready"]),
    })
}

/// Probe for a compose variant: the `docker compose` plugin first, then the
/// standalone binaries.
pub fn detect_compose_tool() -> Option<ComposeTool> {
    if docker_compose_plugin_available() {
        return Some(ComposeTool::DockerPlugin);
    }

    if let Some(path) = find_executable(&["docker-compose"]) {
        return Some(ComposeTool::DockerComposeBin(path));
    }

    find_executable(&["podman-compose"]).map(ComposeTool::PodmanCompose)
}

fn docker_compose_plugin_available() -> bool {
    if find_executable(&["docker"]).is_none() {
        return false;
    }

    Command::new("docker")
        .arg("compose")
        .arg("version")
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}

/// Locate the first of `candidates` that is a file, either directly or on PATH.
pub fn find_executable(candidates: &[&str]) -> Option<PathBuf> {
    for candidate in candidates {
        let path = Path::new(candidate);
        if path.components().count() > 1 && path.is_file() {
            return Some(path.to_path_buf());
        }
    }

    let path_var = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&path_var) {
        for candidate in candidates {
            let full = dir.join(candidate);
            if full.is_file() {
                return Some(full);
            }
        }
    }
    None
}

/// Best-effort LAN address of this host, used for the run report. Connecting a
/// UDP socket selects the outbound interface without sending a packet.
pub fn detect_lan_ip() -> Option<IpAddr> {
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("192.0.2.1:80").ok()?;
    let addr = socket.local_addr().ok()?;
    if addr.ip().is_unspecified() || addr.ip().is_loopback() {
        None
    } else {
        Some(addr.ip())
    }
}
