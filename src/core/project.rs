use std::ffi::OsStr;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use crate::config::{PortConflict, ProjectConfig};
use crate::error::{Error, Result};

use super::diagnostics::{Diagnostic, Severity};
use super::options::{ConfigLoadOptions, ConfigSource, InitOptions};

/// Result of loading a project configuration.
#[derive(Debug)]
pub struct ProjectLoad {
    pub config: ProjectConfig,
    pub diagnostics: Vec<Diagnostic>,
}

pub fn preferred_init_target(options: &InitOptions) -> PathBuf {
    match (&options.output_path, &options.config_hint) {
        (Some(path), _) => path.clone(),
        (None, ConfigSource::Explicit(path)) => path.clone(),
        (None, ConfigSource::Discover) => PathBuf::from("stackup.toml"),
    }
}

pub fn load_project(options: &ConfigLoadOptions) -> Result<ProjectLoad> {
    let path = resolve_config_path(&options.source, options.search_root.as_ref())?;
    let config = crate::config::load_project_config(&path)?;
    let diagnostics = config
        .warnings
        .iter()
        .map(|warning| Diagnostic::new(Severity::Warning, warning).with_path(path.clone()))
        .collect();
    Ok(ProjectLoad {
        config,
        diagnostics,
    })
}

pub fn default_project_name(target_path: &Path) -> String {
    if let Some(parent) = target_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if let Some(name) = parent.file_name().and_then(OsStr::to_str) {
            if !name.is_empty() {
                return name.to_string();
            }
        }
    }

    std::env::current_dir()
        .ok()
        .and_then(|path| {
            path.file_name()
                .and_then(OsStr::to_str)
                .map(ToString::to_string)
        })
        .unwrap_or_else(|| "stackup-project".to_string())
}

pub fn default_config_contents(project_name: &str) -> String {
    format!(
        r#"# Stackup project configuration
version = "0.1.0"

[project]
name = "{project_name}"

[run]
# max_readiness_attempts = 30
# readiness_interval_secs = 1
# ready_grace_secs = 2
# port_kill_list = [5173, 8025]
# launcher = "terminal"  # or "detached"

# [database]
# host = "127.0.0.1"
# port = 5432
# compose_dirs = ["infra/postgres"]

# [tunnel]
# binary = "cloudflared"

# Services start in declaration order. Put services that others depend on
# first.
[[services]]
name = "api"
port = 3001
command = "npm run dev"
# group = "backend"
# workdir = "services/api"
# public_hostname = "api.example.dev"

#   [services.env]
#   PORT = "3001"
"#
    )
}

pub fn resolve_config_path(
    source: &ConfigSource,
    search_root: Option<&PathBuf>,
) -> Result<PathBuf> {
    match source {
        ConfigSource::Explicit(path) => {
            if path.is_file() {
                Ok(path.clone())
            } else {
                Err(Error::ExplicitConfigMissing { path: path.clone() })
            }
        }
        ConfigSource::Discover => {
            let cwd = match search_root {
                Some(root) => root.clone(),
                None => current_dir()?,
            };
            discover_config(&cwd).ok_or_else(|| Error::ConfigDiscoveryFailed { search_root: cwd })
        }
    }
}

fn current_dir() -> Result<PathBuf> {
    std::env::current_dir().map_err(|source| Error::WorkingDirectoryUnavailable { source })
}

fn discover_config(start: &Path) -> Option<PathBuf> {
    let mut cursor = Some(start.to_path_buf());
    while let Some(dir) = cursor {
        let candidate = dir.join("stackup.toml");
        if candidate.is_file() {
            return Some(candidate);
        }
        cursor = dir.parent().map(Path::to_path_buf);
    }
    None
}

pub fn format_config_warnings(warnings: &[Diagnostic]) -> Option<String> {
    let relevant: Vec<&Diagnostic> = warnings
        .iter()
        .filter(|diag| matches!(diag.severity, Severity::Warning))
        .collect();
    if relevant.is_empty() {
        return None;
    }

    let count = relevant.len();
    let suffix = if count == 1 { "" } else { "s" };
    let mut buf = String::new();
    writeln!(
        buf,
        "Found {count} warning{suffix} while parsing configuration:"
    )
    .unwrap();
    for warning in &relevant {
        writeln!(buf, "  • {}", warning.message).unwrap();
    }
    buf.push('\n');
    Some(buf)
}

pub fn port_conflicts(conflicts: &[PortConflict]) -> Vec<Diagnostic> {
    conflicts
        .iter()
        .map(|conflict| {
            let message = format!(
                "Port {} is declared by services: {}. The later service will find its port \
                 occupied by the earlier one.",
                conflict.port,
                conflict.service_names.join(", ")
            );
            Diagnostic::new(Severity::Warning, message)
        })
        .collect()
}
