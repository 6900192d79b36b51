use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::Error;

pub const DEFAULT_READINESS_ATTEMPTS: u32 = 30;
pub const DEFAULT_READINESS_INTERVAL_SECS: u64 = 1;
pub const DEFAULT_READY_GRACE_SECS: u64 = 2;
pub const DEFAULT_TUNNEL_BINARY: &str = "cloudflared";

/// Fully validated project configuration. Read-only for the lifetime of a run.
#[derive(Debug, Clone)]
pub struct ProjectConfig {
    pub file_path: PathBuf,
    pub version: String,
    pub project_name: String,
    /// Ordered: declaration order is startup order. Later services may depend
    /// on earlier ones being reachable; the sequence IS the dependency
    /// declaration.
    pub services: Vec<ServiceSpec>,
    pub run: RunSettings,
    pub database: Option<DatabaseConfig>,
    pub tunnel: TunnelConfig,
    pub state_root: PathBuf,
    pub warnings: Vec<String>,
}

impl ProjectConfig {
    /// Ports declared by more than one service.
    pub fn port_conflicts(&self) -> Vec<PortConflict> {
        let mut map: HashMap<u16, Vec<&ServiceSpec>> = HashMap::new();
        for service in &self.services {
            map.entry(service.port).or_default().push(service);
        }

        let mut conflicts: Vec<PortConflict> = map
            .into_iter()
            .filter(|(_, services)| services.len() > 1)
            .map(|(port, services)| PortConflict {
                port,
                service_names: services.iter().map(|s| s.name.clone()).collect(),
            })
            .collect();
        conflicts.sort_by_key(|conflict| conflict.port);
        conflicts
    }
}

/// A single backend service to bring up.
#[derive(Debug, Clone)]
pub struct ServiceSpec {
    pub name: String,
    pub group: Option<String>,
    pub port: u16,
    pub command: String,
    pub workdir: PathBuf,
    pub env: BTreeMap<String, String>,
    /// Public hostname for the tunnel. No tunnel is started when absent.
    pub public_hostname: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RunSettings {
    pub max_readiness_attempts: u32,
    pub readiness_interval_secs: u64,
    pub ready_grace_secs: u64,
    /// Ports force-freed before any service is touched.
    pub port_kill_list: Vec<u16>,
    pub launcher: LauncherKind,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            max_readiness_attempts: DEFAULT_READINESS_ATTEMPTS,
            readiness_interval_secs: DEFAULT_READINESS_INTERVAL_SECS,
            ready_grace_secs: DEFAULT_READY_GRACE_SECS,
            port_kill_list: Vec::new(),
            launcher: LauncherKind::Terminal,
        }
    }
}

/// How service start commands get their own execution context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LauncherKind {
    /// Open a new terminal window per service (falls back to detached).
    Terminal,
    /// Detached background spawn with output captured to a log file.
    Detached,
}

impl LauncherKind {
    fn parse(input: Option<String>) -> std::result::Result<Self, String> {
        match input.as_deref() {
            None | Some("terminal") => Ok(Self::Terminal),
            Some("detached") => Ok(Self::Detached),
            Some(other) => Err(format!(
                "Unknown launcher `{other}`. Supported values: terminal, detached"
            )),
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            LauncherKind::Terminal => "terminal",
            LauncherKind::Detached => "detached",
        }
    }
}

/// Backing database reachable over TCP, brought up via a compose tool.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    /// Directories containing compose manifests, relative to the config file.
    pub compose_dirs: Vec<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct TunnelConfig {
    /// Tunnel binary name or path; resolved on PATH at run time.
    pub binary: String,
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            binary: DEFAULT_TUNNEL_BINARY.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PortConflict {
    pub port: u16,
    pub service_names: Vec<String>,
}

/// State root lives next to the configuration file.
pub fn default_state_root(config_path: &Path) -> PathBuf {
    config_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".stackup")
}

pub fn load_project_config(path: &Path) -> Result<ProjectConfig, Error> {
    let contents = fs::read_to_string(path).map_err(|source| Error::ReadConfig {
        path: path.to_path_buf(),
        source,
    })?;

    let value: toml::Value = toml::from_str(&contents).map_err(|source| Error::ParseConfig {
        path: path.to_path_buf(),
        source,
    })?;

    let mut warnings = detect_unknown_fields(&value);

    let raw = RawConfig::deserialize(value).map_err(|source| Error::ParseConfig {
        path: path.to_path_buf(),
        source,
    })?;

    raw.into_validated(path, &mut warnings)
}

fn invalid_config(path: &Path, message: impl Into<String>) -> Error {
    Error::InvalidConfig {
        path: path.to_path_buf(),
        message: message.into(),
    }
}

fn detect_unknown_fields(value: &toml::Value) -> Vec<String> {
    let mut warnings = Vec::new();
    let allowed_root = ["version", "project", "run", "database", "tunnel", "services"];

    if let toml::Value::Table(table) = value {
        warn_table(table, &allowed_root, "root", &mut warnings);

        if let Some(project) = table.get("project") {
            if let toml::Value::Table(project_table) = project {
                warn_table(project_table, &["name"], "[project]", &mut warnings);
            } else {
                warnings.push("Expected [project] to be a table.".to_string());
            }
        }

        if let Some(run) = table.get("run") {
            if let toml::Value::Table(run_table) = run {
                warn_table(
                    run_table,
                    &[
                        "max_readiness_attempts",
                        "readiness_interval_secs",
                        "ready_grace_secs",
                        "port_kill_list",
                        "launcher",
                    ],
                    "[run]",
                    &mut warnings,
                );
            } else {
                warnings.push("Expected [run] to be a table.".to_string());
            }
        }

        if let Some(database) = table.get("database") {
            if let toml::Value::Table(database_table) = database {
                warn_table(
                    database_table,
                    &["host", "port", "compose_dirs"],
                    "[database]",
                    &mut warnings,
                );
            } else {
                warnings.push("Expected [database] to be a table.".to_string());
            }
        }

        if let Some(tunnel) = table.get("tunnel") {
            if let toml::Value::Table(tunnel_table) = tunnel {
                warn_table(tunnel_table, &["binary"], "[tunnel]", &mut warnings);
            } else {
                warnings.push("Expected [tunnel] to be a table.".to_string());
            }
        }

        if let Some(services) = table.get("services") {
            if let toml::Value::Array(entries) = services {
                for (idx, entry) in entries.iter().enumerate() {
                    if let toml::Value::Table(service_table) = entry {
                        warn_table(
                            service_table,
                            &[
                                "name",
                                "group",
                                "port",
                                "command",
                                "workdir",
                                "env",
                                "public_hostname",
                            ],
                            &format!("[[services]] #{idx}"),
                            &mut warnings,
                        );
                    } else {
                        warnings.push(format!("[[services]] entry #{idx} must be a table."));
                    }
                }
            } else {
                warnings.push("`services` must be an array of tables.".to_string());
            }
        }
    }

    warnings
}

fn warn_table(
    table: &toml::map::Map<String, toml::Value>,
    allowed: &[&str],
    context: &str,
    warnings: &mut Vec<String>,
) {
    for key in table.keys() {
        if !allowed.contains(&key.as_str()) {
            warnings.push(format!(
                "Unknown field `{key}` at {context}; this value will be ignored."
            ));
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    version: Option<String>,
    project: Option<RawProject>,
    #[serde(default)]
    run: Option<RawRun>,
    #[serde(default)]
    database: Option<RawDatabase>,
    #[serde(default)]
    tunnel: Option<RawTunnel>,
    #[serde(default)]
    services: Vec<RawService>,
}

#[derive(Debug, Deserialize)]
struct RawProject {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawRun {
    #[serde(default)]
    max_readiness_attempts: Option<u32>,
    #[serde(default)]
    readiness_interval_secs: Option<u64>,
    #[serde(default)]
    ready_grace_secs: Option<u64>,
    #[serde(default)]
    port_kill_list: Vec<u16>,
    #[serde(default)]
    launcher: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawDatabase {
    host: Option<String>,
    port: Option<u16>,
    #[serde(default)]
    compose_dirs: Vec<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct RawTunnel {
    binary: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawService {
    name: Option<String>,
    #[serde(default)]
    group: Option<String>,
    port: Option<u16>,
    command: Option<String>,
    #[serde(default)]
    workdir: Option<PathBuf>,
    #[serde(default)]
    env: BTreeMap<String, String>,
    #[serde(default)]
    public_hostname: Option<String>,
}

impl RawConfig {
    fn into_validated(
        self,
        path: &Path,
        warnings: &mut Vec<String>,
    ) -> Result<ProjectConfig, Error> {
        let version = self.version.ok_or_else(|| {
            invalid_config(
                path,
                "Missing required top-level field `version`. Example: `version = \"0.1.0\"`.",
            )
        })?;

        if version != "0.1.0" {
            warnings.push(format!(
                "Configuration version `{version}` is not fully supported yet; proceeding anyway."
            ));
        }

        let project = self.project.ok_or_else(|| {
            invalid_config(
                path,
                "Missing required table `[project]`. Example:\n\
                 [project]\n\
                 name = \"acme-dev\"",
            )
        })?;

        let project_name = project.name.ok_or_else(|| {
            invalid_config(
                path,
                "Missing required field `project.name`. Example: `name = \"acme-dev\"`.",
            )
        })?;

        if self.services.is_empty() {
            return Err(invalid_config(
                path,
                "No services declared. Add at least one `[[services]]` entry.",
            ));
        }

        let config_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        let mut services = Vec::with_capacity(self.services.len());
        let mut seen_names: Vec<String> = Vec::new();
        for (idx, raw) in self.services.into_iter().enumerate() {
            let name = raw.name.ok_or_else(|| {
                invalid_config(path, format!("[[services]] entry #{idx} is missing `name`."))
            })?;
            if name.trim().is_empty() {
                return Err(invalid_config(
                    path,
                    format!("[[services]] entry #{idx} has an empty `name`."),
                ));
            }
            if seen_names.contains(&name) {
                return Err(invalid_config(
                    path,
                    format!("Duplicate service name `{name}`. Service names must be unique."),
                ));
            }
            seen_names.push(name.clone());

            let port = raw.port.ok_or_else(|| {
                invalid_config(path, format!("Service `{name}` is missing `port`."))
            })?;
            if port == 0 {
                return Err(invalid_config(
                    path,
                    format!("Service `{name}` declares port 0; a concrete listening port is required."),
                ));
            }

            let command = raw.command.ok_or_else(|| {
                invalid_config(path, format!("Service `{name}` is missing `command`."))
            })?;
            if command.trim().is_empty() {
                return Err(invalid_config(
                    path,
                    format!("Service `{name}` has an empty `command`."),
                ));
            }

            let workdir = match raw.workdir {
                Some(dir) if dir.is_absolute() => dir,
                Some(dir) => config_dir.join(dir),
                None => config_dir.clone(),
            };

            if let Some(hostname) = &raw.public_hostname {
                if hostname.trim().is_empty() {
                    return Err(invalid_config(
                        path,
                        format!("Service `{name}` has an empty `public_hostname`."),
                    ));
                }
            }

            services.push(ServiceSpec {
                name,
                group: raw.group,
                port,
                command,
                workdir,
                env: raw.env,
                public_hostname: raw.public_hostname,
            });
        }

        let mut run = RunSettings::default();
        if let Some(raw_run) = self.run {
            if let Some(attempts) = raw_run.max_readiness_attempts {
                if attempts == 0 {
                    return Err(invalid_config(
                        path,
                        "`run.max_readiness_attempts` must be at least 1.",
                    ));
                }
                run.max_readiness_attempts = attempts;
            }
            if let Some(interval) = raw_run.readiness_interval_secs {
                run.readiness_interval_secs = interval;
            }
            if let Some(grace) = raw_run.ready_grace_secs {
                run.ready_grace_secs = grace;
            }
            run.port_kill_list = raw_run.port_kill_list;
            run.launcher = LauncherKind::parse(raw_run.launcher)
                .map_err(|message| invalid_config(path, message))?;
        }

        let database = match self.database {
            None => None,
            Some(raw_db) => {
                let host = raw_db.host.unwrap_or_else(|| "127.0.0.1".to_string());
                let port = raw_db.port.unwrap_or(5432);
                let compose_dirs = raw_db
                    .compose_dirs
                    .into_iter()
                    .map(|dir| {
                        if dir.is_absolute() {
                            dir
                        } else {
                            config_dir.join(dir)
                        }
                    })
                    .collect();
                Some(DatabaseConfig {
                    host,
                    port,
                    compose_dirs,
                })
            }
        };

        let tunnel = match self.tunnel {
            Some(raw_tunnel) => TunnelConfig {
                binary: raw_tunnel
                    .binary
                    .unwrap_or_else(|| DEFAULT_TUNNEL_BINARY.to_string()),
            },
            None => TunnelConfig::default(),
        };

        let state_root = default_state_root(path);

        Ok(ProjectConfig {
            file_path: path.to_path_buf(),
            version,
            project_name,
            services,
            run,
            database,
            tunnel,
            state_root,
            warnings: std::mem::take(warnings),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn write_config(dir: &Path, contents: &str) -> PathBuf {
        let path = dir.join("stackup.toml");
        fs::write(&path, contents).expect("write config");
        path
    }

    const MINIMAL: &str = r#"
version = "0.1.0"

[project]
name = "demo"

[[services]]
name = "api"
port = 3001
command = "npm run dev"
"#;

    #[test]
    fn minimal_config_parses_with_defaults() {
        let temp = tempdir().expect("temp dir");
        let path = write_config(temp.path(), MINIMAL);

        let config = load_project_config(&path).expect("load config");
        assert_eq!(config.project_name, "demo");
        assert_eq!(config.services.len(), 1);
        assert_eq!(config.services[0].port, 3001);
        assert_eq!(config.services[0].workdir, temp.path());
        assert!(config.services[0].public_hostname.is_none());
        assert_eq!(config.run.max_readiness_attempts, DEFAULT_READINESS_ATTEMPTS);
        assert_eq!(config.run.launcher, LauncherKind::Terminal);
        assert_eq!(config.tunnel.binary, DEFAULT_TUNNEL_BINARY);
        assert!(config.database.is_none());
        assert_eq!(config.state_root, temp.path().join(".stackup"));
        assert!(config.warnings.is_empty());
    }

    #[test]
    fn full_config_parses() {
        let temp = tempdir().expect("temp dir");
        let path = write_config(
            temp.path(),
            r#"
version = "0.1.0"

[project]
name = "acme"

[run]
max_readiness_attempts = 5
readiness_interval_secs = 2
ready_grace_secs = 1
port_kill_list = [5173, 8025]
launcher = "detached"

[database]
host = "127.0.0.1"
port = 5433
compose_dirs = ["infra/postgres"]

[tunnel]
binary = "cloudflared"

[[services]]
name = "upload"
group = "backend"
port = 3009
command = "cargo run"
workdir = "services/upload"
public_hostname = "upload.example.dev"

  [services.env]
  RUST_LOG = "info"
"#,
        );

        let config = load_project_config(&path).expect("load config");
        assert_eq!(config.run.max_readiness_attempts, 5);
        assert_eq!(config.run.port_kill_list, vec![5173, 8025]);
        assert_eq!(config.run.launcher, LauncherKind::Detached);

        let db = config.database.as_ref().expect("database");
        assert_eq!(db.port, 5433);
        assert_eq!(db.compose_dirs, vec![temp.path().join("infra/postgres")]);

        let service = &config.services[0];
        assert_eq!(service.group.as_deref(), Some("backend"));
        assert_eq!(service.workdir, temp.path().join("services/upload"));
        assert_eq!(service.env.get("RUST_LOG").map(String::as_str), Some("info"));
        assert_eq!(
            service.public_hostname.as_deref(),
            Some("upload.example.dev")
        );
    }

    #[test]
    fn unknown_fields_produce_warnings() {
        let temp = tempdir().expect("temp dir");
        let path = write_config(
            temp.path(),
            r#"
version = "0.1.0"
surprise = true

[project]
name = "demo"

[[services]]
name = "api"
port = 3001
command = "npm run dev"
flavor = "extra"
"#,
        );

        let config = load_project_config(&path).expect("load config");
        assert!(
            config
                .warnings
                .iter()
                .any(|warning| warning.contains("`surprise`"))
        );
        assert!(
            config
                .warnings
                .iter()
                .any(|warning| warning.contains("`flavor`"))
        );
    }

    #[test]
    fn missing_version_is_rejected() {
        let temp = tempdir().expect("temp dir");
        let path = write_config(
            temp.path(),
            r#"
[project]
name = "demo"

[[services]]
name = "api"
port = 3001
command = "npm run dev"
"#,
        );

        let err = load_project_config(&path).unwrap_err();
        match err {
            Error::InvalidConfig { message, .. } => {
                assert!(message.contains("version"), "unexpected message: {message}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn duplicate_service_names_are_rejected() {
        let temp = tempdir().expect("temp dir");
        let path = write_config(
            temp.path(),
            r#"
version = "0.1.0"

[project]
name = "demo"

[[services]]
name = "api"
port = 3001
command = "npm run dev"

[[services]]
name = "api"
port = 3002
command = "npm run dev"
"#,
        );

        let err = load_project_config(&path).unwrap_err();
        match err {
            Error::InvalidConfig { message, .. } => {
                assert!(message.contains("Duplicate service name"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn port_conflicts_reports_duplicate_ports() {
        let temp = tempdir().expect("temp dir");
        let path = write_config(
            temp.path(),
            r#"
version = "0.1.0"

[project]
name = "demo"

[[services]]
name = "api"
port = 3001
command = "npm run dev"

[[services]]
name = "worker"
port = 3001
command = "npm run worker"
"#,
        );

        let config = load_project_config(&path).expect("load config");
        let conflicts = config.port_conflicts();
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].port, 3001);
        assert_eq!(conflicts[0].service_names, vec!["api", "worker"]);
    }

    #[test]
    fn unknown_launcher_is_rejected() {
        let temp = tempdir().expect("temp dir");
        let path = write_config(
            temp.path(),
            r#"
version = "0.1.0"

[project]
name = "demo"

[run]
launcher = "screen"

[[services]]
name = "api"
port = 3001
command = "npm run dev"
"#,
        );

        let err = load_project_config(&path).unwrap_err();
        match err {
            Error::InvalidConfig { message, .. } => {
                assert!(message.contains("Unknown launcher"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
