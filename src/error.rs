use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(
        "A stackup configuration already exists at {path}. \
         Re-run with --force to overwrite the generated files."
    )]
    AlreadyInitialized { path: PathBuf },
    #[error("Failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to write configuration file at {path}: {source}")]
    WriteConfig {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to read configuration file at {path}: {source}")]
    ReadConfig {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Configuration at {path} could not be parsed: {source}")]
    ParseConfig {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("Configuration at {path} is invalid:\n{message}")]
    InvalidConfig { path: PathBuf, message: String },
    #[error("The configuration path {path} does not exist or is not readable.")]
    ExplicitConfigMissing { path: PathBuf },
    #[error(
        "No stackup configuration found while searching upward from {search_root}. \
         Run `stackup init` first or provide a path with --config."
    )]
    ConfigDiscoveryFailed { search_root: PathBuf },
    #[error(
        "`stackup {command} --skip-discovery` requires an explicit --config path, \
         since upward discovery is disabled."
    )]
    SkipDiscoveryRequiresConfig { command: &'static str },
    #[error("Failed to determine the current working directory: {source}")]
    WorkingDirectoryUnavailable {
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to prepare state directory {path}: {source}")]
    StateDirUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
