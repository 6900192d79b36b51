use std::path::PathBuf;

/// Source used when resolving a stackup configuration.
#[derive(Debug, Clone)]
pub enum ConfigSource {
    /// Search for `stackup.toml` by walking up from the current working directory.
    Discover,
    /// Use an explicit path to the configuration file.
    Explicit(PathBuf),
}

/// Parameters for configuration loading.
#[derive(Debug, Clone)]
pub struct ConfigLoadOptions {
    /// Where to source the configuration from.
    pub source: ConfigSource,
    /// Optional override for the discovery root (defaults to the process CWD).
    pub search_root: Option<PathBuf>,
}

impl ConfigLoadOptions {
    /// Convenience constructor for explicit config usage.
    pub fn explicit(path: PathBuf) -> Self {
        Self {
            source: ConfigSource::Explicit(path),
            search_root: None,
        }
    }

    /// Convenience constructor for upward discovery.
    pub fn discover() -> Self {
        Self {
            source: ConfigSource::Discover,
            search_root: None,
        }
    }
}

/// Options accepted by the `init` operation.
#[derive(Debug, Clone)]
pub struct InitOptions {
    /// Whether an existing file should be overwritten.
    pub force: bool,
    /// Optional project name for the generated configuration.
    pub project_name: Option<String>,
    /// Preferred output path for the configuration. When absent the value is
    /// derived from `config_hint`.
    pub output_path: Option<PathBuf>,
    /// Hint from the caller (e.g. `--config`) that influences the default output path.
    pub config_hint: ConfigSource,
}

impl Default for InitOptions {
    fn default() -> Self {
        Self {
            force: false,
            project_name: None,
            output_path: None,
            config_hint: ConfigSource::Discover,
        }
    }
}

/// Options for the `up` operation.
#[derive(Debug, Clone)]
pub struct UpOptions {
    /// Configuration lookup parameters.
    pub config: ConfigLoadOptions,
}

impl Default for UpOptions {
    fn default() -> Self {
        Self {
            config: ConfigLoadOptions::discover(),
        }
    }
}

/// Options for the `down` operation.
#[derive(Debug, Clone)]
pub struct DownOptions {
    /// Configuration lookup parameters.
    pub config: ConfigLoadOptions,
}

impl Default for DownOptions {
    fn default() -> Self {
        Self {
            config: ConfigLoadOptions::discover(),
        }
    }
}

/// Options for the `status` operation.
#[derive(Debug, Clone)]
pub struct StatusOptions {
    /// Configuration lookup parameters.
    pub config: ConfigLoadOptions,
}

impl Default for StatusOptions {
    fn default() -> Self {
        Self {
            config: ConfigLoadOptions::discover(),
        }
    }
}
