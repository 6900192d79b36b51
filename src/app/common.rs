use std::path::PathBuf;

use crate::core::diagnostics::{Diagnostic, Severity};
use crate::core::options::{ConfigLoadOptions, ConfigSource};
use crate::error::{Error, Result};

pub fn config_source(config_override: Option<&PathBuf>) -> ConfigSource {
    match config_override {
        Some(path) => ConfigSource::Explicit(path.clone()),
        None => ConfigSource::Discover,
    }
}

pub fn config_load_options(
    config_override: Option<&PathBuf>,
    skip_discovery: bool,
    command: &'static str,
) -> Result<ConfigLoadOptions> {
    if skip_discovery && config_override.is_none() {
        return Err(Error::SkipDiscoveryRequiresConfig { command });
    }

    Ok(match config_override {
        Some(path) => ConfigLoadOptions::explicit(path.clone()),
        None => ConfigLoadOptions::discover(),
    })
}

pub fn split_config_warnings(diagnostics: &[Diagnostic]) -> (Vec<Diagnostic>, Vec<Diagnostic>) {
    let mut config = Vec::new();
    let mut rest = Vec::new();
    for diagnostic in diagnostics {
        if matches!(diagnostic.severity, Severity::Warning) && diagnostic.path.is_some() {
            config.push(diagnostic.clone());
        } else {
            rest.push(diagnostic.clone());
        }
    }
    (config, rest)
}

pub fn emit_diagnostics(diagnostics: &[Diagnostic]) {
    for diagnostic in diagnostics {
        match diagnostic.severity {
            Severity::Warning => {
                eprintln!("Warning: {}", diagnostic.message);
                if let Some(help) = &diagnostic.help {
                    eprintln!("         {help}");
                }
            }
            Severity::Info => {
                println!("{}", diagnostic.message);
                if let Some(help) = &diagnostic.help {
                    println!("{help}");
                }
            }
            Severity::Error => {
                eprintln!("Error: {}", diagnostic.message);
                if let Some(help) = &diagnostic.help {
                    eprintln!("       {help}");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skip_discovery_requires_explicit_config() {
        let err = config_load_options(None, true, "status").unwrap_err();
        match err {
            Error::SkipDiscoveryRequiresConfig { command } => {
                assert_eq!(command, "status");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn explicit_override_is_honored() {
        let path = PathBuf::from("/tmp/stackup.toml");
        let options = config_load_options(Some(&path), true, "up").expect("options");
        match options.source {
            ConfigSource::Explicit(resolved) => assert_eq!(resolved, path),
            other => panic!("unexpected source: {other:?}"),
        }
    }

    #[test]
    fn config_warnings_are_split_by_path_presence() {
        let with_path = Diagnostic::new(Severity::Warning, "unknown field")
            .with_path(PathBuf::from("stackup.toml"));
        let without_path = Diagnostic::new(Severity::Warning, "port still occupied");
        let info = Diagnostic::new(Severity::Info, "database ready");

        let (config, rest) =
            split_config_warnings(&[with_path.clone(), without_path.clone(), info.clone()]);
        assert_eq!(config, vec![with_path]);
        assert_eq!(rest, vec![without_path, info]);
    }
}
