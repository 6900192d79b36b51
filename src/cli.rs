use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Top-level CLI definition for the `stackup` tool.
#[derive(Debug, Parser)]
#[command(
    name = "stackup",
    version,
    about = "Best-effort bring-up for local multi-service development stacks.",
    long_about = "Stackup reads a stackup.toml, frees the ports it needs, starts backing \
                  dependencies, then launches each service in declaration order, waiting for \
                  its port before moving on. Failures are reported and the run continues."
)]
pub struct Cli {
    /// Path to an explicit configuration file. Defaults to searching for `stackup.toml`.
    #[arg(
        global = true,
        short,
        long = "config",
        value_name = "PATH",
        help = "Override auto-discovery and load configuration from PATH. Pair with --skip-discovery to disable filesystem walking."
    )]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Scaffold a new stackup.toml in the current directory.
    Init(InitArgs),
    /// Bring the whole stack online: ports, dependencies, services, tunnels.
    Up(UpArgs),
    /// Stop the tunnel processes recorded by a previous `up`.
    Down(DownArgs),
    /// Report which service ports are listening and which tunnels are running.
    Status(StatusArgs),
}

#[derive(Debug, Args, Default)]
pub struct InitArgs {
    /// Overwrite an existing configuration file.
    #[arg(long, help = "Replace an existing stackup.toml instead of refusing.")]
    pub force: bool,

    /// Project name recorded in the generated configuration.
    #[arg(
        long,
        value_name = "NAME",
        help = "Project name for the generated config (defaults to the directory name)."
    )]
    pub project_name: Option<String>,

    /// Where to write the configuration file.
    #[arg(
        long,
        value_name = "PATH",
        help = "Write the configuration to PATH instead of ./stackup.toml."
    )]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Args, Default)]
pub struct UpArgs {
    /// Only use the explicit --config path instead of searching parent directories.
    #[arg(
        long,
        help = "Skip config discovery; requires --config <PATH> (e.g. --config ./stackup.toml)."
    )]
    pub skip_discovery: bool,
}

#[derive(Debug, Args, Default)]
pub struct DownArgs {
    /// Only use the explicit --config path instead of searching parent directories.
    #[arg(
        long,
        help = "Skip config discovery; requires --config <PATH> (e.g. --config ./stackup.toml)."
    )]
    pub skip_discovery: bool,
}

#[derive(Debug, Args, Default)]
pub struct StatusArgs {
    /// Only use the explicit --config path instead of searching parent directories.
    #[arg(
        long,
        help = "Skip config discovery; requires --config <PATH> (e.g. --config ./stackup.toml)."
    )]
    pub skip_discovery: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_config_flag_is_accepted_after_subcommand() {
        let cli = Cli::try_parse_from(["stackup", "up", "--config", "custom.toml"])
            .expect("parse");
        assert_eq!(cli.config, Some(PathBuf::from("custom.toml")));
        assert!(matches!(cli.command, Some(Commands::Up(_))));
    }

    #[test]
    fn skip_discovery_flag_parses() {
        let cli = Cli::try_parse_from(["stackup", "status", "--skip-discovery"]).expect("parse");
        match cli.command {
            Some(Commands::Status(args)) => assert!(args.skip_discovery),
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
