use std::process::ExitCode;

use clap::{CommandFactory, Parser, error::ErrorKind};

use stackup::app::{self, handle_down, handle_init, handle_status, handle_up};
use stackup::cli::{Cli, Commands};

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::from(64),
            };
        }
    };

    let Cli { config, command } = cli;

    let command = match command {
        Some(cmd) => cmd,
        None => {
            let mut command = Cli::command();
            let _ = command.print_help();
            println!();
            return ExitCode::from(64);
        }
    };

    let exit = match command {
        Commands::Init(args) => handle_init(args, config.as_ref()),
        Commands::Up(args) => handle_up(args, config.as_ref()),
        Commands::Down(args) => handle_down(args, config.as_ref()),
        Commands::Status(args) => handle_status(args, config.as_ref()),
    };

    match exit {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err}");
            app::error::exit_code(&err)
        }
    }
}
