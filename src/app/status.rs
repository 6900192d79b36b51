use std::path::PathBuf;

use crate::Result;
use crate::cli::StatusArgs;
use crate::core::operations;
use crate::core::options::StatusOptions;
use crate::core::outcome::{StatusOutcome, TunnelState};
use crate::core::project::format_config_warnings;

use super::common::{config_load_options, emit_diagnostics, split_config_warnings};

pub fn handle_status(args: StatusArgs, config_override: Option<&PathBuf>) -> Result<()> {
    let options = StatusOptions {
        config: config_load_options(config_override, args.skip_discovery, "status")?,
    };

    let output = operations::status(options, None)?;

    let (config_warnings, other) = split_config_warnings(&output.diagnostics);
    if let Some(message) = format_config_warnings(&config_warnings) {
        eprint!("{message}");
    }
    emit_diagnostics(&other);

    print_status_table(&output.value);

    Ok(())
}

fn print_status_table(outcome: &StatusOutcome) {
    let name_width = outcome
        .rows
        .iter()
        .map(|row| row.name.len())
        .max()
        .unwrap_or(0)
        .max("SERVICE".len());

    println!("{:<name_width$}  {:>5}  {:<9}  {}", "SERVICE", "PORT", "STATE", "TUNNEL");
    for row in &outcome.rows {
        let state = if row.listening {
            "listening"
        } else {
            "down"
        };
        let tunnel = match row.tunnel {
            TunnelState::Running { pid } => format!("running (pid {pid})"),
            TunnelState::Offline => "offline".to_string(),
        };
        println!(
            "{:<name_width$}  {:>5}  {:<9}  {}",
            row.name, row.port, state, tunnel
        );
    }
}
