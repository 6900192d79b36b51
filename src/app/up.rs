use std::path::PathBuf;

use crate::Result;
use crate::cli::UpArgs;
use crate::core::diagnostics::Severity;
use crate::core::events::Event;
use crate::core::operations;
use crate::core::options::UpOptions;
use crate::core::outcome::UpOutcome;
use crate::core::project::format_config_warnings;

use super::common::{config_load_options, emit_diagnostics, split_config_warnings};

pub fn handle_up(args: UpArgs, config_override: Option<&PathBuf>) -> Result<()> {
    let options = UpOptions {
        config: config_load_options(config_override, args.skip_discovery, "up")?,
    };

    let output = operations::up(options, None)?;

    let (config_warnings, other) = split_config_warnings(&output.diagnostics);
    if let Some(message) = format_config_warnings(&config_warnings) {
        eprint!("{message}");
    }
    emit_diagnostics(&other);

    render_up(&output.value, &output.events);

    Ok(())
}

fn render_up(outcome: &UpOutcome, events: &[Event]) {
    for event in events {
        match event {
            Event::PortReclaimed { port, terminated } => {
                if *terminated > 0 {
                    println!("→ port {port}: freed ({terminated} process(es) terminated).");
                } else {
                    println!("→ port {port}: already free.");
                }
            }
            Event::PortStillOccupied { port } => {
                eprintln!("Warning: port {port} is still occupied after reclaim.");
            }
            Event::DependencyBootstrap { dir, status } => {
                println!("→ deps {}: {}.", dir.display(), status.describe());
            }
            Event::ServiceLaunched { service, method } => {
                println!("→ {service}: launched in a {}.", method.describe());
            }
            Event::ServiceReady {
                service,
                port,
                attempts,
            } => {
                println!("→ {service}: ready on port {port} (attempt {attempts}).");
            }
            Event::ServiceReadinessTimedOut {
                service,
                port,
                attempts,
            } => {
                eprintln!(
                    "Warning: {service} never opened port {port} ({attempts} attempts); \
                     continuing."
                );
            }
            Event::TunnelReplaced { service, old_pid } => {
                println!("→ {service}: replaced prior tunnel (pid {old_pid}).");
            }
            Event::TunnelStarted {
                service,
                pid,
                hostname,
            } => {
                println!("→ {service}: tunnel up for https://{hostname} (pid {pid}).");
            }
            Event::Message { severity, text } => match severity {
                Severity::Info => println!("{text}"),
                Severity::Warning => eprintln!("Warning: {text}"),
                Severity::Error => eprintln!("Error: {text}"),
            },
            _ => {}
        }
    }

    println!();
    print_report(outcome);
    println!();
    println!("Logs: {}", outcome.log_root.display());
}

fn print_report(outcome: &UpOutcome) {
    let name_width = outcome
        .report
        .rows
        .iter()
        .map(|row| row.service.len())
        .max()
        .unwrap_or(0)
        .max("SERVICE".len());
    let local_width = outcome
        .report
        .rows
        .iter()
        .map(|row| row.local.len())
        .max()
        .unwrap_or(0)
        .max("LOCAL".len());
    let lan_width = outcome
        .report
        .rows
        .iter()
        .map(|row| row.lan.len())
        .max()
        .unwrap_or(0)
        .max("LAN".len());

    println!(
        "{:<name_width$}  {:<local_width$}  {:<lan_width$}  {}",
        "SERVICE", "LOCAL", "LAN", "PUBLIC"
    );
    for row in &outcome.report.rows {
        println!(
            "{:<name_width$}  {:<local_width$}  {:<lan_width$}  {}",
            row.service,
            row.local,
            row.lan,
            row.public.as_deref().unwrap_or("-")
        );
    }
}
