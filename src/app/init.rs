use std::path::PathBuf;

use crate::Result;
use crate::cli::InitArgs;
use crate::core::operations;
use crate::core::options::InitOptions;

use super::common::{config_source, emit_diagnostics};

pub fn handle_init(args: InitArgs, config_override: Option<&PathBuf>) -> Result<()> {
    let options = InitOptions {
        force: args.force,
        project_name: args.project_name.clone(),
        output_path: args.output.clone(),
        config_hint: config_source(config_override),
    };

    let output = operations::init(options, None)?;
    emit_diagnostics(&output.diagnostics);

    let outcome = output.value;
    println!("✔ Created stackup configuration.");
    println!("  config → {}", outcome.config_path.display());
    println!("  state  → {}", outcome.state_root.display());
    println!();
    println!("Next steps:");
    println!("  • Declare your services as [[services]] entries, dependencies first.");
    println!("  • Run `stackup up` to bring the stack online.");

    Ok(())
}
