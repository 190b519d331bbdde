//! Parambridge CLI
//!
//! Command-line interface for inspecting the native parameters a layer tree
//! exposes.

use anyhow::Context;
use clap::Parser;
use env_logger::Env;
use log::info;

use parambridge::cli::{commands, Cli, Commands};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(default_filter)).init();

    info!("Parambridge v{}", env!("CARGO_PKG_VERSION"));

    handle_command(cli.command)
}

fn handle_command(cmd: Commands) -> anyhow::Result<()> {
    match cmd {
        Commands::Inspect {
            blueprint,
            prefix,
            no_recurse,
            keep_duplicates,
        } => {
            let lines = commands::inspect(&blueprint, &prefix, !no_recurse, !keep_duplicates)
                .with_context(|| format!("inspecting {}", blueprint.display()))?;
            for line in lines {
                println!("{}", line);
            }
        }
        Commands::Fingerprint { blueprint } => {
            let fingerprint = commands::fingerprint(&blueprint)
                .with_context(|| format!("fingerprinting {}", blueprint.display()))?;
            println!("{}", fingerprint);
        }
        Commands::Export { blueprint, output } => {
            let state_file = commands::export(&blueprint, &output)
                .with_context(|| format!("exporting {}", blueprint.display()))?;
            println!(
                "Exported {} parameters to {}",
                state_file.state.len(),
                output.display()
            );
        }
        Commands::Load {
            blueprint,
            state,
            strict,
        } => {
            let report = commands::load(&blueprint, &state, strict)
                .with_context(|| format!("loading {}", state.display()))?;
            println!("Loaded {} parameters", report.loaded.len());
            for key in &report.missing_keys {
                println!("  missing: {}", key);
            }
            for key in &report.unexpected_keys {
                println!("  unexpected: {}", key);
            }
        }
    }
    Ok(())
}
