//! CLI Module
//!
//! Command-line interface for inspecting layer tree blueprints.

pub mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Parambridge - inspect the native parameters a layer tree exposes
#[derive(Parser, Debug)]
#[command(name = "parambridge")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List the flattened native parameters of a blueprint
    #[command(name = "inspect")]
    Inspect {
        /// Path to the blueprint JSON
        blueprint: PathBuf,

        /// Prefix applied to every parameter name
        #[arg(short, long, default_value = "")]
        prefix: String,

        /// Only list the root layer's own parameters
        #[arg(long)]
        no_recurse: bool,

        /// Report shared parameters once per path
        #[arg(long)]
        keep_duplicates: bool,
    },

    /// Print the exposure fingerprint of a blueprint
    #[command(name = "fingerprint")]
    Fingerprint {
        /// Path to the blueprint JSON
        blueprint: PathBuf,
    },

    /// Write the state dict of a blueprint to a file
    #[command(name = "export")]
    Export {
        /// Path to the blueprint JSON
        blueprint: PathBuf,

        /// Output state file
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Load a state file into a blueprint
    #[command(name = "load")]
    Load {
        /// Path to the blueprint JSON
        blueprint: PathBuf,

        /// State file written by `export`
        state: PathBuf,

        /// Fail on missing or unexpected keys
        #[arg(long)]
        strict: bool,
    },
}
