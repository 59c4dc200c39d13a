//! Thin diagnostic CLI: parse an overlay log, run it through the analyzer
//! and validator, and print the result as JSON. Not a product frontend —
//! just enough surface to exercise the library from a terminal.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber;

#[derive(Parser)]
#[command(name = "linuxbench-cli", version, about = "Frametime log analysis")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Parse and analyze a single overlay CSV log.
    Analyze {
        /// Path to the MangoHud-style CSV log.
        log_path: PathBuf,

        /// Report FPS-target evaluation against these targets.
        #[arg(long, value_delimiter = ',', default_value = "60,120,144")]
        targets: Vec<u32>,
    },
    /// Print the detected system fingerprint.
    SystemInfo,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Analyze { log_path, targets } => {
            let log = linuxbench_core::parser::parse_log_file(&log_path)?;
            let validation = linuxbench_core::validator::validate(&log, None);
            let metrics = linuxbench_core::analyzer::analyze(&log)?;
            let target_report = linuxbench_core::analyzer::evaluate_fps_targets(&metrics, &targets);

            let output = serde_json::json!({
                "validation": validation,
                "metrics": metrics,
                "fps_targets": target_report,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Command::SystemInfo => {
            let info = linuxbench_core::system_info::gather_system_info();
            println!("{}", serde_json::to_string_pretty(&info)?);
        }
    }

    Ok(())
}
