use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use log::warn;

use pipeflow::commands;
use pipeflow::config::CONFIG;
use pipeflow::logging;

#[derive(Parser, Debug)]
#[command(name = "pipeflow", version, about = "Regression pipeline runner")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Runs the pipeline up to a step (all steps by default).
    Run {
        #[arg(long, default_value = ".")]
        root: PathBuf,
        #[arg(long)]
        step: Option<String>,
        #[arg(long)]
        profile: Option<String>,
    },
    /// Lists the artifacts of a step with their hashes.
    Inspect {
        #[arg(long, default_value = ".")]
        root: PathBuf,
        #[arg(long)]
        step: String,
    },
    /// Loads a saved model and predicts on a JSON input file.
    Predict {
        #[arg(long)]
        model: PathBuf,
        #[arg(long)]
        input: PathBuf,
    },
    /// Prints a tracking run as JSON.
    ShowRun {
        #[arg(long)]
        run_id: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    if let Err(e) = logging::init(&CONFIG.log_level) {
        eprintln!("log subscriber already installed: {e}");
    }

    match cli.command {
        Commands::Run { root, step, profile } => {
            let report = commands::run_pipeline(&root, step.as_deref(), profile.as_deref(), &CONFIG)?;
            print!("{}", commands::summarize(&report));
        }
        Commands::Inspect { root, step } => {
            let (artifacts, card) = commands::inspect_step(&root, &step)?;
            if artifacts.is_empty() {
                warn!("step '{step}' produced no files");
            }
            for a in &artifacts {
                println!("{}  {}", a.hash, a.relative_path);
            }
            println!("card: {}", card.display());
        }
        Commands::Predict { model, input } => {
            let predictions = commands::predict(&model, &input)?;
            println!("{}", serde_json::to_string_pretty(&predictions)?);
        }
        Commands::ShowRun { run_id } => {
            let run = commands::show_run(&run_id, &CONFIG)?;
            println!("{}", serde_json::to_string_pretty(&run)?);
        }
    }
    Ok(())
}
