use std::path::PathBuf;

use clap::{Parser, Subcommand};
use rolodex::actor::reactor::replay;
use rolodex::common::config::Config;
use rolodex::common::log;

#[derive(Parser)]
#[command(name = "rolodex", about = "Window-switcher synchronization engine")]
struct Cli {
    /// Path to the config file; defaults to ~/.config/rolodex/config.toml.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Replay a recorded event log and print the resulting registry.
    Replay { file: PathBuf },
    /// Parse the config file and report problems.
    CheckConfig,
}

fn main() -> anyhow::Result<()> {
    log::init();
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;
    match cli.command {
        Command::Replay { file } => {
            let snapshot = replay::replay(&file, config)?;
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        }
        Command::CheckConfig => {
            println!("config ok");
        }
    }
    Ok(())
}
