mod about;
mod cli;
mod console;
mod engine;
mod launch;
mod logging;
mod model;
mod orchestrator;
mod preferences;
#[cfg(feature = "tui")]
mod tui;

use anyhow::Result;
use clap::Parser;

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();
    let is_headless = args.command.is_some();

    match cli::run(args).await {
        Ok(()) => {
            // Explicitly exit on success so no blocking reader thread keeps the process alive.
            if is_headless {
                std::process::exit(0);
            }
            Ok(())
        }
        Err(e) => Err(e),
    }
}
