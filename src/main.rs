// AtPort - command/response tool for serial devices
use anyhow::Result;
use atport::cli::{execute_command, Args};
use clap::Parser;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if let Err(e) = execute_command(args).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    Ok(())
}
