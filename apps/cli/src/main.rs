//! Gazette CLI: parallel research digest generator.
//!
//! Queries every configured research source concurrently, merges what comes
//! back into one deduplicated newsletter, and writes it out as HTML, text
//! and/or JSON.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    // API keys may live in a local .env file
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
