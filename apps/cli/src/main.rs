//! SiteAdvisor CLI: structural content research for a seed topic.
//!
//! Plans candidate search terms, looks up ranking pages, analyzes their
//! structure and prints a content recommendation as JSON.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
