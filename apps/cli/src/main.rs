//! LotScout CLI — vehicle-auction lot scraper.
//!
//! Scrapes live-auction lot listings into a local database and re-checks
//! stored lots for buy-now offers.

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
