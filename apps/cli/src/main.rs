//! KaggleIngest CLI: turn Kaggle competitions and datasets into
//! token-efficient LLM context.
//!
//! Fetches resource metadata, dataset schema samples, and the top community
//! notebooks, then renders them as TOON, plain text, or Markdown.

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
