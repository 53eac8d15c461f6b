//! census CLI: undergraduate-institution census for a cohort list.
//!
//! Looks up each student's undergraduate school through a web-search
//! language model, merges retry passes, and counts students per school.

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
