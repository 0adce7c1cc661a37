//! nanoprod - batch nanoAOD production job.
//!
//! The main entry point for the `nanoprod` binary.

use anyhow::Result;
use clap::Parser;

use nanoprod_cli::Cli;
use nanoprod_core::init_logging;

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_format);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(nanoprod_cli::execute(cli))
}
