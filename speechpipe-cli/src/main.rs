//! speechpipe CLI - corpus statistics and batch inspection

mod cli;
mod config;
mod inspect;
mod norm;
mod stats;

use clap::Parser;
use cli::{Cli, run};
use eyre::Result;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    color_eyre::install()?;

    let (non_blocking, _guard) = tracing_appender::non_blocking(std::io::stderr());

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    run(Cli::parse())
}
