mod app;
mod catalog;
mod cli;
mod config;
mod http;
mod logging;
mod media;
mod metadata;
mod paths;
mod playlist;
mod transcode;

#[cfg(test)]
mod testing;

use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    let cli = cli::Cli::parse();
    app::run(cli)
}
