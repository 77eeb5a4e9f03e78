// main.rs
mod ai_provider;
mod cache;
mod cli;
mod config;
mod core;
mod derivation;
mod generator;
mod scoring;

use clap::Parser;
use colored::*;
use tracing_subscriber::EnvFilter;

use cli::Args;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    if let Err(e) = cli::run(args).await {
        eprintln!("{} {}", "Error:".red(), e);
        std::process::exit(1);
    }
}
