use anyhow::Result;
use clap::Parser;
use sbexchange_core::cli::Args;

fn main() -> Result<()> {
    let args = Args::parse();
    sbexchange_core::run_cli(&args)
}
