use clap::Parser;
use clonetrack::{cli, run, Cli};
use color_eyre::eyre::{Report, Result};

fn main() -> Result<(), Report> {
    // ------------------------------------------------------------------------
    // CLI Setup

    // Parse CLI parameters
    let args = Cli::parse();

    // initialize color_eyre crate for colorized logs
    color_eyre::install()?;

    // Set logging/verbosity level via RUST_LOG
    std::env::set_var("RUST_LOG", args.verbosity.to_string());

    // initialize env_logger crate for logging/verbosity level
    env_logger::init();

    // check which CLI command we're running (update, collapse, summary)
    match args.command {
        cli::Command::Update(args) => _ = run::update(&args)?,
        cli::Command::Collapse(args) => _ = run::collapse(&args)?,
        cli::Command::Summary(args) => _ = run::summary(&args)?,
    }

    Ok(())
}
