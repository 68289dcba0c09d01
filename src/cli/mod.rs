//! [Command-line interface](Cli) (CLI) of the main binary.

use crate::run::{CollapseArgs, SummaryArgs, UpdateArgs};
use crate::Verbosity;
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

// ----------------------------------------------------------------------------
// CLI Entry Point
// ----------------------------------------------------------------------------

/// The command-line interface (CLI).
/// ---
/// The CLI is intended for parsing user input from the command-line in the main function. This is achieved with the `parse` function, which parses the command line arguments from [`std::env::args`](https://doc.rust-lang.org/std/env/fn.args.html).
/// ```no_run
/// use clap::Parser;
/// let args = clonetrack::Cli::parse();
/// ```
/// The command-line arguments from `std::env::args` are simply a vector of space separated strings. Here is a manual example of setting the command-line input:
/// ```rust
/// # use clap::Parser;
/// let input = ["clonetrack", "summary", "--ensemble", "posterior.json", "--threshold", "0.05"];
/// let args = clonetrack::Cli::parse_from(input);
/// serde_json::to_string_pretty(&args)?;
/// # Ok::<(), color_eyre::eyre::Report>(())
/// ```
/// With the following pretty JSON representation:
/// ```json
/// {
///   "command": {
///     "Summary": {
///       "ensemble": "posterior.json",
///       "threshold": 0.05
///     }
///   },
///   "verbosity": "Info"
/// }
/// ```
#[derive(Debug, Deserialize, Parser, Serialize)]
#[clap(name = "clonetrack", author, version)]
#[clap(about = "clonetrack reweights tumor phylogeny ensembles with longitudinal marker evidence.")]
pub struct Cli {
    #[clap(subcommand)]
    /// Pass CLI arguments to a particular [Command].
    #[clap(help = "Set the command.")]
    pub command: Command,

    /// Set the output [Verbosity] level.
    #[clap(short = 'v', long)]
    #[clap(value_enum, default_value_t = Verbosity::default())]
    #[clap(hide_possible_values = false)]
    #[clap(global = true)]
    #[clap(help = "Set the output verbosity level.")]
    pub verbosity: Verbosity,
}

/// CLI [commands](#variants). Used to decide which runtime [Command](#variants) the CLI arguments should be passed to.
#[derive(Debug, Deserialize, Serialize, Subcommand)]
pub enum Command {
    /// Pass CLI arguments to the [update](crate::run::update()) method.
    ///
    /// ```rust
    /// use clonetrack::{cli::Command, Cli};
    /// use clap::Parser;
    /// let input = ["clonetrack", "update", "-e", "prior.json", "-i", "ddpcr.csv", "-o", "out", "--method", "structure"];
    /// let args = Cli::parse_from(input);
    /// assert!(matches!(args.command, Command::Update(_)));
    /// ```
    #[clap(about = "Update a tree ensemble with longitudinal marker observations.")]
    Update(UpdateArgs),

    /// Pass CLI arguments to the [collapse](crate::run::collapse()) method.
    #[clap(about = "Collapse uninformative nodes of a tree and its matrices.")]
    Collapse(CollapseArgs),

    /// Pass CLI arguments to the [summary](crate::run::summary()) method.
    #[clap(about = "Summarize the weights of a tree ensemble.")]
    Summary(SummaryArgs),
}
