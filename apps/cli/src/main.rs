//! Ferrule CLI - entry point for training runs.
//!
//! The same binary runs on a workstation, where configuration arrives as
//! flags, and inside a managed training container, where the platform
//! supplies channel locations and host details through `SM_*` environment
//! variables. Flags always override the environment.

mod commands;

use clap::{CommandFactory, Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use commands::types::{PredictArgs, TrainArgs};
use commands::{config, metrics, predict, train};

/// Ferrule - trainable entry point adapter
#[derive(Parser, Debug)]
#[command(
    name = "ferrule",
    author,
    version,
    about = "Ferrule - run one training script locally or on a managed platform",
    long_about = "Ferrule resolves run configuration from flags, SM_* environment variables, an \
                  optional\nhyperparameter file and defaults, then trains, evaluates and writes a \
                  versioned model."
)]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Train, evaluate and save a model
    ///
    /// Prints one line per epoch on stdout in the format scraped by
    /// hyperparameter tuners; logs go to stderr.
    Train {
        #[command(flatten)]
        args: TrainArgs,

        /// Print the training manifest as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the parameter table and how each value resolves
    Config {
        #[command(flatten)]
        args: TrainArgs,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print metric definitions (name + regex) for tuning jobs
    Metrics,

    /// Score inputs with the latest saved model
    Predict(PredictArgs),
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing; stdout is reserved for epoch lines and JSON output
    let level = match args.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .without_time()
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let Some(command) = args.command else {
        Args::command().print_help()?;
        return Ok(());
    };

    match command {
        Command::Train { args, json } => train::execute(&args, json),
        Command::Config { args, json } => config::execute(&args, json),
        Command::Metrics => metrics::execute(),
        Command::Predict(args) => predict::execute(&args),
    }
}
