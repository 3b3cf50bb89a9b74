//! infoflow CLI - transfer-entropy networks between social-media actors.
//!
//! Reads normalized message tables, registers actors and writes one edge table
//! per time window.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;

use config::{ModeArg, RunArgs};

/// infoflow CLI - compute who drives whom.
///
/// Run `iflow network` for one network over the whole range, or
/// `iflow series` for a growing or moving series of windows.
#[derive(Parser, Debug)]
#[command(
    name = "iflow",
    author,
    version,
    about = "infoflow: transfer-entropy networks between social-media actors",
    long_about = None
)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Compute one network over the whole range.
    Network {
        #[command(flatten)]
        run: RunArgs,
    },

    /// Compute one network per window of a growing or moving series.
    Series {
        #[command(flatten)]
        run: RunArgs,

        /// Window series mode.
        #[arg(long, value_enum, default_value = "growing")]
        mode: ModeArg,

        /// Days between window anchors.
        #[arg(long)]
        shift_days: Option<u32>,

        /// Length of the first window in days.
        #[arg(long)]
        init_window_days: Option<u32>,
    },

    /// List the windows a series would use, without reading any data.
    Windows {
        /// Range start (RFC 3339 or `YYYY-MM-DD[ HH:MM:SS]`).
        #[arg(long, value_parser = config::parse_time)]
        start: chrono::DateTime<chrono::Utc>,

        /// Range end.
        #[arg(long, value_parser = config::parse_time)]
        end: chrono::DateTime<chrono::Utc>,

        /// Days between window anchors.
        #[arg(long, default_value_t = 2)]
        shift_days: u32,

        /// Length of the first window in days.
        #[arg(long, default_value_t = 4)]
        init_window_days: u32,

        /// Window series mode.
        #[arg(long, value_enum, default_value = "growing")]
        mode: ModeArg,
    },

    /// Register actors and print the actor table.
    Actors {
        #[command(flatten)]
        run: RunArgs,

        /// Also write the table as gzip CSV.
        #[arg(long)]
        save: Option<PathBuf>,
    },

    /// Write a configuration file with default values.
    Init {
        /// Target path.
        #[arg(default_value = "infoflow.json")]
        path: PathBuf,

        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over the verbosity flags.
    let level = if cli.quiet {
        "error"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Network { run } => commands::network::execute(&run),

        Commands::Series {
            run,
            mode,
            shift_days,
            init_window_days,
        } => commands::series::execute(&run, mode, shift_days, init_window_days),

        Commands::Windows {
            start,
            end,
            shift_days,
            init_window_days,
            mode,
        } => commands::windows::execute(start, end, shift_days, init_window_days, mode),

        Commands::Actors { run, save } => commands::actors::execute(&run, save.as_deref()),

        Commands::Init { path, force } => commands::init::execute(&path, force),
    }
}
