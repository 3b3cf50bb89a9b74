//! Resolution of the run configuration from a JSON file and CLI flags.
//!
//! Flags override values read from `--config`; anything unset in both keeps
//! the defaults of [`FlowConfig`].

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Args, ValueEnum};
use infoflow_core::{ClassLabel, WindowMode};
use infoflow_engine::{parse_datetime, ActorSelection, FlowConfig, Frequency};

/// Window series mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    Growing,
    Moving,
}

impl From<ModeArg> for WindowMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Growing => WindowMode::Growing,
            ModeArg::Moving => WindowMode::Moving,
        }
    }
}

/// Actor kinds to register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ActorArg {
    Platform,
    Individual,
    Group,
    All,
}

impl From<ActorArg> for ActorSelection {
    fn from(arg: ActorArg) -> Self {
        match arg {
            ActorArg::Platform => ActorSelection::Platform,
            ActorArg::Individual => ActorSelection::Individual,
            ActorArg::Group => ActorSelection::Group,
            ActorArg::All => ActorSelection::All,
        }
    }
}

/// Parse a timestamp flag.
pub fn parse_time(value: &str) -> Result<DateTime<Utc>, String> {
    parse_datetime(value).ok_or_else(|| format!("unrecognised timestamp {value:?}"))
}

/// Inputs and overrides shared by the commands that read data.
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Input files or directories of normalized message tables.
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// JSON configuration file.
    #[arg(short, long, env = "INFOFLOW_CONFIG")]
    pub config: Option<PathBuf>,

    /// Range start (RFC 3339 or `YYYY-MM-DD[ HH:MM:SS]`).
    #[arg(long, value_parser = parse_time)]
    pub start: Option<DateTime<Utc>>,

    /// Range end.
    #[arg(long, value_parser = parse_time)]
    pub end: Option<DateTime<Utc>>,

    /// Sampling frequency, e.g. `6H`, `D`, `30min`.
    #[arg(short, long)]
    pub frequency: Option<String>,

    /// Output directory.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Minimum distinct users of a platform actor.
    #[arg(long)]
    pub min_platform_size: Option<usize>,

    /// Minimum authored messages of an individual actor.
    #[arg(long)]
    pub min_user_messages: Option<usize>,

    /// Minimum activity per 30 days; replaces --min-user-messages.
    #[arg(long)]
    pub min_activity_per_month: Option<usize>,

    /// Actor kinds to register.
    #[arg(long, value_enum)]
    pub actors: Option<ActorArg>,

    /// Comma-separated class labels.
    #[arg(long, value_delimiter = ',')]
    pub classes: Option<Vec<String>>,

    /// Compose the marginal superclass series.
    #[arg(long)]
    pub superclasses: bool,

    /// Add a total_te column.
    #[arg(long)]
    pub total: bool,

    /// Worker threads.
    #[arg(short, long)]
    pub workers: Option<usize>,
}

impl RunArgs {
    /// The configuration file (if any) with flag overrides applied.
    pub fn resolve(&self) -> Result<FlowConfig> {
        let mut config = match &self.config {
            Some(path) => FlowConfig::load(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => FlowConfig::default(),
        };

        if let Some(start) = self.start {
            config.start = Some(start);
        }
        if let Some(end) = self.end {
            config.end = Some(end);
        }
        if let Some(frequency) = &self.frequency {
            config.frequency = frequency
                .parse::<Frequency>()
                .with_context(|| format!("Invalid --frequency {frequency}"))?;
        }
        if let Some(output) = &self.output {
            config.output_dir = output.clone();
        }
        if let Some(size) = self.min_platform_size {
            config.min_platform_size = size;
        }
        if let Some(count) = self.min_user_messages {
            config.min_user_messages = count;
        }
        if let Some(rate) = self.min_activity_per_month {
            config.min_activity_per_month = Some(rate);
        }
        if let Some(actors) = self.actors {
            config.actors = actors.into();
        }
        if let Some(classes) = &self.classes {
            config.classes = classes
                .iter()
                .map(|c| c.trim())
                .filter(|c| !c.is_empty())
                .map(ClassLabel::new)
                .collect();
        }
        if self.superclasses {
            config.add_superclasses = true;
        }
        if self.total {
            config.include_total = true;
        }
        if let Some(workers) = self.workers {
            config.workers = Some(workers);
        }

        config.validate().context("Invalid configuration")?;
        Ok(config)
    }
}
