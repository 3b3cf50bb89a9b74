//! Run configuration.
//!
//! A [`FlowConfig`] is read from JSON; missing fields take their defaults.
//! [`FlowConfig::validate`] must pass before any computation starts.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use infoflow_core::{ClassLabel, TimeWindow, WindowMode};
use serde::{Deserialize, Serialize};

use crate::error::{FlowError, FlowResult};
use crate::frequency::Frequency;
use crate::registry::{min_messages_for_activity, GroupDefinition, RegistryOptions};
use crate::timeseries::{default_classes, ClassScheme, SeriesBuilder};
use crate::window::WindowSchedule;

/// Which actor kinds take part in a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActorSelection {
    Platform,
    #[default]
    Individual,
    Group,
    All,
}

impl ActorSelection {
    pub fn platforms(&self) -> bool {
        matches!(self, ActorSelection::Platform | ActorSelection::All)
    }

    pub fn individuals(&self) -> bool {
        matches!(self, ActorSelection::Individual | ActorSelection::All)
    }

    pub fn groups(&self) -> bool {
        matches!(self, ActorSelection::Group | ActorSelection::All)
    }
}

/// Configuration of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowConfig {
    /// Start of the analysed range. Defaults to the first message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<DateTime<Utc>>,

    /// End of the analysed range. Defaults to the last message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<DateTime<Utc>>,

    /// Sampling frequency of the activity series.
    #[serde(default = "default_frequency")]
    pub frequency: Frequency,

    /// Platforms with fewer distinct users are not registered.
    #[serde(default)]
    pub min_platform_size: usize,

    /// Individuals with fewer authored messages are not registered.
    #[serde(default)]
    pub min_user_messages: usize,

    /// When set, replaces `min_user_messages` by this rate per 30 days over
    /// the analysed range.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_activity_per_month: Option<usize>,

    /// Days between consecutive window anchors.
    #[serde(default = "default_shift_days")]
    pub shift_days: u32,

    /// Length of the first window in days.
    #[serde(default = "default_init_window_days")]
    pub init_window_days: u32,

    /// Window series to compute. `None` computes one network over the range.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_mode: Option<WindowMode>,

    /// Compose the marginal series of `dimensions`.
    #[serde(default)]
    pub add_superclasses: bool,

    /// Class labels with a `class_<LABEL>` column in the input.
    #[serde(default = "default_classes")]
    pub classes: Vec<ClassLabel>,

    /// Dimension labels used for superclass composition.
    #[serde(default)]
    pub dimensions: ClassScheme,

    /// Add a `total_te` column.
    #[serde(default)]
    pub include_total: bool,

    /// Worker threads. Defaults to available parallelism minus one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,

    #[serde(default)]
    pub actors: ActorSelection,

    #[serde(default)]
    pub groups: Vec<GroupDefinition>,

    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

fn default_frequency() -> Frequency {
    Frequency::default()
}

fn default_shift_days() -> u32 {
    2
}

fn default_init_window_days() -> u32 {
    4
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("infoflow-output")
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            start: None,
            end: None,
            frequency: default_frequency(),
            min_platform_size: 0,
            min_user_messages: 0,
            min_activity_per_month: None,
            shift_days: default_shift_days(),
            init_window_days: default_init_window_days(),
            window_mode: None,
            add_superclasses: false,
            classes: default_classes(),
            dimensions: ClassScheme::default(),
            include_total: false,
            workers: None,
            actors: ActorSelection::default(),
            groups: Vec::new(),
            output_dir: default_output_dir(),
        }
    }
}

impl FlowConfig {
    /// Configuration over `[start, end]` with defaults elsewhere.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
            ..Self::default()
        }
    }

    /// Load a JSON configuration file.
    pub fn load(path: &Path) -> FlowResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Write the configuration as pretty JSON.
    pub fn save(&self, path: &Path) -> FlowResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Reject configurations that cannot produce a run.
    pub fn validate(&self) -> FlowResult<()> {
        if let (Some(start), Some(end)) = (self.start, self.end) {
            if start >= end {
                return Err(FlowError::InvalidWindow { start, end });
            }
        }
        if self.window_mode.is_some() {
            if self.shift_days == 0 {
                return Err(FlowError::config("shift_days must be positive"));
            }
            if self.init_window_days == 0 {
                return Err(FlowError::config("init_window_days must be positive"));
            }
        }
        if self.workers == Some(0) {
            return Err(FlowError::config("workers must be positive"));
        }
        if self.classes.is_empty() {
            return Err(FlowError::config("at least one class is required"));
        }
        if self.actors == ActorSelection::Group && self.groups.is_empty() {
            return Err(FlowError::config("group actors selected but no groups defined"));
        }
        if let Some(group) = self.groups.iter().find(|g| g.members.is_empty()) {
            return Err(FlowError::config(format!("group {:?} has no members", group.label)));
        }
        self.series_builder()?;
        Ok(())
    }

    /// The analysed range, falling back to `data_range` for unset bounds.
    pub fn bounds(&self, data_range: Option<(DateTime<Utc>, DateTime<Utc>)>) -> FlowResult<TimeWindow> {
        let (first, last) = match data_range {
            Some(range) => (Some(range.0), Some(range.1)),
            None => (None, None),
        };
        let start = self
            .start
            .or(first)
            .ok_or_else(|| FlowError::config("no start given and no messages to derive it from"))?;
        let end = self
            .end
            .or(last)
            .ok_or_else(|| FlowError::config("no end given and no messages to derive it from"))?;
        if start >= end {
            return Err(FlowError::InvalidWindow { start, end });
        }
        Ok(TimeWindow::new(start, end))
    }

    /// Window schedule over `bounds`, when a window mode is set.
    pub fn schedule(&self, bounds: &TimeWindow) -> Option<WindowSchedule> {
        self.window_mode.map(|mode| WindowSchedule {
            start: bounds.start,
            end: bounds.end,
            shift_days: self.shift_days,
            init_window_days: self.init_window_days,
            mode,
        })
    }

    /// Registry thresholds over `bounds`.
    pub fn registry_options(&self, bounds: &TimeWindow) -> RegistryOptions {
        let min_user_messages = match self.min_activity_per_month {
            Some(per_month) => min_messages_for_activity(per_month, bounds.start, bounds.end),
            None => self.min_user_messages,
        };
        RegistryOptions {
            min_platform_size: self.min_platform_size,
            min_user_messages,
        }
    }

    /// Series builder for the configured classes.
    pub fn series_builder(&self) -> FlowResult<SeriesBuilder> {
        let builder = SeriesBuilder::new(self.classes.clone())?;
        if self.add_superclasses {
            builder.with_superclasses(self.dimensions.clone())
        } else {
            Ok(builder)
        }
    }
}
