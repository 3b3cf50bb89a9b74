//! Run driver.
//!
//! A [`FlowPipeline`] owns the message table, the actor registry and the
//! engine of one run. Windows are processed strictly one after another; each
//! window's table is on disk before the next window starts.

use std::path::PathBuf;

use infoflow_core::{ActorId, EdgeTable, MessageRecord, TimeWindow, WindowMode};
use serde::{Deserialize, Serialize};
use tracing::{error, info, info_span, warn};

use crate::config::FlowConfig;
use crate::error::FlowResult;
use crate::network::{NetworkSummary, TransferEntropyEngine};
use crate::persistence::{NetworkStore, RunManifest};
use crate::registry::ActorRegistry;
use crate::source::{collect_input_files, AnySourceReader};
use crate::store::{record_time_range, MessageTable};
use crate::timeseries::TimeGrid;
use crate::window::WindowSchedule;

// =============================================================================
// Reports
// =============================================================================

/// What happened to one window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum WindowOutcome {
    /// The table was computed and written.
    Completed {
        summary: NetworkSummary,
        path: PathBuf,
    },
    /// The window was not computed.
    Skipped { reason: String },
    /// Computing or writing the table failed.
    Failed { reason: String },
}

impl WindowOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, WindowOutcome::Completed { .. })
    }
}

/// Outcome of one window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowReport {
    pub window: TimeWindow,
    pub outcome: WindowOutcome,
}

/// Outcome of a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    /// Window series mode, `None` for a single network.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<WindowMode>,
    /// Analysed range.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bounds: Option<TimeWindow>,
    /// Registered actors.
    pub actors: usize,
    pub windows: Vec<WindowReport>,
}

impl RunReport {
    pub fn completed(&self) -> usize {
        self.count(|o| matches!(o, WindowOutcome::Completed { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, WindowOutcome::Skipped { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, WindowOutcome::Failed { .. }))
    }

    fn count(&self, pred: impl Fn(&WindowOutcome) -> bool) -> usize {
        self.windows.iter().filter(|w| pred(&w.outcome)).count()
    }
}

// =============================================================================
// Pipeline
// =============================================================================

/// Resolve the analysed range and build the table from the records inside it.
///
/// Unset `start`/`end` fall back to the first and last record. Users, counts
/// and thresholds therefore only see messages within the range.
pub fn bounded_table(config: &FlowConfig, records: Vec<MessageRecord>) -> FlowResult<(TimeWindow, MessageTable)> {
    let bounds = config.bounds(record_time_range(&records))?;
    let table = MessageTable::from_records_within(records, &bounds);

    let observed = table.observed_classes();
    for class in config.classes.iter().filter(|c| !observed.contains(c)) {
        warn!(class = %class, "Configured class never occurs in the analysed range");
    }
    Ok((bounds, table))
}

/// Build the registry for the kinds selected in `config`.
pub fn build_registry(config: &FlowConfig, table: &MessageTable, bounds: &TimeWindow) -> FlowResult<ActorRegistry> {
    let options = config.registry_options(bounds);
    let mut registry = ActorRegistry::default();

    if config.actors.platforms() {
        registry.register_platforms(table, options.min_platform_size)?;
    }
    if config.actors.individuals() {
        registry.register_individuals(table, options.min_user_messages)?;
    }
    if config.actors.groups() && !config.groups.is_empty() {
        registry.register_groups(table, &config.groups)?;
    }
    Ok(registry)
}

/// One configured run over one message table.
#[derive(Debug)]
pub struct FlowPipeline {
    config: FlowConfig,
    bounds: TimeWindow,
    table: MessageTable,
    registry: ActorRegistry,
    engine: TransferEntropyEngine,
    store: NetworkStore,
}

impl FlowPipeline {
    /// Validate `config` and prepare a run over `records`.
    pub fn new(config: FlowConfig, records: Vec<MessageRecord>) -> FlowResult<Self> {
        config.validate()?;

        let (bounds, table) = bounded_table(&config, records)?;
        let registry = build_registry(&config, &table, &bounds)?;
        let engine = TransferEntropyEngine::new(config.series_builder()?, config.include_total, config.workers)?;
        let store = NetworkStore::new(&config.output_dir);

        info!(
            messages = table.len(),
            users = table.users().len(),
            actors = registry.len(),
            start = %bounds.start,
            end = %bounds.end,
            frequency = %config.frequency,
            "Prepared pipeline"
        );

        Ok(Self {
            config,
            bounds,
            table,
            registry,
            engine,
            store,
        })
    }

    /// Read `inputs` (files or directories) and prepare a run.
    pub fn from_inputs(config: FlowConfig, inputs: &[PathBuf]) -> FlowResult<Self> {
        config.validate()?;
        let files = collect_input_files(inputs)?;
        let records = AnySourceReader::default().read_files(&files)?;
        Self::new(config, records)
    }

    pub fn config(&self) -> &FlowConfig {
        &self.config
    }

    pub fn bounds(&self) -> &TimeWindow {
        &self.bounds
    }

    pub fn table(&self) -> &MessageTable {
        &self.table
    }

    pub fn registry(&self) -> &ActorRegistry {
        &self.registry
    }

    pub fn engine(&self) -> &TransferEntropyEngine {
        &self.engine
    }

    pub fn store(&self) -> &NetworkStore {
        &self.store
    }

    /// Actors taking part, in registration order.
    pub fn actor_ids(&self) -> Vec<ActorId> {
        self.registry.ids()
    }

    /// Windows of the configured series, or the whole range for a single
    /// network.
    pub fn windows(&self) -> FlowResult<Vec<TimeWindow>> {
        match self.config.schedule(&self.bounds) {
            Some(schedule) => schedule.windows(),
            None => Ok(vec![self.bounds]),
        }
    }

    /// Compute the edge table of one window without writing it.
    pub fn compute_window(&self, window: &TimeWindow) -> FlowResult<(EdgeTable, NetworkSummary)> {
        let grid = TimeGrid::new(*window, self.config.frequency.clone())?;
        let view = self.table.window_view(window);
        self.engine.compute(&self.registry, &self.actor_ids(), view, &grid)
    }

    /// Run the configured computation, then write the actor table and the
    /// manifest.
    pub fn run(&self) -> FlowResult<RunReport> {
        self.store.init()?;

        let report = match self.config.window_mode {
            Some(mode) => self.run_series(mode)?,
            None => self.run_single(),
        };

        self.store.save_actors(self.registry.actors())?;
        self.store
            .save_manifest(&RunManifest::new(self.config.clone(), report.clone()))?;

        info!(
            completed = report.completed(),
            skipped = report.skipped(),
            failed = report.failed(),
            "Run finished"
        );
        Ok(report)
    }

    /// One network over the whole range.
    pub fn run_single(&self) -> RunReport {
        let outcome = self.process_window(&self.bounds, |table| self.store.save_network(table));
        self.log_outcome(&self.bounds, &outcome);
        RunReport {
            mode: None,
            bounds: Some(self.bounds),
            actors: self.registry.len(),
            windows: vec![WindowReport {
                window: self.bounds,
                outcome,
            }],
        }
    }

    /// One network per window of a growing or moving series.
    pub fn run_series(&self, mode: WindowMode) -> FlowResult<RunReport> {
        let schedule = WindowSchedule {
            start: self.bounds.start,
            end: self.bounds.end,
            shift_days: self.config.shift_days,
            init_window_days: self.config.init_window_days,
            mode,
        };
        let windows = schedule.windows()?;
        info!(mode = %mode, windows = windows.len(), "Starting window series");

        let mut reports = Vec::with_capacity(windows.len());
        for (index, window) in windows.iter().enumerate() {
            let _span = info_span!("window", index, start = %window.start, end = %window.end).entered();
            let outcome = self.process_window(window, |table| self.store.save_window(mode, window, table));
            self.log_outcome(window, &outcome);
            reports.push(WindowReport {
                window: *window,
                outcome,
            });
        }

        Ok(RunReport {
            mode: Some(mode),
            bounds: Some(self.bounds),
            actors: self.registry.len(),
            windows: reports,
        })
    }

    fn process_window<F>(&self, window: &TimeWindow, save: F) -> WindowOutcome
    where
        F: FnOnce(&EdgeTable) -> FlowResult<PathBuf>,
    {
        let Some((first, last)) = self.table.time_range() else {
            return WindowOutcome::Skipped {
                reason: "no messages".to_string(),
            };
        };
        if !window.overlaps(first, last) {
            return WindowOutcome::Skipped {
                reason: format!(
                    "outside data range [{}, {}]",
                    first.to_rfc3339(),
                    last.to_rfc3339()
                ),
            };
        }

        let result = self
            .compute_window(window)
            .and_then(|(table, summary)| save(&table).map(|path| (summary, path)));
        match result {
            Ok((summary, path)) => WindowOutcome::Completed { summary, path },
            Err(e) => WindowOutcome::Failed { reason: e.to_string() },
        }
    }

    fn log_outcome(&self, window: &TimeWindow, outcome: &WindowOutcome) {
        match outcome {
            WindowOutcome::Completed { summary, path } => info!(
                window = %window,
                actors = summary.actors,
                comparison_pairs = summary.comparison_pairs,
                rows = summary.rows,
                path = %path.display(),
                "Window completed"
            ),
            WindowOutcome::Skipped { reason } => warn!(window = %window, reason = %reason, "Window skipped"),
            WindowOutcome::Failed { reason } => error!(window = %window, reason = %reason, "Window failed"),
        }
    }
}
