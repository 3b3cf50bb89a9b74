//! Output files of a run.
//!
//! ## File Structure
//!
//! ```text
//! <output>/
//! ├── te_network.csv.gz        # single-window run
//! ├── growing/                 # growing window series
//! │   └── te_<start>__<end>.csv.gz
//! ├── moving/                  # moving window series
//! │   └── te_<start>__<end>.csv.gz
//! ├── actors.csv.gz            # actor table
//! └── manifest.json            # configuration and per-window outcomes
//! ```
//!
//! Tables are written to a `.partial` sibling first and renamed into place, so
//! a table file that exists is complete.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use infoflow_core::{
    Actor, ActorId, ActorKind, EdgeTable, TeEdge, TimeWindow, WindowMode, SOURCE_COLUMN, TARGET_COLUMN,
    TOTAL_COLUMN,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::config::FlowConfig;
use crate::error::{FlowError, FlowResult};
use crate::pipeline::RunReport;

/// Version of the manifest format.
pub const MANIFEST_VERSION: u32 = 1;

const NETWORK_FILE: &str = "te_network.csv.gz";
const ACTORS_FILE: &str = "actors.csv.gz";
const MANIFEST_FILE: &str = "manifest.json";
const PARTIAL_SUFFIX: &str = ".partial";

/// Everything recorded about a finished run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunManifest {
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub config: FlowConfig,
    pub report: RunReport,
}

impl RunManifest {
    pub fn new(config: FlowConfig, report: RunReport) -> Self {
        Self {
            version: MANIFEST_VERSION,
            created_at: Utc::now(),
            config,
            report,
        }
    }
}

/// Replace characters that are unsafe in file names.
fn sanitize(value: &str) -> String {
    value.replace([':', '/', '\\'], "-")
}

/// File name of a window's edge table.
pub fn window_file_name(window: &TimeWindow) -> String {
    format!(
        "te_{}__{}.csv.gz",
        sanitize(&window.start.to_rfc3339()),
        sanitize(&window.end.to_rfc3339())
    )
}

/// Store for the output directory of one run.
#[derive(Debug, Clone)]
pub struct NetworkStore {
    root: PathBuf,
}

impl NetworkStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the output directory.
    pub fn init(&self) -> FlowResult<()> {
        if !self.root.exists() {
            std::fs::create_dir_all(&self.root)?;
            debug!(path = %self.root.display(), "Created output directory");
        }
        Ok(())
    }

    pub fn window_path(&self, mode: WindowMode, window: &TimeWindow) -> PathBuf {
        self.root.join(mode.dir_name()).join(window_file_name(window))
    }

    pub fn network_path(&self) -> PathBuf {
        self.root.join(NETWORK_FILE)
    }

    pub fn actors_path(&self) -> PathBuf {
        self.root.join(ACTORS_FILE)
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.root.join(MANIFEST_FILE)
    }

    /// Write the edge table of one window of a series.
    pub fn save_window(&self, mode: WindowMode, window: &TimeWindow, table: &EdgeTable) -> FlowResult<PathBuf> {
        let path = self.window_path(mode, window);
        write_edge_table(&path, table)?;
        info!(path = %path.display(), rows = table.len(), "Saved window network");
        Ok(path)
    }

    /// Write the edge table of a single-window run.
    pub fn save_network(&self, table: &EdgeTable) -> FlowResult<PathBuf> {
        let path = self.network_path();
        write_edge_table(&path, table)?;
        info!(path = %path.display(), rows = table.len(), "Saved network");
        Ok(path)
    }

    /// Write the actor table.
    pub fn save_actors(&self, actors: &[Actor]) -> FlowResult<PathBuf> {
        let path = self.actors_path();
        write_actor_table(&path, actors)?;
        info!(path = %path.display(), actors = actors.len(), "Saved actor table");
        Ok(path)
    }

    pub fn save_manifest(&self, manifest: &RunManifest) -> FlowResult<PathBuf> {
        self.init()?;
        let path = self.manifest_path();
        std::fs::write(&path, serde_json::to_string_pretty(manifest)?)?;
        debug!(path = %path.display(), "Saved manifest");
        Ok(path)
    }

    /// Load the manifest, `None` when the run did not finish.
    pub fn load_manifest(&self) -> FlowResult<Option<RunManifest>> {
        let path = self.manifest_path();
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&contents)?))
    }

    /// Window tables present for `mode`, sorted by file name.
    pub fn list_windows(&self, mode: WindowMode) -> FlowResult<Vec<PathBuf>> {
        let dir = self.root.join(mode.dir_name());
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut paths = Vec::new();
        for entry in WalkDir::new(&dir).min_depth(1).max_depth(1) {
            let entry = entry.map_err(std::io::Error::from)?;
            let name = entry.file_name().to_string_lossy();
            if entry.file_type().is_file() && name.ends_with(".csv.gz") {
                paths.push(entry.into_path());
            }
        }
        paths.sort();
        Ok(paths)
    }
}

// =============================================================================
// Table I/O
// =============================================================================

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(PARTIAL_SUFFIX);
    PathBuf::from(name)
}

/// Write gzip CSV rows through a `.partial` file.
fn write_gz_csv<F>(path: &Path, write_rows: F) -> FlowResult<()>
where
    F: FnOnce(&mut csv::Writer<GzEncoder<BufWriter<File>>>) -> FlowResult<()>,
{
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let partial = partial_path(path);
    let encoder = GzEncoder::new(BufWriter::new(File::create(&partial)?), Compression::default());
    let mut writer = csv::Writer::from_writer(encoder);

    write_rows(&mut writer)?;

    let encoder = writer.into_inner().map_err(|e| e.into_error())?;
    encoder.finish()?.flush()?;
    std::fs::rename(&partial, path)?;
    Ok(())
}

/// Write an edge table as gzip CSV.
pub fn write_edge_table(path: &Path, table: &EdgeTable) -> FlowResult<()> {
    write_gz_csv(path, |writer| {
        writer.write_record(table.header())?;
        for edge in &table.edges {
            let mut row = Vec::with_capacity(edge.values.len() + 3);
            row.push(edge.source.to_string());
            row.push(edge.target.to_string());
            row.extend(edge.values.iter().map(f64::to_string));
            if table.include_total {
                row.push(edge.total.unwrap_or_else(|| edge.values.iter().sum()).to_string());
            }
            writer.write_record(&row)?;
        }
        Ok(())
    })
}

fn open_table(path: &Path) -> FlowResult<csv::Reader<Box<dyn Read>>> {
    let file = BufReader::new(File::open(path)?);
    let input: Box<dyn Read> = if path.extension().is_some_and(|ext| ext == "gz") {
        Box::new(GzDecoder::new(file))
    } else {
        Box::new(file)
    };
    Ok(csv::Reader::from_reader(input))
}

/// Read an edge table written by [`write_edge_table`].
pub fn read_edge_table(path: &Path) -> FlowResult<EdgeTable> {
    let mut reader = open_table(path)?;
    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();

    if headers.len() < 2 || headers[0] != SOURCE_COLUMN || headers[1] != TARGET_COLUMN {
        return Err(FlowError::malformed(path, "edge table must start with Source,Target"));
    }
    let include_total = headers.last().is_some_and(|h| h == TOTAL_COLUMN);
    let value_end = if include_total { headers.len() - 1 } else { headers.len() };
    let pair_columns = headers[2..value_end].to_vec();

    let mut table = EdgeTable::new(pair_columns, include_total);
    for (row, result) in reader.records().enumerate() {
        let record = result?;
        let parse = |idx: usize| -> FlowResult<f64> {
            let raw = record.get(idx).unwrap_or("");
            raw.parse::<f64>()
                .map_err(|_| FlowError::malformed(path, format!("row {}: bad value {raw:?}", row + 1)))
        };

        let values = (2..value_end).map(parse).collect::<FlowResult<Vec<_>>>()?;
        let total = if include_total { Some(parse(value_end)?) } else { None };
        table.edges.push(TeEdge {
            source: ActorId(record.get(0).unwrap_or("").to_string()),
            target: ActorId(record.get(1).unwrap_or("").to_string()),
            values,
            total,
        });
    }
    Ok(table)
}

/// Columns of the actor table.
pub const ACTOR_COLUMNS: [&str; 6] = [
    "actor_id",
    "actor_type",
    "actor_label",
    "actor_long_label",
    "num_users",
    "members",
];

/// Write the actor table as gzip CSV. Group members are `;`-separated user ids.
pub fn write_actor_table(path: &Path, actors: &[Actor]) -> FlowResult<()> {
    write_gz_csv(path, |writer| {
        writer.write_record(ACTOR_COLUMNS)?;
        for actor in actors {
            let members = match &actor.kind {
                ActorKind::Platform { .. } => String::new(),
                ActorKind::Individual { user_id } => user_id.to_string(),
                ActorKind::Group { members } => members.iter().map(ToString::to_string).collect::<Vec<_>>().join(";"),
            };
            writer.write_record([
                actor.id.as_str(),
                actor.kind.tag().label(),
                actor.label.as_str(),
                actor.long_label.as_str(),
                actor.num_users.to_string().as_str(),
                members.as_str(),
            ])?;
        }
        Ok(())
    })
}
