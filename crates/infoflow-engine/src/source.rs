//! Input readers.
//!
//! A [`SourceReader`] either recognises a file and returns its rows as
//! [`MessageRecord`]s or reports a non-match so that the next reader can try.
//! [`AnySourceReader`] composes readers first-match-wins.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use flate2::read::GzDecoder;
use infoflow_core::{ClassLabel, MessageRecord};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::{FlowError, FlowResult};

/// Something that can try to read a message file.
pub trait SourceReader: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Rows of `path`, or `Ok(None)` when the file is not in this reader's
    /// format.
    fn try_read(&self, path: &Path) -> FlowResult<Option<Vec<MessageRecord>>>;
}

// =============================================================================
// Normalized CSV
// =============================================================================

const DATETIME_COLUMN: &str = "datetime";
const PLATFORM_COLUMN: &str = "platform";
const USER_COLUMN: &str = "source_user_id";
const PARENT_COLUMNS: [&str; 2] = ["parent_source_user_id", "parent_user_id"];
const MSG_ID_COLUMNS: [&str; 2] = ["msg_id", "source_msg_id"];

/// Reads the normalized message table from CSV, gzip-compressed when the file
/// name ends in `.gz`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NormalizedCsvReader;

struct Columns {
    datetime: usize,
    platform: usize,
    user: usize,
    parent: Option<usize>,
    msg_id: Option<usize>,
    classes: Vec<(usize, ClassLabel)>,
}

impl Columns {
    fn from_headers(headers: &csv::StringRecord) -> Option<Self> {
        let find = |name: &str| headers.iter().position(|h| h.trim() == name);
        let find_any = |names: &[&str]| names.iter().find_map(|name| find(name));

        Some(Self {
            datetime: find(DATETIME_COLUMN)?,
            platform: find(PLATFORM_COLUMN)?,
            user: find(USER_COLUMN)?,
            parent: find_any(&PARENT_COLUMNS),
            msg_id: find_any(&MSG_ID_COLUMNS),
            classes: headers
                .iter()
                .enumerate()
                .filter_map(|(idx, h)| ClassLabel::from_column_name(h.trim()).map(|label| (idx, label)))
                .collect(),
        })
    }
}

fn optional_field(record: &csv::StringRecord, idx: Option<usize>) -> Option<String> {
    idx.and_then(|i| record.get(i))
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn parse_count(value: &str) -> Option<u32> {
    let value = value.trim();
    if value.is_empty() {
        return Some(0);
    }
    if let Ok(count) = value.parse::<u32>() {
        return Some(count);
    }
    // Counts exported from float columns, e.g. "2.0".
    let float = value.parse::<f64>().ok()?;
    (float.is_finite() && float >= 0.0 && float <= f64::from(u32::MAX)).then(|| float.round() as u32)
}

fn open(path: &Path) -> FlowResult<Box<dyn Read>> {
    let file = BufReader::new(File::open(path)?);
    let is_gz = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("gz"));
    if is_gz {
        Ok(Box::new(GzDecoder::new(file)))
    } else {
        Ok(Box::new(file))
    }
}

impl SourceReader for NormalizedCsvReader {
    fn name(&self) -> &str {
        "normalized-csv"
    }

    fn try_read(&self, path: &Path) -> FlowResult<Option<Vec<MessageRecord>>> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(open(path)?);

        let headers = match reader.headers() {
            Ok(headers) => headers.clone(),
            Err(e) => {
                debug!(path = %path.display(), error = %e, "Unreadable header");
                return Ok(None);
            }
        };
        let Some(columns) = Columns::from_headers(&headers) else {
            debug!(path = %path.display(), "Required columns missing");
            return Ok(None);
        };

        let mut records = Vec::new();
        let mut undated = 0usize;
        for (row, result) in reader.records().enumerate() {
            let line = row + 2;
            let record = result.map_err(|e| FlowError::malformed(path, format!("line {line}: {e}")))?;

            let raw_datetime = record.get(columns.datetime).unwrap_or("").trim();
            if raw_datetime.is_empty() {
                undated += 1;
                continue;
            }
            let datetime = parse_datetime(raw_datetime).ok_or_else(|| {
                FlowError::malformed(path, format!("line {line}: unparseable datetime {raw_datetime:?}"))
            })?;

            let mut message = MessageRecord::new(
                datetime,
                record.get(columns.platform).unwrap_or("").trim(),
                record.get(columns.user).unwrap_or("").trim(),
            );
            message.parent_source_user_id = optional_field(&record, columns.parent);
            message.msg_id = optional_field(&record, columns.msg_id);

            for (idx, class) in &columns.classes {
                let raw = record.get(*idx).unwrap_or("");
                let count = parse_count(raw).ok_or_else(|| {
                    FlowError::malformed(path, format!("line {line}: bad count {raw:?} for {}", class.column_name()))
                })?;
                if count > 0 {
                    message.class_counts.insert(class.clone(), count);
                }
            }
            records.push(message);
        }

        if undated > 0 {
            warn!(path = %path.display(), dropped = undated, "Dropped rows without datetime");
        }
        Ok(Some(records))
    }
}

/// Parse an input timestamp.
///
/// Accepts RFC 3339 and `YYYY-MM-DD HH:MM:SS[.fff][+zz:zz]`; values without
/// an offset are taken as UTC. A bare date means midnight UTC.
pub fn parse_datetime(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%:z", "%Y-%m-%d %H:%M:%S%.f%z"] {
        if let Ok(dt) = DateTime::parse_from_str(value, format) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

// =============================================================================
// Composition
// =============================================================================

/// Tries each reader in order; the first match wins.
pub struct AnySourceReader {
    readers: Vec<Box<dyn SourceReader>>,
}

impl Default for AnySourceReader {
    fn default() -> Self {
        Self {
            readers: vec![Box::new(NormalizedCsvReader)],
        }
    }
}

impl AnySourceReader {
    /// Append a reader, tried after the existing ones.
    pub fn with_reader(mut self, reader: impl SourceReader + 'static) -> Self {
        self.readers.push(Box::new(reader));
        self
    }

    /// Reader names in trial order.
    pub fn reader_names(&self) -> Vec<&str> {
        self.readers.iter().map(|r| r.name()).collect()
    }

    /// Read one file with the first reader that accepts it.
    pub fn read_file(&self, path: &Path) -> FlowResult<Vec<MessageRecord>> {
        for reader in &self.readers {
            if let Some(records) = reader.try_read(path)? {
                info!(
                    path = %path.display(),
                    reader = reader.name(),
                    rows = records.len(),
                    "Read input file"
                );
                return Ok(records);
            }
        }
        Err(FlowError::UnsupportedInput {
            path: path.to_path_buf(),
        })
    }

    /// Read and concatenate several files in order.
    pub fn read_files(&self, paths: &[PathBuf]) -> FlowResult<Vec<MessageRecord>> {
        debug!(files = paths.len(), readers = ?self.reader_names(), "Reading inputs");
        let mut all = Vec::new();
        for path in paths {
            all.extend(self.read_file(path)?);
        }
        Ok(all)
    }
}

/// Candidate input files directly inside `dir`, sorted by path.
pub fn discover_files(dir: &Path) -> FlowResult<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(std::io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_lowercase();
        if name.ends_with(".csv") || name.ends_with(".csv.gz") {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}

/// Expand directories among `inputs` into the files they contain.
pub fn collect_input_files(inputs: &[PathBuf]) -> FlowResult<Vec<PathBuf>> {
    let mut files = Vec::new();
    for input in inputs {
        if input.is_dir() {
            files.extend(discover_files(input)?);
        } else {
            files.push(input.clone());
        }
    }
    Ok(files)
}
