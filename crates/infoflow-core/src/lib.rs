//! Core domain types shared across the infoflow workspace.
//!
//! Messages come from a normalized, platform-independent table. Each author is
//! a [`User`]; users are grouped into analytic [`Actor`]s whose activity over a
//! [`TimeWindow`] is compared pairwise, producing an [`EdgeTable`] of directed
//! transfer-entropy values.

use chrono::{DateTime, Duration, Utc};
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

// =============================================================================
// Identifiers
// =============================================================================

/// Identifier for a message. Generated identifiers have the form `m<N>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub String);

impl MessageId {
    /// Build the generated identifier for the message at `index`.
    pub fn from_index(index: usize) -> Self {
        Self(format!("m{index}"))
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Surrogate identifier for a (platform, source user id) pair, `u<N>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    /// Build the surrogate identifier for the user at `index`.
    pub fn from_index(index: usize) -> Self {
        Self(format!("u{index}"))
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier for an actor, `a<N>`.
///
/// The numeric suffix is drawn from a single counter shared by every actor
/// kind, so identifiers never collide within a run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorId(pub String);

impl ActorId {
    /// Build the identifier with numeric suffix `index`.
    pub fn from_index(index: u64) -> Self {
        Self(format!("a{index}"))
    }

    /// Numeric suffix of the identifier, if it has the `a<N>` form.
    pub fn index(&self) -> Option<u64> {
        self.0.strip_prefix('a')?.parse().ok()
    }

    /// Borrow the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// Classes
// =============================================================================

/// Label of the aggregate "any activity" series.
pub const ANY_ACTIVITY: &str = "*";

/// Prefix of the per-class count columns in the normalized message table.
pub const CLASS_COLUMN_PREFIX: &str = "class_";

/// Base classes used when no explicit class set is configured.
pub const DEFAULT_BASE_CLASSES: [&str; 4] = ["TF", "TM", "UF", "UM"];

/// Label of a topical class attached to messages through matched content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassLabel(String);

impl ClassLabel {
    /// Create a label.
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    /// The "any activity" marker label.
    pub fn any() -> Self {
        Self(ANY_ACTIVITY.to_string())
    }

    /// Whether this is the "any activity" marker.
    pub fn is_any(&self) -> bool {
        self.0 == ANY_ACTIVITY
    }

    /// Borrow the label as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name of the count column for this class, e.g. `class_TF`.
    pub fn column_name(&self) -> String {
        format!("{CLASS_COLUMN_PREFIX}{}", self.0)
    }

    /// Parse a `class_<LABEL>` column name.
    pub fn from_column_name(column: &str) -> Option<Self> {
        column
            .strip_prefix(CLASS_COLUMN_PREFIX)
            .filter(|label| !label.is_empty())
            .map(Self::new)
    }
}

impl From<&str> for ClassLabel {
    fn from(label: &str) -> Self {
        Self::new(label)
    }
}

impl fmt::Display for ClassLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// Messages and Users
// =============================================================================

/// One row of the normalized message table as produced by a source reader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRecord {
    /// Identifier carried by the input, if any.
    pub msg_id: Option<String>,
    /// When the message was posted.
    pub datetime: DateTime<Utc>,
    /// Platform label, e.g. "twitter".
    pub platform: String,
    /// Author identifier as given by the platform.
    pub source_user_id: String,
    /// Identifier of the replied-to / reposted user, if any.
    pub parent_source_user_id: Option<String>,
    /// Number of matched article references per class.
    pub class_counts: BTreeMap<ClassLabel, u32>,
}

impl MessageRecord {
    /// Create a record without parent or class counts.
    pub fn new(
        datetime: DateTime<Utc>,
        platform: impl Into<String>,
        source_user_id: impl Into<String>,
    ) -> Self {
        Self {
            msg_id: None,
            datetime,
            platform: platform.into(),
            source_user_id: source_user_id.into(),
            parent_source_user_id: None,
            class_counts: BTreeMap::new(),
        }
    }

    /// Set the input identifier.
    pub fn with_id(mut self, msg_id: impl Into<String>) -> Self {
        self.msg_id = Some(msg_id.into());
        self
    }

    /// Set the parent user.
    pub fn with_parent(mut self, parent_source_user_id: impl Into<String>) -> Self {
        self.parent_source_user_id = Some(parent_source_user_id.into());
        self
    }

    /// Set the count for one class.
    pub fn with_class(mut self, class: impl Into<ClassLabel>, count: u32) -> Self {
        self.class_counts.insert(class.into(), count);
        self
    }

    /// Whether the required fields are present.
    pub fn is_complete(&self) -> bool {
        !self.platform.trim().is_empty() && !self.source_user_id.trim().is_empty()
    }
}

/// A message after surrogate user ids have been attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Unique, stable identifier.
    pub id: MessageId,
    /// When the message was posted.
    pub datetime: DateTime<Utc>,
    /// Platform label.
    pub platform: String,
    /// Author identifier as given by the platform.
    pub source_user_id: String,
    /// Parent author identifier as given by the platform.
    pub parent_source_user_id: Option<String>,
    /// Surrogate id of the author.
    pub user_id: UserId,
    /// Surrogate id of the parent author.
    pub parent_user_id: Option<UserId>,
    /// Number of matched article references per class.
    pub class_counts: BTreeMap<ClassLabel, u32>,
}

impl Message {
    /// Count recorded for `class`, zero when absent.
    pub fn class_count(&self, class: &ClassLabel) -> u32 {
        self.class_counts.get(class).copied().unwrap_or(0)
    }

    /// Whether the message references at least one item of `class`.
    pub fn has_class(&self, class: &ClassLabel) -> bool {
        self.class_count(class) > 0
    }
}

/// A (platform, source user id) pair with its surrogate id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Surrogate identifier.
    pub id: UserId,
    /// Platform label.
    pub platform: String,
    /// Identifier as given by the platform.
    pub source_user_id: String,
    /// Number of messages authored.
    pub msgs_count: usize,
    /// Number of messages whose parent is this user.
    pub received_share_count: usize,
}

// =============================================================================
// Actors
// =============================================================================

/// Discriminant of [`ActorKind`], used for selection and tabular output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActorKindTag {
    /// All users of a platform.
    Platform,
    /// A single user.
    Individual,
    /// An explicit set of users.
    Group,
}

impl ActorKindTag {
    /// Get a display label for the kind.
    pub fn label(&self) -> &'static str {
        match self {
            ActorKindTag::Platform => "platform",
            ActorKindTag::Individual => "individual",
            ActorKindTag::Group => "group",
        }
    }
}

impl fmt::Display for ActorKindTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// What an actor stands for, and therefore how its messages are selected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActorKind {
    /// Every user of one platform.
    Platform {
        /// Platform label.
        platform: String,
    },
    /// Exactly one user.
    Individual {
        /// Surrogate id of the user.
        user_id: UserId,
    },
    /// An explicit membership list.
    Group {
        /// Surrogate ids of the members.
        members: BTreeSet<UserId>,
    },
}

impl ActorKind {
    /// The discriminant of this kind.
    pub fn tag(&self) -> ActorKindTag {
        match self {
            ActorKind::Platform { .. } => ActorKindTag::Platform,
            ActorKind::Individual { .. } => ActorKindTag::Individual,
            ActorKind::Group { .. } => ActorKindTag::Group,
        }
    }
}

/// An analytic unit whose activity is compared to other actors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    /// Globally unique identifier.
    pub id: ActorId,
    /// Kind and resolution data.
    pub kind: ActorKind,
    /// Short label (platform name, user handle, group name).
    pub label: String,
    /// Descriptive label, e.g. `twitter: @someone`.
    pub long_label: String,
    /// Number of users represented.
    pub num_users: usize,
}

// =============================================================================
// Time Windows
// =============================================================================

/// How consecutive windows relate to each other.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowMode {
    /// Fixed start, end advances each step.
    #[default]
    Growing,
    /// Fixed length, start and end advance each step.
    Moving,
}

impl WindowMode {
    /// Directory name used for this mode's output.
    pub fn dir_name(&self) -> &'static str {
        match self {
            WindowMode::Growing => "growing",
            WindowMode::Moving => "moving",
        }
    }
}

impl fmt::Display for WindowMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// A closed time interval `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeWindow {
    /// Inclusive start.
    pub start: DateTime<Utc>,
    /// Inclusive end.
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    /// Create a window. Ordering of the bounds is validated by callers.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Length of the window.
    pub fn length(&self) -> Duration {
        self.end - self.start
    }

    /// Whether `instant` falls within the window, bounds included.
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant <= self.end
    }

    /// Whether the window intersects the closed range `[first, last]`.
    pub fn overlaps(&self, first: DateTime<Utc>, last: DateTime<Utc>) -> bool {
        self.start <= last && first <= self.end
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.start.to_rfc3339(), self.end.to_rfc3339())
    }
}

// =============================================================================
// Transfer-Entropy Edges
// =============================================================================

/// Column holding the source actor id.
pub const SOURCE_COLUMN: &str = "Source";

/// Column holding the target actor id.
pub const TARGET_COLUMN: &str = "Target";

/// Column holding the sum of all comparison values of a row.
pub const TOTAL_COLUMN: &str = "total_te";

/// Directed transfer-entropy values from one actor to another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeEdge {
    /// Actor whose past is used as predictor.
    pub source: ActorId,
    /// Actor whose future is predicted.
    pub target: ActorId,
    /// One value per comparison column, in column order.
    pub values: Vec<f64>,
    /// Sum of `values`, when requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<f64>,
}

/// All edges computed for one window.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EdgeTable {
    /// Comparison columns, `<src_class>_<tgt_class>`.
    pub pair_columns: Vec<String>,
    /// Whether rows carry a `total_te` value.
    pub include_total: bool,
    /// Rows in (source index, target index) order.
    pub edges: Vec<TeEdge>,
}

impl EdgeTable {
    /// Create an empty table with the given columns.
    pub fn new(pair_columns: Vec<String>, include_total: bool) -> Self {
        Self {
            pair_columns,
            include_total,
            edges: Vec::new(),
        }
    }

    /// Full header: `Source`, `Target`, the comparison columns and `total_te`.
    pub fn header(&self) -> Vec<String> {
        let mut header = Vec::with_capacity(self.pair_columns.len() + 3);
        header.push(SOURCE_COLUMN.to_string());
        header.push(TARGET_COLUMN.to_string());
        header.extend(self.pair_columns.iter().cloned());
        if self.include_total {
            header.push(TOTAL_COLUMN.to_string());
        }
        header
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    /// Whether the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Position of a comparison column.
    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.pair_columns.iter().position(|c| c == column)
    }

    /// Find the row for an ordered actor pair.
    pub fn edge(&self, source: &ActorId, target: &ActorId) -> Option<&TeEdge> {
        self.edges
            .iter()
            .find(|e| &e.source == source && &e.target == target)
    }

    /// Value of `column` (a comparison column or `total_te`) for an ordered pair.
    pub fn value(&self, source: &ActorId, target: &ActorId, column: &str) -> Option<f64> {
        let edge = self.edge(source, target)?;
        if column == TOTAL_COLUMN {
            return edge.total;
        }
        let idx = self.column_index(column)?;
        edge.values.get(idx).copied()
    }

    /// Actors appearing in the table, in order of first appearance.
    pub fn actor_ids(&self) -> Vec<ActorId> {
        let mut seen = BTreeSet::new();
        let mut ids = Vec::new();
        for edge in &self.edges {
            for id in [&edge.source, &edge.target] {
                if seen.insert(id.clone()) {
                    ids.push(id.clone());
                }
            }
        }
        ids
    }

    /// Convert to a petgraph StableDiGraph weighted by `column`.
    /// Returns the graph and a mapping from ActorId to NodeIndex.
    /// Rows with a zero (or missing) value for the column add no edge.
    pub fn to_petgraph(&self, column: &str) -> (StableDiGraph<ActorId, f64>, HashMap<ActorId, NodeIndex>) {
        let mut graph = StableDiGraph::new();
        let mut id_to_index = HashMap::new();

        for id in self.actor_ids() {
            let idx = graph.add_node(id.clone());
            id_to_index.insert(id, idx);
        }

        for edge in &self.edges {
            let weight = match self.value(&edge.source, &edge.target, column) {
                Some(w) if w > 0.0 => w,
                _ => continue,
            };
            if let (Some(&from_idx), Some(&to_idx)) =
                (id_to_index.get(&edge.source), id_to_index.get(&edge.target))
            {
                graph.add_edge(from_idx, to_idx, weight);
            }
        }

        (graph, id_to_index)
    }

    /// Summed outgoing weight of every actor under `column`, strongest
    /// first. Ties keep actor order.
    pub fn out_strength(&self, column: &str) -> Vec<(ActorId, f64)> {
        let (graph, id_to_index) = self.to_petgraph(column);
        let mut strengths: Vec<(ActorId, f64)> = self
            .actor_ids()
            .into_iter()
            .filter_map(|id| {
                let idx = *id_to_index.get(&id)?;
                let total = graph.edges_directed(idx, Direction::Outgoing).map(|e| *e.weight()).sum();
                Some((id, total))
            })
            .collect();
        strengths.sort_by(|a, b| b.1.total_cmp(&a.1));
        strengths
    }
}
