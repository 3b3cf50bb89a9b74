//! Directed information-flow networks between social-media actors.
//!
//! Messages from a normalized table are grouped by actor, turned into binary
//! activity series per topical class and compared pairwise with discrete
//! transfer entropy. Networks are computed over one range or over a growing or
//! moving series of time windows.
//!
//! ## Pipeline
//!
//! ```text
//! input files ──► MessageTable ──► ActorRegistry
//!                                      │
//!        WindowSchedule ──► TimeGrid ──┤
//!                                      ▼
//!                         SeriesBuilder (per actor, parallel)
//!                                      │
//!                                      ▼
//!               transfer_entropy (per ordered actor pair, parallel)
//!                                      │
//!                                      ▼
//!                          EdgeTable ──► NetworkStore
//! ```
//!
//! ## Actor ids
//!
//! Platforms, individuals and groups draw `a<N>` ids from one counter, in
//! that order, so ids never collide across kinds within a run.

pub mod comparison;
pub mod config;
pub mod entropy;
mod error;
pub mod frequency;
pub mod network;
pub mod persistence;
pub mod pipeline;
pub mod registry;
pub mod source;
pub mod store;
pub mod timeseries;
pub mod window;

pub use comparison::{ComparabilityGroup, ComparisonPair, ComparisonPlan};
pub use config::{ActorSelection, FlowConfig};
pub use entropy::transfer_entropy;
pub use error::{FlowError, FlowResult};
pub use frequency::Frequency;
pub use network::{default_workers, NetworkSummary, TransferEntropyEngine};
pub use persistence::{read_edge_table, window_file_name, write_edge_table, NetworkStore, RunManifest};
pub use pipeline::{bounded_table, build_registry, FlowPipeline, RunReport, WindowOutcome, WindowReport};
pub use registry::{
    assign_actor_ids, min_messages_for_activity, ActorIdCounter, ActorRegistry, GroupMember, GroupDefinition,
    RegistryOptions,
};
pub use source::{collect_input_files, discover_files, parse_datetime, AnySourceReader, NormalizedCsvReader, SourceReader};
pub use store::{record_time_range, MessageTable, UserDirectory};
pub use timeseries::{default_classes, ActorSeries, BinarySeries, ClassScheme, SeriesBuilder, TimeGrid};
pub use window::{generate_windows, WindowSchedule};
