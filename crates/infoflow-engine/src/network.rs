//! Transfer-entropy network of one window.
//!
//! Two fan-out phases run on a bounded rayon pool: one task per actor builds
//! its series map, then one task per ordered actor pair computes its row. The
//! second phase only reads the output of the first.

use std::time::Instant;

use infoflow_core::{ActorId, EdgeTable, Message, TeEdge};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::comparison::ComparisonPlan;
use crate::entropy::transfer_entropy;
use crate::error::{FlowError, FlowResult};
use crate::registry::ActorRegistry;
use crate::timeseries::{ActorSeries, SeriesBuilder, TimeGrid};

/// Default worker count: available parallelism minus one, at least one.
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get().saturating_sub(1))
        .unwrap_or(1)
        .max(1)
}

/// Counts reported for one computed network.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkSummary {
    /// Actors whose series were built.
    pub actors: usize,
    /// Actors with at least one active bucket.
    pub active_actors: usize,
    /// Class pairs compared per actor pair.
    pub comparison_pairs: usize,
    /// Rows in the edge table.
    pub rows: usize,
    pub duration_ms: u64,
}

/// Computes edge tables for a fixed class configuration.
pub struct TransferEntropyEngine {
    builder: SeriesBuilder,
    plan: ComparisonPlan,
    include_total: bool,
    pool: rayon::ThreadPool,
}

impl TransferEntropyEngine {
    /// Create an engine. `workers` of `None` uses [`default_workers`].
    pub fn new(builder: SeriesBuilder, include_total: bool, workers: Option<usize>) -> FlowResult<Self> {
        let workers = workers.unwrap_or_else(default_workers);
        if workers == 0 {
            return Err(FlowError::config("workers must be positive"));
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("infoflow-worker-{i}"))
            .build()
            .map_err(|e| FlowError::WorkerPool(e.to_string()))?;

        let plan = ComparisonPlan::new(&builder.labels(), builder.superclasses());
        debug!(
            workers,
            labels = builder.labels().len(),
            comparison_pairs = plan.len(),
            "Created transfer entropy engine"
        );

        Ok(Self {
            builder,
            plan,
            include_total,
            pool,
        })
    }

    pub fn plan(&self) -> &ComparisonPlan {
        &self.plan
    }

    pub fn builder(&self) -> &SeriesBuilder {
        &self.builder
    }

    pub fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Phase one: the series map of every actor, in `actor_ids` order.
    pub fn actor_series(
        &self,
        registry: &ActorRegistry,
        actor_ids: &[ActorId],
        view: &[Message],
        grid: &TimeGrid,
    ) -> FlowResult<Vec<ActorSeries>> {
        self.pool.install(|| {
            actor_ids
                .par_iter()
                .map(|id| {
                    let messages = registry.resolve_messages(id, view)?;
                    let series = self.builder.build(&messages, grid);
                    debug!(
                        actor_id = %id,
                        messages = messages.len(),
                        active_buckets = series.active_buckets(),
                        "Built actor series"
                    );
                    Ok(series)
                })
                .collect()
        })
    }

    /// Phase two: one row per ordered pair of distinct actors, in
    /// (source index, target index) order.
    pub fn edge_table(&self, actor_ids: &[ActorId], series: &[ActorSeries]) -> FlowResult<EdgeTable> {
        if actor_ids.len() != series.len() {
            return Err(FlowError::config(format!(
                "{} actors but {} series maps",
                actor_ids.len(),
                series.len()
            )));
        }

        let n = actor_ids.len();
        let pairs: Vec<(usize, usize)> = (0..n)
            .flat_map(|i| (0..n).filter(move |&j| j != i).map(move |j| (i, j)))
            .collect();

        let mut rows: Vec<(usize, usize, TeEdge)> = self.pool.install(|| {
            pairs
                .par_iter()
                .map(|&(i, j)| {
                    let edge = self.edge_row(&actor_ids[i], &series[i], &actor_ids[j], &series[j])?;
                    Ok((i, j, edge))
                })
                .collect::<FlowResult<Vec<_>>>()
        })?;
        rows.sort_by_key(|&(i, j, _)| (i, j));

        let mut table = EdgeTable::new(self.plan.column_names(), self.include_total);
        table.edges = rows.into_iter().map(|(_, _, edge)| edge).collect();
        Ok(table)
    }

    fn edge_row(
        &self,
        source_id: &ActorId,
        source: &ActorSeries,
        target_id: &ActorId,
        target: &ActorSeries,
    ) -> FlowResult<TeEdge> {
        let mut values = Vec::with_capacity(self.plan.len());
        for pair in self.plan.pairs() {
            let x = source.get(&pair.source).ok_or_else(|| FlowError::MissingSeries {
                actor_id: source_id.clone(),
                class: pair.source.clone(),
            })?;
            let y = target.get(&pair.target).ok_or_else(|| FlowError::MissingSeries {
                actor_id: target_id.clone(),
                class: pair.target.clone(),
            })?;
            values.push(transfer_entropy(x, y)?);
        }

        let total = self.include_total.then(|| values.iter().sum());
        Ok(TeEdge {
            source: source_id.clone(),
            target: target_id.clone(),
            values,
            total,
        })
    }

    /// Build series and the edge table for `actor_ids` over `view`.
    pub fn compute(
        &self,
        registry: &ActorRegistry,
        actor_ids: &[ActorId],
        view: &[Message],
        grid: &TimeGrid,
    ) -> FlowResult<(EdgeTable, NetworkSummary)> {
        let started = Instant::now();

        let series = self.actor_series(registry, actor_ids, view, grid)?;
        let active_actors = series.iter().filter(|s| s.active_buckets() > 0).count();
        info!(
            actors = actor_ids.len(),
            active_actors,
            grid_points = grid.len(),
            last_point = ?grid.last_point(),
            "Built actor series"
        );

        let table = self.edge_table(actor_ids, &series)?;
        let summary = NetworkSummary {
            actors: actor_ids.len(),
            active_actors,
            comparison_pairs: self.plan.len(),
            rows: table.len(),
            duration_ms: started.elapsed().as_millis() as u64,
        };
        info!(
            actors = summary.actors,
            comparison_pairs = summary.comparison_pairs,
            rows = summary.rows,
            duration_ms = summary.duration_ms,
            "Computed transfer entropy network"
        );

        Ok((table, summary))
    }
}

impl std::fmt::Debug for TransferEntropyEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferEntropyEngine")
            .field("labels", &self.builder.labels())
            .field("comparison_pairs", &self.plan.len())
            .field("include_total", &self.include_total)
            .field("workers", &self.workers())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frequency::Frequency;
    use crate::store::MessageTable;
    use crate::timeseries::default_classes;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use infoflow_core::{MessageRecord, TimeWindow};

    fn at(hour: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2022, 1, 1, 0, 0, 0).unwrap() + Duration::hours(hour)
    }

    fn setup() -> (MessageTable, ActorRegistry, Vec<ActorId>, TimeGrid) {
        let mut records = Vec::new();
        for hour in [0, 3, 4, 8, 9] {
            records.push(MessageRecord::new(at(hour), "twitter", "amy").with_class("TF", 1));
            records.push(MessageRecord::new(at(hour + 1), "twitter", "bob").with_class("TF", 1));
        }
        records.push(MessageRecord::new(at(5), "twitter", "cat"));
        let table = MessageTable::from_records(records);

        let mut registry = ActorRegistry::default();
        let ids = registry.register_individuals(&table, 0).unwrap();
        let grid = TimeGrid::new(TimeWindow::new(at(0), at(11)), Frequency::parse("H").unwrap()).unwrap();
        (table, registry, ids, grid)
    }

    #[test]
    fn test_rows_for_every_ordered_pair() {
        let (table, registry, ids, grid) = setup();
        let engine = TransferEntropyEngine::new(SeriesBuilder::new(default_classes()).unwrap(), true, Some(2)).unwrap();
        let (edges, summary) = engine.compute(&registry, &ids, table.messages(), &grid).unwrap();

        assert_eq!(summary.actors, 3);
        assert_eq!(summary.rows, 6);
        assert_eq!(summary.comparison_pairs, 17);
        let order: Vec<(ActorId, ActorId)> = edges.edges.iter().map(|e| (e.source.clone(), e.target.clone())).collect();
        assert_eq!(order[0], (ids[0].clone(), ids[1].clone()));
        assert_eq!(order[1], (ids[0].clone(), ids[2].clone()));
        assert_eq!(order[5], (ids[2].clone(), ids[1].clone()));
        assert!(edges.edges.iter().all(|e| e.source != e.target));

        for edge in &edges.edges {
            assert!(edge.values.iter().all(|v| *v >= 0.0));
            let sum: f64 = edge.values.iter().sum();
            assert!((edge.total.unwrap() - sum).abs() < 1e-12);
        }
    }

    #[test]
    fn test_leader_has_higher_flow() {
        let (table, registry, ids, grid) = setup();
        let engine = TransferEntropyEngine::new(SeriesBuilder::new(default_classes()).unwrap(), false, Some(1)).unwrap();
        let (edges, _) = engine.compute(&registry, &ids, table.messages(), &grid).unwrap();

        let amy_to_bob = edges.value(&ids[0], &ids[1], "TF_TF").unwrap();
        let bob_to_amy = edges.value(&ids[1], &ids[0], "TF_TF").unwrap();
        assert!(amy_to_bob > bob_to_amy, "{amy_to_bob} vs {bob_to_amy}");
        assert!(edges.edges[0].total.is_none());
    }

    #[test]
    fn test_mismatched_inputs_are_rejected() {
        let engine = TransferEntropyEngine::new(SeriesBuilder::new(default_classes()).unwrap(), false, Some(1)).unwrap();
        let err = engine.edge_table(&[ActorId::from_index(0)], &[]).unwrap_err();
        assert!(err.is_config());

        let err = engine
            .edge_table(
                &[ActorId::from_index(0), ActorId::from_index(1)],
                &[ActorSeries::default(), ActorSeries::default()],
            )
            .unwrap_err();
        assert!(matches!(err, FlowError::MissingSeries { .. }));
    }

    #[test]
    fn test_zero_workers_rejected() {
        let builder = SeriesBuilder::new(default_classes()).unwrap();
        assert!(TransferEntropyEngine::new(builder, false, Some(0)).is_err());
        assert!(default_workers() >= 1);
    }
}
