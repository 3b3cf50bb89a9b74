//! Integration tests for infoflow-engine using synthetic message tables.

use chrono::{DateTime, Duration, TimeZone, Utc};
use infoflow_core::{ActorId, ActorKindTag, ClassLabel, MessageRecord, TimeWindow, WindowMode, TOTAL_COLUMN};
use infoflow_engine::{
    read_edge_table, ActorRegistry, ActorSelection, ClassScheme, ComparabilityGroup, FlowConfig, FlowError,
    FlowPipeline, GroupDefinition, MessageTable, WindowOutcome,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::TempDir;

// ============================================================================
// Test Data Builders
// ============================================================================

fn origin() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2022, 1, 1, 0, 0, 0).unwrap()
}

/// Builder for hourly synthetic activity.
#[derive(Default)]
struct TestDataBuilder {
    records: Vec<MessageRecord>,
}

impl TestDataBuilder {
    fn new() -> Self {
        Self::default()
    }

    /// One message by `user` inside hour `hour`, tagged with `class`.
    fn post(&mut self, hour: i64, platform: &str, user: &str, class: &str) -> &mut Self {
        let at = origin() + Duration::hours(hour) + Duration::minutes(10);
        self.records
            .push(MessageRecord::new(at, platform, user).with_class(class, 1));
        self
    }

    fn reply(&mut self, hour: i64, platform: &str, user: &str, parent: &str) -> &mut Self {
        let at = origin() + Duration::hours(hour) + Duration::minutes(20);
        self.records
            .push(MessageRecord::new(at, platform, user).with_parent(parent));
        self
    }

    fn build(&self) -> Vec<MessageRecord> {
        self.records.clone()
    }
}

/// Leader, follower one hour behind, and independent noise.
fn leader_follower_noise(hours: i64) -> Vec<MessageRecord> {
    let mut rng = StdRng::seed_from_u64(42);
    let mut builder = TestDataBuilder::new();
    for hour in 0..hours {
        if rng.random_bool(0.4) {
            builder.post(hour, "twitter", "alice", "TF");
            builder.post(hour + 1, "twitter", "bob", "TF");
        }
        if rng.random_bool(0.4) {
            builder.post(hour, "twitter", "carol", "TF");
        }
    }
    builder.build()
}

fn hourly_config(dir: &TempDir, hours: i64) -> FlowConfig {
    let mut config = FlowConfig::new(origin(), origin() + Duration::hours(hours));
    config.frequency = "H".parse().unwrap();
    config.output_dir = dir.path().to_path_buf();
    config.workers = Some(2);
    config
}

fn individual(pipeline: &FlowPipeline, user: &str) -> ActorId {
    pipeline
        .registry()
        .actors()
        .iter()
        .find(|a| a.kind.tag() == ActorKindTag::Individual && a.label == user)
        .map(|a| a.id.clone())
        .unwrap()
}

// ============================================================================
// End-to-end
// ============================================================================

#[test]
fn test_leader_transfers_to_follower() {
    let dir = TempDir::new().unwrap();
    let pipeline = FlowPipeline::new(hourly_config(&dir, 300), leader_follower_noise(300)).unwrap();
    let (table, summary) = pipeline.compute_window(pipeline.bounds()).unwrap();
    assert_eq!(summary.actors, 3);
    assert_eq!(summary.rows, 6);

    let a = individual(&pipeline, "alice");
    let b = individual(&pipeline, "bob");
    let c = individual(&pipeline, "carol");
    let te = |src: &ActorId, tgt: &ActorId| table.value(src, tgt, "TF_TF").unwrap();

    assert!(te(&a, &b) > te(&b, &a), "{} vs {}", te(&a, &b), te(&b, &a));
    assert!(te(&a, &b) > te(&a, &c));
    assert!(te(&a, &b) > te(&c, &a));
    assert!(te(&a, &b) > 0.5);

    let any = table.value(&a, &b, "*_*").unwrap();
    assert!((any - te(&a, &b)).abs() < 1e-12);
}

#[test]
fn test_superclass_columns_stay_within_groups() {
    let dir = TempDir::new().unwrap();
    let mut config = hourly_config(&dir, 100);
    config.add_superclasses = true;
    config.include_total = true;

    let pipeline = FlowPipeline::new(config, leader_follower_noise(100)).unwrap();
    let (table, _) = pipeline.compute_window(pipeline.bounds()).unwrap();
    let scheme = ClassScheme::default();

    assert_eq!(table.pair_columns.len(), 25);
    for column in &table.pair_columns {
        let (src, tgt) = column.rsplit_once('_').unwrap();
        assert_eq!(
            ComparabilityGroup::of(&ClassLabel::new(src), Some(&scheme)),
            ComparabilityGroup::of(&ClassLabel::new(tgt), Some(&scheme)),
            "{column}"
        );
    }
    assert_eq!(table.header().last().map(String::as_str), Some(TOTAL_COLUMN));
    for edge in &table.edges {
        let sum: f64 = edge.values.iter().sum();
        assert!((edge.total.unwrap() - sum).abs() < 1e-9);
    }
}

#[test]
fn test_csv_input_end_to_end() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("input");
    std::fs::create_dir(&input).unwrap();

    let mut csv = String::from("msg_id,datetime,platform,source_user_id,parent_source_user_id,class_TF,class_TM,class_UF,class_UM\n");
    for (idx, record) in leader_follower_noise(120).iter().enumerate() {
        csv.push_str(&format!(
            "{idx},{},{},{},,1,0,0,0\n",
            record.datetime.format("%Y-%m-%d %H:%M:%S%:z"),
            record.platform,
            record.source_user_id
        ));
    }
    // Repeated id, dropped.
    csv.push_str("0,2022-01-01 00:30:00+00:00,twitter,mallory,,1,0,0,0\n");
    std::fs::write(input.join("messages.csv"), csv).unwrap();

    let mut config = hourly_config(&dir, 120);
    config.output_dir = dir.path().join("out");
    let pipeline = FlowPipeline::from_inputs(config, &[input]).unwrap();
    assert!(pipeline.table().users().lookup("twitter", "mallory").is_none());

    let report = pipeline.run().unwrap();
    assert_eq!(report.completed(), 1);

    let table = read_edge_table(&pipeline.store().network_path()).unwrap();
    assert_eq!(table.len(), 6);
    assert_eq!(table.header()[..3], ["Source", "Target", "TF_TF"]);
}

// ============================================================================
// Actors
// ============================================================================

#[test]
fn test_id_assignments_are_disjoint() {
    let records = leader_follower_noise(50);
    let table = MessageTable::from_records(records);
    let mut registry = ActorRegistry::default();

    let platforms = registry.register_platforms(&table, 0).unwrap();
    let individuals = registry.register_individuals(&table, 0).unwrap();

    let max_first = platforms.iter().filter_map(ActorId::index).max().unwrap();
    let min_second = individuals.iter().filter_map(ActorId::index).min().unwrap();
    assert_eq!(min_second, max_first + 1);
    assert!(platforms.iter().all(|p| !individuals.contains(p)));
}

#[test]
fn test_parent_only_users_get_ids() {
    let mut builder = TestDataBuilder::new();
    builder.reply(0, "reddit", "dora", "ghost").reply(1, "reddit", "dora", "ghost");
    let table = MessageTable::from_records(builder.build());

    let ghost = table.users().lookup("reddit", "ghost").unwrap();
    assert_eq!(ghost.msgs_count, 0);
    assert_eq!(ghost.received_share_count, 2);
    assert!(table
        .messages()
        .iter()
        .all(|m| m.parent_user_id.as_ref() == Some(&ghost.id)));
}

#[test]
fn test_degenerate_group_differs_from_individual() {
    let dir = TempDir::new().unwrap();
    let mut config = hourly_config(&dir, 100);
    config.actors = ActorSelection::All;
    config.groups = vec![
        GroupDefinition::new("lonely")
            .with_member("twitter", "alice")
            .with_member("twitter", "not-in-data"),
        GroupDefinition::new("duo")
            .with_member("twitter", "alice")
            .with_member("twitter", "bob"),
    ];

    let pipeline = FlowPipeline::new(config, leader_follower_noise(100)).unwrap();
    let registry = pipeline.registry();
    let groups = registry.ids_of_kind(ActorKindTag::Group);
    assert_eq!(groups.len(), 2);

    let view = pipeline.table().messages();
    let alice = individual(&pipeline, "alice");
    assert!(registry.resolve_messages(&groups[0], view).unwrap().is_empty());
    assert!(!registry.resolve_messages(&alice, view).unwrap().is_empty());

    let duo = registry.resolve_messages(&groups[1], view).unwrap().len();
    let pair = registry.resolve_messages(&alice, view).unwrap().len()
        + registry.resolve_messages(&individual(&pipeline, "bob"), view).unwrap().len();
    assert_eq!(duo, pair);

    // Platform first, then three individuals, then the two groups.
    let indices: Vec<u64> = pipeline.actor_ids().iter().filter_map(ActorId::index).collect();
    assert_eq!(indices, vec![0, 1, 2, 3, 4, 5]);
}

#[test]
fn test_thresholds_exclude_before_assignment() {
    let dir = TempDir::new().unwrap();
    let mut builder = TestDataBuilder::new();
    for hour in 0..10 {
        builder.post(hour, "twitter", "busy", "TF");
    }
    builder.post(3, "twitter", "quiet", "TF");
    builder.post(4, "twitter", "other", "UM");

    let mut config = hourly_config(&dir, 12);
    config.min_user_messages = 2;
    let pipeline = FlowPipeline::new(config, builder.build()).unwrap();

    assert_eq!(pipeline.actor_ids(), vec![ActorId::from_index(0)]);
    assert_eq!(pipeline.registry().actors()[0].label, "busy");
}

#[test]
fn test_thresholds_count_only_messages_in_range() {
    let dir = TempDir::new().unwrap();
    let mut builder = TestDataBuilder::new();
    // Busy before the range, quiet inside it.
    for day in 0..5 {
        builder.post(24 * day, "twitter", "old", "TF");
    }
    for day in 10..13 {
        builder.post(24 * day, "twitter", "new", "TF");
    }

    let mut config = FlowConfig::new(origin() + Duration::days(9), origin() + Duration::days(19));
    config.output_dir = dir.path().to_path_buf();
    config.min_user_messages = 3;
    let pipeline = FlowPipeline::new(config, builder.build()).unwrap();

    let labels: Vec<&str> = pipeline.registry().actors().iter().map(|a| a.label.as_str()).collect();
    assert_eq!(labels, vec!["new"]);
    assert!(pipeline.table().users().lookup("twitter", "old").is_none());
    assert_eq!(pipeline.table().len(), 3);
}

#[test]
fn test_unknown_actor_is_surfaced() {
    let table = MessageTable::from_records(leader_follower_noise(10));
    let registry = ActorRegistry::default();
    let err = registry
        .resolve_messages(&ActorId::from_index(7), table.messages())
        .unwrap_err();
    assert!(matches!(err, FlowError::UnknownActor { .. }));
}

// ============================================================================
// Window series
// ============================================================================

#[test]
fn test_growing_series_writes_each_window() {
    let dir = TempDir::new().unwrap();
    let mut config = FlowConfig::new(origin(), origin() + Duration::days(8));
    config.frequency = "6H".parse().unwrap();
    config.output_dir = dir.path().to_path_buf();
    config.window_mode = Some(WindowMode::Growing);
    config.shift_days = 2;
    config.init_window_days = 2;
    config.workers = Some(1);

    // Activity over the first five days only.
    let pipeline = FlowPipeline::new(config, leader_follower_noise(24 * 5)).unwrap();
    let windows = pipeline.windows().unwrap();
    assert_eq!(windows.len(), 4);
    assert!(windows.iter().all(|w| w.start == origin()));

    let report = pipeline.run().unwrap();
    assert_eq!(report.completed(), 4);
    assert_eq!(report.failed(), 0);

    let files = pipeline.store().list_windows(WindowMode::Growing).unwrap();
    assert_eq!(files.len(), 4);
    for (file, window) in files.iter().zip(&windows) {
        assert!(file.ends_with(infoflow_engine::window_file_name(window)));
        let table = read_edge_table(file).unwrap();
        assert_eq!(table.len(), 6);
        assert_eq!(table.pair_columns.len(), 17);
    }

    let manifest = pipeline.store().load_manifest().unwrap().unwrap();
    assert_eq!(manifest.report.windows.len(), 4);
    assert!(pipeline.store().actors_path().exists());
}

#[test]
fn test_moving_series_skips_windows_without_data() {
    let dir = TempDir::new().unwrap();
    let mut config = FlowConfig::new(origin(), origin() + Duration::days(10));
    config.output_dir = dir.path().to_path_buf();
    config.window_mode = Some(WindowMode::Moving);
    config.shift_days = 3;
    config.init_window_days = 2;
    config.workers = Some(1);

    // Data within the first two days.
    let pipeline = FlowPipeline::new(config, leader_follower_noise(40)).unwrap();
    let report = pipeline.run().unwrap();

    // Anchors at days 0, 3, 6 and 9.
    assert_eq!(report.windows.len(), 4);
    assert!(report.windows[0].outcome.is_completed());
    for window in &report.windows[1..] {
        assert!(matches!(window.outcome, WindowOutcome::Skipped { .. }));
    }
    assert_eq!(pipeline.store().list_windows(WindowMode::Moving).unwrap().len(), 1);
}

#[test]
fn test_window_slack_sees_no_messages_after_range_end() {
    let dir = TempDir::new().unwrap();
    let end = origin() + Duration::days(7);
    let mut config = FlowConfig::new(origin(), end);
    config.output_dir = dir.path().to_path_buf();
    config.window_mode = Some(WindowMode::Moving);
    config.shift_days = 3;
    config.init_window_days = 3;
    config.workers = Some(1);

    // Activity continues well past the range end.
    let pipeline = FlowPipeline::new(config, leader_follower_noise(24 * 12)).unwrap();
    let windows = pipeline.windows().unwrap();
    let last = windows.last().unwrap();
    assert!(last.end > end, "last window reaches into the slack");

    let view = pipeline.table().window_view(last);
    assert!(!view.is_empty());
    assert!(view.iter().all(|m| m.datetime <= end));
    assert_eq!(pipeline.table().time_range().map(|(_, last)| last <= end), Some(true));
}

#[test]
fn test_window_view_is_closed_interval() {
    let table = MessageTable::from_records(vec![
        MessageRecord::new(origin(), "twitter", "amy"),
        MessageRecord::new(origin() + Duration::days(1), "twitter", "amy"),
        MessageRecord::new(origin() + Duration::days(1) + Duration::seconds(1), "twitter", "amy"),
    ]);
    let view = table.window_view(&TimeWindow::new(origin(), origin() + Duration::days(1)));
    assert_eq!(view.len(), 2);
}
