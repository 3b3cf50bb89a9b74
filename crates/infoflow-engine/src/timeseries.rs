//! Binary activity time series.
//!
//! Every actor in a window is sampled on the same [`TimeGrid`], so two series
//! built for the same window always have equal length.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use infoflow_core::{ClassLabel, Message, TimeWindow, DEFAULT_BASE_CLASSES};
use serde::{Deserialize, Serialize};

use crate::error::{FlowError, FlowResult};
use crate::frequency::Frequency;

/// A 0/1 series aligned to a [`TimeGrid`].
pub type BinarySeries = Vec<u8>;

// =============================================================================
// Time Grid
// =============================================================================

/// Grid points `start + k * step` not after the window end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeGrid {
    window: TimeWindow,
    frequency: Frequency,
    len: usize,
}

impl TimeGrid {
    /// Build the grid of `window`; the window must have `start < end`.
    pub fn new(window: TimeWindow, frequency: Frequency) -> FlowResult<Self> {
        if window.start >= window.end {
            return Err(FlowError::InvalidWindow {
                start: window.start,
                end: window.end,
            });
        }
        let len = frequency.grid_len(window.start, window.end);
        Ok(Self { window, frequency, len })
    }

    pub fn window(&self) -> &TimeWindow {
        &self.window
    }

    pub fn frequency(&self) -> &Frequency {
        &self.frequency
    }

    /// Number of grid points.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Bucket index of `instant`, `None` outside the window.
    pub fn bucket_of(&self, instant: DateTime<Utc>) -> Option<usize> {
        if !self.window.contains(instant) {
            return None;
        }
        self.frequency
            .bucket_of(self.window.start, instant)
            .filter(|&bucket| bucket < self.len)
    }

    /// Grid point `k`, `None` past the last one.
    pub fn point(&self, k: usize) -> Option<DateTime<Utc>> {
        if k >= self.len {
            return None;
        }
        let offset = i64::try_from(k).ok()?.checked_mul(self.frequency.step().num_milliseconds())?;
        Some(self.window.start + Duration::milliseconds(offset))
    }

    /// The last grid point.
    pub fn last_point(&self) -> Option<DateTime<Utc>> {
        self.point(self.len.checked_sub(1)?)
    }
}

// =============================================================================
// Class Scheme
// =============================================================================

/// Two binary dimensions whose labels combine into the four base classes.
///
/// With dimension A = {T, U} and dimension B = {F, M} the base classes are
/// `TF, TM, UF, UM` and the marginals are `T, U, F, M`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassScheme {
    pub dimension_a: [String; 2],
    pub dimension_b: [String; 2],
}

impl Default for ClassScheme {
    fn default() -> Self {
        Self {
            dimension_a: ["T".to_string(), "U".to_string()],
            dimension_b: ["F".to_string(), "M".to_string()],
        }
    }
}

impl ClassScheme {
    /// Base classes in `xp, xq, yp, yq` order.
    pub fn base_classes(&self) -> [ClassLabel; 4] {
        let [x, y] = &self.dimension_a;
        let [p, q] = &self.dimension_b;
        [
            ClassLabel::new(format!("{x}{p}")),
            ClassLabel::new(format!("{x}{q}")),
            ClassLabel::new(format!("{y}{p}")),
            ClassLabel::new(format!("{y}{q}")),
        ]
    }

    /// Dimension A marginals, then dimension B marginals.
    pub fn marginals(&self) -> [ClassLabel; 4] {
        let [x, y] = &self.dimension_a;
        let [p, q] = &self.dimension_b;
        [x, y, p, q].map(|label| ClassLabel::new(label.as_str()))
    }

    /// Dimension A marginal labels.
    pub fn marginals_a(&self) -> [ClassLabel; 2] {
        self.dimension_a.clone().map(ClassLabel::new)
    }

    /// Dimension B marginal labels.
    pub fn marginals_b(&self) -> [ClassLabel; 2] {
        self.dimension_b.clone().map(ClassLabel::new)
    }

    /// Each marginal with the two base classes it is the union of.
    fn compositions(&self) -> [(ClassLabel, [ClassLabel; 2]); 4] {
        let [xp, xq, yp, yq] = self.base_classes();
        let [x, y, p, q] = self.marginals();
        [
            (x, [xp.clone(), xq.clone()]),
            (y, [yp.clone(), yq.clone()]),
            (p, [xp, yp]),
            (q, [xq, yq]),
        ]
    }

    fn validate(&self) -> FlowResult<()> {
        let labels = self.dimension_a.iter().chain(self.dimension_b.iter());
        for label in labels {
            if label.is_empty() || label.as_str() == infoflow_core::ANY_ACTIVITY {
                return Err(FlowError::config(format!("invalid dimension label {label:?}")));
            }
        }
        if self.dimension_a[0] == self.dimension_a[1] || self.dimension_b[0] == self.dimension_b[1] {
            return Err(FlowError::config("dimension labels must differ"));
        }
        Ok(())
    }
}

/// The default class labels.
pub fn default_classes() -> Vec<ClassLabel> {
    DEFAULT_BASE_CLASSES.iter().map(|&c| ClassLabel::new(c)).collect()
}

// =============================================================================
// Series Builder
// =============================================================================

/// All series of one actor in one window, keyed by class label.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActorSeries {
    series: BTreeMap<ClassLabel, BinarySeries>,
}

impl ActorSeries {
    pub fn get(&self, class: &ClassLabel) -> Option<&BinarySeries> {
        self.series.get(class)
    }

    pub fn labels(&self) -> impl Iterator<Item = &ClassLabel> {
        self.series.keys()
    }

    /// Number of class series.
    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// Number of active buckets in the `*` series.
    pub fn active_buckets(&self) -> usize {
        self.series
            .get(&ClassLabel::any())
            .map(|s| s.iter().filter(|&&v| v > 0).count())
            .unwrap_or(0)
    }
}

/// Builds [`ActorSeries`] for configured classes.
#[derive(Debug, Clone)]
pub struct SeriesBuilder {
    classes: Vec<ClassLabel>,
    superclasses: Option<ClassScheme>,
}

impl SeriesBuilder {
    /// Builder for `classes` without superclass composition.
    pub fn new(classes: Vec<ClassLabel>) -> FlowResult<Self> {
        if classes.iter().any(ClassLabel::is_any) {
            return Err(FlowError::config("\"*\" is reserved for the any-activity series"));
        }
        let mut deduped: Vec<ClassLabel> = Vec::with_capacity(classes.len());
        for class in classes {
            if !deduped.contains(&class) {
                deduped.push(class);
            }
        }
        Ok(Self {
            classes: deduped,
            superclasses: None,
        })
    }

    /// Also compose the four marginal series of `scheme`. Its four base classes
    /// must be among the configured classes.
    pub fn with_superclasses(mut self, scheme: ClassScheme) -> FlowResult<Self> {
        scheme.validate()?;
        let missing: Vec<String> = scheme
            .base_classes()
            .iter()
            .filter(|c| !self.classes.contains(c))
            .map(ToString::to_string)
            .collect();
        if !missing.is_empty() {
            return Err(FlowError::config(format!(
                "superclasses need base classes {}",
                missing.join(", ")
            )));
        }
        let clashing: Vec<String> = scheme
            .marginals()
            .iter()
            .filter(|m| self.classes.contains(m))
            .map(ToString::to_string)
            .collect();
        if !clashing.is_empty() {
            return Err(FlowError::config(format!(
                "classes {} collide with superclass labels",
                clashing.join(", ")
            )));
        }
        self.superclasses = Some(scheme);
        Ok(self)
    }

    pub fn classes(&self) -> &[ClassLabel] {
        &self.classes
    }

    pub fn superclasses(&self) -> Option<&ClassScheme> {
        self.superclasses.as_ref()
    }

    /// Series labels in output order: classes, marginals, then `*`.
    pub fn labels(&self) -> Vec<ClassLabel> {
        let mut labels = self.classes.clone();
        if let Some(scheme) = &self.superclasses {
            labels.extend(scheme.marginals());
        }
        labels.push(ClassLabel::any());
        labels
    }

    /// Build every series of one actor from its messages in one pass.
    pub fn build(&self, messages: &[&Message], grid: &TimeGrid) -> ActorSeries {
        let mut series: BTreeMap<ClassLabel, BinarySeries> = self
            .classes
            .iter()
            .cloned()
            .chain(std::iter::once(ClassLabel::any()))
            .map(|label| (label, vec![0u8; grid.len()]))
            .collect();

        for message in messages {
            let Some(bucket) = grid.bucket_of(message.datetime) else {
                continue;
            };
            for class in &self.classes {
                if message.has_class(class) {
                    if let Some(values) = series.get_mut(class) {
                        values[bucket] = 1;
                    }
                }
            }
            if let Some(values) = series.get_mut(&ClassLabel::any()) {
                values[bucket] = 1;
            }
        }

        if let Some(scheme) = &self.superclasses {
            for (marginal, [left, right]) in scheme.compositions() {
                let union = match (series.get(&left), series.get(&right)) {
                    (Some(l), Some(r)) => l.iter().zip(r).map(|(a, b)| a | b).collect(),
                    _ => vec![0u8; grid.len()],
                };
                series.insert(marginal, union);
            }
        }

        ActorSeries { series }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use infoflow_core::{MessageId, UserId};

    fn at(hour: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2022, 1, 1, 0, 0, 0).unwrap() + Duration::hours(hour)
    }

    fn message(hour: i64, classes: &[&str]) -> Message {
        Message {
            id: MessageId::from_index(hour as usize),
            datetime: at(hour),
            platform: "twitter".into(),
            source_user_id: "amy".into(),
            parent_source_user_id: None,
            user_id: UserId::from_index(0),
            parent_user_id: None,
            class_counts: classes.iter().map(|&c| (ClassLabel::new(c), 1)).collect(),
        }
    }

    fn grid() -> TimeGrid {
        TimeGrid::new(TimeWindow::new(at(0), at(24)), Frequency::parse("6H").unwrap()).unwrap()
    }

    #[test]
    fn test_long_fine_grid_points_do_not_wrap() {
        // More than i32::MAX one-second steps.
        let start = Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2072, 1, 1, 0, 0, 0).unwrap();
        let grid = TimeGrid::new(TimeWindow::new(start, end), Frequency::parse("1S").unwrap()).unwrap();
        assert!(grid.len() > i32::MAX as usize);
        assert_eq!(grid.last_point(), Some(end));

        let k = i32::MAX as usize + 10;
        assert_eq!(grid.point(k), Some(start + Duration::seconds(k as i64)));
    }

    #[test]
    fn test_grid_len_and_points() {
        let grid = grid();
        assert_eq!(grid.len(), 5);
        assert_eq!(grid.point(4), Some(at(24)));
        assert_eq!(grid.last_point(), Some(at(24)));
        assert_eq!(grid.point(5), None);
        assert_eq!(grid.bucket_of(at(13)), Some(2));
        assert_eq!(grid.bucket_of(at(25)), None);
        assert_eq!(grid.bucket_of(at(-1)), None);
    }

    #[test]
    fn test_grid_rejects_empty_window() {
        let err = TimeGrid::new(TimeWindow::new(at(5), at(5)), Frequency::parse("H").unwrap()).unwrap_err();
        assert!(matches!(err, FlowError::InvalidWindow { .. }));
    }

    #[test]
    fn test_build_marks_buckets() {
        let builder = SeriesBuilder::new(default_classes()).unwrap();
        let messages = [message(1, &["TF"]), message(2, &["TF", "UM"]), message(19, &[])];
        let refs: Vec<&Message> = messages.iter().collect();
        let series = builder.build(&refs, &grid());

        assert_eq!(series.get(&"TF".into()).unwrap(), &vec![1, 0, 0, 0, 0]);
        assert_eq!(series.get(&"UM".into()).unwrap(), &vec![1, 0, 0, 0, 0]);
        assert_eq!(series.get(&"TM".into()).unwrap(), &vec![0, 0, 0, 0, 0]);
        assert_eq!(series.get(&ClassLabel::any()).unwrap(), &vec![1, 0, 0, 1, 0]);
        assert_eq!(series.len(), 5);
        assert_eq!(series.active_buckets(), 2);
    }

    #[test]
    fn test_build_without_messages_is_all_zero() {
        let builder = SeriesBuilder::new(default_classes()).unwrap();
        let series = builder.build(&[], &grid());
        for label in builder.labels() {
            assert!(series.get(&label).unwrap().iter().all(|&v| v == 0));
        }
    }

    #[test]
    fn test_superclasses_are_unions() {
        let builder = SeriesBuilder::new(default_classes())
            .unwrap()
            .with_superclasses(ClassScheme::default())
            .unwrap();
        let messages = [message(0, &["TF"]), message(7, &["UM"]), message(13, &["TM"])];
        let refs: Vec<&Message> = messages.iter().collect();
        let series = builder.build(&refs, &grid());

        assert_eq!(series.get(&"T".into()).unwrap(), &vec![1, 0, 1, 0, 0]);
        assert_eq!(series.get(&"U".into()).unwrap(), &vec![0, 1, 0, 0, 0]);
        assert_eq!(series.get(&"F".into()).unwrap(), &vec![1, 0, 0, 0, 0]);
        assert_eq!(series.get(&"M".into()).unwrap(), &vec![0, 1, 1, 0, 0]);

        let labels: Vec<String> = builder.labels().iter().map(ToString::to_string).collect();
        assert_eq!(labels, vec!["TF", "TM", "UF", "UM", "T", "U", "F", "M", "*"]);
    }

    #[test]
    fn test_superclasses_require_base_classes() {
        let err = SeriesBuilder::new(vec!["TF".into(), "TM".into()])
            .unwrap()
            .with_superclasses(ClassScheme::default())
            .unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_superclasses_reject_class_named_like_a_marginal() {
        let classes = ["TF", "TM", "UF", "UM", "T"].map(ClassLabel::new).to_vec();
        let err = SeriesBuilder::new(classes)
            .unwrap()
            .with_superclasses(ClassScheme::default())
            .unwrap_err();
        assert!(err.is_config());
        assert!(err.to_string().contains('T'));

        // Without composition the same label is an ordinary class.
        let classes = ["TF", "T"].map(ClassLabel::new).to_vec();
        let labels = SeriesBuilder::new(classes).unwrap().labels();
        assert_eq!(labels.iter().filter(|l| l.as_str() == "T").count(), 1);
    }

    #[test]
    fn test_custom_scheme_labels() {
        let scheme = ClassScheme {
            dimension_a: ["L".into(), "R".into()],
            dimension_b: ["1".into(), "2".into()],
        };
        let base: Vec<String> = scheme.base_classes().iter().map(ToString::to_string).collect();
        assert_eq!(base, vec!["L1", "L2", "R1", "R2"]);
        assert!(SeriesBuilder::new(vec!["*".into()]).is_err());
    }
}
