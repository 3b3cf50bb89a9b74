//! Which class pairs are compared between two actors.
//!
//! A (source class, target class) pair is compared only when both labels fall
//! in the same comparability group: `*` alone, the dimension-A marginals, the
//! dimension-B marginals, or the configured classes.

use infoflow_core::ClassLabel;
use serde::{Deserialize, Serialize};

use crate::timeseries::ClassScheme;

/// Comparability group of a class label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComparabilityGroup {
    AnyActivity,
    MarginalA,
    MarginalB,
    Base,
}

impl ComparabilityGroup {
    /// Group of `label` under an optional superclass scheme.
    pub fn of(label: &ClassLabel, scheme: Option<&ClassScheme>) -> Self {
        if label.is_any() {
            return ComparabilityGroup::AnyActivity;
        }
        if let Some(scheme) = scheme {
            if scheme.marginals_a().contains(label) {
                return ComparabilityGroup::MarginalA;
            }
            if scheme.marginals_b().contains(label) {
                return ComparabilityGroup::MarginalB;
            }
        }
        ComparabilityGroup::Base
    }
}

/// A (source class, target class) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ComparisonPair {
    pub source: ClassLabel,
    pub target: ClassLabel,
}

impl ComparisonPair {
    /// Output column name, `<src>_<tgt>`.
    pub fn column_name(&self) -> String {
        format!("{}_{}", self.source, self.target)
    }
}

/// The valid comparison pairs, computed once per engine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComparisonPlan {
    pairs: Vec<ComparisonPair>,
}

impl ComparisonPlan {
    /// Pairs over `labels` in label order (source-major).
    pub fn new(labels: &[ClassLabel], scheme: Option<&ClassScheme>) -> Self {
        let groups: Vec<ComparabilityGroup> = labels
            .iter()
            .map(|label| ComparabilityGroup::of(label, scheme))
            .collect();

        let mut pairs = Vec::new();
        for (source, source_group) in labels.iter().zip(&groups) {
            for (target, target_group) in labels.iter().zip(&groups) {
                if source_group == target_group {
                    pairs.push(ComparisonPair {
                        source: source.clone(),
                        target: target.clone(),
                    });
                }
            }
        }
        Self { pairs }
    }

    pub fn pairs(&self) -> &[ComparisonPair] {
        &self.pairs
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Column names in pair order.
    pub fn column_names(&self) -> Vec<String> {
        self.pairs.iter().map(ComparisonPair::column_name).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeseries::{default_classes, SeriesBuilder};

    #[test]
    fn test_plan_without_superclasses() {
        let builder = SeriesBuilder::new(default_classes()).unwrap();
        let plan = ComparisonPlan::new(&builder.labels(), None);

        // 4x4 base pairs plus *_*
        assert_eq!(plan.len(), 17);
        let columns = plan.column_names();
        assert_eq!(columns[0], "TF_TF");
        assert_eq!(columns[1], "TF_TM");
        assert_eq!(columns.last().map(String::as_str), Some("*_*"));
        assert!(!columns.iter().any(|c| c.starts_with("*_") && c != "*_*"));
    }

    #[test]
    fn test_plan_never_crosses_groups() {
        let scheme = ClassScheme::default();
        let builder = SeriesBuilder::new(default_classes())
            .unwrap()
            .with_superclasses(scheme.clone())
            .unwrap();
        let plan = ComparisonPlan::new(&builder.labels(), Some(&scheme));

        // 16 base + 4 (T,U) + 4 (F,M) + 1
        assert_eq!(plan.len(), 25);
        for pair in plan.pairs() {
            assert_eq!(
                ComparabilityGroup::of(&pair.source, Some(&scheme)),
                ComparabilityGroup::of(&pair.target, Some(&scheme)),
                "{}",
                pair.column_name()
            );
        }

        let columns = plan.column_names();
        assert!(columns.contains(&"T_U".to_string()));
        assert!(columns.contains(&"M_F".to_string()));
        assert!(!columns.contains(&"T_F".to_string()));
        assert!(!columns.contains(&"TF_T".to_string()));
        assert!(!columns.contains(&"*_TF".to_string()));
    }
}
