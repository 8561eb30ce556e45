//! Read-only statistics input.
//!
//! Statistics are produced elsewhere (a profiling job, a sketching pipeline)
//! and handed to the schema engine as plain data. The engine only ever reads
//! them through [`DatasetStatsView`] and [`FeatureStatsView`].

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::error::Result;
use crate::types::DataType;

/// Token that stands in for values too long to track individually.
///
/// Statistics generators fold oversized strings into this single value, so a
/// column containing it cannot be treated as a closed set of categories.
pub const LARGE_VALUE_PLACEHOLDER: &str = "__LARGE_VALUE__";

/// Observed count of one distinct value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueFrequency {
    pub value: String,
    pub count: u64,
}

impl ValueFrequency {
    pub fn new(value: impl Into<String>, count: u64) -> Self {
        Self {
            value: value.into(),
            count,
        }
    }
}

/// Statistics for one column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct FeatureStatistics {
    pub name: String,

    /// Number of non-missing values observed per data type
    #[serde(default)]
    pub type_counts: BTreeMap<DataType, u64>,

    /// Examples in which the column had at least one value
    #[serde(default)]
    pub num_present: u64,

    /// Examples in which the column was absent or null
    #[serde(default)]
    pub num_missing: u64,

    /// Fewest values in a single example (among present examples)
    #[serde(default)]
    pub min_num_values: u64,

    /// Most values in a single example
    #[serde(default)]
    pub max_num_values: u64,

    /// Distinct observed values with counts (categorical columns)
    #[serde(default)]
    pub values: Vec<ValueFrequency>,
}

impl FeatureStatistics {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Record `count` present scalar values of `data_type`.
    pub fn with_type(mut self, data_type: DataType, count: u64) -> Self {
        *self.type_counts.entry(data_type).or_insert(0) += count;
        self.num_present += count;
        if self.min_num_values == 0 {
            self.min_num_values = 1;
        }
        self.max_num_values = self.max_num_values.max(1);
        self
    }

    pub fn with_missing(mut self, num_missing: u64) -> Self {
        self.num_missing = num_missing;
        self
    }

    pub fn with_num_values(mut self, min: u64, max: u64) -> Self {
        self.min_num_values = min;
        self.max_num_values = max;
        self
    }

    pub fn with_values<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = (S, u64)>,
        S: Into<String>,
    {
        self.values = values
            .into_iter()
            .map(|(value, count)| ValueFrequency::new(value, count))
            .collect();
        self
    }
}

/// Statistics for one dataset (one batch of examples).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct DatasetStatistics {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub num_examples: u64,

    #[serde(default)]
    pub features: Vec<FeatureStatistics>,
}

impl DatasetStatistics {
    pub fn new(name: impl Into<String>, num_examples: u64) -> Self {
        Self {
            name: name.into(),
            num_examples,
            features: Vec::new(),
        }
    }

    pub fn with_feature(mut self, feature: FeatureStatistics) -> Self {
        self.features.push(feature);
        self
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

// ============================================================================
// Views
// ============================================================================

/// Name-indexed, environment-aware view over [`DatasetStatistics`].
#[derive(Debug, Clone)]
pub struct DatasetStatsView<'a> {
    stats: &'a DatasetStatistics,
    environment: Option<String>,
    by_name: HashMap<&'a str, usize>,
}

impl<'a> DatasetStatsView<'a> {
    pub fn new(stats: &'a DatasetStatistics) -> Self {
        let mut by_name = HashMap::with_capacity(stats.features.len());
        for (idx, feature) in stats.features.iter().enumerate() {
            // First occurrence wins for duplicated column names
            by_name.entry(feature.name.as_str()).or_insert(idx);
        }
        Self {
            stats,
            environment: None,
            by_name,
        }
    }

    /// Evaluate presence rules as if the data came from `environment`.
    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = Some(environment.into());
        self
    }

    pub fn environment(&self) -> Option<&str> {
        self.environment.as_deref()
    }

    pub fn name(&self) -> &'a str {
        &self.stats.name
    }

    pub fn num_examples(&self) -> u64 {
        self.stats.num_examples
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn feature(&self, name: &str) -> Option<FeatureStatsView<'a>> {
        self.by_name
            .get(name)
            .map(|&idx| FeatureStatsView::new(&self.stats.features[idx]))
    }

    /// Every column, in input order (duplicates skipped).
    pub fn features(&self) -> impl Iterator<Item = FeatureStatsView<'a>> + '_ {
        self.stats
            .features
            .iter()
            .enumerate()
            .filter(move |(idx, f)| self.by_name.get(f.name.as_str()) == Some(idx))
            .map(|(_, f)| FeatureStatsView::new(f))
    }

    pub fn feature_names(&self) -> Vec<&'a str> {
        self.features().map(|f| f.name()).collect()
    }
}

/// Read-only queries over one column's statistics.
#[derive(Debug, Clone, Copy)]
pub struct FeatureStatsView<'a> {
    stats: &'a FeatureStatistics,
}

impl<'a> FeatureStatsView<'a> {
    pub fn new(stats: &'a FeatureStatistics) -> Self {
        Self { stats }
    }

    pub fn name(&self) -> &'a str {
        &self.stats.name
    }

    pub fn num_present(&self) -> u64 {
        self.stats.num_present
    }

    pub fn num_missing(&self) -> u64 {
        self.stats.num_missing
    }

    /// True when the statistics carry no observations at all.
    pub fn is_empty(&self) -> bool {
        self.stats.num_present == 0 && self.stats.num_missing == 0
    }

    /// Fraction of examples in which the column was present.
    pub fn presence_fraction(&self) -> f64 {
        let total = self.stats.num_present + self.stats.num_missing;
        if total == 0 {
            return 0.0;
        }
        self.stats.num_present as f64 / total as f64
    }

    pub fn min_num_values(&self) -> u64 {
        self.stats.min_num_values
    }

    pub fn max_num_values(&self) -> u64 {
        self.stats.max_num_values
    }

    /// Narrowest type covering every observed value, or `None` if no value
    /// was observed.
    pub fn observed_type(&self) -> Option<DataType> {
        self.stats
            .type_counts
            .iter()
            .filter(|(_, &count)| count > 0)
            .map(|(&data_type, _)| data_type)
            .reduce(DataType::unify)
    }

    pub fn values(&self) -> &'a [ValueFrequency] {
        &self.stats.values
    }

    /// Distinct observed values in input order.
    pub fn distinct_values(&self) -> impl Iterator<Item = &'a str> {
        self.stats
            .values
            .iter()
            .filter(|v| v.count > 0)
            .map(|v| v.value.as_str())
    }

    pub fn num_distinct(&self) -> usize {
        self.distinct_values().count()
    }

    /// True if oversized values were folded into [`LARGE_VALUE_PLACEHOLDER`].
    pub fn has_large_values(&self) -> bool {
        self.distinct_values().any(|v| v == LARGE_VALUE_PLACEHOLDER)
    }

    /// value -> count / total count. Empty when no value was observed.
    pub fn value_distribution(&self) -> BTreeMap<String, f64> {
        let total: u64 = self.stats.values.iter().map(|v| v.count).sum();
        let mut distribution = BTreeMap::new();
        if total == 0 {
            return distribution;
        }
        for v in &self.stats.values {
            if v.count > 0 {
                *distribution.entry(v.value.clone()).or_insert(0.0) +=
                    v.count as f64 / total as f64;
            }
        }
        distribution
    }
}
