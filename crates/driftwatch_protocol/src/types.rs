//! Schema document and anomaly types (canonical definitions)

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{ProtocolError, Result};

/// Current version of the persisted [`SchemaDocument`] layout.
pub const SCHEMA_DOCUMENT_VERSION: u32 = 1;

// ============================================================================
// Data Types
// ============================================================================

/// Canonical column data type.
///
/// Ordering of the variants carries no meaning; type compatibility lives in
/// [`DataType::unify`] and [`DataType::is_lossless_widening`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    /// Boolean (true/false)
    Boolean,
    /// 64-bit signed integer
    Int64,
    /// 64-bit floating point
    Float64,
    /// Date (no time component)
    Date,
    /// Timestamp without timezone
    Timestamp,
    /// UTF-8 string (default/fallback)
    #[default]
    String,
    /// Raw bytes
    Binary,
}

impl DataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Boolean => "boolean",
            DataType::Int64 => "int64",
            DataType::Float64 => "float64",
            DataType::Date => "date",
            DataType::Timestamp => "timestamp",
            DataType::String => "string",
            DataType::Binary => "binary",
        }
    }

    /// Returns all data types.
    pub fn all() -> Vec<DataType> {
        vec![
            DataType::Boolean,
            DataType::Int64,
            DataType::Float64,
            DataType::Date,
            DataType::Timestamp,
            DataType::String,
            DataType::Binary,
        ]
    }

    /// Returns true if this type is numeric
    pub fn is_numeric(&self) -> bool {
        matches!(self, DataType::Int64 | DataType::Float64)
    }

    /// Returns true if this type is temporal
    pub fn is_temporal(&self) -> bool {
        matches!(self, DataType::Date | DataType::Timestamp)
    }

    /// Returns true if values of this type can populate a string domain.
    pub fn is_string_like(&self) -> bool {
        matches!(self, DataType::String | DataType::Binary)
    }

    /// The narrowest type that holds values of both `self` and `other`.
    ///
    /// Binary absorbs everything, String absorbs everything but Binary,
    /// numeric and temporal types widen within their family, and any
    /// cross-family pair falls back to String.
    pub fn unify(self, other: DataType) -> DataType {
        use DataType::*;
        if self == other {
            return self;
        }
        match (self, other) {
            (Binary, _) | (_, Binary) => Binary,
            (String, _) | (_, String) => String,
            (Boolean, Int64) | (Int64, Boolean) => Int64,
            (Boolean, Float64) | (Float64, Boolean) => Float64,
            (Int64, Float64) | (Float64, Int64) => Float64,
            (Date, Timestamp) | (Timestamp, Date) => Timestamp,
            _ => String,
        }
    }

    /// True when moving from `from` to `to` keeps every value representable
    /// without changing its family (e.g. Int64 -> Float64).
    pub fn is_lossless_widening(from: DataType, to: DataType) -> bool {
        use DataType::*;
        matches!(
            (from, to),
            (Boolean, Int64)
                | (Boolean, Float64)
                | (Int64, Float64)
                | (Date, Timestamp)
                | (String, Binary)
        )
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for DataType {
    type Err = ProtocolError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "boolean" | "bool" => Ok(DataType::Boolean),
            "int64" | "int" | "integer" => Ok(DataType::Int64),
            "float64" | "float" | "double" => Ok(DataType::Float64),
            "date" => Ok(DataType::Date),
            "timestamp" | "datetime" => Ok(DataType::Timestamp),
            "string" | "str" | "utf8" => Ok(DataType::String),
            "binary" | "bytes" => Ok(DataType::Binary),
            _ => Err(ProtocolError::InvalidDataType(s.to_string())),
        }
    }
}

// ============================================================================
// Severity
// ============================================================================

/// How much an anomaly matters. Ordered: `Unknown < Warning < Error`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    /// Nothing worth reporting (yet)
    #[default]
    Unknown,
    /// Drift that was absorbed but deserves a look
    Warning,
    /// Drift that breaks the declared contract
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Unknown => "UNKNOWN",
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
        }
    }

    /// Raise to `other` if it is worse. Never lowers.
    pub fn raise(&mut self, other: Severity) {
        if other > *self {
            *self = other;
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "UNKNOWN" => Ok(Severity::Unknown),
            "WARNING" => Ok(Severity::Warning),
            "ERROR" => Ok(Severity::Error),
            _ => Err(format!(
                "Invalid severity: '{}'. Expected: unknown, warning, or error",
                s
            )),
        }
    }
}

// ============================================================================
// Anomaly Descriptions
// ============================================================================

/// Category of a reported anomaly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    /// A column not declared in the schema was observed
    NewColumn,
    /// Observed values do not match the declared data type
    UnexpectedType,
    /// Values per example fell outside the declared range
    ValueCountChanged,
    /// The column is present in fewer examples than required
    PresenceBelowThreshold,
    /// Categorical values missing from the column's domain
    UnexpectedStringValues,
    /// A required column has no statistics at all
    MissingColumn,
    /// Feature references a domain that does not exist
    DanglingDomain,
    /// Feature has a domain but a non-string type
    DomainTypeConflict,
    /// Declared value count has min > max
    InvalidValueCount,
    /// Declared presence fraction outside [0, 1]
    InvalidPresence,
    /// Environment listed more than once
    DuplicateEnvironment,
    /// Current distribution diverged from the skew reference
    SkewDivergence,
}

impl AnomalyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnomalyKind::NewColumn => "new_column",
            AnomalyKind::UnexpectedType => "unexpected_type",
            AnomalyKind::ValueCountChanged => "value_count_changed",
            AnomalyKind::PresenceBelowThreshold => "presence_below_threshold",
            AnomalyKind::UnexpectedStringValues => "unexpected_string_values",
            AnomalyKind::MissingColumn => "missing_column",
            AnomalyKind::DanglingDomain => "dangling_domain",
            AnomalyKind::DomainTypeConflict => "domain_type_conflict",
            AnomalyKind::InvalidValueCount => "invalid_value_count",
            AnomalyKind::InvalidPresence => "invalid_presence",
            AnomalyKind::DuplicateEnvironment => "duplicate_environment",
            AnomalyKind::SkewDivergence => "skew_divergence",
        }
    }
}

impl fmt::Display for AnomalyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One reported anomaly: a kind plus a short and a long human-readable text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Description {
    pub kind: AnomalyKind,
    pub short_description: String,
    pub description: String,
}

impl Description {
    pub fn new(
        kind: AnomalyKind,
        short_description: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            short_description: short_description.into(),
            description: description.into(),
        }
    }
}

impl fmt::Display for Description {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.kind, self.short_description, self.description)
    }
}

// ============================================================================
// Schema Document
// ============================================================================

/// Whether a column must be present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PresencePolicy {
    Required,
    #[default]
    Optional,
}

/// Presence constraint of a feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeaturePresence {
    pub policy: PresencePolicy,

    /// Minimum fraction of examples the column must appear in
    #[serde(default)]
    pub min_fraction: f64,
}

impl FeaturePresence {
    pub fn required() -> Self {
        Self {
            policy: PresencePolicy::Required,
            min_fraction: 1.0,
        }
    }

    pub fn optional() -> Self {
        Self {
            policy: PresencePolicy::Optional,
            min_fraction: 0.0,
        }
    }

    pub fn with_min_fraction(mut self, min_fraction: f64) -> Self {
        self.min_fraction = min_fraction;
        self
    }

    pub fn is_required(&self) -> bool {
        self.policy == PresencePolicy::Required
    }
}

impl Default for FeaturePresence {
    fn default() -> Self {
        Self::optional()
    }
}

/// Bounds on the number of values per example. `max == 1` is a scalar column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueCount {
    pub min: u64,
    pub max: u64,
}

impl ValueCount {
    pub fn new(min: u64, max: u64) -> Self {
        Self { min, max }
    }

    pub fn scalar() -> Self {
        Self { min: 1, max: 1 }
    }

    pub fn is_scalar(&self) -> bool {
        self.max <= 1
    }

    pub fn contains(&self, min: u64, max: u64) -> bool {
        min >= self.min && max <= self.max
    }
}

/// Reference distribution recorded for skew detection.
///
/// An empty `reference` means "record the next observation as reference".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SkewComparator {
    /// value -> normalized frequency
    #[serde(default)]
    pub reference: BTreeMap<String, f64>,
}

impl SkewComparator {
    pub fn is_established(&self) -> bool {
        !self.reference.is_empty()
    }
}

/// Expected shape of one column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    /// Column name (unique across features and sparse features)
    pub name: String,

    /// Declared data type
    #[serde(rename = "type")]
    pub data_type: DataType,

    /// Name of the string domain holding allowed values (categorical columns)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,

    #[serde(default)]
    pub presence: FeaturePresence,

    /// Values per example; `None` leaves the shape unconstrained
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_count: Option<ValueCount>,

    /// Environments this feature applies to; empty means all
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub in_environment: Vec<String>,

    #[serde(default)]
    pub deprecated: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skew_comparator: Option<SkewComparator>,
}

impl Feature {
    /// Create an optional, unconstrained feature
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            domain: None,
            presence: FeaturePresence::optional(),
            value_count: None,
            in_environment: Vec::new(),
            deprecated: false,
            skew_comparator: None,
        }
    }

    /// Create a feature that must be present in every example
    pub fn required(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            presence: FeaturePresence::required(),
            ..Self::new(name, data_type)
        }
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn with_presence(mut self, presence: FeaturePresence) -> Self {
        self.presence = presence;
        self
    }

    pub fn with_value_count(mut self, value_count: ValueCount) -> Self {
        self.value_count = Some(value_count);
        self
    }

    pub fn in_environments<I, S>(mut self, environments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.in_environment = environments.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_skew_comparator(mut self, comparator: SkewComparator) -> Self {
        self.skew_comparator = Some(comparator);
        self
    }
}

/// A feature assembled from several underlying columns (index/value pairs).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SparseFeature {
    pub name: String,

    /// Columns holding the indices
    pub index_features: Vec<String>,

    /// Column holding the values
    pub value_feature: String,

    #[serde(default)]
    pub presence: FeaturePresence,

    #[serde(default)]
    pub deprecated: bool,
}

impl SparseFeature {
    pub fn new(
        name: impl Into<String>,
        index_features: Vec<String>,
        value_feature: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            index_features,
            value_feature: value_feature.into(),
            presence: FeaturePresence::optional(),
            deprecated: false,
        }
    }

    pub fn with_presence(mut self, presence: FeaturePresence) -> Self {
        self.presence = presence;
        self
    }

    /// Every underlying column, indices first.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.index_features
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(self.value_feature.as_str()))
    }
}

/// Named, ordered, deduplicated set of allowed categorical values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StringDomain {
    pub name: String,
    #[serde(default)]
    pub values: Vec<String>,
}

impl StringDomain {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            values: Vec::new(),
        }
    }

    pub fn with_values<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.values = values.into_iter().map(Into::into).collect();
        self
    }

    pub fn contains(&self, value: &str) -> bool {
        self.values.iter().any(|v| v == value)
    }
}

/// The persisted schema: consumed by `Schema::init`, produced by `Schema::snapshot`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaDocument {
    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default)]
    pub features: Vec<Feature>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sparse_features: Vec<SparseFeature>,

    #[serde(default)]
    pub string_domains: Vec<StringDomain>,

    /// Environments known to this schema
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub environments: Vec<String>,
}

fn default_version() -> u32 {
    SCHEMA_DOCUMENT_VERSION
}

impl Default for SchemaDocument {
    fn default() -> Self {
        Self {
            version: SCHEMA_DOCUMENT_VERSION,
            features: Vec::new(),
            sparse_features: Vec::new(),
            string_domains: Vec::new(),
            environments: Vec::new(),
        }
    }
}

impl SchemaDocument {
    /// Decode a document, rejecting versions newer than this build understands.
    pub fn from_json(json: &str) -> Result<Self> {
        let doc: SchemaDocument = serde_json::from_str(json)?;
        if doc.version > SCHEMA_DOCUMENT_VERSION {
            return Err(ProtocolError::UnsupportedVersion {
                found: doc.version,
                supported: SCHEMA_DOCUMENT_VERSION,
            });
        }
        Ok(doc)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn feature(&self, name: &str) -> Option<&Feature> {
        self.features.iter().find(|f| f.name == name)
    }

    pub fn string_domain(&self, name: &str) -> Option<&StringDomain> {
        self.string_domains.iter().find(|d| d.name == name)
    }

    /// Stable content hash, see [`crate::fingerprint::schema_fingerprint`].
    pub fn fingerprint(&self) -> String {
        crate::fingerprint::schema_fingerprint(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unify_widens_within_family() {
        assert_eq!(DataType::Int64.unify(DataType::Float64), DataType::Float64);
        assert_eq!(DataType::Boolean.unify(DataType::Int64), DataType::Int64);
        assert_eq!(DataType::Date.unify(DataType::Timestamp), DataType::Timestamp);
        assert_eq!(DataType::Int64.unify(DataType::Int64), DataType::Int64);
    }

    #[test]
    fn test_unify_cross_family_falls_back_to_string() {
        assert_eq!(DataType::Int64.unify(DataType::Date), DataType::String);
        assert_eq!(DataType::Float64.unify(DataType::String), DataType::String);
        assert_eq!(DataType::String.unify(DataType::Binary), DataType::Binary);
    }

    #[test]
    fn test_lossless_widening() {
        assert!(DataType::is_lossless_widening(DataType::Int64, DataType::Float64));
        assert!(!DataType::is_lossless_widening(DataType::Int64, DataType::String));
        assert!(!DataType::is_lossless_widening(DataType::Float64, DataType::Int64));
    }

    #[test]
    fn test_data_type_from_str_aliases() {
        assert_eq!("int".parse::<DataType>().unwrap(), DataType::Int64);
        assert_eq!("BYTES".parse::<DataType>().unwrap(), DataType::Binary);
        assert!("decimal".parse::<DataType>().is_err());
    }

    #[test]
    fn test_severity_raise_is_monotonic() {
        let mut severity = Severity::Unknown;
        severity.raise(Severity::Error);
        severity.raise(Severity::Warning);
        assert_eq!(severity, Severity::Error);
        assert!(Severity::Unknown < Severity::Warning);
    }

    #[test]
    fn test_feature_serialization() {
        let feature = Feature::required("country", DataType::String)
            .with_domain("country")
            .with_value_count(ValueCount::scalar());
        let json = serde_json::to_string(&feature).unwrap();
        assert!(json.contains("\"type\":\"string\""));
        assert!(json.contains("\"policy\":\"REQUIRED\""));
        let back: Feature = serde_json::from_str(&json).unwrap();
        assert_eq!(back, feature);
    }

    #[test]
    fn test_document_rejects_future_version() {
        let json = r#"{"version": 99, "features": [], "string_domains": []}"#;
        let err = SchemaDocument::from_json(json).unwrap_err();
        assert!(matches!(err, ProtocolError::UnsupportedVersion { found: 99, .. }));
    }

    #[test]
    fn test_sparse_feature_columns() {
        let sparse = SparseFeature::new("clicks", vec!["clicks_idx".into()], "clicks_val");
        let cols: Vec<&str> = sparse.columns().collect();
        assert_eq!(cols, vec!["clicks_idx", "clicks_val"]);
    }
}
