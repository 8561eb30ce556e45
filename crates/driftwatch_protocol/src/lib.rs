//! Driftwatch Protocol: the shapes shared by every Driftwatch crate.
//!
//! Nothing in this crate mutates a schema. It defines:
//!
//! - The persisted schema document ([`SchemaDocument`]) and its parts
//!   ([`Feature`], [`SparseFeature`], [`StringDomain`])
//! - The anomaly vocabulary ([`Description`], [`AnomalyKind`], [`Severity`])
//! - The read-only statistics input ([`DatasetStatistics`]) and the views the
//!   schema engine queries it through ([`DatasetStatsView`], [`FeatureStatsView`])
//!
//! # Wire Format
//!
//! Everything here round-trips through `serde_json`. Enum encodings are
//! stable: data types are lowercase (`"int64"`), severities and presence
//! policies are SCREAMING_SNAKE_CASE (`"WARNING"`, `"REQUIRED"`), anomaly
//! kinds are snake_case (`"unexpected_type"`).

pub mod error;
pub mod fingerprint;
pub mod naming;
pub mod stats;
pub mod types;

pub use error::{ProtocolError, Result};
pub use fingerprint::schema_fingerprint;
pub use naming::field_identifier;
pub use stats::{
    DatasetStatistics, DatasetStatsView, FeatureStatistics, FeatureStatsView, ValueFrequency,
    LARGE_VALUE_PLACEHOLDER,
};
pub use types::{
    AnomalyKind, DataType, Description, Feature, FeaturePresence, PresencePolicy, SchemaDocument,
    Severity, SkewComparator, SparseFeature, StringDomain, ValueCount, SCHEMA_DOCUMENT_VERSION,
};
