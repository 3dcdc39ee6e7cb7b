//! Record identity, store sides and change checkpoints

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Identity of a logical record, shared by both stores
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordKey {
    pub entity_type: String,
    pub tenant_id: String,
    pub record_id: String,
}

impl RecordKey {
    /// Create new record key
    #[inline]
    #[must_use]
    pub fn new(
        entity_type: impl Into<String>,
        tenant_id: impl Into<String>,
        record_id: impl Into<String>,
    ) -> Self {
        Self {
            entity_type: entity_type.into(),
            tenant_id: tenant_id.into(),
            record_id: record_id.into(),
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.entity_type, self.tenant_id, self.record_id)
    }
}

/// Which of the two stores
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreSide {
    /// The old store being migrated away from
    Legacy,
    /// The new store being migrated to
    Target,
}

impl StoreSide {
    /// The opposite store
    #[inline]
    #[must_use]
    pub fn other(&self) -> StoreSide {
        match self {
            StoreSide::Legacy => StoreSide::Target,
            StoreSide::Target => StoreSide::Legacy,
        }
    }

    /// Stable name, also used for checkpoint keys
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreSide::Legacy => "legacy",
            StoreSide::Target => "target",
        }
    }
}

impl fmt::Display for StoreSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Position in a store's change stream
///
/// Opaque, monotonically increasing. [`Checkpoint::ORIGIN`] precedes every change.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Checkpoint(pub u64);

impl Checkpoint {
    /// Before the first change
    pub const ORIGIN: Checkpoint = Checkpoint(0);

    /// Whether this is the origin
    #[inline]
    #[must_use]
    pub fn is_origin(&self) -> bool {
        self.0 == 0
    }
}

/// A record reported by a change enumeration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangedRecord {
    pub key: RecordKey,
    /// Checkpoint that covers this change
    pub checkpoint: Checkpoint,
}

/// Blake3 fingerprint of a JSON value, hex encoded
///
/// `serde_json` maps are key-sorted, so serialization is canonical for
/// equal values.
#[must_use]
pub fn fingerprint(value: &Value) -> String {
    let bytes = serde_json::to_vec(value).unwrap_or_default();
    hex::encode(blake3::hash(&bytes).as_bytes())
}
