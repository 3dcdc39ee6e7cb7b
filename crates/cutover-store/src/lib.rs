//! Cutover Store
//!
//! Value types and store contracts shared by every part of a live cutover.
//!
//! # Core Concepts
//!
//! - [`MigrationPhase`]: ordered cutover stage deciding which store is authoritative
//! - [`RecordKey`]: identity of a logical record in both stores
//! - [`RecordStore`]: minimal get/put/changed-since contract of the legacy and target stores
//! - [`StateStore`]: the shared persistent store holding the phase row and the
//!   append-only journals (operations, samples, discrepancies, alerts)
//!
//! # Example
//!
//! ```rust,ignore
//! use cutover_store::{MemoryRecordStore, RecordKey, RecordStore};
//!
//! let legacy = MemoryRecordStore::new("legacy");
//! let key = RecordKey::new("animal", "tenant-1", "cow-42");
//! legacy.put(&key, &serde_json::json!({ "id": "cow-42", "weight": 610 })).await?;
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

// Core modules
pub mod alert;
pub mod discrepancy;
pub mod error;
pub mod journal;
pub mod phase;
pub mod record;
pub mod record_store;
pub mod state_store;

mod id;

// Re-exports for convenience
pub use alert::{AlertId, AlertNotice, AlertRecord, AlertType, DeliveryOutcome, RecoveryRecord};
pub use discrepancy::{
    Candidate, Discrepancy, DiscrepancyId, DiscrepancyKind, ReconciliationPass, ResolutionAction, ScanMode,
};
pub use error::{NotificationError, StateStoreError, StoreError};
pub use journal::{
    DualWriteOperation, MetricSample, MetricsSnapshot, OperationId, SampleId, StoreOutcome,
};
pub use phase::{MigrationPhase, PhaseAuditEntry, PhaseChange, PhaseChangeInitiator, PhaseRecord};
pub use record::{fingerprint, ChangedRecord, Checkpoint, RecordKey, StoreSide};
pub use record_store::{MemoryRecordStore, RecordStore};
pub use state_store::{MemoryStateStore, SampleAppend, StateStore};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with cutover stores
    pub use crate::{
        Checkpoint, MemoryRecordStore, MemoryStateStore, MigrationPhase, RecordKey, RecordStore,
        StateStore, StoreError, StoreSide,
    };
}
