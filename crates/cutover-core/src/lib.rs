//! Cutover Core
//!
//! Keeps a legacy and a target store consistent while traffic is cut over
//! between them in phases.
//!
//! # Components
//!
//! - [`PhaseController`]: cached view of the shared phase row, validated transitions
//! - [`DualWriteGateway`]: phase-aware reads and writes with best-effort secondary writes
//! - [`MetricsCollector`]: idempotent health samples and the operator dashboard
//! - [`ReconciliationEngine`]: bounded detection and repair of cross-store divergence
//! - [`AlertingController`]: alerts, recovery actions, automated rollback
//! - [`MigrationCycle`]: the periodic driver tying them together
//!
//! # Example
//!
//! ```rust,ignore
//! use cutover_core::prelude::*;
//! use std::sync::Arc;
//!
//! let system = MigrationSystem::new(
//!     CutoverConfig::new(),
//!     Arc::new(MemoryRecordStore::new("legacy")),
//!     Arc::new(MemoryRecordStore::new("target")),
//!     Arc::new(MemoryStateStore::new()),
//!     Arc::new(LogNotifier),
//! );
//! system.gateway.write_payload("animal", "farm-1", &serde_json::json!({ "id": "cow-1" })).await?;
//! let report = system.cycle.run_once().await;
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

// Core modules
pub mod alerting;
pub mod collector;
pub mod config;
pub mod cycle;
pub mod error;
pub mod gateway;
pub mod notify;
pub mod phase;
pub mod reconcile;
pub mod system;
pub mod transition;

// Re-exports for convenience
pub use alerting::{
    active_alerts, evaluate, parse_alert_type, AlertingController, RollbackDecision,
    ThresholdBreach, ROLLBACK_REASON,
};
pub use collector::{DashboardData, MetricsCollector};
pub use config::CutoverConfig;
pub use cycle::{spawn_ticker, CycleReport, MigrationCycle, StepError};
pub use error::{
    AlertingError, ConfigError, FailureKind, GatewayError, MigrationError, PhaseError,
    ReconciliationError,
};
pub use gateway::{DualWriteGateway, WriteReceipt};
pub use notify::{LogNotifier, NotificationChannel};
pub use phase::PhaseController;
pub use reconcile::{ReconciliationEngine, SyncResult};
pub use system::MigrationSystem;
pub use transition::{allowed_transitions, validate_transition};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for driving a cutover
    pub use crate::{
        CutoverConfig, DualWriteGateway, LogNotifier, MigrationError, MigrationSystem,
        NotificationChannel, PhaseController,
    };
    pub use cutover_store::prelude::*;
}
