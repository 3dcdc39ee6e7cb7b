//! Component wiring
//!
//! Builds every controller over one shared set of stores.

use crate::alerting::AlertingController;
use crate::collector::MetricsCollector;
use crate::config::CutoverConfig;
use crate::cycle::MigrationCycle;
use crate::gateway::DualWriteGateway;
use crate::notify::NotificationChannel;
use crate::phase::PhaseController;
use crate::reconcile::ReconciliationEngine;
use cutover_store::{RecordStore, StateStore};
use std::sync::Arc;

/// Fully wired cutover controller set
#[derive(Debug, Clone)]
pub struct MigrationSystem {
    pub config: Arc<CutoverConfig>,
    pub state: Arc<dyn StateStore>,
    pub phases: Arc<PhaseController>,
    pub gateway: DualWriteGateway,
    pub collector: Arc<MetricsCollector>,
    pub reconciler: Arc<ReconciliationEngine>,
    pub alerting: Arc<AlertingController>,
    pub cycle: Arc<MigrationCycle>,
}

impl MigrationSystem {
    #[must_use]
    pub fn new(
        config: CutoverConfig,
        legacy: Arc<dyn RecordStore>,
        target: Arc<dyn RecordStore>,
        state: Arc<dyn StateStore>,
        notifier: Arc<dyn NotificationChannel>,
    ) -> Self {
        let config = Arc::new(config);
        let phases = Arc::new(PhaseController::from_config(Arc::clone(&state), &config));
        let gateway = DualWriteGateway::new(
            Arc::clone(&phases),
            Arc::clone(&legacy),
            Arc::clone(&target),
            Arc::clone(&state),
        );
        let collector = Arc::new(MetricsCollector::new(
            Arc::clone(&state),
            Arc::clone(&phases),
            Arc::clone(&config),
        ));
        let reconciler = Arc::new(ReconciliationEngine::new(
            legacy,
            target,
            Arc::clone(&state),
            Arc::clone(&phases),
            Arc::clone(&config),
        ));
        let alerting = Arc::new(AlertingController::new(
            Arc::clone(&state),
            Arc::clone(&phases),
            Arc::clone(&reconciler),
            notifier,
            Arc::clone(&config),
        ));
        let cycle = Arc::new(MigrationCycle::new(
            Arc::clone(&collector),
            Arc::clone(&reconciler),
            Arc::clone(&alerting),
        ));
        Self {
            config,
            state,
            phases,
            gateway,
            collector,
            reconciler,
            alerting,
            cycle,
        }
    }
}
