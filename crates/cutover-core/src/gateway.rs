//! Dual-write gateway
//!
//! Routes every application read and write to the stores the current phase
//! names. The primary write is synchronous and fatal on failure. The
//! secondary write is awaited in the same call but its failure is only
//! recorded, counted and queued for reconciliation.

use crate::error::GatewayError;
use crate::phase::PhaseController;
use cutover_store::{
    Candidate, DualWriteOperation, MigrationPhase, OperationId, RecordKey, RecordStore, StateStore,
    StoreOutcome, StoreSide,
};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// Payload field holding the record id for [`DualWriteGateway::write_payload`]
pub const RECORD_ID_FIELD: &str = "id";

/// What happened to an accepted write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteReceipt {
    pub operation: OperationId,
    pub phase: MigrationPhase,
    pub primary: StoreSide,
    /// Secondary outcome; `None` when the phase writes a single store
    pub secondary: Option<StoreOutcome>,
}

impl WriteReceipt {
    /// Whether the secondary store fell behind on this write
    #[inline]
    #[must_use]
    pub fn secondary_failed(&self) -> bool {
        matches!(self.secondary, Some(StoreOutcome::Failed { .. }))
    }
}

/// Phase-aware front door to the legacy and target stores
#[derive(Debug, Clone)]
pub struct DualWriteGateway {
    phases: Arc<PhaseController>,
    legacy: Arc<dyn RecordStore>,
    target: Arc<dyn RecordStore>,
    state: Arc<dyn StateStore>,
}

impl DualWriteGateway {
    #[must_use]
    pub fn new(
        phases: Arc<PhaseController>,
        legacy: Arc<dyn RecordStore>,
        target: Arc<dyn RecordStore>,
        state: Arc<dyn StateStore>,
    ) -> Self {
        Self {
            phases,
            legacy,
            target,
            state,
        }
    }

    /// Store for one side
    #[inline]
    #[must_use]
    pub fn store(&self, side: StoreSide) -> &Arc<dyn RecordStore> {
        match side {
            StoreSide::Legacy => &self.legacy,
            StoreSide::Target => &self.target,
        }
    }

    /// Write a record whose id is carried in the payload's `id` field
    pub async fn write_payload(
        &self,
        entity_type: &str,
        tenant_id: &str,
        payload: &Value,
    ) -> Result<WriteReceipt, GatewayError> {
        let record_id = match payload.get(RECORD_ID_FIELD) {
            Some(Value::String(id)) if !id.is_empty() => id.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => {
                return Err(GatewayError::MissingRecordId {
                    entity_type: entity_type.to_string(),
                    tenant_id: tenant_id.to_string(),
                    field: RECORD_ID_FIELD,
                })
            }
        };
        let key = RecordKey::new(entity_type, tenant_id, record_id);
        self.write(&key, payload).await
    }

    /// Write a record to the store(s) the current phase requires
    pub async fn write(
        &self,
        key: &RecordKey,
        payload: &Value,
    ) -> Result<WriteReceipt, GatewayError> {
        let phase = self.phases.get_phase().await?;
        let primary = phase.primary_write_side();
        let mut op = DualWriteOperation::new(key.clone(), phase);

        if let Err(source) = self.store(primary).put(key, payload).await {
            warn!(%key, %phase, side = %primary, error = %source, "primary write failed");
            op = op.with_outcome(primary, StoreOutcome::failed(source.to_string()));
            self.journal(op).await;
            count_write(phase, "primary_failure");
            return Err(GatewayError::PrimaryWriteFailed {
                side: primary,
                source,
            });
        }
        op = op.with_outcome(primary, StoreOutcome::Succeeded);

        let secondary = match phase.secondary_write_side() {
            Some(side) => Some(self.write_secondary(side, key, payload, phase).await),
            None => None,
        };
        if let (Some(side), Some(outcome)) = (phase.secondary_write_side(), secondary.clone()) {
            op = op.with_outcome(side, outcome);
        }

        let receipt = WriteReceipt {
            operation: op.id,
            phase,
            primary,
            secondary,
        };
        self.journal(op).await;
        count_write(
            phase,
            if receipt.secondary_failed() {
                "secondary_failure"
            } else {
                "success"
            },
        );
        Ok(receipt)
    }

    async fn write_secondary(
        &self,
        side: StoreSide,
        key: &RecordKey,
        payload: &Value,
        phase: MigrationPhase,
    ) -> StoreOutcome {
        match self.store(side).put(key, payload).await {
            Ok(()) => StoreOutcome::Succeeded,
            Err(err) => {
                warn!(%key, %phase, side = %side, error = %err, "secondary write failed, queued for reconciliation");
                metrics::counter!("cutover_secondary_failures_total", "side" => side.as_str())
                    .increment(1);
                let candidate = Candidate::failed_write(key.clone(), side.other());
                if let Err(queue_err) = self.state.enqueue_candidate(candidate).await {
                    warn!(%key, error = %queue_err, "failed to queue reconciliation candidate");
                }
                StoreOutcome::failed(err.to_string())
            }
        }
    }

    /// Read a record from the store the current phase reads from
    pub async fn read(&self, key: &RecordKey) -> Result<Option<Value>, GatewayError> {
        let phase = self.phases.get_phase().await?;
        let side = phase.read_side();
        debug!(%key, %phase, side = %side, "gateway read");
        self.store(side)
            .get(key)
            .await
            .map_err(|source| GatewayError::ReadFailed { side, source })
    }

    async fn journal(&self, op: DualWriteOperation) {
        let id = op.id;
        if let Err(err) = self.state.record_operation(op).await {
            warn!(operation = %id, error = %err, "failed to journal dual-write operation");
        }
    }
}

fn count_write(phase: MigrationPhase, outcome: &'static str) {
    metrics::counter!(
        "cutover_writes_total",
        "phase" => phase.as_str(),
        "outcome" => outcome
    )
    .increment(1);
}
