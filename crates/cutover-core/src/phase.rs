//! Phase controller
//!
//! The phase row lives in the shared state store so every instance sees
//! the same phase. Reads go through a short-TTL moka cache because the
//! phase gates every gateway call; changes are validated against a fresh
//! read, persisted, then the cache is invalidated and a [`PhaseChange`] is
//! broadcast.

use crate::config::CutoverConfig;
use crate::error::PhaseError;
use crate::transition::{allowed_transitions, validate_transition};
use cutover_store::{MigrationPhase, PhaseChange, PhaseChangeInitiator, PhaseRecord, StateStore};
use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info};

/// Owner of the migration phase
#[derive(Debug)]
pub struct PhaseController {
    state: Arc<dyn StateStore>,
    cache: Cache<(), PhaseRecord>,
    events: broadcast::Sender<PhaseChange>,
    /// Serializes changes made through this instance
    change_lock: Mutex<()>,
}

impl PhaseController {
    /// Create controller with cache TTL and event channel capacity
    #[must_use]
    pub fn new(state: Arc<dyn StateStore>, cache_ttl: Duration, event_capacity: usize) -> Self {
        let (events, _) = broadcast::channel(event_capacity.max(1));
        Self {
            state,
            cache: Cache::builder()
                .max_capacity(1)
                .time_to_live(cache_ttl)
                .build(),
            events,
            change_lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn from_config(state: Arc<dyn StateStore>, config: &CutoverConfig) -> Self {
        Self::new(state, config.phase_cache_ttl(), config.phase.event_capacity)
    }

    /// Current phase, possibly up to one TTL stale
    pub async fn get_phase(&self) -> Result<MigrationPhase, PhaseError> {
        Ok(self.current().await?.phase)
    }

    /// Current phase row, possibly up to one TTL stale
    pub async fn current(&self) -> Result<PhaseRecord, PhaseError> {
        let state = Arc::clone(&self.state);
        self.cache
            .try_get_with((), async move { load(state.as_ref()).await })
            .await
            .map_err(|err| PhaseError::State((*err).clone()))
    }

    /// Phase row read straight from the state store
    pub async fn fresh(&self) -> Result<PhaseRecord, PhaseError> {
        Ok(load(self.state.as_ref()).await?)
    }

    /// Move to `target`
    ///
    /// Operators may only advance one step; rollback initiators may only move
    /// to a strictly earlier phase.
    pub async fn set_phase(
        &self,
        target: MigrationPhase,
        reason: impl Into<String>,
        initiator: PhaseChangeInitiator,
    ) -> Result<PhaseChange, PhaseError> {
        let reason = reason.into();
        let _guard = self.change_lock.lock().await;

        let current = self.fresh().await?;
        validate_transition(current.phase, target, initiator)?;

        let next = current.successor(target, reason.clone(), initiator);
        self.state.store_phase(next.clone()).await?;
        self.invalidate().await;

        let change = PhaseChange {
            from: current.phase,
            to: target,
            reason,
            initiator,
            version: next.version,
            at: next.changed_at,
        };

        metrics::gauge!("cutover_phase").set(f64::from(target.rank()));
        info!(
            from = %change.from,
            to = %change.to,
            initiator = %initiator,
            version = change.version,
            reason = %change.reason,
            "migration phase changed"
        );

        if self.events.send(change.clone()).is_err() {
            debug!("no phase change subscribers");
        }
        Ok(change)
    }

    /// Phases reachable from the current phase for `initiator`
    pub async fn allowed_transitions(
        &self,
        initiator: PhaseChangeInitiator,
    ) -> Result<Vec<MigrationPhase>, PhaseError> {
        let current = self.fresh().await?;
        Ok(allowed_transitions(current.phase, initiator))
    }

    /// Receive committed phase changes
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<PhaseChange> {
        self.events.subscribe()
    }

    /// Drop the cached phase
    pub async fn invalidate(&self) {
        self.cache.invalidate(&()).await;
    }
}

async fn load(state: &dyn StateStore) -> Result<PhaseRecord, cutover_store::StateStoreError> {
    Ok(state.load_phase().await?.unwrap_or_else(PhaseRecord::initial))
}
