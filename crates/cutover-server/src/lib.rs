//! Cutover Server
//!
//! Operator HTTP API over a [`MigrationSystem`](cutover_core::MigrationSystem),
//! the webhook notification channel and logging setup for the `cutover`
//! binary.

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod api;
pub mod auth;
pub mod telemetry;
pub mod webhook;

pub use api::{handle_rejection, routes, ApiError, ApiState};
pub use auth::{AuthError, Credentials};
pub use telemetry::init_logging;
pub use webhook::WebhookNotifier;

use cutover_core::{CutoverConfig, LogNotifier, NotificationChannel};
use cutover_store::NotificationError;
use std::sync::Arc;

/// Notification channel selected by the alerting config
///
/// A configured webhook URL selects [`WebhookNotifier`], otherwise alerts
/// are only logged.
pub fn notifier_from_config(
    config: &CutoverConfig,
) -> Result<Arc<dyn NotificationChannel>, NotificationError> {
    match config.alerting.webhook_url.as_deref() {
        Some(url) if !url.is_empty() => Ok(Arc::new(WebhookNotifier::new(
            url,
            config.webhook_timeout(),
        )?)),
        _ => Ok(Arc::new(LogNotifier)),
    }
}
