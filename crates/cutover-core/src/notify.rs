//! Notification channel
//!
//! Delivery is best-effort: the alerting controller retries and records the
//! outcome, it never propagates a channel failure.

use async_trait::async_trait;
use cutover_store::{AlertNotice, NotificationError};
use tracing::{error, warn};

/// Outbound alert delivery
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationChannel: Send + Sync + std::fmt::Debug {
    /// Deliver one alert
    async fn send_alert(&self, notice: &AlertNotice) -> Result<(), NotificationError>;
}

/// Writes alerts to the log; never fails
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl NotificationChannel for LogNotifier {
    async fn send_alert(&self, notice: &AlertNotice) -> Result<(), NotificationError> {
        if notice.alert_type.is_critical() {
            error!(
                alert = %notice.id,
                alert_type = %notice.alert_type,
                automated = notice.automated,
                reason = %notice.trigger_reason,
                "migration alert"
            );
        } else {
            warn!(
                alert = %notice.id,
                alert_type = %notice.alert_type,
                automated = notice.automated,
                reason = %notice.trigger_reason,
                "migration alert"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cutover_store::AlertType;

    #[tokio::test]
    async fn log_notifier_always_delivers() {
        let notice = AlertNotice::new(AlertType::RollbackFailed, "store down", true);
        assert!(LogNotifier.send_alert(&notice).await.is_ok());
    }
}
