//! Webhook notification channel
//!
//! POSTs each [`AlertNotice`] as JSON. Any non-2xx answer is a delivery
//! failure; the alerting controller decides whether to retry.

use async_trait::async_trait;
use cutover_core::NotificationChannel;
use cutover_store::{AlertNotice, NotificationError};
use std::time::Duration;
use tracing::debug;

/// Longest response body kept in a rejection error
const MAX_ERROR_BODY: usize = 512;

/// Delivers alerts to an HTTP endpoint
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    /// Create a notifier posting to `url` with a per-request `timeout`
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, NotificationError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotificationError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    #[inline]
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl NotificationChannel for WebhookNotifier {
    async fn send_alert(&self, notice: &AlertNotice) -> Result<(), NotificationError> {
        let response = self
            .client
            .post(&self.url)
            .json(notice)
            .send()
            .await
            .map_err(|e| NotificationError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            debug!(alert = %notice.id, status = status.as_u16(), "alert delivered to webhook");
            return Ok(());
        }
        let mut body = response.text().await.unwrap_or_default();
        if body.len() > MAX_ERROR_BODY {
            let mut cut = MAX_ERROR_BODY;
            while !body.is_char_boundary(cut) {
                cut -= 1;
            }
            body.truncate(cut);
        }
        Err(NotificationError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cutover_store::AlertType;
    use std::sync::Arc;
    use tokio::sync::Mutex;
    use warp::Filter;

    /// Serve `status` on an ephemeral port, capturing posted bodies
    fn receiver(
        status: warp::http::StatusCode,
    ) -> (String, Arc<Mutex<Vec<serde_json::Value>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let route = warp::post()
            .and(warp::body::json())
            .then(move |body: serde_json::Value| {
                let sink = Arc::clone(&sink);
                async move {
                    sink.lock().await.push(body);
                    warp::reply::with_status("ok", status)
                }
            });
        let (addr, server) = warp::serve(route).bind_ephemeral(([127, 0, 0, 1], 0));
        tokio::spawn(server);
        (format!("http://{addr}/alerts"), seen)
    }

    #[tokio::test]
    async fn posts_notice_as_json() {
        let (url, seen) = receiver(warp::http::StatusCode::OK);
        let notifier = WebhookNotifier::new(url, Duration::from_secs(5)).unwrap();
        let notice = AlertNotice::new(AlertType::AutomatedRollback, "SUSTAINED_ISSUES", true);

        notifier.send_alert(&notice).await.unwrap();

        let seen = seen.lock().await;
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0]["alert_type"], "AUTOMATED_ROLLBACK");
    }

    #[tokio::test]
    async fn non_success_status_is_rejection() {
        let (url, _) = receiver(warp::http::StatusCode::SERVICE_UNAVAILABLE);
        let notifier = WebhookNotifier::new(url, Duration::from_secs(5)).unwrap();
        let notice = AlertNotice::new(AlertType::HealthDegraded, "slow", true);

        let err = notifier.send_alert(&notice).await.unwrap_err();
        assert!(matches!(err, NotificationError::Rejected { status: 503, .. }));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_transport_error() {
        let notifier =
            WebhookNotifier::new("http://127.0.0.1:9/alerts", Duration::from_millis(500)).unwrap();
        let notice = AlertNotice::new(AlertType::HealthDegraded, "slow", true);
        let err = notifier.send_alert(&notice).await.unwrap_err();
        assert!(matches!(err, NotificationError::Transport(_)));
    }
}
