//! Operator and scheduler credentials
//!
//! Both secrets are held as [`SecretString`] and compared in constant time.
//! An unset secret denies every request to the endpoints it guards.

use cutover_core::config::ServerSettings;
use secrecy::{ExposeSecret, SecretString};
use subtle::ConstantTimeEq;
use thiserror::Error;

/// Why a request was refused
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("missing credentials")]
    Missing,

    #[error("invalid credentials")]
    Invalid,

    /// No secret configured for this endpoint
    #[error("endpoint disabled: no {0} configured")]
    NotConfigured(&'static str),
}

/// Secrets guarding the operator API
pub struct Credentials {
    admin_token: Option<SecretString>,
    schedule_secret: Option<SecretString>,
    schedule_header: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("admin_token", &self.admin_token.as_ref().map(|_| "[REDACTED]"))
            .field(
                "schedule_secret",
                &self.schedule_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("schedule_header", &self.schedule_header)
            .finish()
    }
}

impl Credentials {
    #[must_use]
    pub fn new(
        admin_token: Option<SecretString>,
        schedule_secret: Option<SecretString>,
        schedule_header: impl Into<String>,
    ) -> Self {
        Self {
            admin_token,
            schedule_secret,
            schedule_header: schedule_header.into().to_ascii_lowercase(),
        }
    }

    #[must_use]
    pub fn from_settings(settings: &ServerSettings) -> Self {
        Self::new(
            non_empty(settings.admin_token.as_deref()),
            non_empty(settings.schedule_secret.as_deref()),
            settings.schedule_header.clone(),
        )
    }

    /// Header the scheduler sends its secret in, lowercase
    #[inline]
    #[must_use]
    pub fn schedule_header(&self) -> &str {
        &self.schedule_header
    }

    /// Check an `Authorization: Bearer <token>` header value
    pub fn check_admin(&self, authorization: Option<&str>) -> Result<(), AuthError> {
        let expected = self
            .admin_token
            .as_ref()
            .ok_or(AuthError::NotConfigured("admin token"))?;
        let presented = authorization
            .and_then(|h| h.strip_prefix("Bearer "))
            .map(str::trim)
            .ok_or(AuthError::Missing)?;
        verify(presented, expected)
    }

    /// Check the scheduler's shared-secret header value
    pub fn check_schedule(&self, presented: Option<&str>) -> Result<(), AuthError> {
        let expected = self
            .schedule_secret
            .as_ref()
            .ok_or(AuthError::NotConfigured("schedule secret"))?;
        verify(presented.ok_or(AuthError::Missing)?, expected)
    }
}

fn non_empty(value: Option<&str>) -> Option<SecretString> {
    value
        .filter(|v| !v.is_empty())
        .map(|v| SecretString::from(v.to_string()))
}

fn verify(presented: &str, expected: &SecretString) -> Result<(), AuthError> {
    if presented
        .as_bytes()
        .ct_eq(expected.expose_secret().as_bytes())
        .into()
    {
        Ok(())
    } else {
        tracing::warn!("operator credential check failed");
        Err(AuthError::Invalid)
    }
}
