//! Operator HTTP API
//!
//! ```text
//! GET  /migration/dashboard   admin    dashboard rollup
//! POST /migration/recover     admin    run a recovery action
//! POST /migration/phase       admin    advance the phase
//! POST /migration/rollback    admin    manual rollback
//! GET  /migration/schedule    cron     run one cycle
//! ```
//!
//! Every error answers with `{"error": "..."}` and a matching status.

use crate::auth::{AuthError, Credentials};
use cutover_core::{
    parse_alert_type, AlertingError, MigrationError, MigrationSystem, PhaseError,
};
use cutover_store::{AlertType, MigrationPhase, PhaseChangeInitiator};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use tracing::{info, warn};
use warp::http::{HeaderMap, StatusCode};
use warp::reject::Reject;
use warp::{Filter, Rejection, Reply};

/// Shared handler state
#[derive(Debug, Clone)]
pub struct ApiState {
    pub system: MigrationSystem,
    pub credentials: Arc<Credentials>,
}

impl ApiState {
    #[must_use]
    pub fn new(system: MigrationSystem, credentials: Credentials) -> Self {
        Self {
            system,
            credentials: Arc::new(credentials),
        }
    }
}

/// Request failure carried through warp's rejection path
#[derive(Debug)]
pub enum ApiError {
    Unauthorized(AuthError),
    BadRequest(String),
    Conflict(String),
    Unavailable(String),
}

impl Reject for ApiError {}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn message(&self) -> String {
        match self {
            Self::Unauthorized(err) => err.to_string(),
            Self::BadRequest(m) | Self::Conflict(m) | Self::Unavailable(m) => m.clone(),
        }
    }
}

impl From<PhaseError> for ApiError {
    fn from(err: PhaseError) -> Self {
        match err {
            PhaseError::IllegalTransition { .. } => Self::Conflict(err.to_string()),
            PhaseError::State(_) => Self::Unavailable(err.to_string()),
        }
    }
}

impl From<AlertingError> for ApiError {
    fn from(err: AlertingError) -> Self {
        match err {
            AlertingError::Phase(phase) => phase.into(),
            AlertingError::UnknownAlertType(_) => Self::BadRequest(err.to_string()),
            other => Self::Unavailable(other.to_string()),
        }
    }
}

impl From<MigrationError> for ApiError {
    fn from(err: MigrationError) -> Self {
        Self::Unavailable(err.to_string())
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoverRequest {
    pub alert_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoverResponse {
    pub success: bool,
    pub alert_type: AlertType,
    pub action: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseRequest {
    pub target: MigrationPhase,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollbackRequest {
    #[serde(default)]
    pub target: Option<MigrationPhase>,
    pub reason: String,
}

/// All routes plus the rejection handler
pub fn routes(state: ApiState) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    let dashboard_route = warp::path!("migration" / "dashboard")
        .and(warp::get())
        .and(admin(&state))
        .and(with_state(&state))
        .and_then(dashboard);

    let recover_route = warp::path!("migration" / "recover")
        .and(warp::post())
        .and(admin(&state))
        .and(with_state(&state))
        .and(warp::body::json())
        .and_then(recover);

    let phase_route = warp::path!("migration" / "phase")
        .and(warp::post())
        .and(admin(&state))
        .and(with_state(&state))
        .and(warp::body::json())
        .and_then(advance_phase);

    let rollback_route = warp::path!("migration" / "rollback")
        .and(warp::post())
        .and(admin(&state))
        .and(with_state(&state))
        .and(warp::body::json())
        .and_then(rollback);

    let schedule_route = warp::path!("migration" / "schedule")
        .and(warp::get())
        .and(scheduler(&state))
        .and(with_state(&state))
        .and_then(schedule);

    dashboard_route
        .or(recover_route)
        .or(phase_route)
        .or(rollback_route)
        .or(schedule_route)
        .recover(handle_rejection)
}

fn with_state(state: &ApiState) -> impl Filter<Extract = (ApiState,), Error = Infallible> + Clone {
    let state = state.clone();
    warp::any().map(move || state.clone())
}

/// Require the admin bearer token
fn admin(state: &ApiState) -> impl Filter<Extract = (), Error = Rejection> + Clone {
    let credentials = Arc::clone(&state.credentials);
    warp::header::optional::<String>("authorization")
        .and_then(move |header: Option<String>| {
            let credentials = Arc::clone(&credentials);
            async move {
                credentials
                    .check_admin(header.as_deref())
                    .map_err(|e| warp::reject::custom(ApiError::Unauthorized(e)))
            }
        })
        .untuple_one()
}

/// Require the scheduler's shared-secret header
fn scheduler(state: &ApiState) -> impl Filter<Extract = (), Error = Rejection> + Clone {
    let credentials = Arc::clone(&state.credentials);
    warp::header::headers_cloned()
        .and_then(move |headers: HeaderMap| {
            let credentials = Arc::clone(&credentials);
            async move {
                let presented = headers
                    .get(credentials.schedule_header())
                    .and_then(|v| v.to_str().ok());
                credentials
                    .check_schedule(presented)
                    .map_err(|e| warp::reject::custom(ApiError::Unauthorized(e)))
            }
        })
        .untuple_one()
}

async fn dashboard(state: ApiState) -> Result<impl Reply, Rejection> {
    let data = state
        .system
        .collector
        .get_dashboard_data()
        .await
        .map_err(|e| warp::reject::custom(ApiError::from(e)))?;
    Ok(warp::reply::json(&data))
}

async fn recover(state: ApiState, request: RecoverRequest) -> Result<impl Reply, Rejection> {
    let alert_type = parse_alert_type(&request.alert_type)
        .map_err(|e| warp::reject::custom(ApiError::from(e)))?;
    let record = state.system.alerting.recover(alert_type, false).await;
    info!(%alert_type, action = %record.action, success = record.resolved, "operator recovery");
    Ok(warp::reply::json(&RecoverResponse {
        success: record.resolved,
        alert_type,
        action: record.action,
    }))
}

async fn advance_phase(state: ApiState, request: PhaseRequest) -> Result<impl Reply, Rejection> {
    let change = state
        .system
        .phases
        .set_phase(request.target, request.reason, PhaseChangeInitiator::Operator)
        .await
        .map_err(|e| warp::reject::custom(ApiError::from(e)))?;
    Ok(warp::reply::json(&change))
}

async fn rollback(state: ApiState, request: RollbackRequest) -> Result<impl Reply, Rejection> {
    let change = state
        .system
        .alerting
        .manual_rollback(request.target, request.reason)
        .await
        .map_err(|e| warp::reject::custom(ApiError::from(e)))?;
    Ok(warp::reply::json(&change))
}

async fn schedule(state: ApiState) -> Result<impl Reply, Rejection> {
    let report = state.system.cycle.run_once().await;
    Ok(warp::reply::json(&report))
}

/// Turn rejections into JSON error bodies
pub async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    let (status, message) = if let Some(api) = err.find::<ApiError>() {
        (api.status(), api.message())
    } else if err.is_not_found() {
        (StatusCode::NOT_FOUND, "not found".to_string())
    } else if let Some(body) = err.find::<warp::filters::body::BodyDeserializeError>() {
        (StatusCode::BAD_REQUEST, body.to_string())
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "method not allowed".to_string())
    } else if err.find::<warp::reject::UnsupportedMediaType>().is_some() {
        (
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            "expected application/json".to_string(),
        )
    } else {
        warn!(rejection = ?err, "unhandled rejection");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal error".to_string(),
        )
    };
    Ok(warp::reply::with_status(
        warp::reply::json(&ErrorBody { error: message }),
        status,
    ))
}
