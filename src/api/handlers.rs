use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::alerts::{Alert, ChannelStatsSnapshot, Severity, SeverityCounts};
use crate::monitor::{Monitor, MonitorError, MonitorRequest, MonitorService};
use crate::sources::CheckerStatsSnapshot;

/// Application state shared across handlers
pub struct AppState {
    pub service: MonitorService,
}

// ============================================================================
// Health Check
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub active_monitors: usize,
}

pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        active_monitors: state.service.active_count(),
    })
}

// ============================================================================
// Monitors
// ============================================================================

fn default_duration() -> u32 {
    30
}

fn default_triggers() -> Vec<String> {
    vec![
        "court_cases".to_string(),
        "arrests".to_string(),
        "bankruptcies".to_string(),
    ]
}

fn default_channels() -> Vec<String> {
    vec!["email".to_string(), "webhook".to_string()]
}

#[derive(Deserialize)]
pub struct StartMonitorRequest {
    pub person_name: String,
    #[serde(default)]
    pub person_id: Option<String>,
    #[serde(default = "default_duration")]
    pub tracking_duration: u32,
    #[serde(default = "default_triggers")]
    pub alert_triggers: Vec<String>,
    #[serde(default = "default_channels")]
    pub notification_channels: Vec<String>,
    #[serde(default)]
    pub check_interval_secs: Option<u64>,
}

#[derive(Serialize)]
pub struct StartMonitorResponse {
    pub monitor_id: String,
    pub status: &'static str,
    pub duration_days: u32,
    pub next_check: DateTime<Utc>,
    pub alert_triggers: Vec<String>,
}

pub async fn start_monitor(
    State(state): State<Arc<AppState>>,
    Json(request): Json<StartMonitorRequest>,
) -> Result<(StatusCode, Json<StartMonitorResponse>), ApiError> {
    let channels = request
        .notification_channels
        .iter()
        .map(|c| c.parse().map_err(|_| MonitorError::UnknownChannel(c.clone())))
        .collect::<Result<Vec<_>, _>>()?;

    let mut monitor_request = MonitorRequest::new(&request.person_name)
        .with_triggers(request.alert_triggers.iter().cloned())
        .with_channels(channels)
        .with_duration_days(request.tracking_duration);
    monitor_request.target_identifier = request.person_id;
    if let Some(secs) = request.check_interval_secs {
        monitor_request = monitor_request.with_check_interval(Duration::from_secs(secs));
    }

    monitor_request.validate()?;
    let next_check = state.service.next_check(&monitor_request)?;
    let monitor_id = state.service.start(monitor_request)?;

    Ok((
        StatusCode::CREATED,
        Json(StartMonitorResponse {
            monitor_id,
            status: "tracking_initiated",
            duration_days: request.tracking_duration,
            next_check,
            alert_triggers: request.alert_triggers,
        }),
    ))
}

#[derive(Serialize)]
pub struct MonitorsResponse {
    pub total: usize,
    pub active: usize,
    pub monitors: Vec<Monitor>,
}

pub async fn list_monitors(State(state): State<Arc<AppState>>) -> Json<MonitorsResponse> {
    let monitors = state.service.list();
    Json(MonitorsResponse {
        total: monitors.len(),
        active: monitors.iter().filter(|m| m.active).count(),
        monitors,
    })
}

pub async fn get_monitor(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Monitor>, ApiError> {
    state
        .service
        .get(&id)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Monitor '{}' not found", id)))
}

pub async fn stop_monitor(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if !state.service.stop(&id) {
        return Err(ApiError::NotFound(format!("Monitor '{}' not found", id)));
    }

    Ok(Json(serde_json::json!({ "stopped": id })))
}

// ============================================================================
// Alerts
// ============================================================================

#[derive(Deserialize)]
pub struct AlertsQuery {
    #[serde(default)]
    pub severity: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

/// Widest recent-alerts window, ten years
const MAX_RECENT_HOURS: u32 = 24 * 365 * 10;

#[derive(Deserialize)]
pub struct RecentQuery {
    #[serde(default)]
    pub hours: Option<u32>,
}

#[derive(Serialize)]
pub struct AlertsResponse {
    pub total: usize,
    pub alerts: Vec<Alert>,
}

impl From<Vec<Alert>> for AlertsResponse {
    fn from(alerts: Vec<Alert>) -> Self {
        Self {
            total: alerts.len(),
            alerts,
        }
    }
}

pub async fn list_alerts(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AlertsQuery>,
) -> Result<Json<AlertsResponse>, ApiError> {
    let severity = params
        .severity
        .as_deref()
        .map(str::parse::<Severity>)
        .transpose()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let alerts = state.service.alerts(severity, params.limit.unwrap_or(50));
    Ok(Json(alerts.into()))
}

pub async fn recent_alerts(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RecentQuery>,
) -> Json<AlertsResponse> {
    let hours = params.hours.unwrap_or(24).min(MAX_RECENT_HOURS);
    Json(state.service.get_recent_alerts(hours).into())
}

// ============================================================================
// Stats
// ============================================================================

#[derive(Serialize)]
pub struct StatsResponse {
    pub monitors: usize,
    pub active_monitors: usize,
    pub alerts: SeverityCounts,
    pub sources: BTreeMap<&'static str, CheckerStatsSnapshot>,
    pub channels: BTreeMap<&'static str, ChannelStatsSnapshot>,
}

pub async fn stats(State(state): State<Arc<AppState>>) -> Json<StatsResponse> {
    let service = &state.service;

    Json(StatsResponse {
        monitors: service.list().len(),
        active_monitors: service.active_count(),
        alerts: service.alert_log().counts(),
        sources: service.checker_stats().into_iter().collect(),
        channels: service
            .delivery_stats()
            .into_iter()
            .map(|(channel, stats)| (channel.as_str(), stats))
            .collect(),
    })
}

// ============================================================================
// Error Handling
// ============================================================================

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Internal(String),
}

impl From<MonitorError> for ApiError {
    fn from(e: MonitorError) -> Self {
        ApiError::BadRequest(e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = serde_json::json!({
            "error": message
        });

        (status, Json(body)).into_response()
    }
}
