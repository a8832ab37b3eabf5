// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Operational endpoints.
//!
//! - Ledger statistics (ledger viewers)
//! - Audit log queries (admin)
//! - On-demand maintenance: full pass, pending sweep, certificate cleanup (admin)

use std::sync::OnceLock;
use std::time::Instant;

use axum::{
    extract::{Query, State},
    Json,
};
use chrono::{Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::{
    auth::{AdminOnly, LedgerViewer},
    error::ApiError,
    purchase::{blocking, MaintenanceReport, MaintenanceTask},
    state::AppState,
    storage::{AuditEvent, AuditEventType, AuditQuery, AuditRepository},
};

const DEFAULT_AUDIT_LIMIT: usize = 100;
const MAX_AUDIT_LIMIT: usize = 1000;
/// Widest date range one audit query may scan.
const MAX_AUDIT_DAYS: i64 = 366;

static SERVER_START: OnceLock<Instant> = OnceLock::new();

/// Record the process start. Later calls are no-ops.
pub fn init_server_start_time() {
    SERVER_START.get_or_init(Instant::now);
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StatsResponse {
    /// Purchases awaiting confirmation.
    pub pending_payments: usize,
    pub shares: u64,
    pub payments: u64,
    /// Registered payment providers.
    pub providers: Vec<String>,
    pub uptime_seconds: u64,
    pub timestamp: String,
}

/// Query parameters for audit log queries.
#[derive(Debug, Deserialize, IntoParams)]
pub struct AuditQueryParams {
    /// Start date (YYYY-MM-DD). Defaults to the end date.
    pub start_date: Option<String>,
    /// End date (YYYY-MM-DD). Defaults to today.
    pub end_date: Option<String>,
    pub user_id: Option<String>,
    /// Event type in snake_case, e.g. `purchase_confirmed`.
    pub event_type: Option<String>,
    pub resource_id: Option<String>,
    /// Maximum number of results (default 100, max 1000).
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AuditLogResponse {
    /// Matching events, newest first.
    pub events: Vec<AuditEvent>,
    pub total: usize,
    /// Whether more events match beyond `limit`.
    pub has_more: bool,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct SweepParams {
    /// Remove pending records older than this. Defaults to the configured age.
    pub max_age_hours: Option<i64>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct CleanupParams {
    /// Remove certificate files older than this. Defaults to the configured
    /// retention.
    pub older_than_days: Option<i64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CleanupResponse {
    pub removed: usize,
}

/// Ledger and pending payment counters.
#[utoipa::path(
    get,
    path = "/v1/admin/stats",
    tag = "Admin",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Statistics", body = StatsResponse),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Not authorized (ledger access required)")
    )
)]
pub async fn get_stats(
    LedgerViewer(_user): LedgerViewer,
    State(state): State<AppState>,
) -> Result<Json<StatsResponse>, ApiError> {
    let pending = state.orchestrator.pending().clone();
    let ledger = state.ledger().clone();
    let (pending_payments, ledger_stats) =
        blocking(move || Ok((pending.count()?, ledger.stats()?))).await?;

    Ok(Json(StatsResponse {
        pending_payments,
        shares: ledger_stats.shares,
        payments: ledger_stats.payments,
        providers: state
            .orchestrator
            .gateways()
            .providers()
            .into_iter()
            .map(str::to_string)
            .collect(),
        uptime_seconds: SERVER_START.get_or_init(Instant::now).elapsed().as_secs(),
        timestamp: Utc::now().to_rfc3339(),
    }))
}

/// Query the audit log. Admin only.
#[utoipa::path(
    get,
    path = "/v1/admin/audit",
    tag = "Admin",
    params(AuditQueryParams),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Audit events", body = AuditLogResponse),
        (status = 400, description = "Invalid query parameters"),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Not authorized (admin required)")
    )
)]
pub async fn query_audit_log(
    AdminOnly(_user): AdminOnly,
    State(state): State<AppState>,
    Query(params): Query<AuditQueryParams>,
) -> Result<Json<AuditLogResponse>, ApiError> {
    let query = audit_query(&params, Utc::now().date_naive())?;
    let limit = query.limit;

    let storage = state.storage().clone();
    let mut events = blocking(move || {
        // One extra row tells whether the page is complete.
        let probe = AuditQuery {
            limit: limit + 1,
            ..query
        };
        Ok(AuditRepository::new(&storage).query(&probe)?)
    })
    .await?;

    let has_more = events.len() > limit;
    events.truncate(limit);
    Ok(Json(AuditLogResponse {
        total: events.len(),
        events,
        has_more,
    }))
}

/// Run one maintenance pass now. Admin only.
///
/// Polls provider payments, sweeps stale pending records and, when a
/// retention period is configured, removes old certificate files.
#[utoipa::path(
    post,
    path = "/v1/admin/maintenance",
    tag = "Admin",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Maintenance report", body = MaintenanceReport),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Not authorized (admin required)")
    )
)]
pub async fn run_maintenance(
    AdminOnly(user): AdminOnly,
    State(state): State<AppState>,
) -> Json<MaintenanceReport> {
    let task = MaintenanceTask::new(
        state.orchestrator.clone(),
        state.config.maintenance_interval,
        state.config.sweep_max_age,
        state.config.certificate_retention,
    );
    let report = task.run_once().await;
    tracing::info!(
        user_id = %user.user_id,
        confirmed = report.poll.confirmed,
        swept = report.pending_swept,
        certificates_removed = report.certificates_removed,
        "Manual maintenance pass"
    );
    Json(report)
}

/// Remove stale pending payment records. Admin only.
#[utoipa::path(
    post,
    path = "/v1/admin/maintenance/sweep",
    tag = "Admin",
    params(SweepParams),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Records removed", body = CleanupResponse),
        (status = 400, description = "Invalid age"),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Not authorized (admin required)")
    )
)]
pub async fn sweep_pending(
    AdminOnly(user): AdminOnly,
    State(state): State<AppState>,
    Query(params): Query<SweepParams>,
) -> Result<Json<CleanupResponse>, ApiError> {
    let max_age = match params.max_age_hours {
        Some(hours) if hours < 0 => {
            return Err(ApiError::bad_request("max_age_hours must not be negative"))
        }
        Some(hours) => Duration::hours(hours),
        None => state.config.sweep_max_age,
    };
    let removed = state
        .orchestrator
        .sweep_pending(max_age, &user.user_id)
        .await?;
    Ok(Json(CleanupResponse { removed }))
}

/// Remove old certificate files, both originals and encrypted copies. Admin only.
#[utoipa::path(
    post,
    path = "/v1/admin/maintenance/cleanup",
    tag = "Admin",
    params(CleanupParams),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Files removed", body = CleanupResponse),
        (status = 400, description = "No retention period given or configured"),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Not authorized (admin required)")
    )
)]
pub async fn cleanup_certificates(
    AdminOnly(user): AdminOnly,
    State(state): State<AppState>,
    Query(params): Query<CleanupParams>,
) -> Result<Json<CleanupResponse>, ApiError> {
    let older_than = match params.older_than_days {
        Some(days) if days < 1 => {
            return Err(ApiError::bad_request("older_than_days must be at least 1"))
        }
        Some(days) => Duration::days(days),
        None => state.config.certificate_retention.ok_or_else(|| {
            ApiError::bad_request("older_than_days is required when no retention is configured")
        })?,
    };
    let removed = state
        .orchestrator
        .cleanup_certificates(older_than, &user.user_id)
        .await?;
    Ok(Json(CleanupResponse { removed }))
}

fn audit_query(params: &AuditQueryParams, today: NaiveDate) -> Result<AuditQuery, ApiError> {
    let to = parse_date(params.end_date.as_deref(), "end_date")?.unwrap_or(today);
    let from = parse_date(params.start_date.as_deref(), "start_date")?.unwrap_or(to);
    if from > to {
        return Err(ApiError::bad_request("start_date is after end_date"));
    }
    if to - from > Duration::days(MAX_AUDIT_DAYS) {
        return Err(ApiError::bad_request("date range too large"));
    }

    let event_type = params
        .event_type
        .as_deref()
        .map(|raw| {
            AuditEventType::from_str(raw)
                .ok_or_else(|| ApiError::bad_request(format!("unknown event_type: {raw}")))
        })
        .transpose()?;

    Ok(AuditQuery {
        from,
        to,
        event_type,
        user_id: params.user_id.clone(),
        resource_id: params.resource_id.clone(),
        limit: params
            .limit
            .unwrap_or(DEFAULT_AUDIT_LIMIT)
            .clamp(1, MAX_AUDIT_LIMIT),
    })
}

fn parse_date(raw: Option<&str>, field: &str) -> Result<Option<NaiveDate>, ApiError> {
    raw.map(|s| {
        NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map_err(|_| ApiError::bad_request(format!("Invalid {field} format. Use YYYY-MM-DD.")))
    })
    .transpose()
}
