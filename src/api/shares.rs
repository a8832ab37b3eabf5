// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Share ledger and certificate endpoints.

use axum::{
    extract::{Path, Query, State},
    http::{
        header::{CONTENT_DISPOSITION, CONTENT_TYPE},
        StatusCode,
    },
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::{
    auth::{AdminOnly, Auth, TreasuryStaff},
    error::ApiError,
    purchase::{CertificateDownload, InstallmentRequest, ShareDetail},
    state::AppState,
    storage::{Payment, Share, ShareStatus},
};

const PDF: &str = "application/pdf";
const ENCRYPTED: &str = "application/octet-stream";

#[derive(Debug, Deserialize, IntoParams)]
pub struct ShareListParams {
    /// Only shares of this member (staff only for other members).
    pub member_id: Option<u64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ShareListResponse {
    pub shares: Vec<Share>,
    pub total: usize,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct StatusUpdateRequest {
    pub status: ShareStatus,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct DecryptRequest {
    /// Identity document number (or member id when none is registered).
    #[serde(alias = "identity")]
    pub password_or_identity: String,
}

/// List shares.
#[utoipa::path(
    get,
    path = "/v1/shares",
    tag = "Shares",
    params(ShareListParams),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Shares", body = ShareListResponse),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Not allowed to list these shares")
    )
)]
pub async fn list_shares(
    Auth(user): Auth,
    State(state): State<AppState>,
    Query(params): Query<ShareListParams>,
) -> Result<Json<ShareListResponse>, ApiError> {
    let shares = state
        .orchestrator
        .list_shares(&user, params.member_id)
        .await?;
    Ok(Json(ShareListResponse {
        total: shares.len(),
        shares,
    }))
}

/// Get a share with its payments and payment completeness.
#[utoipa::path(
    get,
    path = "/v1/shares/{share_id}",
    tag = "Shares",
    params(("share_id" = u64, Path, description = "Share id")),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Share detail", body = ShareDetail),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Not your share"),
        (status = 404, description = "Share not found")
    )
)]
pub async fn get_share(
    Auth(user): Auth,
    State(state): State<AppState>,
    Path(share_id): Path<u64>,
) -> Result<Json<ShareDetail>, ApiError> {
    Ok(Json(state.orchestrator.share_detail(share_id, &user).await?))
}

/// Change a share's administrative status. Admin only.
#[utoipa::path(
    put,
    path = "/v1/shares/{share_id}/status",
    tag = "Shares",
    params(("share_id" = u64, Path, description = "Share id")),
    request_body = StatusUpdateRequest,
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Updated share", body = Share),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Not authorized (admin required)"),
        (status = 404, description = "Share not found")
    )
)]
pub async fn update_share_status(
    AdminOnly(user): AdminOnly,
    State(state): State<AppState>,
    Path(share_id): Path<u64>,
    Json(request): Json<StatusUpdateRequest>,
) -> Result<Json<Share>, ApiError> {
    let share = state
        .orchestrator
        .update_share_status(share_id, request.status, &user.user_id)
        .await?;
    Ok(Json(share))
}

/// Record an installment. Treasury staff only.
#[utoipa::path(
    post,
    path = "/v1/shares/{share_id}/payments",
    tag = "Shares",
    params(("share_id" = u64, Path, description = "Share id")),
    request_body = InstallmentRequest,
    security(("bearer_auth" = [])),
    responses(
        (status = 201, description = "Payment recorded", body = Payment),
        (status = 400, description = "Invalid amount"),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Not authorized (treasury staff required)"),
        (status = 404, description = "Share not found")
    )
)]
pub async fn record_installment(
    TreasuryStaff(user): TreasuryStaff,
    State(state): State<AppState>,
    Path(share_id): Path<u64>,
    Json(request): Json<InstallmentRequest>,
) -> Result<(StatusCode, Json<Payment>), ApiError> {
    let payment = state
        .orchestrator
        .record_installment(share_id, request, &user.user_id)
        .await?;
    Ok((StatusCode::CREATED, Json(payment)))
}

/// Download a share certificate.
///
/// The owner and admins receive the PDF. Other ledger staff receive the
/// copy encrypted for the member.
#[utoipa::path(
    get,
    path = "/v1/shares/{share_id}/certificate",
    tag = "Shares",
    params(("share_id" = u64, Path, description = "Share id")),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "PDF or encrypted certificate", content_type = "application/pdf"),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Not allowed"),
        (status = 404, description = "Share or certificate not found")
    )
)]
pub async fn download_certificate(
    Auth(user): Auth,
    State(state): State<AppState>,
    Path(share_id): Path<u64>,
) -> Result<Response, ApiError> {
    let download = state
        .orchestrator
        .download_certificate(share_id, &user)
        .await?;
    Ok(match download {
        CertificateDownload::Plaintext(bytes) => {
            attachment(PDF, format!("certificado-{share_id}.pdf"), bytes)
        }
        CertificateDownload::Encrypted(bytes) => {
            attachment(ENCRYPTED, format!("certificado-{share_id}.enc"), bytes)
        }
    })
}

/// (Re)issue the certificate for a share. Admin only.
///
/// Retries rendering and encryption after a failed confirmation-time issue.
#[utoipa::path(
    post,
    path = "/v1/shares/{share_id}/certificate/issue",
    tag = "Shares",
    params(("share_id" = u64, Path, description = "Share id")),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Certificate issued", body = Share),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Not authorized (admin required)"),
        (status = 404, description = "Share or member not found"),
        (status = 500, description = "Certificate could not be rendered")
    )
)]
pub async fn issue_certificate(
    AdminOnly(user): AdminOnly,
    State(state): State<AppState>,
    Path(share_id): Path<u64>,
) -> Result<Json<Share>, ApiError> {
    let share = state
        .orchestrator
        .issue_certificate(share_id, &user.user_id)
        .await?;
    Ok(Json(share))
}

/// Decrypt a certificate with the member's identity number.
#[utoipa::path(
    post,
    path = "/v1/shares/{share_id}/certificate/decrypt",
    tag = "Shares",
    params(("share_id" = u64, Path, description = "Share id")),
    request_body = DecryptRequest,
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Decrypted PDF", content_type = "application/pdf"),
        (status = 400, description = "Wrong identity"),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Not your share"),
        (status = 404, description = "Share or certificate not found")
    )
)]
pub async fn decrypt_certificate(
    Auth(user): Auth,
    State(state): State<AppState>,
    Path(share_id): Path<u64>,
    Json(request): Json<DecryptRequest>,
) -> Result<Response, ApiError> {
    let pdf = state
        .orchestrator
        .decrypt_certificate(share_id, &user, &request.password_or_identity)
        .await?;
    Ok(attachment(PDF, format!("certificado-{share_id}.pdf"), pdf))
}

fn attachment(content_type: &'static str, filename: String, bytes: Vec<u8>) -> Response {
    (
        [
            (CONTENT_TYPE, content_type.to_string()),
            (
                CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        bytes,
    )
        .into_response()
}
