// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Payment provider notifications.
//!
//! Providers authenticate with their own signature scheme, so these routes
//! carry no bearer token. A verified delivery is only a hint: the purchase is
//! confirmed after the provider reports the payment as settled.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{error::ApiError, purchase::WebhookOutcome, state::AppState};

#[derive(Debug, Serialize, ToSchema)]
pub struct WebhookResponse {
    /// `confirmed` or `ignored`.
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub share_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Receive a provider webhook.
///
/// Deliveries that do not lead to a confirmation (expired reference,
/// payment not yet settled, unhandled event) are acknowledged with 200 so the
/// provider stops retrying.
#[utoipa::path(
    post,
    path = "/v1/webhooks/{provider}",
    tag = "Webhooks",
    params(("provider" = String, Path, description = "Provider name, e.g. stripe")),
    request_body(content = String, description = "Raw provider payload"),
    responses(
        (status = 200, description = "Delivery processed", body = WebhookResponse),
        (status = 401, description = "Invalid signature"),
        (status = 404, description = "Unknown provider"),
        (status = 502, description = "Provider could not be queried")
    )
)]
pub async fn receive_webhook(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>, ApiError> {
    let outcome = state
        .orchestrator
        .handle_webhook(&provider, &headers, &body)
        .await
        .inspect_err(|e| tracing::warn!(provider = %provider, error = %e, "Webhook rejected"))?;

    let response = match outcome {
        WebhookOutcome::Confirmed { share_id } => {
            tracing::info!(provider = %provider, share_id, "Webhook confirmed purchase");
            WebhookResponse {
                status: "confirmed".to_string(),
                share_id: Some(share_id),
                reason: None,
            }
        }
        WebhookOutcome::Ignored(reason) => {
            tracing::debug!(provider = %provider, reason = %reason, "Webhook ignored");
            WebhookResponse {
                status: "ignored".to_string(),
                share_id: None,
                reason: Some(reason),
            }
        }
    };
    Ok(Json(response))
}
