// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Environment lookups shared by the gateway clients.

use std::time::Duration;

use reqwest::Client;

use super::GatewayError;

const HTTP_TIMEOUT: Duration = Duration::from_secs(15);

pub(super) fn required_env_present(name: &str) -> bool {
    env_optional(name).is_some()
}

pub(super) fn env_required(name: &str) -> Result<String, GatewayError> {
    env_optional(name).ok_or_else(|| GatewayError::NotConfigured(name.to_string()))
}

pub(super) fn env_optional(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub(super) fn env_or_default(name: &str, default: &str) -> String {
    env_optional(name).unwrap_or_else(|| default.to_string())
}

pub(super) fn http_client() -> Result<Client, GatewayError> {
    Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .map_err(|e| GatewayError::Request(format!("failed to build HTTP client: {e}")))
}

/// Turn a non-2xx response into a [`GatewayError::Request`].
pub(super) async fn ensure_success(
    response: reqwest::Response,
    context: &str,
) -> Result<reqwest::Response, GatewayError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    tracing::error!(status = %status, response_body = %body, context, "payment provider request failed");
    Err(GatewayError::Request(format!("{context} returned {status}: {body}")))
}
