// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! MercadoPago Checkout Pro integration for regional wallet payments.
//!
//! A checkout preference is created with `external_reference` set to our
//! reference. Payments made against it are found by searching on that
//! reference, so the preference id is informational only.
//!
//! Webhooks carry just the payment id and are signed with
//! `x-signature: ts=...,v1=...` where `v1` is HMAC-SHA256 over the manifest
//! `id:{data.id};request-id:{x-request-id};ts:{ts};`.

use std::collections::BTreeMap;

use async_trait::async_trait;
use axum::http::HeaderMap;
use hmac::{Hmac, Mac};
use reqwest::Client;
use rust_decimal::prelude::ToPrimitive;
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::Sha256;

use super::env::{
    ensure_success, env_optional, env_or_default, env_required, http_client, required_env_present,
};
use super::{
    status_from, CreatePaymentRequest, GatewayError, GatewayPayment, GatewayStatus,
    GatewayStatusReport, PaymentGateway, WebhookEvent, REFERENCE_METADATA_KEY,
};

type HmacSha256 = Hmac<Sha256>;

const DEFAULT_API_BASE_URL: &str = "https://api.mercadopago.com";
const SIGNATURE_HEADER: &str = "x-signature";
const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Debug, Clone)]
pub struct MercadoPagoGateway {
    api_base_url: String,
    access_token: String,
    webhook_secret: String,
    notification_url: Option<String>,
    use_sandbox: bool,
    http: Client,
}

#[derive(Debug, Deserialize)]
struct Preference {
    id: String,
    #[serde(default)]
    init_point: Option<String>,
    #[serde(default)]
    sandbox_init_point: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MpPayment {
    status: String,
    #[serde(default)]
    external_reference: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<MpPayment>,
}

impl MercadoPagoGateway {
    pub fn is_configured() -> bool {
        required_env_present("MERCADOPAGO_ACCESS_TOKEN")
            && required_env_present("MERCADOPAGO_WEBHOOK_SECRET")
    }

    pub fn from_env() -> Result<Self, GatewayError> {
        Ok(Self {
            api_base_url: env_or_default("MERCADOPAGO_API_BASE_URL", DEFAULT_API_BASE_URL),
            access_token: env_required("MERCADOPAGO_ACCESS_TOKEN")?,
            webhook_secret: env_required("MERCADOPAGO_WEBHOOK_SECRET")?,
            notification_url: env_optional("MERCADOPAGO_NOTIFICATION_URL"),
            use_sandbox: env_optional("MERCADOPAGO_SANDBOX").is_some_and(|v| v == "true" || v == "1"),
            http: http_client()?,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base_url.trim_end_matches('/'), path)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        context: &str,
    ) -> Result<T, GatewayError> {
        let response = self
            .http
            .get(self.url(path))
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| GatewayError::Request(format!("{context} failed: {e}")))?;
        let response = ensure_success(response, context).await?;
        response
            .json()
            .await
            .map_err(|e| GatewayError::InvalidResponse(format!("{context}: {e}")))
    }

    fn verify_signature(&self, headers: &HeaderMap, data_id: &str) -> Result<(), GatewayError> {
        let header = headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| GatewayError::InvalidSignature("missing x-signature".to_string()))?;
        let request_id = headers
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();

        let mut timestamp = None;
        let mut signature = None;
        for part in header.split(',') {
            let mut kv = part.trim().splitn(2, '=');
            match (kv.next(), kv.next()) {
                (Some("ts"), Some(value)) => timestamp = Some(value),
                (Some("v1"), Some(value)) => signature = Some(value),
                _ => {}
            }
        }
        let timestamp =
            timestamp.ok_or_else(|| GatewayError::InvalidSignature("missing ts".to_string()))?;
        let signature =
            signature.ok_or_else(|| GatewayError::InvalidSignature("missing v1".to_string()))?;
        let provided = hex::decode(signature)
            .map_err(|_| GatewayError::InvalidSignature("v1 is not hex".to_string()))?;

        let manifest = signature_manifest(data_id, request_id, timestamp);
        let mut mac = HmacSha256::new_from_slice(self.webhook_secret.as_bytes())
            .map_err(|e| GatewayError::InvalidSignature(e.to_string()))?;
        mac.update(manifest.as_bytes());
        mac.verify_slice(&provided)
            .map_err(|_| GatewayError::InvalidSignature("signature mismatch".to_string()))
    }
}

#[async_trait]
impl PaymentGateway for MercadoPagoGateway {
    fn provider(&self) -> &'static str {
        "mercadopago"
    }

    async fn create_payment(
        &self,
        request: &CreatePaymentRequest,
    ) -> Result<GatewayPayment, GatewayError> {
        let mut payload = json!({
            "items": [{
                "title": request.description,
                "quantity": 1,
                "currency_id": request.currency,
                "unit_price": request.amount.as_decimal().to_f64(),
            }],
            "external_reference": request.reference,
            "metadata": request.metadata,
        });
        if let Some(url) = &self.notification_url {
            payload["notification_url"] = Value::String(url.clone());
        }

        let response = self
            .http
            .post(self.url("/checkout/preferences"))
            .bearer_auth(&self.access_token)
            .header("X-Idempotency-Key", &request.reference)
            .json(&payload)
            .send()
            .await
            .map_err(|e| GatewayError::Request(format!("create preference failed: {e}")))?;
        let response = ensure_success(response, "create preference").await?;

        let preference: Preference = response
            .json()
            .await
            .map_err(|e| GatewayError::InvalidResponse(format!("preference: {e}")))?;

        let checkout_url = if self.use_sandbox {
            preference.sandbox_init_point.or(preference.init_point)
        } else {
            preference.init_point
        };
        Ok(GatewayPayment {
            handle: Some(preference.id),
            checkout_url,
            checkout_reference: None,
        })
    }

    async fn get_status(
        &self,
        reference: &str,
        _handle: Option<&str>,
    ) -> Result<GatewayStatusReport, GatewayError> {
        let search: SearchResponse = self
            .get_json(
                &format!("/v1/payments/search?external_reference={reference}"),
                "search payments",
            )
            .await?;

        let statuses: Vec<GatewayStatus> = search
            .results
            .iter()
            .map(|payment| map_payment_status(&payment.status))
            .collect();

        let mut metadata = BTreeMap::new();
        metadata.insert(REFERENCE_METADATA_KEY.to_string(), reference.to_string());
        Ok(GatewayStatusReport {
            status: summarize(&statuses),
            metadata,
        })
    }

    fn parse_webhook(
        &self,
        headers: &HeaderMap,
        body: &[u8],
    ) -> Result<Option<WebhookEvent>, GatewayError> {
        let event: Value = serde_json::from_slice(body)
            .map_err(|e| GatewayError::InvalidResponse(format!("mercadopago event: {e}")))?;

        let data_id = match event.pointer("/data/id") {
            Some(Value::String(id)) => id.clone(),
            Some(Value::Number(id)) => id.to_string(),
            _ => return Ok(None),
        };
        self.verify_signature(headers, &data_id.to_ascii_lowercase())?;

        let kind = event
            .get("type")
            .or_else(|| event.get("topic"))
            .and_then(Value::as_str)
            .unwrap_or_default();
        if kind != "payment" {
            return Ok(None);
        }
        Ok(Some(WebhookEvent {
            reference: None,
            handle: Some(data_id),
        }))
    }

    async fn resolve_reference(
        &self,
        event: &WebhookEvent,
    ) -> Result<Option<String>, GatewayError> {
        if event.reference.is_some() {
            return Ok(event.reference.clone());
        }
        let Some(payment_id) = &event.handle else {
            return Ok(None);
        };
        let payment: MpPayment = self
            .get_json(&format!("/v1/payments/{payment_id}"), "get payment")
            .await?;
        Ok(payment.external_reference)
    }
}

fn signature_manifest(data_id: &str, request_id: &str, timestamp: &str) -> String {
    let mut manifest = format!("id:{data_id};");
    if !request_id.is_empty() {
        manifest.push_str(&format!("request-id:{request_id};"));
    }
    manifest.push_str(&format!("ts:{timestamp};"));
    manifest
}

fn map_payment_status(raw: &str) -> GatewayStatus {
    status_from(
        raw,
        &["approved"],
        &["rejected"],
        &["cancelled", "refunded", "charged_back"],
    )
}

/// One approved payment settles the reference; otherwise the latest attempt
/// decides, and no attempts at all means still pending.
fn summarize(statuses: &[GatewayStatus]) -> GatewayStatus {
    if statuses.contains(&GatewayStatus::Succeeded) {
        return GatewayStatus::Succeeded;
    }
    statuses.last().copied().unwrap_or(GatewayStatus::Pending)
}
