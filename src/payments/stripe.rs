// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Stripe card payments via PaymentIntents.

use std::collections::BTreeMap;

use async_trait::async_trait;
use axum::http::HeaderMap;
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use sha2::Sha256;

use super::env::{ensure_success, env_or_default, env_required, http_client, required_env_present};
use super::{
    status_from, CreatePaymentRequest, GatewayError, GatewayPayment, GatewayStatusReport,
    PaymentGateway, WebhookEvent, REFERENCE_METADATA_KEY,
};

type HmacSha256 = Hmac<Sha256>;

const DEFAULT_API_BASE_URL: &str = "https://api.stripe.com";
const SIGNATURE_HEADER: &str = "stripe-signature";
/// Maximum age of a signed webhook timestamp.
const SIGNATURE_TOLERANCE_SECS: i64 = 300;

#[derive(Debug, Clone)]
pub struct StripeGateway {
    api_base_url: String,
    secret_key: String,
    webhook_secret: String,
    http: Client,
}

#[derive(Debug, Deserialize)]
struct PaymentIntent {
    id: String,
    status: String,
    #[serde(default)]
    client_secret: Option<String>,
    #[serde(default)]
    metadata: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct StripeEvent {
    #[serde(rename = "type")]
    type_: String,
    data: StripeEventData,
}

#[derive(Debug, Deserialize)]
struct StripeEventData {
    object: Value,
}

impl StripeGateway {
    pub fn is_configured() -> bool {
        required_env_present("STRIPE_SECRET_KEY") && required_env_present("STRIPE_WEBHOOK_SECRET")
    }

    pub fn from_env() -> Result<Self, GatewayError> {
        Ok(Self {
            api_base_url: env_or_default("STRIPE_API_BASE_URL", DEFAULT_API_BASE_URL),
            secret_key: env_required("STRIPE_SECRET_KEY")?,
            webhook_secret: env_required("STRIPE_WEBHOOK_SECRET")?,
            http: http_client()?,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base_url.trim_end_matches('/'), path)
    }

    /// Check a `Stripe-Signature` header (`t=...,v1=...`) against the payload.
    fn verify_signature(&self, payload: &[u8], header: &str, now: i64) -> Result<(), GatewayError> {
        let mut timestamp: Option<&str> = None;
        let mut signatures = Vec::new();
        for part in header.split(',') {
            if let Some(rest) = part.trim().strip_prefix("t=") {
                timestamp = Some(rest);
            } else if let Some(rest) = part.trim().strip_prefix("v1=") {
                signatures.push(rest);
            }
        }

        let timestamp = timestamp
            .ok_or_else(|| GatewayError::InvalidSignature("missing timestamp".to_string()))?;
        if signatures.is_empty() {
            return Err(GatewayError::InvalidSignature("missing v1 signature".to_string()));
        }
        let signed_at: i64 = timestamp
            .parse()
            .map_err(|_| GatewayError::InvalidSignature("malformed timestamp".to_string()))?;
        if (now - signed_at).abs() > SIGNATURE_TOLERANCE_SECS {
            return Err(GatewayError::InvalidSignature(
                "timestamp outside tolerance".to_string(),
            ));
        }

        for signature in signatures {
            let Ok(provided) = hex::decode(signature) else {
                continue;
            };
            let mut mac = HmacSha256::new_from_slice(self.webhook_secret.as_bytes())
                .map_err(|e| GatewayError::InvalidSignature(e.to_string()))?;
            mac.update(timestamp.as_bytes());
            mac.update(b".");
            mac.update(payload);
            if mac.verify_slice(&provided).is_ok() {
                return Ok(());
            }
        }
        Err(GatewayError::InvalidSignature("signature mismatch".to_string()))
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    fn provider(&self) -> &'static str {
        "stripe"
    }

    async fn create_payment(
        &self,
        request: &CreatePaymentRequest,
    ) -> Result<GatewayPayment, GatewayError> {
        let mut form: Vec<(String, String)> = vec![
            ("amount".to_string(), request.amount.minor().to_string()),
            ("currency".to_string(), request.currency.to_ascii_lowercase()),
            ("description".to_string(), request.description.clone()),
            ("automatic_payment_methods[enabled]".to_string(), "true".to_string()),
            (
                format!("metadata[{REFERENCE_METADATA_KEY}]"),
                request.reference.clone(),
            ),
        ];
        for (key, value) in &request.metadata {
            form.push((format!("metadata[{key}]"), value.clone()));
        }

        let response = self
            .http
            .post(self.url("/v1/payment_intents"))
            .bearer_auth(&self.secret_key)
            .header("Idempotency-Key", &request.reference)
            .form(&form)
            .send()
            .await
            .map_err(|e| GatewayError::Request(format!("create payment intent failed: {e}")))?;
        let response = ensure_success(response, "create payment intent").await?;

        let intent: PaymentIntent = response
            .json()
            .await
            .map_err(|e| GatewayError::InvalidResponse(format!("payment intent: {e}")))?;

        Ok(GatewayPayment {
            handle: Some(intent.id),
            checkout_url: None,
            checkout_reference: intent.client_secret,
        })
    }

    async fn get_status(
        &self,
        _reference: &str,
        handle: Option<&str>,
    ) -> Result<GatewayStatusReport, GatewayError> {
        let handle = handle.ok_or_else(|| {
            GatewayError::InvalidResponse("stripe payment has no intent id".to_string())
        })?;

        let response = self
            .http
            .get(self.url(&format!("/v1/payment_intents/{handle}")))
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(|e| GatewayError::Request(format!("retrieve payment intent failed: {e}")))?;
        let response = ensure_success(response, "retrieve payment intent").await?;

        let intent: PaymentIntent = response
            .json()
            .await
            .map_err(|e| GatewayError::InvalidResponse(format!("payment intent: {e}")))?;

        Ok(GatewayStatusReport {
            status: map_intent_status(&intent.status),
            metadata: intent.metadata,
        })
    }

    fn parse_webhook(
        &self,
        headers: &HeaderMap,
        body: &[u8],
    ) -> Result<Option<WebhookEvent>, GatewayError> {
        let header = headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| GatewayError::InvalidSignature("missing Stripe-Signature".to_string()))?;
        self.verify_signature(body, header, Utc::now().timestamp())?;

        let event: StripeEvent = serde_json::from_slice(body)
            .map_err(|e| GatewayError::InvalidResponse(format!("stripe event: {e}")))?;
        Ok(event_to_webhook(&event))
    }
}

fn map_intent_status(raw: &str) -> super::GatewayStatus {
    status_from(raw, &["succeeded"], &[], &["canceled"])
}

fn event_to_webhook(event: &StripeEvent) -> Option<WebhookEvent> {
    if !event.type_.starts_with("payment_intent.") {
        return None;
    }
    let object = &event.data.object;
    Some(WebhookEvent {
        reference: object
            .pointer(&format!("/metadata/{REFERENCE_METADATA_KEY}"))
            .and_then(Value::as_str)
            .map(str::to_string),
        handle: object.get("id").and_then(Value::as_str).map(str::to_string),
    })
}
