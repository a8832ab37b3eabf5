// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! PayPal Orders v2 integration for international payments.
//!
//! An order is approved by the buyer on PayPal and then captured by us.
//! [`PayPalGateway::get_status`] captures approved orders, so a status check
//! is what moves the money.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use axum::http::HeaderMap;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

use super::env::{
    ensure_success, env_optional, env_or_default, env_required, http_client, required_env_present,
};
use super::{
    status_from, CreatePaymentRequest, GatewayError, GatewayPayment, GatewayStatus,
    GatewayStatusReport, PaymentGateway, WebhookEvent, REFERENCE_METADATA_KEY,
};

const DEFAULT_API_BASE_URL: &str = "https://api-m.sandbox.paypal.com";

#[derive(Debug, Clone)]
pub struct PayPalGateway {
    api_base_url: String,
    client_id: String,
    client_secret: String,
    return_url: Option<String>,
    cancel_url: Option<String>,
    http: Client,
}

#[derive(Debug, Deserialize)]
struct OAuthTokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct Order {
    id: String,
    status: String,
    #[serde(default)]
    links: Vec<Link>,
    #[serde(default)]
    purchase_units: Vec<PurchaseUnit>,
}

#[derive(Debug, Deserialize)]
struct Link {
    href: String,
    rel: String,
}

#[derive(Debug, Deserialize)]
struct PurchaseUnit {
    #[serde(default)]
    custom_id: Option<String>,
}

impl PayPalGateway {
    pub fn is_configured() -> bool {
        required_env_present("PAYPAL_CLIENT_ID") && required_env_present("PAYPAL_CLIENT_SECRET")
    }

    pub fn from_env() -> Result<Self, GatewayError> {
        Ok(Self {
            api_base_url: env_or_default("PAYPAL_API_BASE_URL", DEFAULT_API_BASE_URL),
            client_id: env_required("PAYPAL_CLIENT_ID")?,
            client_secret: env_required("PAYPAL_CLIENT_SECRET")?,
            return_url: env_optional("PAYPAL_RETURN_URL"),
            cancel_url: env_optional("PAYPAL_CANCEL_URL"),
            http: http_client()?,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base_url.trim_end_matches('/'), path)
    }

    async fn access_token(&self) -> Result<String, GatewayError> {
        let mut form = HashMap::new();
        form.insert("grant_type", "client_credentials");

        let response = self
            .http
            .post(self.url("/v1/oauth2/token"))
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&form)
            .send()
            .await
            .map_err(|e| GatewayError::Request(format!("token request failed: {e}")))?;
        let response = ensure_success(response, "paypal token").await?;

        let token: OAuthTokenResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::InvalidResponse(format!("invalid token response: {e}")))?;
        if token.access_token.trim().is_empty() {
            return Err(GatewayError::InvalidResponse(
                "token response did not include access_token".to_string(),
            ));
        }
        Ok(token.access_token)
    }

    async fn send_order_request(
        &self,
        request: reqwest::RequestBuilder,
        context: &str,
    ) -> Result<Order, GatewayError> {
        let token = self.access_token().await?;
        let response = request
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| GatewayError::Request(format!("{context} failed: {e}")))?;
        let response = ensure_success(response, context).await?;
        response
            .json()
            .await
            .map_err(|e| GatewayError::InvalidResponse(format!("{context}: {e}")))
    }
}

#[async_trait]
impl PaymentGateway for PayPalGateway {
    fn provider(&self) -> &'static str {
        "paypal"
    }

    async fn create_payment(
        &self,
        request: &CreatePaymentRequest,
    ) -> Result<GatewayPayment, GatewayError> {
        let mut payload = json!({
            "intent": "CAPTURE",
            "purchase_units": [{
                "reference_id": request.reference,
                "custom_id": request.reference,
                "description": request.description,
                "amount": {
                    "currency_code": request.currency,
                    "value": request.amount.to_string(),
                }
            }]
        });
        if let (Some(return_url), Some(cancel_url)) = (&self.return_url, &self.cancel_url) {
            payload["application_context"] = json!({
                "return_url": return_url,
                "cancel_url": cancel_url,
            });
        }

        let order = self
            .send_order_request(
                self.http
                    .post(self.url("/v2/checkout/orders"))
                    .header("PayPal-Request-Id", &request.reference)
                    .json(&payload),
                "create order",
            )
            .await?;

        Ok(GatewayPayment {
            checkout_url: approval_link(&order),
            handle: Some(order.id),
            checkout_reference: None,
        })
    }

    async fn get_status(
        &self,
        _reference: &str,
        handle: Option<&str>,
    ) -> Result<GatewayStatusReport, GatewayError> {
        let handle = handle
            .ok_or_else(|| GatewayError::InvalidResponse("paypal payment has no order id".to_string()))?;

        let mut order = self
            .send_order_request(
                self.http.get(self.url(&format!("/v2/checkout/orders/{handle}"))),
                "get order",
            )
            .await?;

        if order.status.eq_ignore_ascii_case("APPROVED") {
            order = self
                .send_order_request(
                    self.http
                        .post(self.url(&format!("/v2/checkout/orders/{handle}/capture")))
                        .header("PayPal-Request-Id", format!("capture-{handle}"))
                        .json(&json!({})),
                    "capture order",
                )
                .await?;
            tracing::info!(order_id = %handle, status = %order.status, "PayPal order captured");
        }

        let mut metadata = BTreeMap::new();
        if let Some(reference) = order.purchase_units.iter().find_map(|u| u.custom_id.clone()) {
            metadata.insert(REFERENCE_METADATA_KEY.to_string(), reference);
        }
        Ok(GatewayStatusReport {
            status: map_order_status(&order.status),
            metadata,
        })
    }

    /// PayPal signs webhooks with certificates verified through its API, so
    /// the event is only used to locate the order. Confirmation re-reads the
    /// order status from PayPal.
    fn parse_webhook(
        &self,
        _headers: &HeaderMap,
        body: &[u8],
    ) -> Result<Option<WebhookEvent>, GatewayError> {
        let event: Value = serde_json::from_slice(body)
            .map_err(|e| GatewayError::InvalidResponse(format!("paypal event: {e}")))?;
        Ok(event_to_webhook(&event))
    }
}

fn map_order_status(raw: &str) -> GatewayStatus {
    status_from(raw, &["completed"], &[], &["voided"])
}

fn approval_link(order: &Order) -> Option<String> {
    order
        .links
        .iter()
        .find(|link| link.rel == "approve" || link.rel == "payer-action")
        .map(|link| link.href.clone())
}

fn event_to_webhook(event: &Value) -> Option<WebhookEvent> {
    let event_type = event.get("event_type").and_then(Value::as_str)?;
    let resource = event.get("resource")?;

    match event_type {
        "CHECKOUT.ORDER.APPROVED" | "CHECKOUT.ORDER.COMPLETED" => Some(WebhookEvent {
            handle: resource.get("id").and_then(Value::as_str).map(str::to_string),
            reference: resource
                .pointer("/purchase_units/0/custom_id")
                .and_then(Value::as_str)
                .map(str::to_string),
        }),
        "PAYMENT.CAPTURE.COMPLETED" => Some(WebhookEvent {
            handle: resource
                .pointer("/supplementary_data/related_ids/order_id")
                .and_then(Value::as_str)
                .map(str::to_string),
            reference: resource
                .get("custom_id")
                .and_then(Value::as_str)
                .map(str::to_string),
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_is_stable() {
        assert_eq!(map_order_status("COMPLETED"), GatewayStatus::Succeeded);
        assert_eq!(map_order_status("VOIDED"), GatewayStatus::Canceled);
        assert_eq!(map_order_status("CREATED"), GatewayStatus::Pending);
        assert_eq!(map_order_status("PAYER_ACTION_REQUIRED"), GatewayStatus::Pending);
    }

    #[test]
    fn finds_approval_link() {
        let order: Order = serde_json::from_value(json!({
            "id": "ORDER-1",
            "status": "CREATED",
            "links": [
                {"href": "https://api/self", "rel": "self"},
                {"href": "https://paypal/checkoutnow?token=ORDER-1", "rel": "approve"}
            ]
        }))
        .unwrap();
        assert_eq!(
            approval_link(&order).as_deref(),
            Some("https://paypal/checkoutnow?token=ORDER-1")
        );
    }

    #[test]
    fn reads_order_and_capture_events() {
        let approved = json!({
            "event_type": "CHECKOUT.ORDER.APPROVED",
            "resource": {"id": "ORDER-1", "purchase_units": [{"custom_id": "ref"}]}
        });
        assert_eq!(
            event_to_webhook(&approved),
            Some(WebhookEvent {
                reference: Some("ref".to_string()),
                handle: Some("ORDER-1".to_string()),
            })
        );

        let captured = json!({
            "event_type": "PAYMENT.CAPTURE.COMPLETED",
            "resource": {
                "id": "CAPTURE-1",
                "custom_id": "ref",
                "supplementary_data": {"related_ids": {"order_id": "ORDER-1"}}
            }
        });
        assert_eq!(
            event_to_webhook(&captured).unwrap().handle.as_deref(),
            Some("ORDER-1")
        );

        let other = json!({"event_type": "BILLING.PLAN.CREATED", "resource": {}});
        assert!(event_to_webhook(&other).is_none());
    }
}
