// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Payment Provider Gateways
//!
//! One [`PaymentGateway`] trait with an implementation per provider:
//!
//! | Method       | Gateway                          |
//! |--------------|----------------------------------|
//! | `card`       | [`stripe::StripeGateway`]        |
//! | `wallet`     | [`mercadopago::MercadoPagoGateway`] |
//! | `paypal`     | [`paypal::PayPalGateway`]        |
//! | `transfer`   | [`manual::ManualGateway`]        |
//! | `cash`       | [`manual::ManualGateway`]        |
//!
//! Callers resolve a gateway from the [`GatewayRegistry`] by payment method
//! and never branch on provider identity.
//!
//! Webhooks are only a hint: a webhook names a reference, and confirmation
//! still asks the provider for the payment status before writing anything.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use axum::http::HeaderMap;
use serde::Serialize;
use utoipa::ToSchema;

use crate::models::{Money, PaymentMethod};
use crate::storage::ProviderHandle;

mod env;
#[cfg(test)]
pub mod fake;
pub mod manual;
pub mod mercadopago;
pub mod paypal;
pub mod stripe;

pub use manual::ManualGateway;
pub use mercadopago::MercadoPagoGateway;
pub use paypal::PayPalGateway;
pub use stripe::StripeGateway;

/// Metadata key carrying the purchase reference at the provider.
pub const REFERENCE_METADATA_KEY: &str = "reference";

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("payment provider not configured: {0}")]
    NotConfigured(String),

    #[error("payment provider request failed: {0}")]
    Request(String),

    #[error("payment provider response was invalid: {0}")]
    InvalidResponse(String),

    #[error("webhook signature invalid: {0}")]
    InvalidSignature(String),

    #[error("not supported by this provider: {0}")]
    Unsupported(String),
}

/// What the orchestrator asks a provider to charge.
#[derive(Debug, Clone)]
pub struct CreatePaymentRequest {
    pub reference: String,
    pub amount: Money,
    pub currency: String,
    pub description: String,
    pub metadata: BTreeMap<String, String>,
}

/// Provider-side identity of a created payment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GatewayPayment {
    pub handle: Option<String>,
    pub checkout_url: Option<String>,
    pub checkout_reference: Option<String>,
}

impl GatewayPayment {
    pub fn into_provider_handle(self, provider: &str) -> ProviderHandle {
        ProviderHandle {
            provider: provider.to_string(),
            handle: self.handle,
            checkout_url: self.checkout_url,
            checkout_reference: self.checkout_reference,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum GatewayStatus {
    Pending,
    Succeeded,
    Failed,
    Canceled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayStatusReport {
    pub status: GatewayStatus,
    pub metadata: BTreeMap<String, String>,
}

impl GatewayStatusReport {
    pub fn pending() -> Self {
        Self {
            status: GatewayStatus::Pending,
            metadata: BTreeMap::new(),
        }
    }
}

/// Payment named by a verified webhook.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WebhookEvent {
    pub reference: Option<String>,
    pub handle: Option<String>,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Stable provider id (`stripe`, `mercadopago`, `paypal`, `manual`).
    fn provider(&self) -> &'static str;

    async fn create_payment(
        &self,
        request: &CreatePaymentRequest,
    ) -> Result<GatewayPayment, GatewayError>;

    /// Current status of the payment for `reference`.
    ///
    /// `handle` is the id returned by [`PaymentGateway::create_payment`].
    async fn get_status(
        &self,
        reference: &str,
        handle: Option<&str>,
    ) -> Result<GatewayStatusReport, GatewayError>;

    /// Verify a webhook delivery and extract the payment it refers to.
    ///
    /// `Ok(None)` means a well-formed event this service does not act on.
    fn parse_webhook(
        &self,
        headers: &HeaderMap,
        body: &[u8],
    ) -> Result<Option<WebhookEvent>, GatewayError>;

    /// Find the purchase reference for a webhook event.
    ///
    /// Providers whose webhooks only carry a payment id look it up.
    async fn resolve_reference(
        &self,
        event: &WebhookEvent,
    ) -> Result<Option<String>, GatewayError> {
        Ok(event.reference.clone())
    }
}

/// Whether a payment method can be used right now.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MethodAvailability {
    pub method: PaymentMethod,
    pub provider: String,
    pub configured: bool,
    pub manual_confirmation: bool,
}

/// Gateways keyed by provider id.
#[derive(Clone, Default)]
pub struct GatewayRegistry {
    gateways: HashMap<&'static str, Arc<dyn PaymentGateway>>,
}

impl GatewayRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every provider whose credentials are present, plus the manual
    /// gateway which needs none.
    pub fn from_env() -> Self {
        let mut registry = Self::new().with_gateway(Arc::new(ManualGateway::from_env()));

        if StripeGateway::is_configured() {
            match StripeGateway::from_env() {
                Ok(gateway) => registry = registry.with_gateway(Arc::new(gateway)),
                Err(e) => tracing::warn!(error = %e, "Stripe gateway disabled"),
            }
        }
        if PayPalGateway::is_configured() {
            match PayPalGateway::from_env() {
                Ok(gateway) => registry = registry.with_gateway(Arc::new(gateway)),
                Err(e) => tracing::warn!(error = %e, "PayPal gateway disabled"),
            }
        }
        if MercadoPagoGateway::is_configured() {
            match MercadoPagoGateway::from_env() {
                Ok(gateway) => registry = registry.with_gateway(Arc::new(gateway)),
                Err(e) => tracing::warn!(error = %e, "MercadoPago gateway disabled"),
            }
        }

        tracing::info!(providers = ?registry.providers(), "Payment gateways registered");
        registry
    }

    pub fn with_gateway(mut self, gateway: Arc<dyn PaymentGateway>) -> Self {
        self.gateways.insert(gateway.provider(), gateway);
        self
    }

    pub fn by_provider(&self, provider: &str) -> Option<Arc<dyn PaymentGateway>> {
        self.gateways.get(provider).cloned()
    }

    pub fn for_method(&self, method: PaymentMethod) -> Result<Arc<dyn PaymentGateway>, GatewayError> {
        self.by_provider(method.provider_id()).ok_or_else(|| {
            GatewayError::NotConfigured(format!(
                "no {} gateway for payment method {method}",
                method.provider_id()
            ))
        })
    }

    /// Registered provider ids, sorted.
    pub fn providers(&self) -> Vec<&'static str> {
        let mut providers: Vec<_> = self.gateways.keys().copied().collect();
        providers.sort_unstable();
        providers
    }

    pub fn availability(&self) -> Vec<MethodAvailability> {
        PaymentMethod::ALL
            .iter()
            .map(|method| MethodAvailability {
                method: *method,
                provider: method.provider_id().to_string(),
                configured: self.gateways.contains_key(method.provider_id()),
                manual_confirmation: method.requires_manual_confirmation(),
            })
            .collect()
    }
}

/// Parse a provider status string against a table of terminal states.
pub(crate) fn status_from(
    raw: &str,
    succeeded: &[&str],
    failed: &[&str],
    canceled: &[&str],
) -> GatewayStatus {
    let status = raw.trim().to_ascii_lowercase();
    if succeeded.contains(&status.as_str()) {
        GatewayStatus::Succeeded
    } else if failed.contains(&status.as_str()) {
        GatewayStatus::Failed
    } else if canceled.contains(&status.as_str()) {
        GatewayStatus::Canceled
    } else {
        GatewayStatus::Pending
    }
}
