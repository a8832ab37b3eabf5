// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Bank transfer and cash payments.
//!
//! No provider is involved: the member pays quoting the reference and
//! treasury staff confirm the purchase once the money is seen.

use async_trait::async_trait;
use axum::http::HeaderMap;

use super::env::env_optional;
use super::{
    CreatePaymentRequest, GatewayError, GatewayPayment, GatewayStatusReport, PaymentGateway,
    WebhookEvent,
};

const DEFAULT_INSTRUCTIONS: &str =
    "Pay at the club treasury or by bank transfer, quoting reference {reference}.";

#[derive(Debug, Clone)]
pub struct ManualGateway {
    /// Shown to the member; `{reference}` is substituted.
    instructions: String,
}

impl ManualGateway {
    pub fn new(instructions: impl Into<String>) -> Self {
        Self {
            instructions: instructions.into(),
        }
    }

    pub fn from_env() -> Self {
        Self::new(
            env_optional("MANUAL_PAYMENT_INSTRUCTIONS")
                .unwrap_or_else(|| DEFAULT_INSTRUCTIONS.to_string()),
        )
    }
}

#[async_trait]
impl PaymentGateway for ManualGateway {
    fn provider(&self) -> &'static str {
        "manual"
    }

    async fn create_payment(
        &self,
        request: &CreatePaymentRequest,
    ) -> Result<GatewayPayment, GatewayError> {
        Ok(GatewayPayment {
            handle: None,
            checkout_url: None,
            checkout_reference: Some(self.instructions.replace("{reference}", &request.reference)),
        })
    }

    /// Manual payments never settle on their own.
    async fn get_status(
        &self,
        _reference: &str,
        _handle: Option<&str>,
    ) -> Result<GatewayStatusReport, GatewayError> {
        Ok(GatewayStatusReport::pending())
    }

    fn parse_webhook(
        &self,
        _headers: &HeaderMap,
        _body: &[u8],
    ) -> Result<Option<WebhookEvent>, GatewayError> {
        Err(GatewayError::Unsupported(
            "manual payments have no webhooks".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Money;
    use crate::payments::GatewayStatus;
    use std::collections::BTreeMap;

    #[tokio::test]
    async fn instructions_quote_reference() {
        let gateway = ManualGateway::new("Transfer to ACME quoting {reference}");
        let payment = gateway
            .create_payment(&CreatePaymentRequest {
                reference: "REF".to_string(),
                amount: Money::from_minor(100),
                currency: "USD".to_string(),
                description: "1 share".to_string(),
                metadata: BTreeMap::new(),
            })
            .await
            .unwrap();

        assert!(payment.handle.is_none());
        assert_eq!(
            payment.checkout_reference.as_deref(),
            Some("Transfer to ACME quoting REF")
        );
        assert_eq!(
            gateway.get_status("REF", None).await.unwrap().status,
            GatewayStatus::Pending
        );
        assert!(gateway.parse_webhook(&HeaderMap::new(), b"{}").is_err());
    }
}
