// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Scriptable gateway for tests.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::http::HeaderMap;
use serde_json::Value;
use tokio::sync::Notify;

use super::{
    CreatePaymentRequest, GatewayError, GatewayPayment, GatewayStatus, GatewayStatusReport,
    PaymentGateway, WebhookEvent, REFERENCE_METADATA_KEY,
};

/// Header a fake webhook must carry with value `valid`.
pub const FAKE_SIGNATURE_HEADER: &str = "x-fake-signature";

pub struct FakeGateway {
    provider: &'static str,
    fail_create: AtomicBool,
    fail_status: AtomicBool,
    status: Mutex<GatewayStatus>,
    created: AtomicUsize,
    status_checks: AtomicUsize,
    hold: Mutex<Option<Arc<Notify>>>,
    held: Notify,
}

impl FakeGateway {
    pub fn new(provider: &'static str) -> Self {
        Self {
            provider,
            fail_create: AtomicBool::new(false),
            fail_status: AtomicBool::new(false),
            status: Mutex::new(GatewayStatus::Pending),
            created: AtomicUsize::new(0),
            status_checks: AtomicUsize::new(0),
            hold: Mutex::new(None),
            held: Notify::new(),
        }
    }

    pub fn fail_create(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    pub fn fail_status(&self, fail: bool) {
        self.fail_status.store(fail, Ordering::SeqCst);
    }

    pub fn set_status(&self, status: GatewayStatus) {
        *self.status.lock().unwrap() = status;
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn status_checks(&self) -> usize {
        self.status_checks.load(Ordering::SeqCst)
    }

    /// Park the next status check until the returned handle is notified.
    pub fn hold_next_status_check(&self) -> Arc<Notify> {
        let release = Arc::new(Notify::new());
        *self.hold.lock().unwrap() = Some(release.clone());
        release
    }

    /// Resolves once a status check is parked.
    pub async fn status_check_held(&self) {
        self.held.notified().await;
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    fn provider(&self) -> &'static str {
        self.provider
    }

    async fn create_payment(
        &self,
        request: &CreatePaymentRequest,
    ) -> Result<GatewayPayment, GatewayError> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(GatewayError::Request("provider unavailable".to_string()));
        }
        let n = self.created.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(GatewayPayment {
            handle: Some(format!("fake_{n}")),
            checkout_url: Some(format!("https://pay.example/{}", request.reference)),
            checkout_reference: None,
        })
    }

    async fn get_status(
        &self,
        reference: &str,
        _handle: Option<&str>,
    ) -> Result<GatewayStatusReport, GatewayError> {
        self.status_checks.fetch_add(1, Ordering::SeqCst);
        let hold = self.hold.lock().unwrap().take();
        if let Some(release) = hold {
            self.held.notify_one();
            release.notified().await;
        }
        if self.fail_status.load(Ordering::SeqCst) {
            return Err(GatewayError::Request("provider unavailable".to_string()));
        }
        let mut metadata = BTreeMap::new();
        metadata.insert(REFERENCE_METADATA_KEY.to_string(), reference.to_string());
        Ok(GatewayStatusReport {
            status: *self.status.lock().unwrap(),
            metadata,
        })
    }

    /// Body `{"reference": "..."}`, signed by header `x-fake-signature: valid`.
    fn parse_webhook(
        &self,
        headers: &HeaderMap,
        body: &[u8],
    ) -> Result<Option<WebhookEvent>, GatewayError> {
        if headers.get(FAKE_SIGNATURE_HEADER).and_then(|v| v.to_str().ok()) != Some("valid") {
            return Err(GatewayError::InvalidSignature("fake signature".to_string()));
        }
        let event: Value = serde_json::from_slice(body)
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;
        Ok(event
            .get("reference")
            .and_then(Value::as_str)
            .map(|reference| WebhookEvent {
                reference: Some(reference.to_string()),
                handle: None,
            }))
    }
}
