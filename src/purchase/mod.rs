// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Purchase Confirmation
//!
//! The share purchase workflow:
//!
//! ```text
//! initiate ──► Initiated (pending record, 24h) ──confirm──► Confirmed ──► Completed
//!                    │                                                  (Share + Payment,
//!                    └── confirm after expiry ──► Expired                certificate, pending
//!                                                                        record deleted)
//! ```
//!
//! Confirmation is idempotent on the Share: once a Share exists for a
//! reference, every later confirmation returns that Share and writes nothing.

use crate::certificates::{RenderError, VaultError};
use crate::payments::{GatewayError, GatewayStatus};
use crate::storage::{LedgerError, StorageError};

pub mod maintenance;
pub mod orchestrator;

pub use maintenance::{MaintenanceReport, MaintenanceTask};
pub use orchestrator::{
    CertificateDownload, Confirmation, ConfirmedPurchase, InitiatePurchase, InitiatedPurchase,
    InstallmentRequest, PollSummary, PurchaseOrchestrator, PurchaseSettings, ShareDetail,
    WebhookOutcome,
};

#[derive(Debug, thiserror::Error)]
pub enum PurchaseError {
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("payment reference expired or not found")]
    ReferenceExpiredOrNotFound,

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("certificate rendering failed: {0}")]
    Render(#[from] RenderError),

    #[error("certificate could not be decrypted")]
    Decryption,

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("payment gateway unavailable: {0}")]
    GatewayUnavailable(String),

    #[error("payment gateway error: {0}")]
    Gateway(GatewayError),

    #[error("payment method requires confirmation by treasury staff")]
    AwaitingManualConfirmation,

    #[error("payment not completed (provider status {0:?})")]
    PaymentNotCompleted(GatewayStatus),
}

impl From<StorageError> for PurchaseError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NotFound(what) => PurchaseError::NotFound(what),
            StorageError::PermissionDenied { resource, .. } => {
                PurchaseError::Forbidden(format!("no access to {resource}"))
            }
            other => PurchaseError::StorageUnavailable(other.to_string()),
        }
    }
}

impl From<LedgerError> for PurchaseError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::NotFound(what) => PurchaseError::NotFound(what),
            other => PurchaseError::StorageUnavailable(other.to_string()),
        }
    }
}

impl From<VaultError> for PurchaseError {
    fn from(e: VaultError) -> Self {
        match e {
            VaultError::Decryption => PurchaseError::Decryption,
            VaultError::Storage(storage) => storage.into(),
            other => PurchaseError::StorageUnavailable(other.to_string()),
        }
    }
}

impl From<GatewayError> for PurchaseError {
    fn from(e: GatewayError) -> Self {
        match e {
            GatewayError::NotConfigured(what) => PurchaseError::GatewayUnavailable(what),
            other => PurchaseError::Gateway(other),
        }
    }
}

impl From<tokio::task::JoinError> for PurchaseError {
    fn from(e: tokio::task::JoinError) -> Self {
        PurchaseError::StorageUnavailable(format!("blocking task failed: {e}"))
    }
}

/// Run blocking storage work off the async executor.
pub(crate) async fn blocking<T, F>(work: F) -> Result<T, PurchaseError>
where
    F: FnOnce() -> Result<T, PurchaseError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work).await?
}
