// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Purchase orchestration.
//!
//! [`PurchaseOrchestrator`] owns the path from a purchase request to an
//! issued certificate:
//!
//! 1. `initiate_purchase` asks the payment gateway for a checkout and stores
//!    a pending record keyed by a fresh reference.
//! 2. `confirm_purchase` verifies the payment (treasury staff for transfers
//!    and cash, the provider otherwise) and writes the Share and its first
//!    Payment in a single ledger transaction.
//! 3. The certificate is rendered, stored and encrypted for the member.
//!    A certificate failure is reported but never undoes the Share.
//! 4. The pending record is deleted.
//!
//! Blocking storage work runs on the blocking pool; gateway calls are awaited
//! directly.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use axum::http::HeaderMap;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use utoipa::ToSchema;

use super::{blocking, PurchaseError};
use crate::auth::AuthenticatedUser;
use crate::certificates::{CertificateRenderer, EncryptedDocumentStore};
use crate::clock::Clock;
use crate::models::{Money, PaymentMethod};
use crate::payments::{
    CreatePaymentRequest, GatewayError, GatewayRegistry, GatewayStatus, REFERENCE_METADATA_KEY,
};
use crate::storage::repository::{generate_reference, is_valid_reference};
use crate::storage::{
    AuditEvent, AuditEventType, AuditRepository, CreateOutcome, FileStorage, Member,
    MemberRepository, NewPayment, NewShare, OwnershipEnforcer, Payment, PaymentCompleteness,
    PaymentStatus, PendingPayment, PendingPaymentStore, PlanRepository, ProviderHandle,
    PurchaseDetails, Share, ShareLedger, ShareStatus, SYSTEM_ACTOR,
};

// =============================================================================
// Request / Response Types
// =============================================================================

/// Club-wide purchase settings.
#[derive(Debug, Clone)]
pub struct PurchaseSettings {
    pub club_id: u64,
    /// ISO 4217 code sent to payment providers.
    pub currency: String,
}

/// Request to buy shares for a member.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct InitiatePurchase {
    pub member_id: u64,
    pub plan_id: u64,
    /// Number of shares.
    pub unit_count: u32,
    /// Price per share.
    pub unit_price: Money,
    pub payment_method: PaymentMethod,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct InitiatedPurchase {
    /// Quote this reference when paying or confirming.
    pub reference: String,
    pub total: Money,
    pub payment_method: PaymentMethod,
    pub provider: ProviderHandle,
    pub expires_at: DateTime<Utc>,
}

/// Who vouches for the payment.
#[derive(Debug, Clone)]
pub enum Confirmation {
    /// Treasury staff saw the money arrive.
    Manual {
        confirmed_by: String,
        external_proof: Option<String>,
    },
    /// Ask the payment provider.
    Provider { triggered_by: String },
}

impl Confirmation {
    fn actor(&self) -> &str {
        match self {
            Confirmation::Manual { confirmed_by, .. } => confirmed_by,
            Confirmation::Provider { triggered_by } => triggered_by,
        }
    }

    fn external_proof(&self) -> Option<String> {
        match self {
            Confirmation::Manual { external_proof, .. } => external_proof.clone(),
            Confirmation::Provider { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ConfirmedPurchase {
    pub share: Share,
    pub payment: Payment,
    /// False when the certificate could not be issued yet.
    pub certificate_available: bool,
    /// True when an earlier confirmation already created the share.
    pub already_confirmed: bool,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ShareDetail {
    pub share: Share,
    pub payments: Vec<Payment>,
    pub completeness: PaymentCompleteness,
    /// Sum of approved payments.
    pub amount_paid: Money,
}

/// Installment toward a financed share.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct InstallmentRequest {
    pub amount: Money,
    pub payment_type: PaymentMethod,
    /// Defaults to `approved`.
    #[serde(default)]
    pub status: Option<PaymentStatus>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Certificate bytes handed to a requester.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CertificateDownload {
    /// The readable PDF (owner or admin).
    Plaintext(Vec<u8>),
    /// The member-encrypted copy (other staff).
    Encrypted(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    Confirmed { share_id: u64 },
    /// Verified delivery that did not lead to a confirmation.
    Ignored(String),
}

/// Result of one pass over pending provider payments.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct PollSummary {
    pub checked: usize,
    pub confirmed: usize,
    pub still_pending: usize,
    pub errors: usize,
}

// =============================================================================
// Orchestrator
// =============================================================================

#[derive(Clone)]
pub struct PurchaseOrchestrator {
    storage: FileStorage,
    ledger: Arc<ShareLedger>,
    pending: PendingPaymentStore,
    gateways: GatewayRegistry,
    vault: EncryptedDocumentStore,
    renderer: CertificateRenderer,
    clock: Arc<dyn Clock>,
    settings: PurchaseSettings,
}

impl PurchaseOrchestrator {
    /// The orchestrator reads time from the pending store's clock.
    pub fn new(
        storage: FileStorage,
        ledger: Arc<ShareLedger>,
        pending: PendingPaymentStore,
        gateways: GatewayRegistry,
        vault: EncryptedDocumentStore,
        renderer: CertificateRenderer,
        settings: PurchaseSettings,
    ) -> Self {
        let clock = pending.clock();
        Self {
            storage,
            ledger,
            pending,
            gateways,
            vault,
            renderer,
            clock,
            settings,
        }
    }

    pub fn ledger(&self) -> &Arc<ShareLedger> {
        &self.ledger
    }

    pub fn pending(&self) -> &PendingPaymentStore {
        &self.pending
    }

    pub fn gateways(&self) -> &GatewayRegistry {
        &self.gateways
    }

    // -------------------------------------------------------------------------
    // Initiate
    // -------------------------------------------------------------------------

    /// Start a purchase and return the reference the member pays against.
    ///
    /// Nothing is persisted when the gateway call fails.
    pub async fn initiate_purchase(
        &self,
        requested_by: &AuthenticatedUser,
        request: InitiatePurchase,
    ) -> Result<InitiatedPurchase, PurchaseError> {
        if !requested_by.acts_for(request.member_id) && !requested_by.role.is_treasury_staff() {
            return Err(PurchaseError::Forbidden(format!(
                "cannot buy shares for member {}",
                request.member_id
            )));
        }
        if request.unit_count == 0 {
            return Err(PurchaseError::InvalidAmount(
                "unit_count must be at least 1".to_string(),
            ));
        }
        let total = request
            .unit_price
            .checked_mul(request.unit_count)
            .ok_or_else(|| PurchaseError::InvalidAmount("total is too large".to_string()))?;
        if !total.is_positive() {
            return Err(PurchaseError::InvalidAmount(
                "total must be greater than zero".to_string(),
            ));
        }

        let gateway = self.gateways.for_method(request.payment_method)?;

        let storage = self.storage.clone();
        let (member_id, plan_id) = (request.member_id, request.plan_id);
        let plan = blocking(move || {
            MemberRepository::new(&storage).get(member_id)?;
            Ok(PlanRepository::new(&storage).get(plan_id)?)
        })
        .await?;

        let reference = generate_reference()?;
        let mut metadata = BTreeMap::new();
        metadata.insert(REFERENCE_METADATA_KEY.to_string(), reference.clone());
        metadata.insert("member_id".to_string(), member_id.to_string());
        metadata.insert("plan_id".to_string(), plan_id.to_string());

        let checkout = gateway
            .create_payment(&CreatePaymentRequest {
                reference: reference.clone(),
                amount: total,
                currency: self.settings.currency.clone(),
                description: format!("{} x {}", request.unit_count, plan.share_type),
                metadata,
            })
            .await
            .map_err(|e| {
                warn!(provider = gateway.provider(), error = %e, "Payment creation failed");
                e
            })?;
        let provider = checkout.into_provider_handle(gateway.provider());

        let purchase = PurchaseDetails {
            club_id: self.settings.club_id,
            member_id,
            plan_id,
            unit_count: request.unit_count,
            unit_price: request.unit_price,
            total,
            payment_method: request.payment_method,
            share_type: plan.share_type,
            requested_by: requested_by.user_id.clone(),
        };
        let store = self.pending.clone();
        let record = blocking(move || {
            Ok(store.create_with_reference(reference, purchase, provider)?)
        })
        .await?;

        self.audit(
            AuditEvent::new(AuditEventType::PurchaseInitiated)
                .with_user(&requested_by.user_id)
                .with_resource("pending_payment", &record.reference)
                .with_details(serde_json::json!({
                    "member_id": member_id,
                    "plan_id": plan_id,
                    "total": total,
                    "payment_method": request.payment_method,
                })),
        );
        info!(
            reference = %record.reference,
            member_id,
            total = %total,
            method = %request.payment_method,
            "Purchase initiated"
        );

        Ok(InitiatedPurchase {
            reference: record.reference,
            total,
            payment_method: request.payment_method,
            provider: record.provider,
            expires_at: record.expires_at,
        })
    }

    /// Pending purchase visible to its member or ledger staff.
    pub async fn pending_purchase(
        &self,
        reference: &str,
        requester: &AuthenticatedUser,
    ) -> Result<PendingPayment, PurchaseError> {
        let record = self
            .load_pending(reference)
            .await?
            .ok_or(PurchaseError::ReferenceExpiredOrNotFound)?;
        record.verify_read_access(requester)?;
        Ok(record)
    }

    // -------------------------------------------------------------------------
    // Confirm
    // -------------------------------------------------------------------------

    /// Confirm a purchase. Idempotent on the Share.
    pub async fn confirm_purchase(
        &self,
        reference: &str,
        confirmation: Confirmation,
    ) -> Result<ConfirmedPurchase, PurchaseError> {
        if !is_valid_reference(reference) {
            return Err(PurchaseError::ReferenceExpiredOrNotFound);
        }
        if let Some(existing) = self.existing_confirmation(reference).await? {
            return Ok(existing);
        }

        match self.confirm_pending(reference, confirmation).await {
            // The record disappears once a concurrent confirmation has
            // written the share, so a missing record is checked against
            // the ledger before it is reported.
            Err(PurchaseError::ReferenceExpiredOrNotFound) => self
                .existing_confirmation(reference)
                .await?
                .ok_or(PurchaseError::ReferenceExpiredOrNotFound),
            other => other,
        }
    }

    async fn confirm_pending(
        &self,
        reference: &str,
        confirmation: Confirmation,
    ) -> Result<ConfirmedPurchase, PurchaseError> {
        let pending = self
            .load_pending(reference)
            .await?
            .ok_or(PurchaseError::ReferenceExpiredOrNotFound)?;

        let store = self.pending.clone();
        let attempt_ref = reference.to_string();
        blocking(move || {
            store
                .record_attempt(&attempt_ref)
                .map_err(|e| pending_gone_or(e.into()))
        })
        .await?;

        let external_proof = self.verify_payment(&pending, &confirmation).await?;
        let actor = confirmation.actor().to_string();

        let store = self.pending.clone();
        let ledger = Arc::clone(&self.ledger);
        let now = self.clock.now();
        let purchase = pending.purchase.clone();
        let confirm_ref = reference.to_string();
        let outcome = blocking(move || {
            store
                .mark_confirmed(&confirm_ref, external_proof.clone())
                .map_err(|e| pending_gone_or(e.into()))?;

            let share = NewShare {
                reference: confirm_ref,
                club_id: purchase.club_id,
                member_id: purchase.member_id,
                plan_id: purchase.plan_id,
                unit_count: purchase.unit_count,
                unit_price: purchase.unit_price,
                total: purchase.total,
                payment_method: purchase.payment_method,
                share_type: purchase.share_type,
                issued_at: now,
            };
            let payment = NewPayment {
                paid_at: now,
                amount: purchase.total,
                payment_type: purchase.payment_method,
                status: PaymentStatus::Approved,
                notes: external_proof,
            };
            Ok(ledger.create_share_with_payment(share, payment)?)
        })
        .await?;

        let (share, payment) = match outcome {
            CreateOutcome::Created { share, payment } => (share, payment),
            CreateOutcome::AlreadyExists(share) => {
                info!(reference, share_id = share.share_id, "Purchase confirmed concurrently");
                return self.confirmed_view(share, true).await;
            }
        };

        self.audit(
            AuditEvent::new(AuditEventType::PurchaseConfirmed)
                .with_user(&actor)
                .with_resource("share", share.share_id.to_string())
                .with_details(serde_json::json!({
                    "reference": reference,
                    "member_id": share.member_id,
                    "total": share.total,
                })),
        );
        info!(
            reference,
            share_id = share.share_id,
            member_id = share.member_id,
            "Share created"
        );

        let (share, certificate_available) = match self.issue_certificate(share.share_id, &actor).await {
            Ok(with_certificate) => (with_certificate, true),
            Err(e) => {
                error!(share_id = share.share_id, error = %e, "Certificate issuance failed");
                (share, false)
            }
        };

        self.discard_pending(reference).await;

        Ok(ConfirmedPurchase {
            share,
            payment,
            certificate_available,
            already_confirmed: false,
        })
    }

    /// Share already written for this reference, if any.
    ///
    /// Removes a leftover pending record so a crash between share creation
    /// and cleanup does not leave the reference confirmable twice.
    async fn existing_confirmation(
        &self,
        reference: &str,
    ) -> Result<Option<ConfirmedPurchase>, PurchaseError> {
        let ledger = Arc::clone(&self.ledger);
        let lookup = reference.to_string();
        let Some(share) = blocking(move || Ok(ledger.share_by_reference(&lookup)?)).await? else {
            return Ok(None);
        };
        self.discard_pending(reference).await;
        self.confirmed_view(share, true).await.map(Some)
    }

    async fn confirmed_view(
        &self,
        share: Share,
        already_confirmed: bool,
    ) -> Result<ConfirmedPurchase, PurchaseError> {
        let ledger = Arc::clone(&self.ledger);
        let share_id = share.share_id;
        let payment = blocking(move || Ok(ledger.payments_for_share(share_id)?))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| PurchaseError::NotFound(format!("payment for share {share_id}")))?;

        Ok(ConfirmedPurchase {
            certificate_available: share.certificate_path.is_some(),
            share,
            payment,
            already_confirmed,
        })
    }

    /// Check the payment is settled. Returns the proof kept on the Payment.
    async fn verify_payment(
        &self,
        pending: &PendingPayment,
        confirmation: &Confirmation,
    ) -> Result<Option<String>, PurchaseError> {
        if pending.purchase.payment_method.requires_manual_confirmation() {
            return match confirmation {
                Confirmation::Manual { .. } => Ok(confirmation
                    .external_proof()
                    .or_else(|| pending.external_proof.clone())),
                Confirmation::Provider { .. } => Err(PurchaseError::AwaitingManualConfirmation),
            };
        }

        let provider = pending.provider.provider.as_str();
        let gateway = self.gateways.by_provider(provider).ok_or_else(|| {
            PurchaseError::GatewayUnavailable(format!("{provider} gateway is not configured"))
        })?;
        let report = gateway
            .get_status(&pending.reference, pending.provider.handle.as_deref())
            .await?;

        if report.status != GatewayStatus::Succeeded {
            return Err(PurchaseError::PaymentNotCompleted(report.status));
        }
        if let Some(reported) = report.metadata.get(REFERENCE_METADATA_KEY) {
            if reported != &pending.reference {
                warn!(
                    reference = %pending.reference,
                    reported = %reported,
                    provider,
                    "Provider returned a payment for another reference"
                );
                return Err(PurchaseError::Gateway(GatewayError::InvalidResponse(
                    "payment reference mismatch".to_string(),
                )));
            }
        }

        Ok(confirmation.external_proof().or_else(|| {
            pending
                .provider
                .handle
                .as_ref()
                .map(|handle| format!("{provider}:{handle}"))
        }))
    }

    async fn load_pending(&self, reference: &str) -> Result<Option<PendingPayment>, PurchaseError> {
        let store = self.pending.clone();
        let reference = reference.to_string();
        blocking(move || Ok(store.get(&reference)?)).await
    }

    async fn discard_pending(&self, reference: &str) {
        let store = self.pending.clone();
        let owned = reference.to_string();
        if let Err(e) = blocking(move || Ok(store.delete(&owned)?)).await {
            warn!(reference, error = %e, "Failed to delete pending record");
        }
    }

    // -------------------------------------------------------------------------
    // Webhooks and polling
    // -------------------------------------------------------------------------

    /// Verify a provider webhook and confirm the purchase it names.
    ///
    /// The webhook only says which payment to look at; settlement is always
    /// re-read from the provider.
    pub async fn handle_webhook(
        &self,
        provider: &str,
        headers: &HeaderMap,
        body: &[u8],
    ) -> Result<WebhookOutcome, PurchaseError> {
        let gateway = self
            .gateways
            .by_provider(provider)
            .ok_or_else(|| PurchaseError::NotFound(format!("payment provider {provider}")))?;

        let Some(event) = gateway.parse_webhook(headers, body)? else {
            return Ok(WebhookOutcome::Ignored("event type not handled".to_string()));
        };
        let Some(reference) = gateway.resolve_reference(&event).await? else {
            return Ok(WebhookOutcome::Ignored(
                "event carries no purchase reference".to_string(),
            ));
        };

        let confirmation = Confirmation::Provider {
            triggered_by: format!("webhook:{provider}"),
        };
        match self.confirm_purchase(&reference, confirmation).await {
            Ok(confirmed) => Ok(WebhookOutcome::Confirmed {
                share_id: confirmed.share.share_id,
            }),
            Err(PurchaseError::ReferenceExpiredOrNotFound) => Ok(WebhookOutcome::Ignored(
                "reference expired or unknown".to_string(),
            )),
            Err(PurchaseError::PaymentNotCompleted(status)) => Ok(WebhookOutcome::Ignored(
                format!("payment status is {status:?}"),
            )),
            Err(PurchaseError::AwaitingManualConfirmation) => Ok(WebhookOutcome::Ignored(
                "payment requires manual confirmation".to_string(),
            )),
            Err(e) => Err(e),
        }
    }

    /// Ask providers about every live provider-backed purchase.
    pub async fn poll_pending(&self) -> Result<PollSummary, PurchaseError> {
        let store = self.pending.clone();
        let active = blocking(move || Ok(store.list_active()?)).await?;

        let mut summary = PollSummary::default();
        for record in active
            .into_iter()
            .filter(|r| !r.purchase.payment_method.requires_manual_confirmation())
        {
            summary.checked += 1;
            let confirmation = Confirmation::Provider {
                triggered_by: SYSTEM_ACTOR.to_string(),
            };
            match self.confirm_purchase(&record.reference, confirmation).await {
                Ok(_) => summary.confirmed += 1,
                Err(PurchaseError::PaymentNotCompleted(_)) => summary.still_pending += 1,
                Err(PurchaseError::ReferenceExpiredOrNotFound) => {}
                Err(e) => {
                    warn!(reference = %record.reference, error = %e, "Pending payment check failed");
                    summary.errors += 1;
                }
            }
        }
        Ok(summary)
    }

    // -------------------------------------------------------------------------
    // Certificates
    // -------------------------------------------------------------------------

    /// Render, store and encrypt the certificate for a share.
    ///
    /// Re-issuing overwrites the previous files.
    pub async fn issue_certificate(&self, share_id: u64, actor: &str) -> Result<Share, PurchaseError> {
        let storage = self.storage.clone();
        let ledger = Arc::clone(&self.ledger);
        let vault = self.vault.clone();
        let renderer = self.renderer.clone();
        let now = self.clock.now();

        let result = blocking(move || {
            let share = ledger
                .get_share(share_id)?
                .ok_or_else(|| PurchaseError::NotFound(format!("Share {share_id}")))?;
            let member = MemberRepository::new(&storage).get(share.member_id)?;
            let plan = PlanRepository::new(&storage).find(share.plan_id)?;

            let pdf = renderer.render(&share, &member, plan.as_ref())?;
            let artifact = vault.issue(
                share_id,
                &pdf,
                member.member_id,
                &recipient_identity(&member),
                now,
            )?;

            Ok(ledger.attach_certificate(
                share_id,
                artifact.plaintext_path,
                Some(artifact.encrypted_path),
            )?)
        })
        .await;

        let event = AuditEvent::new(AuditEventType::CertificateIssued)
            .with_user(actor)
            .with_resource("share", share_id.to_string());
        match &result {
            Ok(share) => {
                info!(share_id, certificate = %share.certificate_number, "Certificate issued");
                self.audit(event);
            }
            Err(e) => {
                let mut failed = event.failed(e.to_string());
                failed.event_type = AuditEventType::CertificateIssueFailed;
                self.audit(failed);
            }
        }
        result
    }

    /// Decrypt a member's certificate with a candidate identity.
    pub async fn decrypt_certificate(
        &self,
        share_id: u64,
        requester: &AuthenticatedUser,
        candidate: &str,
    ) -> Result<Vec<u8>, PurchaseError> {
        let share = self.load_share(share_id).await?;
        self.enforce(share.verify_ownership(requester), requester, &share)?;
        let encrypted = share.encrypted_certificate_path.clone().ok_or_else(|| {
            PurchaseError::NotFound(format!("certificate for share {share_id}"))
        })?;

        let vault = self.vault.clone();
        let candidate = candidate.to_string();
        let result = blocking(move || Ok(vault.decrypt_for(Path::new(&encrypted), &candidate)?)).await;

        let event = AuditEvent::new(AuditEventType::CertificateDecrypted)
            .with_user(&requester.user_id)
            .with_resource("share", share_id.to_string());
        match &result {
            Ok(_) => self.audit(event),
            Err(e) => self.audit(event.failed(e.to_string())),
        }
        result
    }

    /// Certificate for download: plaintext for the owner or an admin, the
    /// encrypted copy for other ledger staff.
    pub async fn download_certificate(
        &self,
        share_id: u64,
        requester: &AuthenticatedUser,
    ) -> Result<CertificateDownload, PurchaseError> {
        let share = self.load_share(share_id).await?;
        self.enforce(share.verify_read_access(requester), requester, &share)?;

        let plaintext = share.verify_ownership(requester).is_ok();
        let path = if plaintext {
            share.certificate_path.clone()
        } else {
            share.encrypted_certificate_path.clone()
        }
        .ok_or_else(|| PurchaseError::NotFound(format!("certificate for share {share_id}")))?;

        let vault = self.vault.clone();
        let bytes = blocking(move || Ok(vault.read(Path::new(&path))?)).await?;

        self.audit(
            AuditEvent::new(AuditEventType::CertificateDownloaded)
                .with_user(&requester.user_id)
                .with_resource("share", share_id.to_string())
                .with_details(serde_json::json!({ "encrypted": !plaintext })),
        );

        Ok(if plaintext {
            CertificateDownload::Plaintext(bytes)
        } else {
            CertificateDownload::Encrypted(bytes)
        })
    }

    // -------------------------------------------------------------------------
    // Ledger
    // -------------------------------------------------------------------------

    /// Shares visible to the requester.
    ///
    /// Ledger staff may list everything or filter by member; members see
    /// only their own.
    pub async fn list_shares(
        &self,
        requester: &AuthenticatedUser,
        member_filter: Option<u64>,
    ) -> Result<Vec<Share>, PurchaseError> {
        let member_id = if requester.role.can_view_ledger() {
            member_filter
        } else {
            let own = requester.member_id.ok_or_else(|| {
                PurchaseError::Forbidden("user is not linked to a club member".to_string())
            })?;
            if member_filter.is_some_and(|m| m != own) {
                return Err(PurchaseError::Forbidden(
                    "cannot list another member's shares".to_string(),
                ));
            }
            Some(own)
        };

        let ledger = Arc::clone(&self.ledger);
        blocking(move || Ok(ledger.list_shares(member_id)?)).await
    }

    pub async fn share_detail(
        &self,
        share_id: u64,
        requester: &AuthenticatedUser,
    ) -> Result<ShareDetail, PurchaseError> {
        let share = self.load_share(share_id).await?;
        self.enforce(share.verify_read_access(requester), requester, &share)?;

        let ledger = Arc::clone(&self.ledger);
        let payments = blocking(move || Ok(ledger.payments_for_share(share_id)?)).await?;
        let (completeness, amount_paid) = PaymentCompleteness::compute(&share, &payments);
        Ok(ShareDetail {
            share,
            payments,
            completeness,
            amount_paid,
        })
    }

    /// Record an installment toward a share.
    pub async fn record_installment(
        &self,
        share_id: u64,
        request: InstallmentRequest,
        recorded_by: &str,
    ) -> Result<Payment, PurchaseError> {
        if !request.amount.is_positive() {
            return Err(PurchaseError::InvalidAmount(
                "installment amount must be greater than zero".to_string(),
            ));
        }

        let ledger = Arc::clone(&self.ledger);
        let new_payment = NewPayment {
            paid_at: self.clock.now(),
            amount: request.amount,
            payment_type: request.payment_type,
            status: request.status.unwrap_or(PaymentStatus::Approved),
            notes: request.notes,
        };
        let payment = blocking(move || Ok(ledger.add_payment(share_id, new_payment)?)).await?;

        self.audit(
            AuditEvent::new(AuditEventType::InstallmentRecorded)
                .with_user(recorded_by)
                .with_resource("share", share_id.to_string())
                .with_details(serde_json::json!({
                    "payment_id": payment.payment_id,
                    "amount": payment.amount,
                    "status": payment.status,
                })),
        );
        Ok(payment)
    }

    pub async fn update_share_status(
        &self,
        share_id: u64,
        status: ShareStatus,
        changed_by: &str,
    ) -> Result<Share, PurchaseError> {
        let ledger = Arc::clone(&self.ledger);
        let share = blocking(move || Ok(ledger.update_status(share_id, status)?)).await?;

        self.audit(
            AuditEvent::new(AuditEventType::ShareStatusChanged)
                .with_user(changed_by)
                .with_resource("share", share_id.to_string())
                .with_details(serde_json::json!({ "status": status })),
        );
        Ok(share)
    }

    // -------------------------------------------------------------------------
    // Maintenance
    // -------------------------------------------------------------------------

    /// Delete pending records created more than `max_age` ago.
    pub async fn sweep_pending(&self, max_age: Duration, actor: &str) -> Result<usize, PurchaseError> {
        let store = self.pending.clone();
        let removed = blocking(move || Ok(store.sweep(max_age)?)).await?;
        if removed > 0 {
            info!(removed, "Swept stale pending payments");
            self.audit(
                AuditEvent::new(AuditEventType::PendingSwept)
                    .with_user(actor)
                    .with_details(serde_json::json!({ "removed": removed })),
            );
        }
        Ok(removed)
    }

    /// Delete certificate files older than `older_than`.
    pub async fn cleanup_certificates(
        &self,
        older_than: Duration,
        actor: &str,
    ) -> Result<usize, PurchaseError> {
        let vault = self.vault.clone();
        let now = self.clock.now();
        let removed = blocking(move || Ok(vault.cleanup(older_than, now)?)).await?;
        if removed > 0 {
            info!(removed, "Removed expired certificate files");
            self.audit(
                AuditEvent::new(AuditEventType::CertificatesCleaned)
                    .with_user(actor)
                    .with_details(serde_json::json!({ "removed": removed })),
            );
        }
        Ok(removed)
    }

    // -------------------------------------------------------------------------
    // Helpers
    // -------------------------------------------------------------------------

    async fn load_share(&self, share_id: u64) -> Result<Share, PurchaseError> {
        let ledger = Arc::clone(&self.ledger);
        blocking(move || Ok(ledger.get_share(share_id)?))
            .await?
            .ok_or_else(|| PurchaseError::NotFound(format!("Share {share_id}")))
    }

    /// Audit and convert a failed ownership check.
    fn enforce(
        &self,
        check: crate::storage::StorageResult<()>,
        requester: &AuthenticatedUser,
        share: &Share,
    ) -> Result<(), PurchaseError> {
        check.map_err(|e| {
            self.audit(
                AuditEvent::new(AuditEventType::PermissionDenied)
                    .with_user(&requester.user_id)
                    .with_resource("share", share.share_id.to_string())
                    .failed(e.to_string()),
            );
            PurchaseError::from(e)
        })
    }

    fn audit(&self, event: AuditEvent) {
        AuditRepository::new(&self.storage).record(event);
    }
}

/// Secret a member's certificate is encrypted under: the identity document
/// number when registered, otherwise the member id.
pub fn recipient_identity(member: &Member) -> String {
    member
        .identity_number
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| member.member_id.to_string())
}

/// A pending record that vanished mid-confirmation reads as expired.
fn pending_gone_or(e: PurchaseError) -> PurchaseError {
    match e {
        PurchaseError::NotFound(_) => PurchaseError::ReferenceExpiredOrNotFound,
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use crate::clock::ManualClock;
    use crate::payments::fake::{FakeGateway, FAKE_SIGNATURE_HEADER};
    use crate::payments::manual::ManualGateway;
    use crate::storage::{PaymentPlan, StoragePaths};
    use chrono::TimeZone;
    use tempfile::TempDir;

    struct Harness {
        orchestrator: PurchaseOrchestrator,
        storage: FileStorage,
        clock: ManualClock,
        card: Arc<FakeGateway>,
        _temp: TempDir,
    }

    fn harness() -> Harness {
        let temp = TempDir::new().unwrap();
        let mut storage = FileStorage::new(StoragePaths::new(temp.path()));
        storage.initialize().unwrap();

        let clock = ManualClock::new(Utc.with_ymd_and_hms(2026, 3, 14, 10, 0, 0).unwrap());
        let ledger = Arc::new(ShareLedger::open(&storage.paths().ledger_db()).unwrap());
        let pending =
            PendingPaymentStore::new(storage.clone(), Arc::new(clock.clone()), Duration::hours(24));
        let card = Arc::new(FakeGateway::new("stripe"));
        let gateways = GatewayRegistry::new()
            .with_gateway(Arc::new(ManualGateway::new("Quote {reference}")))
            .with_gateway(card.clone());

        MemberRepository::new(&storage)
            .upsert(
                7,
                "Ana Pérez".to_string(),
                Some("0912345678".to_string()),
                None,
            )
            .unwrap();
        MemberRepository::new(&storage)
            .upsert(8, "Luis Mora".to_string(), None, None)
            .unwrap();
        PlanRepository::new(&storage)
            .upsert(&PaymentPlan {
                plan_id: 3,
                name: "Contado".to_string(),
                nominal_value: Money::from_minor(5_000),
                share_type: "Acción Patrimonial".to_string(),
                installments: None,
                updated_at: Utc::now(),
            })
            .unwrap();

        let orchestrator = PurchaseOrchestrator::new(
            storage.clone(),
            ledger,
            pending,
            gateways,
            EncryptedDocumentStore::for_tests(storage.clone(), "test-salt"),
            CertificateRenderer::new("Club Social", "USD"),
            PurchaseSettings {
                club_id: 1,
                currency: "USD".to_string(),
            },
        );

        Harness {
            orchestrator,
            storage,
            clock,
            card,
            _temp: temp,
        }
    }

    fn user(user_id: &str, role: Role, member_id: Option<u64>) -> AuthenticatedUser {
        AuthenticatedUser {
            user_id: user_id.to_string(),
            role,
            member_id,
            session_id: None,
            issuer: "test".to_string(),
            expires_at: 0,
        }
    }

    fn member_7() -> AuthenticatedUser {
        user("user_7", Role::Member, Some(7))
    }

    fn treasurer() -> Confirmation {
        Confirmation::Manual {
            confirmed_by: "treasurer_1".to_string(),
            external_proof: Some("deposit 4471".to_string()),
        }
    }

    fn purchase(method: PaymentMethod) -> InitiatePurchase {
        InitiatePurchase {
            member_id: 7,
            plan_id: 3,
            unit_count: 100,
            unit_price: Money::from_minor(5_000),
            payment_method: method,
        }
    }

    #[tokio::test]
    async fn transfer_purchase_end_to_end() {
        let h = harness();
        let initiated = h
            .orchestrator
            .initiate_purchase(&member_7(), purchase(PaymentMethod::Transfer))
            .await
            .unwrap();
        assert_eq!(initiated.total, Money::from_minor(500_000));
        assert_eq!(initiated.provider.provider, "manual");
        assert!(is_valid_reference(&initiated.reference));

        let confirmed = h
            .orchestrator
            .confirm_purchase(&initiated.reference, treasurer())
            .await
            .unwrap();

        assert!(!confirmed.already_confirmed);
        assert!(confirmed.certificate_available);
        assert_eq!(confirmed.share.member_id, 7);
        assert_eq!(confirmed.share.unit_count, 100);
        assert_eq!(confirmed.share.total, Money::from_minor(500_000));
        assert_eq!(confirmed.payment.amount, Money::from_minor(500_000));
        assert_eq!(confirmed.payment.status, PaymentStatus::Approved);
        assert_eq!(confirmed.payment.notes.as_deref(), Some("deposit 4471"));
        assert!(confirmed.share.encrypted);

        // Pending record is gone.
        assert_eq!(h.orchestrator.pending().count().unwrap(), 0);

        let pdf = h
            .orchestrator
            .decrypt_certificate(confirmed.share.share_id, &member_7(), "0912345678")
            .await
            .unwrap();
        assert!(pdf.starts_with(b"%PDF-"));
    }

    #[tokio::test]
    async fn confirmation_is_idempotent() {
        let h = harness();
        let initiated = h
            .orchestrator
            .initiate_purchase(&member_7(), purchase(PaymentMethod::Cash))
            .await
            .unwrap();

        let first = h
            .orchestrator
            .confirm_purchase(&initiated.reference, treasurer())
            .await
            .unwrap();
        let second = h
            .orchestrator
            .confirm_purchase(&initiated.reference, treasurer())
            .await
            .unwrap();

        assert_eq!(first.share.share_id, second.share.share_id);
        assert!(second.already_confirmed);
        assert!(second.certificate_available);

        let stats = h.orchestrator.ledger().stats().unwrap();
        assert_eq!(stats.shares, 1);
        assert_eq!(stats.payments, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_confirmations_create_one_share() {
        let h = harness();
        let initiated = h
            .orchestrator
            .initiate_purchase(&member_7(), purchase(PaymentMethod::Transfer))
            .await
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..6 {
            let orchestrator = h.orchestrator.clone();
            let reference = initiated.reference.clone();
            handles.push(tokio::spawn(async move {
                orchestrator.confirm_purchase(&reference, treasurer()).await
            }));
        }

        let mut share_ids = Vec::new();
        for handle in handles {
            share_ids.push(handle.await.unwrap().unwrap().share.share_id);
        }

        assert_eq!(share_ids.len(), 6);
        assert!(share_ids.iter().all(|id| *id == share_ids[0]));
        assert_eq!(h.orchestrator.ledger().stats().unwrap().shares, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn confirmation_overtaken_while_querying_provider_returns_share() {
        let h = harness();
        h.card.set_status(GatewayStatus::Succeeded);
        let initiated = h
            .orchestrator
            .initiate_purchase(&member_7(), purchase(PaymentMethod::Card))
            .await
            .unwrap();
        let provider = Confirmation::Provider {
            triggered_by: "webhook".to_string(),
        };

        let release = h.card.hold_next_status_check();
        let slow = tokio::spawn({
            let orchestrator = h.orchestrator.clone();
            let reference = initiated.reference.clone();
            let provider = provider.clone();
            async move { orchestrator.confirm_purchase(&reference, provider).await }
        });
        h.card.status_check_held().await;

        let first = h
            .orchestrator
            .confirm_purchase(&initiated.reference, provider)
            .await
            .unwrap();
        assert_eq!(h.orchestrator.pending().count().unwrap(), 0);

        release.notify_one();
        let second = slow.await.unwrap().unwrap();

        assert_eq!(second.share.share_id, first.share.share_id);
        assert!(second.already_confirmed);
        assert_eq!(h.orchestrator.ledger().stats().unwrap().shares, 1);
    }

    #[tokio::test]
    async fn unknown_reference_is_rejected() {
        let h = harness();
        for reference in ["NONEXISTENT", "AAAAAAAAAAAAAAAAAAAAAA"] {
            let err = h
                .orchestrator
                .confirm_purchase(reference, treasurer())
                .await
                .unwrap_err();
            assert!(matches!(err, PurchaseError::ReferenceExpiredOrNotFound));
        }
        assert_eq!(h.orchestrator.ledger().stats().unwrap().shares, 0);
    }

    #[tokio::test]
    async fn expired_reference_is_rejected() {
        let h = harness();
        let initiated = h
            .orchestrator
            .initiate_purchase(&member_7(), purchase(PaymentMethod::Transfer))
            .await
            .unwrap();

        h.clock.advance(Duration::hours(25));

        let err = h
            .orchestrator
            .confirm_purchase(&initiated.reference, treasurer())
            .await
            .unwrap_err();
        assert!(matches!(err, PurchaseError::ReferenceExpiredOrNotFound));
        assert_eq!(h.orchestrator.ledger().stats().unwrap().shares, 0);
    }

    #[tokio::test]
    async fn invalid_amounts_leave_no_trace() {
        let h = harness();

        let mut zero_units = purchase(PaymentMethod::Card);
        zero_units.unit_count = 0;
        let mut free = purchase(PaymentMethod::Card);
        free.unit_price = Money::ZERO;
        let mut overflow = purchase(PaymentMethod::Card);
        overflow.unit_price = Money::from_minor(i64::MAX);

        for request in [zero_units, free, overflow] {
            let err = h
                .orchestrator
                .initiate_purchase(&member_7(), request)
                .await
                .unwrap_err();
            assert!(matches!(err, PurchaseError::InvalidAmount(_)));
        }
        assert_eq!(h.card.created(), 0);
        assert_eq!(h.orchestrator.pending().count().unwrap(), 0);
    }

    #[tokio::test]
    async fn gateway_failure_leaves_no_pending_record() {
        let h = harness();
        h.card.fail_create(true);

        let err = h
            .orchestrator
            .initiate_purchase(&member_7(), purchase(PaymentMethod::Card))
            .await
            .unwrap_err();
        assert!(matches!(err, PurchaseError::Gateway(_)));
        assert_eq!(h.orchestrator.pending().count().unwrap(), 0);
    }

    #[tokio::test]
    async fn unconfigured_method_is_unavailable() {
        let h = harness();
        let err = h
            .orchestrator
            .initiate_purchase(&member_7(), purchase(PaymentMethod::Paypal))
            .await
            .unwrap_err();
        assert!(matches!(err, PurchaseError::GatewayUnavailable(_)));
    }

    #[tokio::test]
    async fn member_cannot_buy_for_someone_else() {
        let h = harness();
        let mut request = purchase(PaymentMethod::Transfer);
        request.member_id = 8;

        let err = h
            .orchestrator
            .initiate_purchase(&member_7(), request.clone())
            .await
            .unwrap_err();
        assert!(matches!(err, PurchaseError::Forbidden(_)));

        let staff = user("treasurer_1", Role::Treasurer, None);
        assert!(h.orchestrator.initiate_purchase(&staff, request).await.is_ok());
    }

    #[tokio::test]
    async fn unknown_member_or_plan_is_not_found() {
        let h = harness();
        let mut request = purchase(PaymentMethod::Transfer);
        request.plan_id = 99;
        let err = h
            .orchestrator
            .initiate_purchase(&user("admin", Role::Admin, None), request)
            .await
            .unwrap_err();
        assert!(matches!(err, PurchaseError::NotFound(_)));
    }

    #[tokio::test]
    async fn card_payment_waits_for_provider() {
        let h = harness();
        let initiated = h
            .orchestrator
            .initiate_purchase(&member_7(), purchase(PaymentMethod::Card))
            .await
            .unwrap();
        assert_eq!(initiated.provider.handle.as_deref(), Some("fake_1"));

        let provider = Confirmation::Provider {
            triggered_by: "user_7".to_string(),
        };
        let err = h
            .orchestrator
            .confirm_purchase(&initiated.reference, provider.clone())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PurchaseError::PaymentNotCompleted(GatewayStatus::Pending)
        ));
        let record = h
            .orchestrator
            .pending()
            .get(&initiated.reference)
            .unwrap()
            .unwrap();
        assert_eq!(record.attempt_count, 1);

        h.card.set_status(GatewayStatus::Succeeded);
        let confirmed = h
            .orchestrator
            .confirm_purchase(&initiated.reference, provider)
            .await
            .unwrap();
        assert_eq!(confirmed.payment.payment_type, PaymentMethod::Card);
        assert_eq!(confirmed.payment.notes.as_deref(), Some("stripe:fake_1"));
    }

    #[tokio::test]
    async fn transfer_needs_treasury_confirmation() {
        let h = harness();
        let initiated = h
            .orchestrator
            .initiate_purchase(&member_7(), purchase(PaymentMethod::Transfer))
            .await
            .unwrap();

        let err = h
            .orchestrator
            .confirm_purchase(
                &initiated.reference,
                Confirmation::Provider {
                    triggered_by: "user_7".to_string(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PurchaseError::AwaitingManualConfirmation));
        assert_eq!(h.orchestrator.ledger().stats().unwrap().shares, 0);
    }

    #[tokio::test]
    async fn certificate_failure_keeps_the_share() {
        let h = harness();
        let initiated = h
            .orchestrator
            .initiate_purchase(&member_7(), purchase(PaymentMethod::Transfer))
            .await
            .unwrap();

        // Blank name makes rendering fail.
        MemberRepository::new(&h.storage)
            .upsert(7, "  ".to_string(), Some("0912345678".to_string()), None)
            .unwrap();

        let confirmed = h
            .orchestrator
            .confirm_purchase(&initiated.reference, treasurer())
            .await
            .unwrap();
        assert!(!confirmed.certificate_available);
        assert!(confirmed.share.certificate_path.is_none());
        assert_eq!(h.orchestrator.pending().count().unwrap(), 0);

        MemberRepository::new(&h.storage)
            .upsert(
                7,
                "Ana Pérez".to_string(),
                Some("0912345678".to_string()),
                None,
            )
            .unwrap();
        let share = h
            .orchestrator
            .issue_certificate(confirmed.share.share_id, "admin")
            .await
            .unwrap();
        assert!(share.certificate_path.is_some());
        assert!(share.encrypted);
    }

    #[tokio::test]
    async fn decrypt_checks_owner_and_identity() {
        let h = harness();
        let initiated = h
            .orchestrator
            .initiate_purchase(&member_7(), purchase(PaymentMethod::Transfer))
            .await
            .unwrap();
        let share_id = h
            .orchestrator
            .confirm_purchase(&initiated.reference, treasurer())
            .await
            .unwrap()
            .share
            .share_id;

        let wrong = h
            .orchestrator
            .decrypt_certificate(share_id, &member_7(), "0000000000")
            .await
            .unwrap_err();
        assert!(matches!(wrong, PurchaseError::Decryption));

        let other = user("user_8", Role::Member, Some(8));
        let denied = h
            .orchestrator
            .decrypt_certificate(share_id, &other, "0912345678")
            .await
            .unwrap_err();
        assert!(matches!(denied, PurchaseError::Forbidden(_)));

        let admin = user("admin", Role::Admin, None);
        assert!(h
            .orchestrator
            .decrypt_certificate(share_id, &admin, " 0912345678 ")
            .await
            .is_ok());

        let missing = h
            .orchestrator
            .decrypt_certificate(999, &admin, "0912345678")
            .await
            .unwrap_err();
        assert!(matches!(missing, PurchaseError::NotFound(_)));
    }

    #[tokio::test]
    async fn download_depends_on_requester() {
        let h = harness();
        let initiated = h
            .orchestrator
            .initiate_purchase(&member_7(), purchase(PaymentMethod::Transfer))
            .await
            .unwrap();
        let share_id = h
            .orchestrator
            .confirm_purchase(&initiated.reference, treasurer())
            .await
            .unwrap()
            .share
            .share_id;

        match h.orchestrator.download_certificate(share_id, &member_7()).await.unwrap() {
            CertificateDownload::Plaintext(bytes) => assert!(bytes.starts_with(b"%PDF-")),
            other => panic!("expected plaintext, got {other:?}"),
        }

        let auditor = user("auditor_1", Role::Auditor, None);
        match h.orchestrator.download_certificate(share_id, &auditor).await.unwrap() {
            CertificateDownload::Encrypted(bytes) => assert!(!bytes.starts_with(b"%PDF-")),
            other => panic!("expected encrypted copy, got {other:?}"),
        }

        let other = user("user_8", Role::Member, Some(8));
        let err = h
            .orchestrator
            .download_certificate(share_id, &other)
            .await
            .unwrap_err();
        assert!(matches!(err, PurchaseError::Forbidden(_)));
    }

    #[tokio::test]
    async fn webhook_confirms_settled_payment() {
        let h = harness();
        let initiated = h
            .orchestrator
            .initiate_purchase(&member_7(), purchase(PaymentMethod::Card))
            .await
            .unwrap();
        let body = serde_json::to_vec(&serde_json::json!({ "reference": initiated.reference }))
            .unwrap();

        let mut headers = HeaderMap::new();
        headers.insert(FAKE_SIGNATURE_HEADER, "valid".parse().unwrap());

        let outcome = h
            .orchestrator
            .handle_webhook("stripe", &headers, &body)
            .await
            .unwrap();
        assert!(matches!(outcome, WebhookOutcome::Ignored(_)));

        h.card.set_status(GatewayStatus::Succeeded);
        let outcome = h
            .orchestrator
            .handle_webhook("stripe", &headers, &body)
            .await
            .unwrap();
        assert!(matches!(outcome, WebhookOutcome::Confirmed { .. }));

        let forged = h
            .orchestrator
            .handle_webhook("stripe", &HeaderMap::new(), &body)
            .await
            .unwrap_err();
        assert!(matches!(
            forged,
            PurchaseError::Gateway(GatewayError::InvalidSignature(_))
        ));

        let unknown = h
            .orchestrator
            .handle_webhook("bitpay", &headers, &body)
            .await
            .unwrap_err();
        assert!(matches!(unknown, PurchaseError::NotFound(_)));
    }

    #[tokio::test]
    async fn poll_confirms_only_provider_payments() {
        let h = harness();
        h.orchestrator
            .initiate_purchase(&member_7(), purchase(PaymentMethod::Transfer))
            .await
            .unwrap();
        h.orchestrator
            .initiate_purchase(&member_7(), purchase(PaymentMethod::Card))
            .await
            .unwrap();

        let summary = h.orchestrator.poll_pending().await.unwrap();
        assert_eq!(
            summary,
            PollSummary {
                checked: 1,
                confirmed: 0,
                still_pending: 1,
                errors: 0
            }
        );

        h.card.set_status(GatewayStatus::Succeeded);
        let summary = h.orchestrator.poll_pending().await.unwrap();
        assert_eq!(summary.confirmed, 1);
        assert_eq!(h.orchestrator.pending().count().unwrap(), 1);
    }

    #[tokio::test]
    async fn sweep_removes_stale_records() {
        let h = harness();
        h.orchestrator
            .initiate_purchase(&member_7(), purchase(PaymentMethod::Transfer))
            .await
            .unwrap();

        assert_eq!(
            h.orchestrator
                .sweep_pending(Duration::hours(48), SYSTEM_ACTOR)
                .await
                .unwrap(),
            0
        );
        h.clock.advance(Duration::hours(49));
        assert_eq!(
            h.orchestrator
                .sweep_pending(Duration::hours(48), SYSTEM_ACTOR)
                .await
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn installments_drive_completeness() {
        let h = harness();
        let initiated = h
            .orchestrator
            .initiate_purchase(&member_7(), purchase(PaymentMethod::Transfer))
            .await
            .unwrap();
        let share_id = h
            .orchestrator
            .confirm_purchase(&initiated.reference, treasurer())
            .await
            .unwrap()
            .share
            .share_id;

        let zero = h
            .orchestrator
            .record_installment(
                share_id,
                InstallmentRequest {
                    amount: Money::ZERO,
                    payment_type: PaymentMethod::Cash,
                    status: None,
                    notes: None,
                },
                "treasurer_1",
            )
            .await
            .unwrap_err();
        assert!(matches!(zero, PurchaseError::InvalidAmount(_)));

        let payment = h
            .orchestrator
            .record_installment(
                share_id,
                InstallmentRequest {
                    amount: Money::from_minor(1_000),
                    payment_type: PaymentMethod::Cash,
                    status: Some(PaymentStatus::Pending),
                    notes: Some("cuota 2".to_string()),
                },
                "treasurer_1",
            )
            .await
            .unwrap();
        assert_eq!(payment.status, PaymentStatus::Pending);

        let detail = h.orchestrator.share_detail(share_id, &member_7()).await.unwrap();
        assert_eq!(detail.payments.len(), 2);
        assert_eq!(detail.completeness, PaymentCompleteness::Paid);
        assert_eq!(detail.amount_paid, Money::from_minor(500_000));

        let missing = h
            .orchestrator
            .record_installment(
                999,
                InstallmentRequest {
                    amount: Money::from_minor(1),
                    payment_type: PaymentMethod::Cash,
                    status: None,
                    notes: None,
                },
                "treasurer_1",
            )
            .await
            .unwrap_err();
        assert!(matches!(missing, PurchaseError::NotFound(_)));
    }

    #[tokio::test]
    async fn listing_is_scoped_to_member() {
        let h = harness();
        let initiated = h
            .orchestrator
            .initiate_purchase(&member_7(), purchase(PaymentMethod::Transfer))
            .await
            .unwrap();
        let share_id = h
            .orchestrator
            .confirm_purchase(&initiated.reference, treasurer())
            .await
            .unwrap()
            .share
            .share_id;

        assert_eq!(h.orchestrator.list_shares(&member_7(), None).await.unwrap().len(), 1);

        let other = user("user_8", Role::Member, Some(8));
        assert!(h.orchestrator.list_shares(&other, None).await.unwrap().is_empty());
        assert!(matches!(
            h.orchestrator.list_shares(&other, Some(7)).await,
            Err(PurchaseError::Forbidden(_))
        ));

        let auditor = user("auditor_1", Role::Auditor, None);
        assert_eq!(
            h.orchestrator.list_shares(&auditor, Some(7)).await.unwrap().len(),
            1
        );

        let suspended = h
            .orchestrator
            .update_share_status(share_id, ShareStatus::Suspended, "admin")
            .await
            .unwrap();
        assert_eq!(suspended.status, ShareStatus::Suspended);
    }

    #[test]
    fn identity_falls_back_to_member_id() {
        let now = Utc::now();
        let mut member = Member {
            member_id: 42,
            full_name: "X".to_string(),
            identity_number: Some("  ".to_string()),
            contact_email: None,
            created_at: now,
            updated_at: now,
        };
        assert_eq!(recipient_identity(&member), "42");
        member.identity_number = Some(" 0912 ".to_string());
        assert_eq!(recipient_identity(&member), "0912");
    }
}
