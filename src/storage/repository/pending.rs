// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Pending payment store.
//!
//! A pending payment is the short-lived record of a purchase intent, written
//! before any permanent Share exists. Records live in `pending/{reference}.json`.
//!
//! ## Expiry
//!
//! Every record carries `expires_at = created_at + ttl`. Reads after
//! `expires_at` behave as if the record did not exist, whether or not the
//! sweep has removed the file yet. The sweep is the only path that deletes
//! expired records; `get` never mutates.

use std::sync::{Arc, Mutex};

use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::{DateTime, Duration, Utc};
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::super::{FileStorage, OwnedResource, StorageError, StorageResult};
use crate::clock::Clock;
use crate::models::{Money, PaymentMethod};

/// Random bytes in a reference (128 bits).
const REFERENCE_BYTES: usize = 16;

/// Length of an encoded reference token.
pub const REFERENCE_LEN: usize = 22;

/// What the member asked to buy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PurchaseDetails {
    pub club_id: u64,
    pub member_id: u64,
    pub plan_id: u64,
    pub unit_count: u32,
    pub unit_price: Money,
    /// Always `unit_count * unit_price`.
    pub total: Money,
    pub payment_method: PaymentMethod,
    /// Share type label copied from the plan ("Acción Patrimonial"...).
    pub share_type: String,
    /// User id that initiated the purchase.
    pub requested_by: String,
}

/// Gateway-side identity of the payment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ProviderHandle {
    /// Gateway identifier (`stripe`, `mercadopago`, `paypal`, `manual`).
    pub provider: String,
    /// Provider payment id; absent for manual payments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handle: Option<String>,
    /// URL where the member completes payment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkout_url: Option<String>,
    /// Client secret or instructions shown to the member.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkout_reference: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PendingStatus {
    Pending,
    Confirmed,
}

/// Persisted pending payment record.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PendingPayment {
    pub reference: String,
    pub purchase: PurchaseDetails,
    pub provider: ProviderHandle,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub status: PendingStatus,
    pub attempt_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_proof: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmed_at: Option<DateTime<Utc>>,
}

impl PendingPayment {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

impl OwnedResource for PendingPayment {
    fn owner_member_id(&self) -> u64 {
        self.purchase.member_id
    }

    fn resource_label(&self) -> String {
        format!("pending payment {}", self.reference)
    }
}

/// Generate a fresh 128-bit reference as a URL-safe token.
pub fn generate_reference() -> StorageResult<String> {
    let mut bytes = [0u8; REFERENCE_BYTES];
    SystemRandom::new()
        .fill(&mut bytes)
        .map_err(|_| StorageError::SerializationError("secure random unavailable".to_string()))?;
    Ok(Base64UrlUnpadded::encode_string(&bytes))
}

/// True for strings shaped like a generated reference.
///
/// References become file names, so anything else is rejected before it
/// can reach the filesystem.
pub fn is_valid_reference(reference: &str) -> bool {
    reference.len() == REFERENCE_LEN
        && reference
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// File-backed pending payment store with injected clock.
#[derive(Clone)]
pub struct PendingPaymentStore {
    storage: FileStorage,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    write_lock: Arc<Mutex<()>>,
}

impl PendingPaymentStore {
    pub fn new(storage: FileStorage, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            storage,
            clock,
            ttl,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    /// Persist a new record under a freshly generated reference.
    pub fn create(
        &self,
        purchase: PurchaseDetails,
        provider: ProviderHandle,
    ) -> StorageResult<PendingPayment> {
        let reference = generate_reference()?;
        self.create_with_reference(reference, purchase, provider)
    }

    /// Persist a new record under a reference generated by the caller.
    ///
    /// Used when the reference must be handed to the gateway before the
    /// record is written.
    pub fn create_with_reference(
        &self,
        reference: String,
        purchase: PurchaseDetails,
        provider: ProviderHandle,
    ) -> StorageResult<PendingPayment> {
        if !is_valid_reference(&reference) {
            return Err(StorageError::SerializationError(format!(
                "invalid reference {reference}"
            )));
        }

        let _guard = self.lock();
        let path = self.storage.paths().pending(&reference);
        if self.storage.exists(&path) {
            return Err(StorageError::AlreadyExists(format!("Pending payment {reference}")));
        }

        let created_at = self.clock.now();
        let record = PendingPayment {
            reference,
            purchase,
            provider,
            created_at,
            expires_at: created_at + self.ttl,
            status: PendingStatus::Pending,
            attempt_count: 0,
            external_proof: None,
            confirmed_at: None,
        };
        self.storage.write_json(&path, &record)?;
        Ok(record)
    }

    /// Live record for `reference`, or `None` if missing, malformed or expired.
    pub fn get(&self, reference: &str) -> StorageResult<Option<PendingPayment>> {
        let Some(record) = self.read(reference)? else {
            return Ok(None);
        };
        if record.is_expired_at(self.clock.now()) {
            return Ok(None);
        }
        Ok(Some(record))
    }

    /// Transition to `Confirmed`. Already-confirmed records are returned as is,
    /// except that a missing external proof is filled in.
    pub fn mark_confirmed(
        &self,
        reference: &str,
        external_proof: Option<String>,
    ) -> StorageResult<PendingPayment> {
        self.update(reference, |record, now| {
            if record.status == PendingStatus::Confirmed {
                if record.external_proof.is_none() && external_proof.is_some() {
                    record.external_proof = external_proof;
                    return true;
                }
                return false;
            }
            record.status = PendingStatus::Confirmed;
            record.confirmed_at = Some(now);
            if external_proof.is_some() {
                record.external_proof = external_proof;
            }
            true
        })
    }

    /// Count a confirmation attempt.
    pub fn record_attempt(&self, reference: &str) -> StorageResult<PendingPayment> {
        self.update(reference, |record, _| {
            record.attempt_count = record.attempt_count.saturating_add(1);
            true
        })
    }

    /// Remove a record. Missing records are not an error.
    pub fn delete(&self, reference: &str) -> StorageResult<()> {
        if !is_valid_reference(reference) {
            return Ok(());
        }
        let _guard = self.lock();
        self.storage
            .delete_if_exists(self.storage.paths().pending(reference))?;
        Ok(())
    }

    /// Remove every record created more than `max_age` ago, whatever its status.
    ///
    /// Files that no longer parse are aged by modification time.
    pub fn sweep(&self, max_age: Duration) -> StorageResult<usize> {
        let _guard = self.lock();
        let cutoff = self.clock.now() - max_age;
        let mut removed = 0;

        for entry in self.storage.list_entries(self.storage.paths().pending_dir(), "json")? {
            let created_at = match self.storage.read_json::<PendingPayment>(&entry.path) {
                Ok(record) => record.created_at,
                Err(StorageError::NotFound(_)) => continue,
                Err(e) => {
                    tracing::warn!(path = %entry.path.display(), error = %e, "Unreadable pending record");
                    DateTime::<Utc>::from(entry.modified)
                }
            };

            if created_at < cutoff && self.storage.delete_if_exists(&entry.path)? {
                removed += 1;
            }
        }

        Ok(removed)
    }

    /// All unexpired records, oldest first.
    pub fn list_active(&self) -> StorageResult<Vec<PendingPayment>> {
        let now = self.clock.now();
        let mut active = Vec::new();
        for reference in self
            .storage
            .list_files(self.storage.paths().pending_dir(), "json")?
        {
            if let Some(record) = self.read(&reference)? {
                if !record.is_expired_at(now) {
                    active.push(record);
                }
            }
        }
        active.sort_by_key(|record| record.created_at);
        Ok(active)
    }

    /// Number of records on disk, expired or not.
    pub fn count(&self) -> StorageResult<usize> {
        Ok(self
            .storage
            .list_files(self.storage.paths().pending_dir(), "json")?
            .len())
    }

    fn read(&self, reference: &str) -> StorageResult<Option<PendingPayment>> {
        if !is_valid_reference(reference) {
            return Ok(None);
        }
        self.storage
            .read_json_opt(self.storage.paths().pending(reference))
    }

    fn update<F>(&self, reference: &str, mutate: F) -> StorageResult<PendingPayment>
    where
        F: FnOnce(&mut PendingPayment, DateTime<Utc>) -> bool,
    {
        let _guard = self.lock();
        let now = self.clock.now();
        let mut record = self
            .read(reference)?
            .filter(|record| !record.is_expired_at(now))
            .ok_or_else(|| StorageError::NotFound(format!("Pending payment {reference}")))?;

        if mutate(&mut record, now) {
            self.storage
                .write_json(self.storage.paths().pending(reference), &record)?;
        }
        Ok(record)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ()> {
        self.write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
