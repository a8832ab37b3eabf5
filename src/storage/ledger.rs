// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Share and payment ledger backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! - `shares`: share_id → serialized Share
//! - `share_by_reference`: originating reference → share_id (unique)
//! - `member_shares`: (member_id, share_id) → ()
//! - `payments`: payment_id → serialized Payment
//! - `share_payments`: (share_id, payment_id) → ()
//! - `counters`: name → last allocated id
//!
//! redb serializes write transactions, so the reference check and the Share
//! insert in [`ShareLedger::create_share_with_payment`] cannot interleave
//! with another confirmation of the same reference.

use std::path::Path;

use chrono::{DateTime, Utc};
use redb::{
    Database, ReadableDatabase, ReadableTable, ReadableTableMetadata, Table, TableDefinition,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::OwnedResource;
use crate::models::{Money, PaymentMethod};

// =============================================================================
// Table Definitions
// =============================================================================

const SHARES: TableDefinition<u64, &[u8]> = TableDefinition::new("shares");

/// Unique index on the originating reference.
const SHARE_BY_REFERENCE: TableDefinition<&str, u64> = TableDefinition::new("share_by_reference");

const MEMBER_SHARES: TableDefinition<(u64, u64), ()> = TableDefinition::new("member_shares");

const PAYMENTS: TableDefinition<u64, &[u8]> = TableDefinition::new("payments");

const SHARE_PAYMENTS: TableDefinition<(u64, u64), ()> = TableDefinition::new("share_payments");

const COUNTERS: TableDefinition<&str, u64> = TableDefinition::new("counters");

const SHARE_COUNTER: &str = "share_id";
const PAYMENT_COUNTER: &str = "payment_id";

// =============================================================================
// Error Type
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type LedgerResult<T> = Result<T, LedgerError>;

// =============================================================================
// Entities
// =============================================================================

/// Administrative status of a share.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ShareStatus {
    /// Status of every newly confirmed share.
    Issued,
    Suspended,
    Transferred,
    Cancelled,
}

/// A club share ("acción").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Share {
    pub share_id: u64,
    /// Number printed on the certificate.
    pub certificate_number: String,
    /// Reference of the pending payment this share was confirmed from.
    pub reference: String,
    pub club_id: u64,
    pub member_id: u64,
    pub plan_id: u64,
    pub status: ShareStatus,
    pub unit_count: u32,
    pub unit_price: Money,
    pub total: Money,
    pub payment_method: PaymentMethod,
    pub share_type: String,
    pub issued_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted_certificate_path: Option<String>,
    /// True once an encrypted certificate copy exists.
    pub encrypted: bool,
}

impl OwnedResource for Share {
    fn owner_member_id(&self) -> u64 {
        self.member_id
    }

    fn resource_label(&self) -> String {
        format!("share {}", self.share_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Approved,
    Pending,
    Rejected,
}

/// A payment toward a share ("pago de acción").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Payment {
    pub payment_id: u64,
    pub share_id: u64,
    pub paid_at: DateTime<Utc>,
    pub amount: Money,
    pub payment_type: PaymentMethod,
    pub status: PaymentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Payment completeness, computed on read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PaymentCompleteness {
    Unpaid,
    Partial,
    Paid,
}

impl PaymentCompleteness {
    /// Compare approved payments against the share's expected total.
    pub fn compute(share: &Share, payments: &[Payment]) -> (PaymentCompleteness, Money) {
        let paid = payments
            .iter()
            .filter(|p| p.share_id == share.share_id && p.status == PaymentStatus::Approved)
            .fold(Money::ZERO, |acc, p| acc.checked_add(p.amount).unwrap_or(acc));

        let completeness = if paid >= share.total {
            PaymentCompleteness::Paid
        } else if paid.is_positive() {
            PaymentCompleteness::Partial
        } else {
            PaymentCompleteness::Unpaid
        };
        (completeness, paid)
    }
}

/// Share fields supplied by the caller; ids and numbers are allocated here.
#[derive(Debug, Clone)]
pub struct NewShare {
    pub reference: String,
    pub club_id: u64,
    pub member_id: u64,
    pub plan_id: u64,
    pub unit_count: u32,
    pub unit_price: Money,
    pub total: Money,
    pub payment_method: PaymentMethod,
    pub share_type: String,
    pub issued_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPayment {
    pub paid_at: DateTime<Utc>,
    pub amount: Money,
    pub payment_type: PaymentMethod,
    pub status: PaymentStatus,
    pub notes: Option<String>,
}

/// Result of [`ShareLedger::create_share_with_payment`].
#[derive(Debug, Clone)]
pub enum CreateOutcome {
    Created { share: Share, payment: Payment },
    /// A share for this reference already existed; nothing was written.
    AlreadyExists(Share),
}

/// Row counts for admin stats.
#[derive(Debug, Clone, Copy, Default, Serialize, ToSchema)]
pub struct LedgerStats {
    pub shares: u64,
    pub payments: u64,
}

/// Certificate number printed for a share id.
pub fn certificate_number(share_id: u64) -> String {
    format!("ACC-{share_id:06}")
}

// =============================================================================
// ShareLedger
// =============================================================================

pub struct ShareLedger {
    db: Database,
}

impl ShareLedger {
    /// Open (or create) the ledger at the given path.
    pub fn open(path: &Path) -> LedgerResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path)?;

        // Pre-create all tables so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(SHARES)?;
            let _ = write_txn.open_table(SHARE_BY_REFERENCE)?;
            let _ = write_txn.open_table(MEMBER_SHARES)?;
            let _ = write_txn.open_table(PAYMENTS)?;
            let _ = write_txn.open_table(SHARE_PAYMENTS)?;
            let _ = write_txn.open_table(COUNTERS)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }

    /// Create the Share and its first Payment, unless the reference already
    /// produced a Share.
    pub fn create_share_with_payment(
        &self,
        new_share: NewShare,
        new_payment: NewPayment,
    ) -> LedgerResult<CreateOutcome> {
        let write_txn = self.db.begin_write()?;

        let existing = {
            let by_reference = write_txn.open_table(SHARE_BY_REFERENCE)?;
            let found = by_reference.get(new_share.reference.as_str())?.map(|v| v.value());
            found
        };
        if let Some(share_id) = existing {
            let share = {
                let shares = write_txn.open_table(SHARES)?;
                read_share(&shares, share_id)?
            };
            write_txn.abort()?;
            return Ok(CreateOutcome::AlreadyExists(share));
        }

        let (share, payment) = {
            let mut counters = write_txn.open_table(COUNTERS)?;
            let share_id = next_id(&mut counters, SHARE_COUNTER)?;
            let payment_id = next_id(&mut counters, PAYMENT_COUNTER)?;

            let share = Share {
                share_id,
                certificate_number: certificate_number(share_id),
                reference: new_share.reference,
                club_id: new_share.club_id,
                member_id: new_share.member_id,
                plan_id: new_share.plan_id,
                status: ShareStatus::Issued,
                unit_count: new_share.unit_count,
                unit_price: new_share.unit_price,
                total: new_share.total,
                payment_method: new_share.payment_method,
                share_type: new_share.share_type,
                issued_at: new_share.issued_at,
                certificate_path: None,
                encrypted_certificate_path: None,
                encrypted: false,
            };
            let payment = Payment {
                payment_id,
                share_id,
                paid_at: new_payment.paid_at,
                amount: new_payment.amount,
                payment_type: new_payment.payment_type,
                status: new_payment.status,
                notes: new_payment.notes,
            };

            let mut shares = write_txn.open_table(SHARES)?;
            shares.insert(share_id, serde_json::to_vec(&share)?.as_slice())?;

            let mut by_reference = write_txn.open_table(SHARE_BY_REFERENCE)?;
            by_reference.insert(share.reference.as_str(), share_id)?;

            let mut member_shares = write_txn.open_table(MEMBER_SHARES)?;
            member_shares.insert((share.member_id, share_id), ())?;

            let mut payments = write_txn.open_table(PAYMENTS)?;
            payments.insert(payment_id, serde_json::to_vec(&payment)?.as_slice())?;

            let mut share_payments = write_txn.open_table(SHARE_PAYMENTS)?;
            share_payments.insert((share_id, payment_id), ())?;

            (share, payment)
        };
        write_txn.commit()?;

        Ok(CreateOutcome::Created { share, payment })
    }

    /// Look up a share by id.
    pub fn get_share(&self, share_id: u64) -> LedgerResult<Option<Share>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(SHARES)?;
        match table.get(share_id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Share confirmed from `reference`, if any.
    pub fn share_by_reference(&self, reference: &str) -> LedgerResult<Option<Share>> {
        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_table(SHARE_BY_REFERENCE)?;
        let Some(share_id) = index.get(reference)?.map(|v| v.value()) else {
            return Ok(None);
        };
        let shares = read_txn.open_table(SHARES)?;
        Ok(Some(read_share(&shares, share_id)?))
    }

    /// Shares of one member, or every share when `member_id` is `None`.
    pub fn list_shares(&self, member_id: Option<u64>) -> LedgerResult<Vec<Share>> {
        let read_txn = self.db.begin_read()?;
        let shares = read_txn.open_table(SHARES)?;

        let mut result = Vec::new();
        match member_id {
            Some(member_id) => {
                let index = read_txn.open_table(MEMBER_SHARES)?;
                for entry in index.range((member_id, 0)..=(member_id, u64::MAX))? {
                    let (key, _) = entry?;
                    let (_, share_id) = key.value();
                    result.push(read_share(&shares, share_id)?);
                }
            }
            None => {
                for entry in shares.iter()? {
                    let (_, value) = entry?;
                    result.push(serde_json::from_slice(value.value())?);
                }
            }
        }
        Ok(result)
    }

    /// Record certificate file locations on a share.
    pub fn attach_certificate(
        &self,
        share_id: u64,
        certificate_path: String,
        encrypted_certificate_path: Option<String>,
    ) -> LedgerResult<Share> {
        self.update_share(share_id, |share| {
            share.certificate_path = Some(certificate_path);
            share.encrypted = encrypted_certificate_path.is_some();
            share.encrypted_certificate_path = encrypted_certificate_path;
        })
    }

    /// Administrative status change.
    pub fn update_status(&self, share_id: u64, status: ShareStatus) -> LedgerResult<Share> {
        self.update_share(share_id, |share| share.status = status)
    }

    /// Append a payment to an existing share.
    pub fn add_payment(&self, share_id: u64, new_payment: NewPayment) -> LedgerResult<Payment> {
        let write_txn = self.db.begin_write()?;
        let payment = {
            let shares = write_txn.open_table(SHARES)?;
            if shares.get(share_id)?.is_none() {
                drop(shares);
                write_txn.abort()?;
                return Err(LedgerError::NotFound(format!("Share {share_id}")));
            }

            let mut counters = write_txn.open_table(COUNTERS)?;
            let payment_id = next_id(&mut counters, PAYMENT_COUNTER)?;
            let payment = Payment {
                payment_id,
                share_id,
                paid_at: new_payment.paid_at,
                amount: new_payment.amount,
                payment_type: new_payment.payment_type,
                status: new_payment.status,
                notes: new_payment.notes,
            };

            let mut payments = write_txn.open_table(PAYMENTS)?;
            payments.insert(payment_id, serde_json::to_vec(&payment)?.as_slice())?;
            let mut share_payments = write_txn.open_table(SHARE_PAYMENTS)?;
            share_payments.insert((share_id, payment_id), ())?;
            payment
        };
        write_txn.commit()?;
        Ok(payment)
    }

    /// Payments of a share in insertion order.
    pub fn payments_for_share(&self, share_id: u64) -> LedgerResult<Vec<Payment>> {
        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_table(SHARE_PAYMENTS)?;
        let payments = read_txn.open_table(PAYMENTS)?;

        let mut result = Vec::new();
        for entry in index.range((share_id, 0)..=(share_id, u64::MAX))? {
            let (key, _) = entry?;
            let (_, payment_id) = key.value();
            if let Some(value) = payments.get(payment_id)? {
                result.push(serde_json::from_slice(value.value())?);
            }
        }
        Ok(result)
    }

    pub fn stats(&self) -> LedgerResult<LedgerStats> {
        let read_txn = self.db.begin_read()?;
        let shares = read_txn.open_table(SHARES)?;
        let payments = read_txn.open_table(PAYMENTS)?;
        Ok(LedgerStats {
            shares: shares.len()?,
            payments: payments.len()?,
        })
    }

    /// Cheap read transaction for readiness probes.
    pub fn ping(&self) -> LedgerResult<()> {
        let read_txn = self.db.begin_read()?;
        let _ = read_txn.open_table(COUNTERS)?;
        Ok(())
    }

    fn update_share<F>(&self, share_id: u64, mutate: F) -> LedgerResult<Share>
    where
        F: FnOnce(&mut Share),
    {
        let write_txn = self.db.begin_write()?;
        let share = {
            let mut table = write_txn.open_table(SHARES)?;
            let mut share = read_share(&table, share_id)?;
            mutate(&mut share);
            table.insert(share_id, serde_json::to_vec(&share)?.as_slice())?;
            share
        };
        write_txn.commit()?;
        Ok(share)
    }
}

fn read_share<T>(table: &T, share_id: u64) -> LedgerResult<Share>
where
    T: ReadableTable<u64, &'static [u8]>,
{
    let bytes = table
        .get(share_id)?
        .map(|value| value.value().to_vec())
        .ok_or_else(|| LedgerError::NotFound(format!("Share {share_id}")))?;
    Ok(serde_json::from_slice(&bytes)?)
}

fn next_id(counters: &mut Table<&str, u64>, name: &str) -> LedgerResult<u64> {
    let current = counters.get(name)?.map(|v| v.value()).unwrap_or(0);
    let next = current + 1;
    counters.insert(name, next)?;
    Ok(next)
}

// =============================================================================
// Tests
// =============================================================================
