// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Storage Module
//!
//! Persistent state lives under one data root (`DATA_DIR`, default `/data`).
//!
//! ## Storage Layout
//!
//! ```text
//! /data/
//!   ledger.redb                 # Shares and payments (redb, ACID)
//!   pending/
//!     {reference}.json          # Pending payments (24h TTL)
//!   certificates/
//!     originals/certificate_{share_id}.pdf
//!     encrypted/certificate_{share_id}_member_{member_id}.enc
//!   members/
//!     {member_id}.json
//!   plans/
//!     {plan_id}.json
//!   audit/
//!     {date}/events.jsonl       # Daily audit logs
//! ```
//!
//! JSON files are written to a temp file and renamed into place, so readers
//! never observe a half-written record.

pub mod audit;
pub mod file_store;
pub mod ledger;
pub mod ownership;
pub mod paths;
pub mod repository;

pub use audit::{AuditEvent, AuditEventType, AuditQuery, AuditRepository, SYSTEM_ACTOR};
pub use file_store::{FileEntry, FileStorage, StorageError, StorageResult};
pub use ledger::{
    CreateOutcome, LedgerError, LedgerStats, NewPayment, NewShare, Payment, PaymentCompleteness,
    PaymentStatus, Share, ShareLedger, ShareStatus,
};
pub use ownership::{OwnedResource, OwnershipCheck, OwnershipEnforcer};
pub use paths::StoragePaths;
pub use repository::{
    Member, MemberRepository, PaymentPlan, PendingPayment, PendingPaymentStore, PendingStatus,
    PlanRepository, ProviderHandle, PurchaseDetails,
};
