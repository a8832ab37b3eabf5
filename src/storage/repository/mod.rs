// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Repository layer providing typed access to file-backed storage.
//!
//! Each repository provides operations for one entity type, using
//! [`FileStorage`](super::FileStorage) for all file operations.

pub mod members;
pub mod pending;
pub mod plans;

pub use members::{Member, MemberRepository};
pub use pending::{
    generate_reference, is_valid_reference, PendingPayment, PendingPaymentStore, PendingStatus,
    ProviderHandle, PurchaseDetails, REFERENCE_LEN,
};
pub use plans::{PaymentPlan, PlanRepository};
