// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Club Shares - share purchase and certificate service
//!
//! Members buy club shares ("acciones") through a payment provider or by
//! transfer/cash settled by treasury staff. A confirmed payment becomes a
//! share in the ledger and an ownership certificate encrypted for the member.
//!
//! ## Modules
//!
//! - `api` - HTTP API handlers (Axum)
//! - `auth` - JWT authentication and club roles
//! - `certificates` - PDF rendering and the encrypted document store
//! - `payments` - Payment gateway clients and webhook verification
//! - `purchase` - Purchase orchestration and background maintenance
//! - `storage` - File storage, pending payments, and the redb share ledger

pub mod api;
pub mod auth;
pub mod certificates;
pub mod clock;
pub mod config;
pub mod error;
pub mod models;
pub mod payments;
pub mod purchase;
pub mod state;
pub mod storage;
