// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! Bearer JWT authentication for the club shares API.
//!
//! ## Auth Flow
//!
//! 1. The member portal authenticates the user with the identity provider
//! 2. The portal sends `Authorization: Bearer <JWT>`
//! 3. The server:
//!    - Fetches the provider JWKS via HTTPS
//!    - Verifies signature, expiry, issuer, audience
//!    - Extracts:
//!      - `sub` → canonical `user_id`
//!      - `publicMetadata.role` → [`Role`]
//!      - `publicMetadata.member_id` → the club member the account acts for
//!
//! ## Security
//!
//! - All `/v1` endpoints except provider webhooks require authentication
//! - JWKS is cached with TTL; clock skew tolerance is 60 seconds

pub mod claims;
pub mod error;
pub mod extractor;
pub mod jwks;
pub mod roles;

pub use claims::AuthenticatedUser;
pub use error::AuthError;
pub use extractor::{AdminOnly, Auth, LedgerViewer, TreasuryStaff};
pub use jwks::JwksManager;
pub use roles::Role;
