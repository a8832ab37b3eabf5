// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Certificates
//!
//! Proof-of-ownership documents for shares: rendering to PDF and storing
//! the plaintext original plus a copy encrypted for the owning member.

pub mod pdf;
pub mod renderer;
pub mod spelled;
pub mod vault;

pub use renderer::{CertificateRenderer, RenderError, PLACEHOLDER};
pub use vault::{CertificateArtifact, EncryptedDocumentStore, VaultError, VaultResult};
