// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use crate::auth::{AuthError, JwksManager};
use crate::certificates::{CertificateRenderer, EncryptedDocumentStore, VaultError};
use crate::clock::Clock;
use crate::config::{AppConfig, AuthSettings};
use crate::payments::GatewayRegistry;
use crate::purchase::{PurchaseOrchestrator, PurchaseSettings};
use crate::storage::{FileStorage, PendingPaymentStore, ShareLedger};

/// JWT verification settings.
///
/// Without a JWKS the server runs in development mode (see
/// [`crate::auth::Auth`]).
#[derive(Clone, Default)]
pub struct AuthConfig {
    pub jwks: Option<JwksManager>,
    pub issuer: Option<String>,
    pub audience: Option<String>,
}

impl AuthConfig {
    pub fn from_settings(settings: &AuthSettings) -> Result<Self, AuthError> {
        let jwks = settings
            .jwks_url
            .as_deref()
            .map(JwksManager::new)
            .transpose()?;
        Ok(Self {
            jwks,
            issuer: settings.issuer.clone(),
            audience: settings.audience.clone(),
        })
    }

    pub fn is_production(&self) -> bool {
        self.jwks.is_some()
    }
}

#[derive(Clone)]
pub struct AppState {
    pub storage: FileStorage,
    pub orchestrator: PurchaseOrchestrator,
    pub auth_config: AuthConfig,
    pub config: Arc<AppConfig>,
}

impl AppState {
    /// Wire the purchase services from configuration.
    pub fn new(
        config: AppConfig,
        storage: FileStorage,
        ledger: Arc<ShareLedger>,
        gateways: GatewayRegistry,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, VaultError> {
        let pending = PendingPaymentStore::new(storage.clone(), clock, config.pending_ttl);
        let vault = EncryptedDocumentStore::new(
            storage.clone(),
            &config.certificate_key_salt,
            config.kdf_iterations,
        )?;
        let renderer = CertificateRenderer::new(config.club_name.clone(), config.currency.clone());
        let orchestrator = PurchaseOrchestrator::new(
            storage.clone(),
            ledger,
            pending,
            gateways,
            vault,
            renderer,
            PurchaseSettings {
                club_id: config.club_id,
                currency: config.currency.clone(),
            },
        );

        Ok(Self {
            storage,
            orchestrator,
            auth_config: AuthConfig::default(),
            config: Arc::new(config),
        })
    }

    pub fn with_auth(mut self, auth_config: AuthConfig) -> Self {
        self.auth_config = auth_config;
        self
    }

    pub fn storage(&self) -> &FileStorage {
        &self.storage
    }

    pub fn ledger(&self) -> &Arc<ShareLedger> {
        self.orchestrator.ledger()
    }
}

#[cfg(test)]
pub mod test_support {
    use super::*;
    use crate::clock::ManualClock;
    use crate::models::Money;
    use crate::payments::fake::FakeGateway;
    use crate::payments::ManualGateway;
    use crate::storage::{MemberRepository, PaymentPlan, PlanRepository, StoragePaths};
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    /// State wired with a manual gateway and a scriptable "stripe" gateway.
    ///
    /// Seeds member 7 (identity `0912345678`), member 8 and plan 3.
    pub struct TestState {
        pub state: AppState,
        pub clock: ManualClock,
        pub card: Arc<FakeGateway>,
        pub temp: TempDir,
    }

    pub fn test_harness() -> TestState {
        let temp = TempDir::new().unwrap();
        let mut storage = FileStorage::new(StoragePaths::new(temp.path()));
        storage.initialize().unwrap();

        let config = AppConfig::with_defaults(temp.path(), "test-salt");
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2026, 3, 14, 10, 0, 0).unwrap());
        let ledger = Arc::new(ShareLedger::open(&storage.paths().ledger_db()).unwrap());
        let pending =
            PendingPaymentStore::new(storage.clone(), Arc::new(clock.clone()), config.pending_ttl);
        let card = Arc::new(FakeGateway::new("stripe"));
        let gateways = GatewayRegistry::new()
            .with_gateway(Arc::new(ManualGateway::new("Quote {reference}")))
            .with_gateway(card.clone());

        let orchestrator = PurchaseOrchestrator::new(
            storage.clone(),
            ledger,
            pending,
            gateways,
            EncryptedDocumentStore::for_tests(storage.clone(), "test-salt"),
            CertificateRenderer::new(config.club_name.clone(), config.currency.clone()),
            PurchaseSettings {
                club_id: config.club_id,
                currency: config.currency.clone(),
            },
        );

        let members = MemberRepository::new(&storage);
        members
            .upsert(
                7,
                "Ana Pérez".to_string(),
                Some("0912345678".to_string()),
                None,
            )
            .unwrap();
        members
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

        TestState {
            state: AppState {
                storage,
                orchestrator,
                auth_config: AuthConfig::default(),
                config: Arc::new(config),
            },
            clock,
            card,
            temp,
        }
    }

    /// Development-mode state; keep the TempDir alive for the test.
    pub fn test_state() -> (AppState, TempDir) {
        let TestState { state, temp, .. } = test_harness();
        (state, temp)
    }
}
