// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Maintenance Task
//!
//! Background task that keeps purchase state moving when nobody is calling
//! the API. Every `interval` it:
//! 1. Asks providers about live card, wallet and PayPal purchases and
//!    confirms the settled ones (missed webhooks).
//! 2. Deletes pending records older than the sweep age.
//! 3. Deletes certificate files past retention, when retention is set.
//!
//! ## Shutdown
//!
//! Uses `tokio_util::sync::CancellationToken` for graceful shutdown.

use std::time::Duration as StdDuration;

use chrono::Duration;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use utoipa::ToSchema;

use super::{PollSummary, PurchaseOrchestrator};
use crate::storage::SYSTEM_ACTOR;

/// Outcome of one maintenance pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct MaintenanceReport {
    pub poll: PollSummary,
    pub pending_swept: usize,
    pub certificates_removed: usize,
}

pub struct MaintenanceTask {
    orchestrator: PurchaseOrchestrator,
    interval: StdDuration,
    sweep_max_age: Duration,
    certificate_retention: Option<Duration>,
}

impl MaintenanceTask {
    pub fn new(
        orchestrator: PurchaseOrchestrator,
        interval: StdDuration,
        sweep_max_age: Duration,
        certificate_retention: Option<Duration>,
    ) -> Self {
        Self {
            orchestrator,
            interval,
            sweep_max_age,
            certificate_retention,
        }
    }

    /// Run until the cancellation token is triggered.
    ///
    /// ```rust,ignore
    /// tokio::spawn(task.run(shutdown.clone()));
    /// ```
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            interval_secs = self.interval.as_secs(),
            sweep_max_age_hours = self.sweep_max_age.num_hours(),
            retention_days = self.certificate_retention.map(|d| d.num_days()),
            "Maintenance task starting"
        );

        loop {
            if shutdown.is_cancelled() {
                info!("Maintenance task shutting down");
                return;
            }

            let report = self.run_once().await;
            if report != MaintenanceReport::default() {
                info!(
                    checked = report.poll.checked,
                    confirmed = report.poll.confirmed,
                    swept = report.pending_swept,
                    certificates_removed = report.certificates_removed,
                    "Maintenance pass finished"
                );
            }

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {},
                _ = shutdown.cancelled() => {
                    info!("Maintenance task shutting down");
                    return;
                }
            }
        }
    }

    /// One pass. Each step runs even when an earlier one fails.
    pub async fn run_once(&self) -> MaintenanceReport {
        let mut report = MaintenanceReport::default();

        match self.orchestrator.poll_pending().await {
            Ok(poll) => report.poll = poll,
            Err(e) => warn!(error = %e, "Maintenance: pending poll failed"),
        }

        match self
            .orchestrator
            .sweep_pending(self.sweep_max_age, SYSTEM_ACTOR)
            .await
        {
            Ok(removed) => report.pending_swept = removed,
            Err(e) => warn!(error = %e, "Maintenance: pending sweep failed"),
        }

        if let Some(retention) = self.certificate_retention {
            match self
                .orchestrator
                .cleanup_certificates(retention, SYSTEM_ACTOR)
                .await
            {
                Ok(removed) => report.certificates_removed = removed,
                Err(e) => warn!(error = %e, "Maintenance: certificate cleanup failed"),
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthenticatedUser, Role};
    use crate::models::{Money, PaymentMethod};
    use crate::payments::GatewayStatus;
    use crate::purchase::InitiatePurchase;
    use crate::state::test_support::{test_harness, TestState};

    fn member() -> AuthenticatedUser {
        AuthenticatedUser {
            user_id: "user_7".to_string(),
            role: Role::Member,
            member_id: Some(7),
            session_id: None,
            issuer: "test".to_string(),
            expires_at: 0,
        }
    }

    fn card_purchase() -> InitiatePurchase {
        InitiatePurchase {
            member_id: 7,
            plan_id: 3,
            unit_count: 2,
            unit_price: Money::from_minor(5_000),
            payment_method: PaymentMethod::Card,
        }
    }

    #[tokio::test]
    async fn pass_confirms_and_sweeps() {
        let TestState {
            state,
            clock,
            card,
            temp: _temp,
        } = test_harness();
        let orchestrator = state.orchestrator.clone();

        orchestrator
            .initiate_purchase(&member(), card_purchase())
            .await
            .unwrap();
        let stale = orchestrator
            .initiate_purchase(&member(), card_purchase())
            .await
            .unwrap();

        let task = MaintenanceTask::new(
            orchestrator.clone(),
            StdDuration::from_secs(60),
            Duration::hours(48),
            Some(Duration::days(365)),
        );

        let report = task.run_once().await;
        assert_eq!(report.poll.checked, 2);
        assert_eq!(report.poll.still_pending, 2);
        assert_eq!(report.pending_swept, 0);

        card.set_status(GatewayStatus::Succeeded);
        orchestrator
            .pending()
            .delete(&stale.reference)
            .unwrap();
        let report = task.run_once().await;
        assert_eq!(report.poll.confirmed, 1);
        assert_eq!(orchestrator.ledger().stats().unwrap().shares, 1);

        // Leftover record past the sweep age is removed.
        card.set_status(GatewayStatus::Pending);
        orchestrator
            .initiate_purchase(&member(), card_purchase())
            .await
            .unwrap();
        clock.advance(Duration::hours(49));
        let report = task.run_once().await;
        assert_eq!(report.pending_swept, 1);
        assert_eq!(orchestrator.pending().count().unwrap(), 0);
    }

    #[tokio::test]
    async fn run_stops_on_cancel() {
        let TestState {
            state, temp: _temp, ..
        } = test_harness();
        let task = MaintenanceTask::new(
            state.orchestrator.clone(),
            StdDuration::from_secs(3600),
            Duration::hours(48),
            None,
        );

        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(task.run(shutdown.clone()));
        shutdown.cancel();

        tokio::time::timeout(StdDuration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
