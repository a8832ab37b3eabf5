// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    models::{Money, PaymentMethod},
    payments::{GatewayStatus, MethodAvailability},
    purchase::{
        ConfirmedPurchase, InitiatePurchase, InitiatedPurchase, InstallmentRequest,
        MaintenanceReport, PollSummary, ShareDetail,
    },
    state::AppState,
    storage::{
        AuditEvent, AuditEventType, LedgerStats, Member, Payment, PaymentCompleteness,
        PaymentPlan, PaymentStatus, PendingPayment, PendingStatus, ProviderHandle,
        PurchaseDetails, Share, ShareStatus,
    },
};

pub mod admin;
pub mod directory;
pub mod health;
pub mod purchases;
pub mod shares;
pub mod webhooks;

pub fn router(state: AppState) -> Router {
    let v1_routes = Router::new()
        // Purchases
        .route("/purchase/initiate", post(purchases::initiate_purchase))
        .route("/purchase/confirm", post(purchases::confirm_purchase))
        .route("/purchase/methods", get(purchases::list_payment_methods))
        .route("/purchase/{reference}", get(purchases::get_pending_purchase))
        // Shares
        .route("/shares", get(shares::list_shares))
        .route("/shares/{share_id}", get(shares::get_share))
        .route("/shares/{share_id}/status", put(shares::update_share_status))
        .route("/shares/{share_id}/payments", post(shares::record_installment))
        .route(
            "/shares/{share_id}/certificate",
            get(shares::download_certificate),
        )
        .route(
            "/shares/{share_id}/certificate/issue",
            post(shares::issue_certificate),
        )
        .route(
            "/shares/{share_id}/certificate/decrypt",
            post(shares::decrypt_certificate),
        )
        // Directory
        .route("/members", get(directory::list_members))
        .route(
            "/members/{member_id}",
            get(directory::get_member).put(directory::upsert_member),
        )
        .route("/plans", get(directory::list_plans))
        .route("/plans/{plan_id}", put(directory::upsert_plan))
        // Provider webhooks (signature-verified, no bearer token)
        .route("/webhooks/{provider}", post(webhooks::receive_webhook))
        // Admin
        .route("/admin/stats", get(admin::get_stats))
        .route("/admin/audit", get(admin::query_audit_log))
        .route("/admin/maintenance", post(admin::run_maintenance))
        .route("/admin/maintenance/sweep", post(admin::sweep_pending))
        .route("/admin/maintenance/cleanup", post(admin::cleanup_certificates))
        .with_state(state.clone());

    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .with_state(state);

    Router::new()
        .nest("/v1", v1_routes)
        .merge(health_routes)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        purchases::initiate_purchase,
        purchases::list_payment_methods,
        purchases::get_pending_purchase,
        purchases::confirm_purchase,
        shares::list_shares,
        shares::get_share,
        shares::update_share_status,
        shares::record_installment,
        shares::download_certificate,
        shares::issue_certificate,
        shares::decrypt_certificate,
        directory::list_members,
        directory::get_member,
        directory::upsert_member,
        directory::list_plans,
        directory::upsert_plan,
        webhooks::receive_webhook,
        admin::get_stats,
        admin::query_audit_log,
        admin::run_maintenance,
        admin::sweep_pending,
        admin::cleanup_certificates,
        health::health,
        health::liveness,
        health::readiness
    ),
    components(
        schemas(
            Money,
            PaymentMethod,
            GatewayStatus,
            MethodAvailability,
            InitiatePurchase,
            InitiatedPurchase,
            ConfirmedPurchase,
            InstallmentRequest,
            ShareDetail,
            PollSummary,
            MaintenanceReport,
            PendingPayment,
            PendingStatus,
            PurchaseDetails,
            ProviderHandle,
            Share,
            ShareStatus,
            Payment,
            PaymentStatus,
            PaymentCompleteness,
            LedgerStats,
            Member,
            PaymentPlan,
            AuditEvent,
            AuditEventType,
            purchases::ConfirmRequest,
            purchases::PaymentMethodsResponse,
            shares::ShareListResponse,
            shares::StatusUpdateRequest,
            shares::DecryptRequest,
            directory::UpsertMemberRequest,
            directory::UpsertPlanRequest,
            directory::MemberListResponse,
            directory::PlanListResponse,
            webhooks::WebhookResponse,
            admin::StatsResponse,
            admin::AuditLogResponse,
            admin::CleanupResponse,
            health::ReadyResponse,
            health::HealthChecks,
            health::HealthResponse
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Purchases", description = "Share purchase and payment confirmation"),
        (name = "Shares", description = "Share ledger and certificates"),
        (name = "Directory", description = "Members and payment plans"),
        (name = "Webhooks", description = "Payment provider notifications"),
        (name = "Admin", description = "Statistics, audit log and maintenance"),
        (name = "Health", description = "Liveness and readiness probes")
    )
)]
pub struct ApiDoc;

#[cfg(test)]
pub(crate) mod test_helpers {
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
        Router,
    };
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::auth::extractor::test_support::create_test_jwt;

    /// Issue a request with an optional `(user_id, role, member_id)` identity.
    pub async fn send(
        app: &Router,
        method: &str,
        uri: &str,
        identity: Option<(&str, &str, Option<u64>)>,
        body: Option<Value>,
    ) -> (StatusCode, Vec<u8>) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some((user_id, role, member_id)) = identity {
            builder = builder.header(
                "Authorization",
                format!("Bearer {}", create_test_jwt(user_id, role, member_id)),
            );
        }
        let body = match body {
            Some(json) => {
                builder = builder.header("Content-Type", "application/json");
                Body::from(serde_json::to_vec(&json).unwrap())
            }
            None => Body::empty(),
        };

        let response = app
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, bytes.to_vec())
    }

    pub fn json(bytes: &[u8]) -> Value {
        serde_json::from_slice(bytes).unwrap()
    }

    pub const MEMBER_7: Option<(&str, &str, Option<u64>)> = Some(("user_7", "member", Some(7)));
    pub const MEMBER_8: Option<(&str, &str, Option<u64>)> = Some(("user_8", "member", Some(8)));
    pub const TREASURER: Option<(&str, &str, Option<u64>)> = Some(("treasurer_1", "treasurer", None));
    pub const AUDITOR: Option<(&str, &str, Option<u64>)> = Some(("auditor_1", "auditor", None));
    pub const ADMIN: Option<(&str, &str, Option<u64>)> = Some(("admin_1", "admin", None));
}
