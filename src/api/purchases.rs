// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Share purchase endpoints.
//!
//! A member (or treasury staff on their behalf) initiates a purchase and
//! receives a reference. Confirmation by treasury staff settles transfers
//! and cash; for provider payments any caller with access to the reference
//! may ask the server to re-check the provider.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    auth::Auth,
    error::ApiError,
    payments::MethodAvailability,
    purchase::{Confirmation, ConfirmedPurchase, InitiatePurchase, InitiatedPurchase, PurchaseError},
    state::AppState,
    storage::{OwnershipEnforcer, PendingPayment},
};

#[derive(Debug, Deserialize, ToSchema)]
pub struct ConfirmRequest {
    /// Reference returned when the purchase was initiated.
    pub reference: String,
    /// Bank deposit number, receipt id or other proof of payment.
    #[serde(default)]
    pub external_proof: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PaymentMethodsResponse {
    pub methods: Vec<MethodAvailability>,
}

/// Initiate a share purchase.
///
/// Creates a pending payment valid for 24 hours and returns the checkout
/// details from the payment provider.
#[utoipa::path(
    post,
    path = "/v1/purchase/initiate",
    tag = "Purchases",
    request_body = InitiatePurchase,
    security(("bearer_auth" = [])),
    responses(
        (status = 201, description = "Purchase initiated", body = InitiatedPurchase),
        (status = 400, description = "Invalid unit count or amount"),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Cannot buy for this member"),
        (status = 404, description = "Member or plan not found"),
        (status = 502, description = "Payment provider error"),
        (status = 503, description = "Payment method not configured")
    )
)]
pub async fn initiate_purchase(
    Auth(user): Auth,
    State(state): State<AppState>,
    Json(request): Json<InitiatePurchase>,
) -> Result<(StatusCode, Json<InitiatedPurchase>), ApiError> {
    let initiated = state.orchestrator.initiate_purchase(&user, request).await?;
    Ok((StatusCode::CREATED, Json(initiated)))
}

/// List payment methods and whether each is available.
#[utoipa::path(
    get,
    path = "/v1/purchase/methods",
    tag = "Purchases",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Payment methods", body = PaymentMethodsResponse),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn list_payment_methods(
    Auth(_user): Auth,
    State(state): State<AppState>,
) -> Json<PaymentMethodsResponse> {
    Json(PaymentMethodsResponse {
        methods: state.orchestrator.gateways().availability(),
    })
}

/// Get a pending purchase by reference.
#[utoipa::path(
    get,
    path = "/v1/purchase/{reference}",
    tag = "Purchases",
    params(("reference" = String, Path, description = "Purchase reference")),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Pending purchase", body = PendingPayment),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Not your purchase"),
        (status = 404, description = "Reference expired or unknown")
    )
)]
pub async fn get_pending_purchase(
    Auth(user): Auth,
    State(state): State<AppState>,
    Path(reference): Path<String>,
) -> Result<Json<PendingPayment>, ApiError> {
    let pending = state.orchestrator.pending_purchase(&reference, &user).await?;
    Ok(Json(pending))
}

/// Confirm a purchase.
///
/// Treasury staff confirm transfers and cash. Provider payments are checked
/// with the provider. Repeating a confirmation returns the same share.
#[utoipa::path(
    post,
    path = "/v1/purchase/confirm",
    tag = "Purchases",
    request_body = ConfirmRequest,
    security(("bearer_auth" = [])),
    responses(
        (status = 201, description = "Share created", body = ConfirmedPurchase),
        (status = 200, description = "Already confirmed", body = ConfirmedPurchase),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Not your purchase"),
        (status = 404, description = "Reference expired or unknown"),
        (status = 409, description = "Payment not completed or awaiting treasury"),
        (status = 502, description = "Payment provider error")
    )
)]
pub async fn confirm_purchase(
    Auth(user): Auth,
    State(state): State<AppState>,
    Json(request): Json<ConfirmRequest>,
) -> Result<(StatusCode, Json<ConfirmedPurchase>), ApiError> {
    let reference = request.reference;

    let confirmation = if user.role.is_treasury_staff() {
        Confirmation::Manual {
            confirmed_by: user.user_id.clone(),
            external_proof: request.external_proof,
        }
    } else {
        // Members may only poke their own purchases.
        match state.orchestrator.pending_purchase(&reference, &user).await {
            Ok(_) | Err(PurchaseError::ReferenceExpiredOrNotFound) => {}
            Err(e) => return Err(e.into()),
        }
        Confirmation::Provider {
            triggered_by: user.user_id.clone(),
        }
    };

    let confirmed = state
        .orchestrator
        .confirm_purchase(&reference, confirmation)
        .await?;
    confirmed.share.verify_read_access(&user)?;

    let status = if confirmed.already_confirmed {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((status, Json(confirmed)))
}

#[cfg(test)]
mod tests {
    use crate::api::router;
    use crate::api::test_helpers::{json, send, MEMBER_7, MEMBER_8, TREASURER};
    use crate::payments::GatewayStatus;
    use crate::state::test_support::{test_harness, test_state};
    use axum::http::StatusCode;
    use serde_json::{json, Value};

    fn transfer_body() -> Value {
        json!({
            "member_id": 7,
            "plan_id": 3,
            "unit_count": 100,
            "unit_price": "50.00",
            "payment_method": "transfer"
        })
    }

    fn confirm_body(reference: &str) -> Option<Value> {
        Some(json!({ "reference": reference }))
    }

    #[tokio::test]
    async fn initiate_and_confirm_transfer() {
        let (state, _temp) = test_state();
        let app = router(state);

        let (status, body) =
            send(&app, "POST", "/v1/purchase/initiate", MEMBER_7, Some(transfer_body())).await;
        assert_eq!(status, StatusCode::CREATED);
        let initiated = json(&body);
        assert_eq!(initiated["total"], "5000.00");
        let reference = initiated["reference"].as_str().unwrap().to_string();

        let (status, body) =
            send(&app, "GET", &format!("/v1/purchase/{reference}"), MEMBER_7, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json(&body)["purchase"]["unit_count"], 100);

        // The member cannot settle a transfer themselves.
        let (status, _) =
            send(&app, "POST", "/v1/purchase/confirm", MEMBER_7, confirm_body(&reference)).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, body) = send(
            &app,
            "POST",
            "/v1/purchase/confirm",
            TREASURER,
            Some(json!({ "reference": reference, "external_proof": "deposit 4471" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let confirmed = json(&body);
        assert_eq!(confirmed["share"]["total"], "5000.00");
        assert_eq!(confirmed["share"]["certificate_number"], "ACC-000001");
        assert_eq!(confirmed["payment"]["amount"], "5000.00");
        assert_eq!(confirmed["certificate_available"], true);

        let (status, body) =
            send(&app, "POST", "/v1/purchase/confirm", TREASURER, confirm_body(&reference)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json(&body)["already_confirmed"], true);

        // The pending record is gone once the share exists.
        let (status, _) =
            send(&app, "GET", &format!("/v1/purchase/{reference}"), MEMBER_7, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn unknown_reference_is_404() {
        let (state, _temp) = test_state();
        let app = router(state);
        let (status, _) = send(
            &app,
            "POST",
            "/v1/purchase/confirm",
            TREASURER,
            confirm_body("NONEXISTENT"),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn zero_units_is_400() {
        let (state, _temp) = test_state();
        let app = router(state);
        let mut body = transfer_body();
        body["unit_count"] = json!(0);

        let (status, _) = send(&app, "POST", "/v1/purchase/initiate", MEMBER_7, Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn other_member_cannot_see_or_confirm() {
        let (state, _temp) = test_state();
        let app = router(state);
        let (_, body) =
            send(&app, "POST", "/v1/purchase/initiate", MEMBER_7, Some(transfer_body())).await;
        let reference = json(&body)["reference"].as_str().unwrap().to_string();

        let (status, _) =
            send(&app, "GET", &format!("/v1/purchase/{reference}"), MEMBER_8, None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) =
            send(&app, "POST", "/v1/purchase/confirm", MEMBER_8, confirm_body(&reference)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn member_rechecks_card_payment() {
        let harness = test_harness();
        let app = router(harness.state.clone());
        let mut body = transfer_body();
        body["payment_method"] = json!("card");

        let (status, body) =
            send(&app, "POST", "/v1/purchase/initiate", MEMBER_7, Some(body)).await;
        assert_eq!(status, StatusCode::CREATED);
        let initiated = json(&body);
        assert_eq!(initiated["provider"]["provider"], "stripe");
        let reference = initiated["reference"].as_str().unwrap().to_string();

        let (status, _) =
            send(&app, "POST", "/v1/purchase/confirm", MEMBER_7, confirm_body(&reference)).await;
        assert_eq!(status, StatusCode::CONFLICT);

        harness.card.set_status(GatewayStatus::Succeeded);
        let (status, _) =
            send(&app, "POST", "/v1/purchase/confirm", MEMBER_7, confirm_body(&reference)).await;
        assert_eq!(status, StatusCode::CREATED);
    }

    #[tokio::test]
    async fn methods_report_configuration() {
        let (state, _temp) = test_state();
        let app = router(state);
        let (status, body) = send(&app, "GET", "/v1/purchase/methods", MEMBER_7, None).await;
        assert_eq!(status, StatusCode::OK);

        let methods = json(&body)["methods"].as_array().unwrap().clone();
        let paypal = methods.iter().find(|m| m["method"] == "paypal").unwrap();
        assert_eq!(paypal["configured"], false);
        let cash = methods.iter().find(|m| m["method"] == "cash").unwrap();
        assert_eq!(cash["configured"], true);
        assert_eq!(cash["manual_confirmation"], true);
    }
}
