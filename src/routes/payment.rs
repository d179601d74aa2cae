use rocket::data::{Data, ToByteUnit};
use rocket::http::Status;
use rocket::request::{self, FromRequest, Outcome, Request};
use rocket::serde::json::Json;
use rocket::State;
use rocket_okapi::openapi;
use mongodb::bson::DateTime;
use crate::config::Config;
use crate::db::DbConn;
use crate::guards::AuthGuard;
use crate::models::{CreateCheckoutDto, PaymentView};
use crate::services::checkout::{catalogue, WebhookOutcome};
use crate::services::stripe::{self, GatewayError};
use crate::utils::{ApiResponse, ApiError};
use super::checkout_service;

/// Raw `Stripe-Signature` header of a webhook delivery.
pub struct StripeSignature(pub String);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for StripeSignature {
    type Error = ();

    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        match req.headers().get_one("Stripe-Signature") {
            Some(value) => Outcome::Success(StripeSignature(value.to_string())),
            None => Outcome::Error((Status::BadRequest, ())),
        }
    }
}

/// --------------------
/// Catalogue
/// --------------------
#[openapi(tag = "Payments")]
#[get("/payments/catalogue")]
pub async fn get_catalogue() -> Json<ApiResponse<serde_json::Value>> {
    Json(ApiResponse::success(serde_json::json!(catalogue(&Config::currency()))))
}

/// --------------------
/// Stripe checkout
/// --------------------
#[openapi(tag = "Payments")]
#[post("/payments/stripe/create-checkout", data = "<dto>")]
pub async fn create_checkout(
    db: &State<DbConn>,
    auth: AuthGuard,
    dto: Json<CreateCheckoutDto>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let started = checkout_service(db)
        .start(auth.user_id, Some(auth.email.clone()), &dto.service_type, DateTime::now())
        .await?;

    Ok(Json(ApiResponse::success(serde_json::json!({
        "url": started.checkout_url,
        "order_id": started.order_id,
        "session_id": started.session_id,
        "amount": started.amount,
        "currency": started.currency,
    }))))
}

/// Gateway callback. Excluded from the OpenAPI document, it is not a client endpoint.
#[post("/payments/stripe/webhook", data = "<body>")]
pub async fn stripe_webhook(
    db: &State<DbConn>,
    signature: StripeSignature,
    body: Data<'_>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let secret = Config::stripe_webhook_secret()
        .ok_or_else(|| ApiError::service_unavailable("Stripe webhooks are not configured"))?;

    let payload = body
        .open(512.kibibytes())
        .into_bytes()
        .await
        .map_err(|_| ApiError::bad_request("Unreadable webhook body"))?;
    if !payload.is_complete() {
        return Err(ApiError::bad_request("Webhook body too large"));
    }

    let event = stripe::verify_webhook(
        &payload,
        &signature.0,
        &secret,
        chrono::Utc::now().timestamp(),
    )
    .map_err(|e| match e {
        GatewayError::Payload(_) => ApiError::bad_request("Malformed webhook payload"),
        other => {
            warn!("stripe: rejected webhook: {}", other);
            ApiError::bad_request("Invalid webhook signature")
        }
    })?;

    let outcome = checkout_service(db)
        .handle_event(&event, DateTime::now())
        .await?;

    if outcome == WebhookOutcome::Ignored {
        debug!("stripe: event {:?} ({}) acknowledged without effect", event.id, event.type_);
    }

    Ok(Json(serde_json::json!({ "received": true })))
}

/// --------------------
/// Status poll
/// --------------------
#[openapi(tag = "Payments")]
#[get("/payments/stripe/status/<order_id>")]
pub async fn payment_status(
    db: &State<DbConn>,
    auth: AuthGuard,
    order_id: String,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let payment = checkout_service(db)
        .refresh_status(auth.user_id, &order_id, DateTime::now())
        .await?;

    Ok(Json(ApiResponse::success(serde_json::json!(PaymentView::from(payment)))))
}

/// --------------------
/// Manual completion (development)
/// --------------------
#[openapi(tag = "Payments")]
#[post("/payments/test/complete/<order_id>")]
pub async fn complete_payment_manually(
    db: &State<DbConn>,
    auth: AuthGuard,
    order_id: String,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    if !Config::allow_manual_completion() {
        return Err(ApiError::forbidden("Manual payment completion is disabled"));
    }

    let payment = checkout_service(db)
        .complete_manually(auth.user_id, &order_id, DateTime::now())
        .await?;

    warn!("payments: order {} completed manually by {}", order_id, auth.email);

    Ok(Json(ApiResponse::success_with_message(
        "Payment completed",
        serde_json::json!(PaymentView::from(payment)),
    )))
}

/// --------------------
/// History
/// --------------------
#[openapi(tag = "Payments")]
#[get("/payments/user")]
pub async fn user_payments(
    db: &State<DbConn>,
    auth: AuthGuard,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let payments: Vec<PaymentView> = checkout_service(db)
        .history(auth.user_id)
        .await?
        .into_iter()
        .map(PaymentView::from)
        .collect();

    Ok(Json(ApiResponse::success(serde_json::json!(payments))))
}

#[openapi(tag = "Payments")]
#[post("/payments/<order_id>/submitted")]
pub async fn mark_submitted(
    db: &State<DbConn>,
    auth: AuthGuard,
    order_id: String,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let payment = checkout_service(db)
        .mark_submitted(auth.user_id, &order_id)
        .await?;

    Ok(Json(ApiResponse::success(serde_json::json!(PaymentView::from(payment)))))
}
