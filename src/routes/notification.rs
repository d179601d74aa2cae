use rocket::serde::json::Json;
use rocket::State;
use rocket_okapi::openapi;
use mongodb::bson::DateTime;
use crate::db::{DbConn, MongoListingStore, MongoPaymentStore};
use crate::guards::AuthGuard;
use crate::services::reminders::collect_reminders;
use crate::utils::ApiResponse;

/// Badge counter. Never fails on a storage error, a failing source counts as zero.
#[openapi(tag = "Notifications")]
#[get("/notifications/count")]
pub async fn notification_count(
    db: &State<DbConn>,
    auth: AuthGuard,
) -> Json<ApiResponse<serde_json::Value>> {
    let reminders = collect_reminders(
        &MongoListingStore::new(db),
        &MongoPaymentStore::new(db),
        auth.user_id,
        DateTime::now(),
    )
    .await;

    Json(ApiResponse::success(serde_json::json!({
        "count": reminders.len()
    })))
}

#[openapi(tag = "Notifications")]
#[get("/notifications")]
pub async fn notifications(
    db: &State<DbConn>,
    auth: AuthGuard,
) -> Json<ApiResponse<serde_json::Value>> {
    let reminders = collect_reminders(
        &MongoListingStore::new(db),
        &MongoPaymentStore::new(db),
        auth.user_id,
        DateTime::now(),
    )
    .await;

    Json(ApiResponse::success(serde_json::json!({
        "count": reminders.len(),
        "notifications": reminders,
    })))
}
