use rocket::serde::json::Json;
use rocket::State;
use rocket_okapi::openapi;
use mongodb::bson::DateTime;
use crate::db::DbConn;
use crate::guards::AuthGuard;
use crate::models::{
    iso, CreateListingDto, ListingView, PlanDuration, TelemetryCounter, UpdateListingDto,
};
use crate::utils::{ApiResponse, ApiError};
use super::{category_from_path, listing_service, parse_object_id};

/// --------------------
/// Create submission
/// --------------------
#[openapi(tag = "Listings")]
#[post("/<category>", data = "<dto>")]
pub async fn create_listing(
    db: &State<DbConn>,
    auth: AuthGuard,
    category: String,
    dto: Json<CreateListingDto>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let category = category_from_path(&category)?;
    let now = DateTime::now();

    let listing = listing_service(db)
        .create(auth.user_id, category, dto.into_inner(), now)
        .await?;

    let message = if listing.is_premium {
        "Listing submitted for review with your active premium plan applied"
    } else {
        "Listing submitted for review"
    };

    Ok(Json(ApiResponse::success_with_message(
        message,
        serde_json::json!(ListingView::new(listing, now)),
    )))
}

/// --------------------
/// Caller's submissions
/// --------------------
#[openapi(tag = "Listings")]
#[get("/<category>/my-submissions")]
pub async fn my_submissions(
    db: &State<DbConn>,
    auth: AuthGuard,
    category: String,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let category = category_from_path(&category)?;
    let now = DateTime::now();

    let listings: Vec<ListingView> = listing_service(db)
        .my_submissions(auth.user_id, category)
        .await?
        .into_iter()
        .map(|listing| ListingView::new(listing, now))
        .collect();

    Ok(Json(ApiResponse::success(serde_json::json!(listings))))
}

/// --------------------
/// Premium status
/// --------------------
#[openapi(tag = "Listings")]
#[get("/<category>/my-premium-status")]
pub async fn my_premium_status(
    db: &State<DbConn>,
    auth: AuthGuard,
    category: String,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let category = category_from_path(&category)?;

    let status = listing_service(db)
        .premium()
        .premium_status(auth.user_id, category, DateTime::now())
        .await?;

    Ok(Json(ApiResponse::success(serde_json::json!({
        "has_active_premium_subscription": status.has_active_premium_subscription,
        "active_plan_type": status.active_plan_type.map(PlanDuration::as_str),
        "premium_expiry": status.premium_expiry.map(iso),
        "order_id": status.order_id,
    }))))
}

/// --------------------
/// Single listing
/// --------------------
#[openapi(tag = "Listings")]
#[get("/<category>/<id>")]
pub async fn get_listing(
    db: &State<DbConn>,
    auth: Option<AuthGuard>,
    category: String,
    id: String,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let category = category_from_path(&category)?;
    let id = parse_object_id(&id, "listing")?;
    let viewer = auth.map(|auth| auth.user_id);

    let listing = listing_service(db)
        .get(category, id, viewer.as_ref())
        .await?;

    Ok(Json(ApiResponse::success(serde_json::json!(
        ListingView::new(listing, DateTime::now())
    ))))
}

/// --------------------
/// Update (owner only)
/// --------------------
#[openapi(tag = "Listings")]
#[put("/<category>/<id>", data = "<dto>")]
pub async fn update_listing(
    db: &State<DbConn>,
    auth: AuthGuard,
    category: String,
    id: String,
    dto: Json<UpdateListingDto>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let category = category_from_path(&category)?;
    let id = parse_object_id(&id, "listing")?;
    let now = DateTime::now();

    let listing = listing_service(db)
        .update(auth.user_id, category, id, dto.into_inner(), now)
        .await?;

    Ok(Json(ApiResponse::success_with_message(
        "Listing updated",
        serde_json::json!(ListingView::new(listing, now)),
    )))
}

/// --------------------
/// Delete (owner only)
/// --------------------
#[openapi(tag = "Listings")]
#[delete("/<category>/<id>")]
pub async fn delete_listing(
    db: &State<DbConn>,
    auth: AuthGuard,
    category: String,
    id: String,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let category = category_from_path(&category)?;
    let id = parse_object_id(&id, "listing")?;

    listing_service(db).delete(auth.user_id, category, id).await?;

    Ok(Json(ApiResponse::success(serde_json::json!({
        "message": "Listing deleted successfully"
    }))))
}

async fn record(
    db: &DbConn,
    category: &str,
    id: &str,
    counter: TelemetryCounter,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let category = category_from_path(category)?;
    let id = parse_object_id(id, "listing")?;

    let counted = listing_service(db)
        .record_interaction(category, id, counter, DateTime::now())
        .await?;

    Ok(Json(ApiResponse::success(serde_json::json!({
        "counted": counted
    }))))
}

/// --------------------
/// Telemetry
/// --------------------
#[openapi(tag = "Listings")]
#[post("/<category>/<id>/view")]
pub async fn record_view(
    db: &State<DbConn>,
    category: String,
    id: String,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    record(db, &category, &id, TelemetryCounter::Views).await
}

#[openapi(tag = "Listings")]
#[post("/<category>/<id>/inquiry")]
pub async fn record_inquiry(
    db: &State<DbConn>,
    category: String,
    id: String,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    record(db, &category, &id, TelemetryCounter::Inquiries).await
}
