use crate::db::DbConn;
use crate::guards::AdminGuard;
use crate::models::ListingView;
use crate::services::review::ReviewDto;
use crate::utils::{ApiError, ApiResponse};
use mongodb::bson::DateTime;
use rocket::State;
use rocket::serde::json::Json;
use rocket_okapi::openapi;
use super::{category_from_path, parse_object_id, review_service};

#[openapi(tag = "Admin")]
#[get("/admin/<category>/pending")]
pub async fn pending_submissions(
    db: &State<DbConn>,
    _admin: AdminGuard,
    category: String,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let category = category_from_path(&category)?;
    let now = DateTime::now();

    let queue: Vec<ListingView> = review_service(db)
        .pending_queue(category)
        .await?
        .into_iter()
        .map(|listing| ListingView::new(listing, now))
        .collect();
    let overdue = queue.iter().filter(|view| view.review_overdue).count();

    Ok(Json(ApiResponse::success(serde_json::json!({
        "listings": queue,
        "total": queue.len(),
        "overdue": overdue,
    }))))
}

#[openapi(tag = "Admin")]
#[put("/admin/<category>/<id>/review", data = "<dto>")]
pub async fn review_submission(
    db: &State<DbConn>,
    admin: AdminGuard,
    category: String,
    id: String,
    dto: Json<ReviewDto>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let category = category_from_path(&category)?;
    let id = parse_object_id(&id, "listing")?;
    let now = DateTime::now();

    let listing = review_service(db)
        .review(category, id, dto.into_inner(), now)
        .await?;

    info!(
        "admin: {} reviewed {} listing {}",
        admin.auth.email,
        category.as_str(),
        id
    );

    Ok(Json(ApiResponse::success_with_message(
        format!("Listing {}", listing.status.as_str()),
        serde_json::json!(ListingView::new(listing, now)),
    )))
}
