use rocket::serde::json::Json;
use rocket::State;
use rocket_okapi::openapi;
use mongodb::bson::{doc, DateTime};
use validator::Validate;
use crate::db::DbConn;
use crate::guards::AuthGuard;
use crate::models::{LoginDto, RegisterDto, User, UserResponse, UserRole};
use crate::services::JwtService;
use crate::utils::{validate_email, ApiResponse, ApiError};
use super::validation_error;

const LOGIN_LIMIT: i32 = 5;
const LOGIN_WINDOW_MS: i64 = 15 * 60 * 1000;

/// --------------------
/// Rate limiter helper
/// --------------------
async fn rate_limit(
    db: &DbConn,
    key: &str,
    limit: i32,
    window_ms: i64,
) -> Result<(), ApiError> {
    let now = chrono::Utc::now().timestamp_millis();
    let window_expires = DateTime::from_millis(now + window_ms);

    let collection = db.collection::<mongodb::bson::Document>("rate_limits");

    let existing = collection
        .find_one(doc! { "key": key }, None)
        .await
        .map_err(|_| ApiError::internal_error("Rate limiter lookup failed"))?;

    match existing {
        // First attempt
        None => {
            collection
                .insert_one(
                    doc! {
                        "key": key,
                        "count": 1,
                        "expires_at": window_expires
                    },
                    None,
                )
                .await
                .map_err(|_| ApiError::internal_error("Rate limiter insert failed"))?;
            Ok(())
        }

        Some(d) => {
            let count = d.get_i32("count").unwrap_or(0);
            let expires_at = d.get_datetime("expires_at").ok();

            // Window expired → reset
            if expires_at.map(|e| *e < DateTime::now()).unwrap_or(true) {
                collection
                    .update_one(
                        doc! { "key": key },
                        doc! {
                            "$set": {
                                "count": 1,
                                "expires_at": window_expires
                            }
                        },
                        None,
                    )
                    .await
                    .map_err(|_| ApiError::internal_error("Rate limiter reset failed"))?;
                return Ok(());
            }

            if count >= limit {
                return Err(ApiError::too_many_requests(
                    "Too many login attempts. Please try later.",
                ));
            }

            collection
                .update_one(
                    doc! { "key": key },
                    doc! { "$inc": { "count": 1 } },
                    None,
                )
                .await
                .map_err(|_| ApiError::internal_error("Rate limiter increment failed"))?;

            Ok(())
        }
    }
}

fn session_body(user: User) -> Result<serde_json::Value, ApiError> {
    let user_id = user.id.ok_or_else(|| ApiError::internal_error("User has no id"))?;
    let token = JwtService::generate_access_token(&user_id, &user.email, user.role)
        .map_err(|e| {
            error!("auth: failed to sign token: {}", e);
            ApiError::internal_error("Failed to create session")
        })?;

    Ok(serde_json::json!({
        "token": token,
        "expires_in": crate::config::Config::jwt_expiry(),
        "user": UserResponse::from(user),
    }))
}

/// --------------------
/// Register
/// --------------------
#[openapi(tag = "Auth")]
#[post("/auth/register", data = "<dto>")]
pub async fn register(
    db: &State<DbConn>,
    dto: Json<RegisterDto>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let dto = dto.into_inner();
    dto.validate().map_err(|e| validation_error(&e))?;

    let email = dto.email.trim().to_lowercase();
    let users = db.collection::<User>("users");

    let existing = users
        .find_one(doc! { "email": &email }, None)
        .await
        .map_err(|e| ApiError::internal_error(format!("Database error: {}", e)))?;
    if existing.is_some() {
        return Err(ApiError::conflict("An account with this email already exists"));
    }

    let password_hash = bcrypt::hash(&dto.password, bcrypt::DEFAULT_COST)
        .map_err(|_| ApiError::internal_error("Failed to hash password"))?;

    let now = DateTime::now();
    let mut user = User {
        id: None,
        name: dto.name.trim().to_string(),
        email,
        password_hash,
        phone: dto.phone,
        role: UserRole::User,
        is_active: true,
        last_login_at: Some(now),
        created_at: now,
        updated_at: now,
    };

    let result = users
        .insert_one(&user, None)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to create user: {}", e)))?;
    user.id = result.inserted_id.as_object_id();

    info!("auth: registered {}", user.email);

    Ok(Json(ApiResponse::success_with_message(
        "Registration successful",
        session_body(user)?,
    )))
}

/// --------------------
/// Login
/// --------------------
#[openapi(tag = "Auth")]
#[post("/auth/login", data = "<dto>")]
pub async fn login(
    db: &State<DbConn>,
    dto: Json<LoginDto>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let email = dto.email.trim().to_lowercase();
    if !validate_email(&email) {
        return Err(ApiError::validation("email", "Invalid email"));
    }
    if dto.password.is_empty() {
        return Err(ApiError::validation("password", "Password is required"));
    }

    rate_limit(db, &format!("login:{}", email), LOGIN_LIMIT, LOGIN_WINDOW_MS).await?;

    let users = db.collection::<User>("users");
    let user = users
        .find_one(doc! { "email": &email }, None)
        .await
        .map_err(|e| ApiError::internal_error(format!("Database error: {}", e)))?
        .ok_or_else(|| ApiError::unauthorized("Invalid email or password"))?;

    let valid = bcrypt::verify(&dto.password, &user.password_hash).unwrap_or(false);
    if !valid {
        return Err(ApiError::unauthorized("Invalid email or password"));
    }
    if !user.is_active {
        return Err(ApiError::forbidden("Account is disabled"));
    }

    users
        .update_one(
            doc! { "_id": user.id },
            doc! { "$set": { "last_login_at": DateTime::now() } },
            None,
        )
        .await
        .ok();

    Ok(Json(ApiResponse::success_with_message(
        "Login successful",
        session_body(user)?,
    )))
}

/// --------------------
/// Current user
/// --------------------
#[openapi(tag = "Auth")]
#[get("/auth/me")]
pub async fn me(
    db: &State<DbConn>,
    auth: AuthGuard,
) -> Result<Json<ApiResponse<UserResponse>>, ApiError> {
    let user = db
        .collection::<User>("users")
        .find_one(doc! { "_id": auth.user_id }, None)
        .await
        .map_err(|e| ApiError::internal_error(format!("Database error: {}", e)))?
        .ok_or_else(|| ApiError::unauthorized("Session is no longer valid"))?;

    Ok(Json(ApiResponse::success(UserResponse::from(user))))
}
