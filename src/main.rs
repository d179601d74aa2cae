#[macro_use]
extern crate rocket;

mod config;
mod db;
mod guards;
mod models;
mod routes;
mod services;
mod utils;

use dotenvy::dotenv;
use rocket::fairing::{AdHoc, Fairing, Info, Kind};
use rocket::http::Header;
use rocket::{Build, Request, Response, Rocket};
use rocket_okapi::openapi_get_routes;
use rocket_okapi::swagger_ui::{SwaggerUIConfig, make_swagger_ui};

/* ----------------------------- CORS ----------------------------- */

pub struct CORS;

#[rocket::async_trait]
impl Fairing for CORS {
    fn info(&self) -> Info {
        Info {
            name: "CORS",
            kind: Kind::Response,
        }
    }

    async fn on_response<'r>(&self, request: &'r Request<'_>, response: &mut Response<'r>) {
        if let Some(origin) = request.headers().get_one("Origin") {
            response.set_header(Header::new("Access-Control-Allow-Origin", origin));
        }

        response.set_header(Header::new(
            "Access-Control-Allow-Methods",
            "GET, POST, PUT, DELETE, OPTIONS",
        ));

        response.set_header(Header::new(
            "Access-Control-Allow-Headers",
            "Content-Type, Authorization, Stripe-Signature",
        ));

        response.set_header(Header::new("Access-Control-Allow-Credentials", "true"));
    }
}

/* ----------------------------- OPTIONS ----------------------------- */

#[options("/<_..>")]
fn options_handler() {}

/* ----------------------------- ERRORS ----------------------------- */

fn error_body(message: &str) -> rocket::serde::json::Value {
    rocket::serde::json::json!({
        "success": false,
        "error": message
    })
}

#[catch(400)]
fn bad_request() -> rocket::serde::json::Value {
    error_body("Bad request")
}

#[catch(401)]
fn unauthorized() -> rocket::serde::json::Value {
    error_body("Invalid or expired token")
}

#[catch(403)]
fn forbidden() -> rocket::serde::json::Value {
    error_body("You do not have access to this resource")
}

#[catch(404)]
fn not_found() -> rocket::serde::json::Value {
    error_body("Resource not found (check /api/v1 prefix)")
}

#[catch(422)]
fn unprocessable() -> rocket::serde::json::Value {
    error_body("Malformed request body")
}

#[catch(500)]
fn internal_error() -> rocket::serde::json::Value {
    error_body("Internal server error")
}

/* ----------------------------- SWAGGER ----------------------------- */

fn swagger_config() -> SwaggerUIConfig {
    SwaggerUIConfig {
        url: "/api/v1/openapi.json".to_string(),
        ..Default::default()
    }
}

/* ----------------------------- LAUNCH ----------------------------- */

#[launch]
fn rocket() -> Rocket<Build> {
    dotenv().ok();
    env_logger::init();

    if config::Config::jwt_secret().is_none() {
        error!("jwt_secret is not configured, refusing to launch");
    }
    if !config::Config::is_stripe_enabled() {
        warn!("Stripe secret key missing, online checkout is disabled");
    }
    if config::Config::allow_manual_completion() {
        warn!("Manual payment completion is enabled");
    }

    info!("🚀 SLExplora API running");
    info!("📚 Swagger UI → http://localhost:8000/api/docs");

    rocket::build()
        .attach(AdHoc::try_on_ignite("JWT secret", |rocket| async move {
            if config::Config::jwt_secret().is_some() {
                Ok(rocket)
            } else {
                Err(rocket)
            }
        }))
        .attach(db::init())
        .attach(CORS)
        .mount("/", routes![options_handler])
        .mount(
            "/api/v1",
            openapi_get_routes![
                // Auth
                routes::auth::register,
                routes::auth::login,
                routes::auth::me,
                // Listings
                routes::listing::create_listing,
                routes::listing::my_submissions,
                routes::listing::my_premium_status,
                routes::listing::get_listing,
                routes::listing::update_listing,
                routes::listing::delete_listing,
                routes::listing::record_view,
                routes::listing::record_inquiry,
                // Admin review
                routes::admin::pending_submissions,
                routes::admin::review_submission,
                // Payments
                routes::payment::get_catalogue,
                routes::payment::create_checkout,
                routes::payment::payment_status,
                routes::payment::complete_payment_manually,
                routes::payment::user_payments,
                routes::payment::mark_submitted,
                // Notifications
                routes::notification::notification_count,
                routes::notification::notifications,
            ],
        )
        .mount("/api/v1", routes![routes::payment::stripe_webhook])
        .mount("/api/docs", make_swagger_ui(&swagger_config()))
        .register(
            "/",
            catchers![
                bad_request,
                unauthorized,
                forbidden,
                not_found,
                unprocessable,
                internal_error
            ],
        )
}
