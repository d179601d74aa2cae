pub mod admin;
pub mod auth;
pub mod listing;
pub mod notification;
pub mod payment;

use std::sync::Arc;

use mongodb::bson::oid::ObjectId;
use validator::ValidationErrors;

use crate::db::{DbConn, MongoListingStore, MongoPaymentStore};
use crate::models::ListingCategory;
use crate::services::checkout::CheckoutSettings;
use crate::services::{CheckoutService, ListingService, ReviewService, StripeService};
use crate::utils::{first_field_error, ApiError};

pub type Listings = ListingService<MongoListingStore, MongoPaymentStore>;
pub type Checkout = CheckoutService<MongoListingStore, MongoPaymentStore, StripeService>;

pub fn listing_service(db: &DbConn) -> Listings {
    ListingService::new(
        Arc::new(MongoListingStore::new(db)),
        Arc::new(MongoPaymentStore::new(db)),
    )
}

pub fn review_service(db: &DbConn) -> ReviewService<MongoListingStore> {
    ReviewService::new(Arc::new(MongoListingStore::new(db)))
}

pub fn checkout_service(db: &DbConn) -> Checkout {
    CheckoutService::new(
        Arc::new(MongoListingStore::new(db)),
        Arc::new(MongoPaymentStore::new(db)),
        Arc::new(StripeService::from_config()),
        CheckoutSettings {
            currency: crate::config::Config::currency(),
            frontend_url: crate::config::Config::frontend_url(),
        },
    )
}

/// Resolves the `{category}` path segment; unknown segments are plain 404s.
pub fn category_from_path(segment: &str) -> Result<ListingCategory, ApiError> {
    ListingCategory::from_path(segment).ok_or_else(|| ApiError::not_found("Resource not found"))
}

pub fn parse_object_id(id: &str, what: &str) -> Result<ObjectId, ApiError> {
    ObjectId::parse_str(id).map_err(|_| ApiError::bad_request(format!("Invalid {} ID", what)))
}

pub fn validation_error(errors: &ValidationErrors) -> ApiError {
    let (field, message) = first_field_error(errors);
    ApiError::validation(field, message)
}
