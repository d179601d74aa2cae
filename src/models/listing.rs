use mongodb::bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};
use rocket_okapi::okapi::schemars;
use rocket_okapi::okapi::schemars::JsonSchema;
use validator::{Validate, ValidationErrors};

use super::iso;
use crate::utils::phone_validator;

/// Free listings may carry a single image, premium ones up to three.
pub const FREE_IMAGE_LIMIT: usize = 1;
pub const PREMIUM_IMAGE_LIMIT: usize = 3;

pub fn image_allowance(premium: bool) -> usize {
    if premium {
        PREMIUM_IMAGE_LIMIT
    } else {
        FREE_IMAGE_LIMIT
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ListingCategory {
    Vehicle,
    Guide,
    Business,
}

impl ListingCategory {
    pub const ALL: [ListingCategory; 3] = [
        ListingCategory::Vehicle,
        ListingCategory::Guide,
        ListingCategory::Business,
    ];

    /// Resolves the plural path segment used by the REST routes.
    pub fn from_path(segment: &str) -> Option<Self> {
        match segment {
            "vehicles" => Some(ListingCategory::Vehicle),
            "guides" | "tour-guides" => Some(ListingCategory::Guide),
            "businesses" | "business-listings" => Some(ListingCategory::Business),
            _ => None,
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "vehicle" => Some(ListingCategory::Vehicle),
            "guide" => Some(ListingCategory::Guide),
            "business" => Some(ListingCategory::Business),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ListingCategory::Vehicle => "vehicle",
            ListingCategory::Guide => "guide",
            ListingCategory::Business => "business",
        }
    }

    pub fn collection(self) -> &'static str {
        match self {
            ListingCategory::Vehicle => "vehicles",
            ListingCategory::Guide => "tour_guides",
            ListingCategory::Business => "business_listings",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionStatus {
    Pending,
    Approved,
    Rejected,
}

impl SubmissionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SubmissionStatus::Pending => "pending",
            SubmissionStatus::Approved => "approved",
            SubmissionStatus::Rejected => "rejected",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, JsonSchema, Validate)]
pub struct VehicleDetails {
    #[validate(length(min = 2, max = 40, message = "Vehicle type is required"))]
    pub vehicle_type: String, // "car", "van", "tuk-tuk", ...
    pub make: Option<String>,
    pub model: Option<String>,
    #[validate(range(min = 1, max = 60, message = "Seats must be between 1 and 60"))]
    pub seats: i32,
    pub price_per_day: f64,
    #[validate(length(min = 2, message = "Location is required"))]
    pub location: String,
    #[validate(custom = "phone_validator")]
    pub contact_phone: String,
    #[serde(default)]
    pub with_driver: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, JsonSchema, Validate)]
pub struct GuideDetails {
    #[validate(length(min = 2, max = 80, message = "Full name is required"))]
    pub full_name: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "At least one language is required"))]
    pub languages: Vec<String>,
    #[serde(default)]
    pub specializations: Vec<String>,
    #[validate(range(min = 0, max = 60, message = "Experience must be between 0 and 60 years"))]
    pub experience_years: i32,
    pub daily_rate: f64,
    pub license_number: Option<String>,
    #[validate(custom = "phone_validator")]
    pub contact_phone: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, JsonSchema, Validate)]
pub struct BusinessDetails {
    #[validate(length(min = 2, max = 60, message = "Business type is required"))]
    pub business_type: String, // "hotel", "restaurant", "surf school", ...
    #[validate(length(min = 5, message = "Address is required"))]
    pub address: String,
    #[validate(email(message = "Invalid contact email"))]
    pub contact_email: String,
    #[validate(custom = "phone_validator")]
    pub contact_phone: String,
    #[validate(url(message = "Invalid website URL"))]
    pub website: Option<String>,
}

/// Category specific part of a listing; the tag doubles as the category discriminant.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, JsonSchema)]
#[serde(tag = "category", rename_all = "lowercase")]
pub enum ListingDetails {
    Vehicle(VehicleDetails),
    Guide(GuideDetails),
    Business(BusinessDetails),
}

impl ListingDetails {
    pub fn category(&self) -> ListingCategory {
        match self {
            ListingDetails::Vehicle(_) => ListingCategory::Vehicle,
            ListingDetails::Guide(_) => ListingCategory::Guide,
            ListingDetails::Business(_) => ListingCategory::Business,
        }
    }

    pub fn validate_fields(&self) -> Result<(), ValidationErrors> {
        match self {
            ListingDetails::Vehicle(details) => {
                details.validate()?;
                if details.price_per_day < 0.0 {
                    return Err(single_error("price_per_day", "Price cannot be negative"));
                }
                Ok(())
            }
            ListingDetails::Guide(details) => {
                details.validate()?;
                if details.daily_rate < 0.0 {
                    return Err(single_error("daily_rate", "Rate cannot be negative"));
                }
                Ok(())
            }
            ListingDetails::Business(details) => details.validate(),
        }
    }
}

fn single_error(field: &'static str, message: &'static str) -> ValidationErrors {
    let mut errors = ValidationErrors::new();
    let mut error = validator::ValidationError::new("invalid");
    error.message = Some(message.into());
    errors.add(field, error);
    errors
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Listing {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub owner_id: ObjectId,
    pub title: String,
    pub description: Option<String>,
    #[serde(default)]
    pub images: Vec<String>,
    pub details: ListingDetails,

    // Review
    pub status: SubmissionStatus,
    pub is_verified: bool,
    pub rejection_reason: Option<String>,
    pub submitted_at: DateTime,
    pub reviewed_at: Option<DateTime>,

    // Premium (written only by premium activation)
    pub is_premium: bool,
    pub premium_expiry: Option<DateTime>,
    pub premium_order_id: Option<String>,
    pub analytics_enabled: bool,
    pub featured_status: bool,
    pub view_count: i64,
    pub inquiry_count: i64,

    pub created_at: DateTime,
    pub updated_at: DateTime,
}

impl Listing {
    pub fn new_submission(owner_id: ObjectId, dto: CreateListingDto, now: DateTime) -> Self {
        Listing {
            id: None,
            owner_id,
            title: dto.title.trim().to_string(),
            description: dto.description,
            images: dto.images,
            details: dto.details,
            status: SubmissionStatus::Pending,
            is_verified: false,
            rejection_reason: None,
            submitted_at: now,
            reviewed_at: None,
            is_premium: false,
            premium_expiry: None,
            premium_order_id: None,
            analytics_enabled: false,
            featured_status: false,
            view_count: 0,
            inquiry_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn category(&self) -> ListingCategory {
        self.details.category()
    }

    pub fn id_hex(&self) -> Option<String> {
        self.id.map(|id| id.to_hex())
    }

    pub fn is_owned_by(&self, user_id: &ObjectId) -> bool {
        self.owner_id == *user_id
    }

    pub fn is_premium_effective(&self, now: DateTime) -> bool {
        crate::services::reminders::is_premium_effective(self.is_premium, self.premium_expiry, now)
    }
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct CreateListingDto {
    #[validate(length(min = 3, max = 120, message = "Title must be between 3 and 120 characters"))]
    pub title: String,
    #[validate(length(max = 5000, message = "Description is too long"))]
    pub description: Option<String>,
    #[serde(default)]
    pub images: Vec<String>,
    pub details: ListingDetails,
}

#[derive(Debug, Default, Deserialize, JsonSchema, Validate)]
pub struct UpdateListingDto {
    #[validate(length(min = 3, max = 120, message = "Title must be between 3 and 120 characters"))]
    pub title: Option<String>,
    #[validate(length(max = 5000, message = "Description is too long"))]
    pub description: Option<String>,
    pub images: Option<Vec<String>>,
    pub details: Option<ListingDetails>,
}

/// Owner editable fields; status and premium fields are never part of an update.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ListingContentUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub images: Option<Vec<String>>,
    pub details: Option<ListingDetails>,
    pub resubmit: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PremiumGrant {
    pub expiry: DateTime,
    pub order_id: String,
    pub granted_at: DateTime,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReviewOutcome {
    pub status: SubmissionStatus,
    pub is_verified: bool,
    pub rejection_reason: Option<String>,
    pub reviewed_at: DateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TelemetryCounter {
    Views,
    Inquiries,
}

impl TelemetryCounter {
    pub fn field(self) -> &'static str {
        match self {
            TelemetryCounter::Views => "view_count",
            TelemetryCounter::Inquiries => "inquiry_count",
        }
    }
}

/// Listing as returned to clients, with the time dependent flags resolved.
#[derive(Debug, Serialize)]
pub struct ListingView {
    pub id: Option<String>,
    pub category: ListingCategory,
    pub owner_id: String,
    pub title: String,
    pub description: Option<String>,
    pub images: Vec<String>,
    pub details: ListingDetails,
    pub status: SubmissionStatus,
    pub is_verified: bool,
    pub rejection_reason: Option<String>,
    pub submitted_at: String,
    pub reviewed_at: Option<String>,
    pub is_premium: bool,
    pub premium_expiry: Option<String>,
    pub analytics_enabled: bool,
    pub featured_status: bool,
    pub view_count: i64,
    pub inquiry_count: i64,
    pub created_at: String,
    pub updated_at: String,

    pub is_premium_effective: bool,
    pub days_until_expiry: Option<i64>,
    pub needs_renewal_soon: bool,
    pub review_overdue: bool,
}

impl ListingView {
    pub fn new(listing: Listing, now: DateTime) -> Self {
        use crate::services::{reminders, review};

        let is_premium_effective = listing.is_premium_effective(now);
        let days_until_expiry = listing
            .premium_expiry
            .filter(|_| is_premium_effective)
            .map(|expiry| reminders::days_between(now, expiry));
        let needs_renewal_soon = listing.is_premium
            && listing
                .premium_expiry
                .map(|expiry| reminders::needs_renewal_soon(expiry, now))
                .unwrap_or(false);
        let review_overdue = review::review_overdue(&listing, now);

        ListingView {
            id: listing.id_hex(),
            category: listing.category(),
            owner_id: listing.owner_id.to_hex(),
            title: listing.title,
            description: listing.description,
            images: listing.images,
            details: listing.details,
            status: listing.status,
            is_verified: listing.is_verified,
            rejection_reason: listing.rejection_reason,
            submitted_at: iso(listing.submitted_at),
            reviewed_at: listing.reviewed_at.map(iso),
            is_premium: listing.is_premium,
            premium_expiry: listing.premium_expiry.map(iso),
            analytics_enabled: listing.analytics_enabled && is_premium_effective,
            featured_status: listing.featured_status && is_premium_effective,
            view_count: listing.view_count,
            inquiry_count: listing.inquiry_count,
            created_at: iso(listing.created_at),
            updated_at: iso(listing.updated_at),
            is_premium_effective,
            days_until_expiry,
            needs_renewal_soon,
            review_overdue,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::{at, premium_listing};

    #[test]
    fn view_hides_premium_perks_after_expiry() {
        let listing = premium_listing(ListingCategory::Vehicle, ObjectId::new(), at(2024, 1, 31));

        let active = ListingView::new(listing.clone(), at(2024, 1, 20));
        assert!(active.is_premium_effective);
        assert!(active.analytics_enabled);
        assert!(active.featured_status);

        let expired = ListingView::new(listing, at(2024, 2, 1));
        assert!(!expired.is_premium_effective);
        assert!(!expired.analytics_enabled);
        assert!(!expired.featured_status);
        assert_eq!(expired.days_until_expiry, None);
    }
}
