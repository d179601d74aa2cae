//! Fixtures shared by the service tests.

use chrono::{TimeZone, Utc};
use mongodb::bson::{oid::ObjectId, DateTime};

use crate::models::{
    BusinessDetails, CreateListingDto, GuideDetails, Listing, ListingCategory, ListingDetails,
    Payment, PaymentGateway, PaymentStatus, VehicleDetails,
};

/// Midnight UTC of the given day.
pub fn at(year: i32, month: u32, day: u32) -> DateTime {
    let instant = Utc.with_ymd_and_hms(year, month, day, 0, 0, 0).unwrap();
    DateTime::from_millis(instant.timestamp_millis())
}

pub fn sample_details(category: ListingCategory) -> ListingDetails {
    match category {
        ListingCategory::Vehicle => ListingDetails::Vehicle(VehicleDetails {
            vehicle_type: "van".into(),
            make: Some("Toyota".into()),
            model: Some("KDH".into()),
            seats: 9,
            price_per_day: 45.0,
            location: "Negombo".into(),
            contact_phone: "+94771234567".into(),
            with_driver: true,
        }),
        ListingCategory::Guide => ListingDetails::Guide(GuideDetails {
            full_name: "Nimal Perera".into(),
            languages: vec!["English".into(), "Sinhala".into()],
            specializations: vec!["wildlife".into()],
            experience_years: 8,
            daily_rate: 60.0,
            license_number: Some("SLTDA-1234".into()),
            contact_phone: "0771234567".into(),
        }),
        ListingCategory::Business => ListingDetails::Business(BusinessDetails {
            business_type: "surf school".into(),
            address: "12 Beach Road, Weligama".into(),
            contact_email: "hello@surf.lk".into(),
            contact_phone: "+94 77 123 4567".into(),
            website: Some("https://surf.lk".into()),
        }),
    }
}

pub fn sample_dto(category: ListingCategory) -> CreateListingDto {
    CreateListingDto {
        title: format!("Sample {} listing", category.as_str()),
        description: Some("Available all year".into()),
        images: vec!["https://cdn.example.com/a.jpg".into()],
        details: sample_details(category),
    }
}

/// Pending, non-premium listing without an id.
pub fn sample_listing(category: ListingCategory, owner: ObjectId) -> Listing {
    Listing::new_submission(owner, sample_dto(category), at(2024, 1, 1))
}

pub fn premium_listing(category: ListingCategory, owner: ObjectId, expiry: DateTime) -> Listing {
    let mut listing = sample_listing(category, owner);
    listing.id = Some(ObjectId::new());
    listing.is_premium = true;
    listing.premium_expiry = Some(expiry);
    listing.premium_order_id = Some(Payment::new_order_id());
    listing.analytics_enabled = true;
    listing.featured_status = true;
    listing
}

pub fn sample_payment(
    owner: ObjectId,
    service_type: &str,
    status: PaymentStatus,
    created_at: DateTime,
) -> Payment {
    let mut payment = Payment::new_pending(
        owner,
        service_type.parse().unwrap(),
        "usd",
        PaymentGateway::Stripe,
        created_at,
    );
    payment.id = Some(ObjectId::new());
    payment.status = status;
    match status {
        PaymentStatus::Completed => payment.completed_at = Some(created_at),
        PaymentStatus::Failed => payment.failed_at = Some(created_at),
        PaymentStatus::Pending => {}
    }
    payment
}

/// Completed payment with the subscription details stamped at completion.
pub fn completed_payment(owner: ObjectId, service_type: &str, completed_at: DateTime) -> Payment {
    let mut payment = sample_payment(owner, service_type, PaymentStatus::Completed, completed_at);
    payment.subscription_details = payment.completion_details(completed_at);
    payment
}

/// Marks a completed payment as deferred, waiting for a listing or submission.
pub fn awaiting(mut payment: Payment) -> Payment {
    if let Some(details) = payment.subscription_details.as_mut() {
        details.awaiting_submission = true;
    }
    payment
}
