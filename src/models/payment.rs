use mongodb::bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};
use rocket_okapi::okapi::schemars;
use rocket_okapi::okapi::schemars::JsonSchema;
use std::fmt;
use std::str::FromStr;

use super::iso;
use super::listing::ListingCategory;
use crate::services::reminders::MS_PER_DAY;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum PaymentGateway {
    Stripe,
    Manual,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum PlanDuration {
    Monthly,
    Yearly,
}

impl PlanDuration {
    pub fn days(self) -> i64 {
        match self {
            PlanDuration::Monthly => 30,
            PlanDuration::Yearly => 365,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PlanDuration::Monthly => "monthly",
            PlanDuration::Yearly => "yearly",
        }
    }

    fn from_token(token: &str) -> Option<Self> {
        match token {
            "monthly" => Some(PlanDuration::Monthly),
            "yearly" => Some(PlanDuration::Yearly),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PremiumPlan {
    pub category: ListingCategory,
    pub duration: PlanDuration,
}

impl PremiumPlan {
    /// Expiry of a plan purchased at `purchased_at`; never accumulates.
    pub fn expiry_from(self, purchased_at: DateTime) -> DateTime {
        DateTime::from_millis(purchased_at.timestamp_millis() + self.duration.days() * MS_PER_DAY)
    }
}

/// What a payment buys. Stored as its string form, e.g. `vehicle_premium_monthly`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ServiceType {
    Premium(PremiumPlan),
    SponsoredBlog,
    TourPartnership,
}

impl ServiceType {
    pub fn premium_plan(self) -> Option<PremiumPlan> {
        match self {
            ServiceType::Premium(plan) => Some(plan),
            _ => None,
        }
    }

    /// Payments made before the free-form submission they pay for.
    pub fn awaits_submission(self) -> bool {
        matches!(self, ServiceType::SponsoredBlog | ServiceType::TourPartnership)
    }

    /// Price in minor currency units.
    pub fn price_minor(self) -> i64 {
        match self {
            ServiceType::Premium(PremiumPlan { category, duration }) => match (category, duration) {
                (ListingCategory::Vehicle, PlanDuration::Monthly) => 999,
                (ListingCategory::Vehicle, PlanDuration::Yearly) => 9_999,
                (ListingCategory::Guide, PlanDuration::Monthly) => 1_499,
                (ListingCategory::Guide, PlanDuration::Yearly) => 14_999,
                (ListingCategory::Business, PlanDuration::Monthly) => 1_999,
                (ListingCategory::Business, PlanDuration::Yearly) => 19_999,
            },
            ServiceType::SponsoredBlog => 2_999,
            ServiceType::TourPartnership => 4_999,
        }
    }

    pub fn label(self) -> String {
        match self {
            ServiceType::Premium(plan) => {
                let category = match plan.category {
                    ListingCategory::Vehicle => "Vehicle",
                    ListingCategory::Guide => "Tour Guide",
                    ListingCategory::Business => "Business Listing",
                };
                let duration = match plan.duration {
                    PlanDuration::Monthly => "Monthly",
                    PlanDuration::Yearly => "Yearly",
                };
                format!("SLExplora {} Premium ({})", category, duration)
            }
            ServiceType::SponsoredBlog => "SLExplora Sponsored Blog".to_string(),
            ServiceType::TourPartnership => "SLExplora Tour Partnership".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown service type: {0}")]
pub struct UnknownServiceType(pub String);

impl FromStr for ServiceType {
    type Err = UnknownServiceType;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_lowercase();
        match normalized.as_str() {
            "sponsored_blog" => return Ok(ServiceType::SponsoredBlog),
            "tour_partnership" => return Ok(ServiceType::TourPartnership),
            _ => {}
        }

        // <category>_premium_<duration>, businesses also accept the legacy
        // business_listing_<duration> spelling.
        let parts: Vec<&str> = normalized.split('_').collect();
        let plan = match parts.as_slice() {
            [category, "premium", duration] => ListingCategory::from_token(category)
                .zip(PlanDuration::from_token(duration)),
            ["business", "listing", duration] => {
                PlanDuration::from_token(duration).map(|d| (ListingCategory::Business, d))
            }
            _ => None,
        };

        plan.map(|(category, duration)| ServiceType::Premium(PremiumPlan { category, duration }))
            .ok_or_else(|| UnknownServiceType(value.to_string()))
    }
}

impl TryFrom<String> for ServiceType {
    type Error = UnknownServiceType;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ServiceType> for String {
    fn from(value: ServiceType) -> Self {
        value.to_string()
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceType::Premium(plan) => write!(
                f,
                "{}_premium_{}",
                plan.category.as_str(),
                plan.duration.as_str()
            ),
            ServiceType::SponsoredBlog => f.write_str("sponsored_blog"),
            ServiceType::TourPartnership => f.write_str("tour_partnership"),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SubscriptionDetails {
    pub plan_type: Option<PlanDuration>,
    pub start_date: Option<DateTime>,
    pub end_date: Option<DateTime>,
    #[serde(default)]
    pub awaiting_submission: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Payment {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub order_id: String,
    pub user_id: ObjectId,
    pub service_type: ServiceType,
    pub amount: i64, // minor units
    pub currency: String,
    pub status: PaymentStatus,
    pub gateway: PaymentGateway,
    pub gateway_session_id: Option<String>,
    pub subscription_details: Option<SubscriptionDetails>,
    pub completed_at: Option<DateTime>,
    pub failed_at: Option<DateTime>,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

impl Payment {
    pub fn new_order_id() -> String {
        let id = uuid::Uuid::new_v4().simple().to_string().to_uppercase();
        format!("SLX-{}", &id[..16])
    }

    pub fn new_pending(
        user_id: ObjectId,
        service_type: ServiceType,
        currency: &str,
        gateway: PaymentGateway,
        now: DateTime,
    ) -> Self {
        Payment {
            id: None,
            order_id: Self::new_order_id(),
            user_id,
            service_type,
            amount: service_type.price_minor(),
            currency: currency.to_string(),
            status: PaymentStatus::Pending,
            gateway,
            gateway_session_id: None,
            subscription_details: None,
            completed_at: None,
            failed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn premium_plan(&self) -> Option<PremiumPlan> {
        self.service_type.premium_plan()
    }

    /// Expiry fixed by the purchase event, if this is a completed premium payment.
    pub fn premium_expiry(&self) -> Option<DateTime> {
        if self.status != PaymentStatus::Completed {
            return None;
        }
        let plan = self.premium_plan()?;
        self.subscription_details
            .as_ref()
            .and_then(|details| details.end_date)
            .or_else(|| self.completed_at.map(|at| plan.expiry_from(at)))
    }

    pub fn is_active_premium_for(&self, category: ListingCategory, now: DateTime) -> bool {
        match (self.premium_plan(), self.premium_expiry()) {
            (Some(plan), Some(expiry)) => plan.category == category && expiry > now,
            _ => false,
        }
    }

    pub fn awaiting_submission(&self) -> bool {
        self.subscription_details
            .as_ref()
            .map(|details| details.awaiting_submission)
            .unwrap_or(false)
    }

    /// Subscription details stamped when the payment completes at `completed_at`.
    pub fn completion_details(&self, completed_at: DateTime) -> Option<SubscriptionDetails> {
        match self.service_type {
            ServiceType::Premium(plan) => Some(SubscriptionDetails {
                plan_type: Some(plan.duration),
                start_date: Some(completed_at),
                end_date: Some(plan.expiry_from(completed_at)),
                awaiting_submission: false,
            }),
            other if other.awaits_submission() => Some(SubscriptionDetails {
                plan_type: None,
                start_date: Some(completed_at),
                end_date: None,
                awaiting_submission: true,
            }),
            _ => None,
        }
    }
}

/// Payment as returned to clients.
#[derive(Debug, Serialize)]
pub struct PaymentView {
    pub order_id: String,
    pub service_type: String,
    pub label: String,
    pub amount: i64,
    pub currency: String,
    pub status: PaymentStatus,
    pub gateway: PaymentGateway,
    pub plan_type: Option<PlanDuration>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub awaiting_submission: bool,
    pub completed_at: Option<String>,
    pub failed_at: Option<String>,
    pub created_at: String,
}

impl From<Payment> for PaymentView {
    fn from(payment: Payment) -> Self {
        let awaiting_submission = payment.awaiting_submission();
        let details = payment.subscription_details.clone().unwrap_or(SubscriptionDetails {
            plan_type: payment.premium_plan().map(|plan| plan.duration),
            start_date: None,
            end_date: None,
            awaiting_submission: false,
        });

        PaymentView {
            order_id: payment.order_id,
            service_type: payment.service_type.to_string(),
            label: payment.service_type.label(),
            amount: payment.amount,
            currency: payment.currency,
            status: payment.status,
            gateway: payment.gateway,
            plan_type: details.plan_type,
            start_date: details.start_date.map(iso),
            end_date: details.end_date.map(iso),
            awaiting_submission,
            completed_at: payment.completed_at.map(iso),
            failed_at: payment.failed_at.map(iso),
            created_at: iso(payment.created_at),
        }
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CreateCheckoutDto {
    pub service_type: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_premium_service_types() {
        let parsed: ServiceType = "vehicle_premium_monthly".parse().unwrap();
        assert_eq!(
            parsed,
            ServiceType::Premium(PremiumPlan {
                category: ListingCategory::Vehicle,
                duration: PlanDuration::Monthly,
            })
        );

        let parsed: ServiceType = "guide_premium_yearly".parse().unwrap();
        assert_eq!(parsed.premium_plan().unwrap().duration, PlanDuration::Yearly);
    }

    #[test]
    fn legacy_business_listing_spelling_maps_to_business_premium() {
        let parsed: ServiceType = "business_listing_monthly".parse().unwrap();
        assert_eq!(parsed.to_string(), "business_premium_monthly");
    }

    #[test]
    fn rejects_unknown_service_types() {
        assert!("boat_premium_monthly".parse::<ServiceType>().is_err());
        assert!("vehicle_premium_weekly".parse::<ServiceType>().is_err());
        assert!("vehicle_monthly".parse::<ServiceType>().is_err());
    }

    #[test]
    fn submission_first_services_await_submission_on_completion() {
        let now = DateTime::from_millis(1_704_067_200_000);
        let payment = Payment::new_pending(
            ObjectId::new(),
            ServiceType::SponsoredBlog,
            "usd",
            PaymentGateway::Manual,
            now,
        );

        let details = payment.completion_details(now).unwrap();
        assert!(details.awaiting_submission);
        assert!(details.end_date.is_none());
    }

    #[test]
    fn premium_expiry_requires_completed_status() {
        let now = DateTime::from_millis(1_704_067_200_000);
        let mut payment = Payment::new_pending(
            ObjectId::new(),
            "vehicle_premium_monthly".parse().unwrap(),
            "usd",
            PaymentGateway::Stripe,
            now,
        );
        assert_eq!(payment.premium_expiry(), None);

        payment.status = PaymentStatus::Completed;
        payment.completed_at = Some(now);
        assert_eq!(
            payment.premium_expiry(),
            Some(DateTime::from_millis(now.timestamp_millis() + 30 * MS_PER_DAY))
        );
    }
}
