use mongodb::bson::{oid::ObjectId, DateTime};
use serde::Serialize;

use crate::db::{ListingStore, PaymentStore};
use crate::models::{iso, Listing, ListingCategory, Payment};

pub const MS_PER_DAY: i64 = 86_400_000;

/// Renewal reminders start this many days before `premium_expiry`.
pub const RENEWAL_WINDOW_DAYS: i64 = 14;

/// Calendar-day ceiling of `(expiry - now)`; negative once expired.
pub fn days_between(now: DateTime, expiry: DateTime) -> i64 {
    let diff = expiry.timestamp_millis() - now.timestamp_millis();
    if diff > 0 {
        (diff + MS_PER_DAY - 1) / MS_PER_DAY
    } else {
        // Truncation toward zero is the ceiling for non-positive values.
        diff / MS_PER_DAY
    }
}

/// The single renewal policy shared by every listing category and the badge counter.
pub fn needs_renewal_soon(expiry: DateTime, now: DateTime) -> bool {
    let days = days_between(now, expiry);
    days > 0 && days <= RENEWAL_WINDOW_DAYS
}

/// Stored `is_premium` is never revoked by a timer, so every reader goes through here.
pub fn is_premium_effective(is_premium: bool, expiry: Option<DateTime>, now: DateTime) -> bool {
    is_premium && expiry.map(|expiry| expiry > now).unwrap_or(true)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Reminder {
    PremiumRenewal {
        listing_id: Option<String>,
        category: ListingCategory,
        title: String,
        days_left: i64,
        premium_expiry: String,
    },
    AwaitingSubmission {
        order_id: String,
        service_type: String,
    },
}

pub fn listing_reminders(listings: &[Listing], now: DateTime) -> Vec<Reminder> {
    listings
        .iter()
        .filter(|listing| listing.is_premium)
        .filter_map(|listing| {
            let expiry = listing.premium_expiry?;
            needs_renewal_soon(expiry, now).then(|| Reminder::PremiumRenewal {
                listing_id: listing.id_hex(),
                category: listing.category(),
                title: listing.title.clone(),
                days_left: days_between(now, expiry),
                premium_expiry: iso(expiry),
            })
        })
        .collect()
}

/// A deferred premium plan stops reminding once it has expired unused.
pub fn payment_reminders(payments: &[Payment], now: DateTime) -> Vec<Reminder> {
    payments
        .iter()
        .filter(|payment| payment.awaiting_submission())
        .filter(|payment| match payment.premium_plan() {
            Some(plan) => payment.is_active_premium_for(plan.category, now),
            None => true,
        })
        .map(|payment| Reminder::AwaitingSubmission {
            order_id: payment.order_id.clone(),
            service_type: payment.service_type.to_string(),
        })
        .collect()
}

/// Gathers every reminder for `owner`. A failing lookup is logged and
/// contributes nothing instead of failing the whole request.
pub async fn collect_reminders<L, P>(
    listings: &L,
    payments: &P,
    owner: ObjectId,
    now: DateTime,
) -> Vec<Reminder>
where
    L: ListingStore + ?Sized,
    P: PaymentStore + ?Sized,
{
    let mut reminders = Vec::new();

    for category in ListingCategory::ALL {
        match listings.find_by_owner(category, owner).await {
            Ok(owned) => reminders.extend(listing_reminders(&owned, now)),
            Err(e) => warn!(
                "reminders: skipping {} listings for {}: {}",
                category.as_str(),
                owner,
                e
            ),
        }
    }

    match payments.find_by_user(owner).await {
        Ok(history) => reminders.extend(payment_reminders(&history, now)),
        Err(e) => warn!("reminders: skipping payments for {}: {}", owner, e),
    }

    reminders
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{MockListingStore, MockPaymentStore, StoreError};
    use crate::models::{ListingView, PaymentStatus, ServiceType};
    use crate::services::test_support::{
        at, awaiting, completed_payment, premium_listing, sample_payment,
    };

    const HOUR: i64 = 3_600_000;

    fn plus_ms(base: DateTime, ms: i64) -> DateTime {
        DateTime::from_millis(base.timestamp_millis() + ms)
    }

    #[test]
    fn days_between_rounds_partial_days_up() {
        let now = at(2024, 1, 1);
        assert_eq!(days_between(now, plus_ms(now, 1)), 1);
        assert_eq!(days_between(now, plus_ms(now, MS_PER_DAY)), 1);
        assert_eq!(days_between(now, plus_ms(now, MS_PER_DAY + HOUR)), 2);
        assert_eq!(days_between(now, now), 0);
        assert_eq!(days_between(now, plus_ms(now, -HOUR)), 0);
        assert_eq!(days_between(now, plus_ms(now, -MS_PER_DAY - HOUR)), -1);
    }

    #[test]
    fn renewal_window_boundaries() {
        let now = at(2024, 1, 1);

        assert!(!needs_renewal_soon(now, now), "exactly 0 days left");
        assert!(!needs_renewal_soon(plus_ms(now, -MS_PER_DAY), now), "already expired");
        assert!(needs_renewal_soon(plus_ms(now, 1), now));
        assert!(
            needs_renewal_soon(plus_ms(now, 14 * MS_PER_DAY), now),
            "exactly 14 days left"
        );
        assert!(
            !needs_renewal_soon(plus_ms(now, 14 * MS_PER_DAY + 1), now),
            "just over 14 days left"
        );
        assert!(!needs_renewal_soon(plus_ms(now, 30 * MS_PER_DAY), now));
    }

    #[test]
    fn effective_premium_rechecks_expiry() {
        let now = at(2024, 1, 1);
        assert!(is_premium_effective(true, Some(plus_ms(now, 1)), now));
        assert!(!is_premium_effective(true, Some(now), now));
        assert!(!is_premium_effective(true, Some(plus_ms(now, -1)), now));
        assert!(is_premium_effective(true, None, now));
        assert!(!is_premium_effective(false, Some(plus_ms(now, MS_PER_DAY)), now));
        assert!(!is_premium_effective(false, None, now));
    }

    #[test]
    fn monthly_purchase_scenario() {
        let purchased = at(2024, 1, 1);
        let expiry = "vehicle_premium_monthly"
            .parse::<ServiceType>()
            .unwrap()
            .premium_plan()
            .unwrap()
            .expiry_from(purchased);
        assert_eq!(expiry, at(2024, 1, 31));

        let mid_month = at(2024, 1, 20);
        assert_eq!(days_between(mid_month, expiry), 11);
        assert!(needs_renewal_soon(expiry, mid_month));

        assert!(!is_premium_effective(true, Some(expiry), at(2024, 2, 1)));
    }

    #[test]
    fn every_category_uses_the_same_renewal_math() {
        let now = at(2024, 1, 20);
        let expiry = at(2024, 1, 31);
        let listings: Vec<Listing> = ListingCategory::ALL
            .iter()
            .map(|category| premium_listing(*category, ObjectId::new(), expiry))
            .collect();

        let flags: Vec<bool> = listings
            .iter()
            .cloned()
            .map(|listing| ListingView::new(listing, now).needs_renewal_soon)
            .collect();
        assert_eq!(flags, vec![true, true, true]);

        let days: Vec<Option<i64>> = listings
            .iter()
            .cloned()
            .map(|listing| ListingView::new(listing, now).days_until_expiry)
            .collect();
        assert_eq!(days, vec![Some(11), Some(11), Some(11)]);

        assert_eq!(listing_reminders(&listings, now).len(), 3);
    }

    #[test]
    fn expired_premium_flag_is_not_counted() {
        let now = at(2024, 2, 1);
        let stale = premium_listing(ListingCategory::Guide, ObjectId::new(), at(2024, 1, 31));
        assert!(stale.is_premium);
        assert!(listing_reminders(&[stale], now).is_empty());
    }

    #[test]
    fn awaiting_submission_payments_are_counted() {
        let owner = ObjectId::new();
        let mut blog = sample_payment(owner, "sponsored_blog", PaymentStatus::Completed, at(2024, 1, 1));
        blog.subscription_details = blog.completion_details(at(2024, 1, 1));
        let plain = sample_payment(owner, "vehicle_premium_monthly", PaymentStatus::Pending, at(2024, 1, 1));

        let reminders = payment_reminders(&[blog, plain], at(2024, 1, 2));
        assert_eq!(reminders.len(), 1);
        assert!(matches!(
            &reminders[0],
            Reminder::AwaitingSubmission { service_type, .. } if service_type == "sponsored_blog"
        ));
    }

    #[test]
    fn deferred_plan_stops_reminding_once_expired() {
        let owner = ObjectId::new();
        let deferred = awaiting(completed_payment(owner, "vehicle_premium_monthly", at(2024, 1, 1)));

        assert_eq!(payment_reminders(std::slice::from_ref(&deferred), at(2024, 1, 20)).len(), 1);
        assert!(payment_reminders(&[deferred], at(2024, 2, 1)).is_empty());
    }

    #[tokio::test]
    async fn failed_lookup_degrades_to_zero_for_that_source() {
        let owner = ObjectId::new();
        let now = at(2024, 1, 20);
        let vehicle = premium_listing(ListingCategory::Vehicle, owner, at(2024, 1, 31));

        let mut listings = MockListingStore::new();
        listings
            .expect_find_by_owner()
            .returning(move |category, _| match category {
                ListingCategory::Vehicle => Ok(vec![vehicle.clone()]),
                ListingCategory::Guide => Err(StoreError::Invalid("guide lookup failed".into())),
                ListingCategory::Business => Ok(vec![]),
            });

        let mut payments = MockPaymentStore::new();
        payments
            .expect_find_by_user()
            .returning(|_| Err(StoreError::Invalid("payments lookup failed".into())));

        let reminders = collect_reminders(&listings, &payments, owner, now).await;
        assert_eq!(reminders.len(), 1);
    }
}
