use std::sync::Arc;

use mongodb::bson::{oid::ObjectId, DateTime};
use serde::Deserialize;
use rocket_okapi::okapi::schemars;
use rocket_okapi::okapi::schemars::JsonSchema;

use super::error::{LifecycleError, LifecycleResult};
use crate::db::ListingStore;
use crate::models::{Listing, ListingCategory, ReviewOutcome, SubmissionStatus};

/// Pending listings older than this get a "contact support" hint.
pub const REVIEW_SUPPORT_HINT_HOURS: i64 = 48;

const MS_PER_HOUR: i64 = 3_600_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ReviewDecision {
    Approve,
    Reject,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ReviewDto {
    pub decision: ReviewDecision,
    pub reason: Option<String>,
}

/// Only pending submissions can be decided.
pub fn next_status(
    current: SubmissionStatus,
    decision: ReviewDecision,
) -> LifecycleResult<SubmissionStatus> {
    match (current, decision) {
        (SubmissionStatus::Pending, ReviewDecision::Approve) => Ok(SubmissionStatus::Approved),
        (SubmissionStatus::Pending, ReviewDecision::Reject) => Ok(SubmissionStatus::Rejected),
        (status, _) => Err(LifecycleError::Conflict(format!(
            "listing is already {}",
            status.as_str()
        ))),
    }
}

/// Editing a rejected listing puts it back in the review queue.
pub fn resubmits(current: SubmissionStatus) -> bool {
    current == SubmissionStatus::Rejected
}

pub fn review_overdue(listing: &Listing, now: DateTime) -> bool {
    listing.status == SubmissionStatus::Pending
        && now.timestamp_millis() - listing.submitted_at.timestamp_millis()
            > REVIEW_SUPPORT_HINT_HOURS * MS_PER_HOUR
}

/// Only approved listings are public; owners always see their own.
pub fn visible_to(listing: &Listing, viewer: Option<&ObjectId>) -> bool {
    listing.status == SubmissionStatus::Approved
        || viewer.map(|viewer| listing.is_owned_by(viewer)).unwrap_or(false)
}

pub struct ReviewService<L>
where
    L: ListingStore + 'static,
{
    listings: Arc<L>,
}

impl<L> ReviewService<L>
where
    L: ListingStore + 'static,
{
    pub fn new(listings: Arc<L>) -> Self {
        Self { listings }
    }

    pub async fn pending_queue(&self, category: ListingCategory) -> LifecycleResult<Vec<Listing>> {
        Ok(self
            .listings
            .find_by_status(category, SubmissionStatus::Pending)
            .await?)
    }

    pub async fn review(
        &self,
        category: ListingCategory,
        id: ObjectId,
        dto: ReviewDto,
        now: DateTime,
    ) -> LifecycleResult<Listing> {
        let mut listing = self
            .listings
            .find_by_id(category, id)
            .await?
            .ok_or(LifecycleError::NotFound("Listing"))?;

        let status = next_status(listing.status, dto.decision)?;
        let rejection_reason = match dto.decision {
            ReviewDecision::Reject => Some(
                dto.reason
                    .filter(|reason| !reason.trim().is_empty())
                    .ok_or_else(|| {
                        LifecycleError::validation("reason", "A rejection reason is required")
                    })?,
            ),
            ReviewDecision::Approve => None,
        };

        let outcome = ReviewOutcome {
            status,
            is_verified: status == SubmissionStatus::Approved,
            rejection_reason,
            reviewed_at: now,
        };

        let applied = self
            .listings
            .record_review(category, id, listing.status, outcome.clone())
            .await?;
        if !applied {
            return Err(LifecycleError::Conflict(
                "listing was reviewed concurrently".to_string(),
            ));
        }

        info!(
            "review: {} listing {} is now {}",
            category.as_str(),
            id,
            status.as_str()
        );

        listing.status = outcome.status;
        listing.is_verified = outcome.is_verified;
        listing.rejection_reason = outcome.rejection_reason;
        listing.reviewed_at = Some(now);
        Ok(listing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MockListingStore;
    use crate::services::test_support::{at, sample_listing};
    use mockall::predicate::eq;

    #[test]
    fn only_pending_listings_can_be_decided() {
        assert_eq!(
            next_status(SubmissionStatus::Pending, ReviewDecision::Approve).unwrap(),
            SubmissionStatus::Approved
        );
        assert_eq!(
            next_status(SubmissionStatus::Pending, ReviewDecision::Reject).unwrap(),
            SubmissionStatus::Rejected
        );
        assert!(matches!(
            next_status(SubmissionStatus::Approved, ReviewDecision::Reject),
            Err(LifecycleError::Conflict(_))
        ));
        assert!(matches!(
            next_status(SubmissionStatus::Rejected, ReviewDecision::Approve),
            Err(LifecycleError::Conflict(_))
        ));
    }

    #[test]
    fn pending_for_72_hours_triggers_support_hint() {
        let mut listing = sample_listing(ListingCategory::Vehicle, ObjectId::new());
        listing.submitted_at = at(2024, 1, 1);

        assert!(!review_overdue(&listing, at(2024, 1, 2)));
        assert!(!review_overdue(&listing, at(2024, 1, 3)), "exactly 48 hours");
        assert!(review_overdue(&listing, at(2024, 1, 4)));

        listing.status = SubmissionStatus::Approved;
        assert!(!review_overdue(&listing, at(2024, 1, 4)));
    }

    #[test]
    fn premium_does_not_change_review_state() {
        let mut listing = sample_listing(ListingCategory::Guide, ObjectId::new());
        listing.is_premium = true;
        listing.premium_expiry = Some(at(2030, 1, 1));
        listing.submitted_at = at(2024, 1, 1);

        assert_eq!(listing.status, SubmissionStatus::Pending);
        assert!(review_overdue(&listing, at(2024, 1, 4)));
    }

    #[test]
    fn rejected_listing_visible_only_to_owner() {
        let owner = ObjectId::new();
        let mut listing = sample_listing(ListingCategory::Business, owner);
        listing.status = SubmissionStatus::Rejected;

        assert!(visible_to(&listing, Some(&owner)));
        assert!(!visible_to(&listing, Some(&ObjectId::new())));
        assert!(!visible_to(&listing, None));
        assert!(resubmits(listing.status));
    }

    #[tokio::test]
    async fn approving_marks_listing_verified() {
        let owner = ObjectId::new();
        let mut listing = sample_listing(ListingCategory::Vehicle, owner);
        let id = ObjectId::new();
        listing.id = Some(id);

        let mut store = MockListingStore::new();
        store
            .expect_find_by_id()
            .with(eq(ListingCategory::Vehicle), eq(id))
            .returning(move |_, _| Ok(Some(listing.clone())));
        store
            .expect_record_review()
            .withf(|_, _, expected, outcome| {
                *expected == SubmissionStatus::Pending
                    && outcome.status == SubmissionStatus::Approved
                    && outcome.is_verified
            })
            .times(1)
            .returning(|_, _, _, _| Ok(true));

        let service = ReviewService::new(Arc::new(store));
        let reviewed = service
            .review(
                ListingCategory::Vehicle,
                id,
                ReviewDto {
                    decision: ReviewDecision::Approve,
                    reason: None,
                },
                at(2024, 1, 2),
            )
            .await
            .unwrap();

        assert_eq!(reviewed.status, SubmissionStatus::Approved);
        assert!(reviewed.is_verified);
    }

    #[tokio::test]
    async fn rejecting_requires_a_reason() {
        let id = ObjectId::new();
        let listing = sample_listing(ListingCategory::Guide, ObjectId::new());

        let mut store = MockListingStore::new();
        store
            .expect_find_by_id()
            .returning(move |_, _| Ok(Some(listing.clone())));
        store.expect_record_review().times(0);

        let service = ReviewService::new(Arc::new(store));
        let result = service
            .review(
                ListingCategory::Guide,
                id,
                ReviewDto {
                    decision: ReviewDecision::Reject,
                    reason: Some("  ".into()),
                },
                at(2024, 1, 2),
            )
            .await;

        assert!(matches!(result, Err(LifecycleError::Validation { .. })));
    }
}
