use async_trait::async_trait;
use mongodb::bson::{doc, oid::ObjectId, to_bson, DateTime, Document};
use mongodb::options::FindOptions;
use mongodb::{Collection, Database};
use rocket::futures::TryStreamExt;

#[cfg(test)]
use mockall::automock;

use super::{StoreError, StoreResult};
use crate::models::{
    Listing, ListingCategory, ListingContentUpdate, PremiumGrant, ReviewOutcome,
    SubmissionStatus, TelemetryCounter,
};

/// Persistence seam for listings of every category.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ListingStore: Send + Sync {
    async fn insert(&self, listing: Listing) -> StoreResult<ObjectId>;

    async fn find_by_id(
        &self,
        category: ListingCategory,
        id: ObjectId,
    ) -> StoreResult<Option<Listing>>;

    async fn find_by_owner(
        &self,
        category: ListingCategory,
        owner_id: ObjectId,
    ) -> StoreResult<Vec<Listing>>;

    /// Oldest submission first.
    async fn find_by_status(
        &self,
        category: ListingCategory,
        status: SubmissionStatus,
    ) -> StoreResult<Vec<Listing>>;

    async fn update_content(
        &self,
        category: ListingCategory,
        id: ObjectId,
        update: ListingContentUpdate,
        now: DateTime,
    ) -> StoreResult<bool>;

    /// Sets the premium fields unless the stored expiry is already at or past
    /// `grant.expiry`. Returns false when the listing was left as it was.
    async fn apply_premium(
        &self,
        category: ListingCategory,
        id: ObjectId,
        grant: PremiumGrant,
    ) -> StoreResult<bool>;

    /// Applies `outcome` only if the listing is still in `expected` status.
    async fn record_review(
        &self,
        category: ListingCategory,
        id: ObjectId,
        expected: SubmissionStatus,
        outcome: ReviewOutcome,
    ) -> StoreResult<bool>;

    async fn increment_counter(
        &self,
        category: ListingCategory,
        id: ObjectId,
        counter: TelemetryCounter,
    ) -> StoreResult<()>;

    async fn delete(&self, category: ListingCategory, id: ObjectId) -> StoreResult<bool>;
}

pub struct MongoListingStore {
    db: Database,
}

impl MongoListingStore {
    pub fn new(db: &Database) -> Self {
        MongoListingStore { db: db.clone() }
    }

    fn collection(&self, category: ListingCategory) -> Collection<Listing> {
        self.db.collection::<Listing>(category.collection())
    }

    async fn find_many(
        &self,
        category: ListingCategory,
        filter: Document,
        options: FindOptions,
    ) -> StoreResult<Vec<Listing>> {
        let listings = self
            .collection(category)
            .find(filter, options)
            .await?
            .try_collect()
            .await?;
        Ok(listings)
    }
}

#[async_trait]
impl ListingStore for MongoListingStore {
    async fn insert(&self, listing: Listing) -> StoreResult<ObjectId> {
        let result = self
            .collection(listing.category())
            .insert_one(&listing, None)
            .await?;

        result
            .inserted_id
            .as_object_id()
            .ok_or_else(|| StoreError::Invalid("listing id is not an ObjectId".to_string()))
    }

    async fn find_by_id(
        &self,
        category: ListingCategory,
        id: ObjectId,
    ) -> StoreResult<Option<Listing>> {
        Ok(self
            .collection(category)
            .find_one(doc! { "_id": id }, None)
            .await?)
    }

    async fn find_by_owner(
        &self,
        category: ListingCategory,
        owner_id: ObjectId,
    ) -> StoreResult<Vec<Listing>> {
        let options = FindOptions::builder().sort(doc! { "created_at": -1 }).build();
        self.find_many(category, doc! { "owner_id": owner_id }, options)
            .await
    }

    async fn find_by_status(
        &self,
        category: ListingCategory,
        status: SubmissionStatus,
    ) -> StoreResult<Vec<Listing>> {
        let options = FindOptions::builder().sort(doc! { "submitted_at": 1 }).build();
        self.find_many(category, doc! { "status": status.as_str() }, options)
            .await
    }

    async fn update_content(
        &self,
        category: ListingCategory,
        id: ObjectId,
        update: ListingContentUpdate,
        now: DateTime,
    ) -> StoreResult<bool> {
        let mut set = doc! { "updated_at": now };

        if let Some(title) = update.title {
            set.insert("title", title);
        }
        if let Some(description) = update.description {
            set.insert("description", description);
        }
        if let Some(images) = update.images {
            set.insert("images", images);
        }
        if let Some(details) = update.details {
            set.insert("details", to_bson(&details)?);
        }
        if update.resubmit {
            set.insert("status", SubmissionStatus::Pending.as_str());
            set.insert("submitted_at", now);
            set.insert("rejection_reason", mongodb::bson::Bson::Null);
        }

        let result = self
            .collection(category)
            .update_one(doc! { "_id": id }, doc! { "$set": set }, None)
            .await?;
        Ok(result.matched_count > 0)
    }

    async fn apply_premium(
        &self,
        category: ListingCategory,
        id: ObjectId,
        grant: PremiumGrant,
    ) -> StoreResult<bool> {
        let result = self
            .collection(category)
            .update_one(
                doc! {
                    "_id": id,
                    "$or": [
                        { "premium_expiry": null },
                        { "premium_expiry": { "$lt": grant.expiry } }
                    ],
                },
                doc! {
                    "$set": {
                        "is_premium": true,
                        "premium_expiry": grant.expiry,
                        "premium_order_id": grant.order_id,
                        "analytics_enabled": true,
                        "featured_status": true,
                        "updated_at": grant.granted_at,
                    }
                },
                None,
            )
            .await?;

        Ok(result.matched_count > 0)
    }

    async fn record_review(
        &self,
        category: ListingCategory,
        id: ObjectId,
        expected: SubmissionStatus,
        outcome: ReviewOutcome,
    ) -> StoreResult<bool> {
        let result = self
            .collection(category)
            .update_one(
                doc! { "_id": id, "status": expected.as_str() },
                doc! {
                    "$set": {
                        "status": outcome.status.as_str(),
                        "is_verified": outcome.is_verified,
                        "rejection_reason": outcome.rejection_reason,
                        "reviewed_at": outcome.reviewed_at,
                        "updated_at": outcome.reviewed_at,
                    }
                },
                None,
            )
            .await?;
        Ok(result.modified_count > 0)
    }

    async fn increment_counter(
        &self,
        category: ListingCategory,
        id: ObjectId,
        counter: TelemetryCounter,
    ) -> StoreResult<()> {
        let mut inc = Document::new();
        inc.insert(counter.field(), 1_i64);

        self.collection(category)
            .update_one(doc! { "_id": id }, doc! { "$inc": inc }, None)
            .await?;
        Ok(())
    }

    async fn delete(&self, category: ListingCategory, id: ObjectId) -> StoreResult<bool> {
        let result = self
            .collection(category)
            .delete_one(doc! { "_id": id }, None)
            .await?;
        Ok(result.deleted_count > 0)
    }
}
