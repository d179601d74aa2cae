use async_trait::async_trait;
use mongodb::bson::{doc, oid::ObjectId, to_bson, Bson, DateTime};
use mongodb::options::{FindOneAndUpdateOptions, FindOptions, ReturnDocument};
use mongodb::{Collection, Database};
use rocket::futures::TryStreamExt;

#[cfg(test)]
use mockall::automock;

use super::{StoreError, StoreResult};
use crate::models::{Payment, PaymentStatus, SubscriptionDetails};

/// Persistence seam for payment records.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn insert(&self, payment: Payment) -> StoreResult<ObjectId>;

    async fn find_by_order_id(&self, order_id: String) -> StoreResult<Option<Payment>>;

    /// Newest first.
    async fn find_by_user(&self, user_id: ObjectId) -> StoreResult<Vec<Payment>>;

    async fn attach_gateway_session(&self, order_id: String, session_id: String) -> StoreResult<()>;

    /// `pending -> completed`. Returns `None` when the payment was not pending.
    async fn mark_completed(
        &self,
        order_id: String,
        completed_at: DateTime,
        details: Option<SubscriptionDetails>,
    ) -> StoreResult<Option<Payment>>;

    /// `pending -> failed`. Returns false when the payment was not pending.
    async fn mark_failed(&self, order_id: String, failed_at: DateTime) -> StoreResult<bool>;

    async fn set_awaiting_submission(&self, order_id: String, awaiting: bool) -> StoreResult<()>;
}

pub struct MongoPaymentStore {
    db: Database,
}

impl MongoPaymentStore {
    pub fn new(db: &Database) -> Self {
        MongoPaymentStore { db: db.clone() }
    }

    fn collection(&self) -> Collection<Payment> {
        self.db.collection::<Payment>("payments")
    }
}

#[async_trait]
impl PaymentStore for MongoPaymentStore {
    async fn insert(&self, payment: Payment) -> StoreResult<ObjectId> {
        let result = self.collection().insert_one(&payment, None).await?;

        result
            .inserted_id
            .as_object_id()
            .ok_or_else(|| StoreError::Invalid("payment id is not an ObjectId".to_string()))
    }

    async fn find_by_order_id(&self, order_id: String) -> StoreResult<Option<Payment>> {
        Ok(self
            .collection()
            .find_one(doc! { "order_id": order_id }, None)
            .await?)
    }

    async fn find_by_user(&self, user_id: ObjectId) -> StoreResult<Vec<Payment>> {
        let options = FindOptions::builder().sort(doc! { "created_at": -1 }).build();
        let payments = self
            .collection()
            .find(doc! { "user_id": user_id }, options)
            .await?
            .try_collect()
            .await?;
        Ok(payments)
    }

    async fn attach_gateway_session(&self, order_id: String, session_id: String) -> StoreResult<()> {
        self.collection()
            .update_one(
                doc! { "order_id": order_id },
                doc! {
                    "$set": {
                        "gateway_session_id": session_id,
                        "updated_at": DateTime::now(),
                    }
                },
                None,
            )
            .await?;
        Ok(())
    }

    async fn mark_completed(
        &self,
        order_id: String,
        completed_at: DateTime,
        details: Option<SubscriptionDetails>,
    ) -> StoreResult<Option<Payment>> {
        let details = match details {
            Some(details) => to_bson(&details)?,
            None => Bson::Null,
        };

        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();

        Ok(self
            .collection()
            .find_one_and_update(
                doc! {
                    "order_id": order_id,
                    "status": PaymentStatus::Pending.as_str(),
                },
                doc! {
                    "$set": {
                        "status": PaymentStatus::Completed.as_str(),
                        "completed_at": completed_at,
                        "subscription_details": details,
                        "updated_at": completed_at,
                    }
                },
                options,
            )
            .await?)
    }

    async fn mark_failed(&self, order_id: String, failed_at: DateTime) -> StoreResult<bool> {
        let result = self
            .collection()
            .update_one(
                doc! {
                    "order_id": order_id,
                    "status": PaymentStatus::Pending.as_str(),
                },
                doc! {
                    "$set": {
                        "status": PaymentStatus::Failed.as_str(),
                        "failed_at": failed_at,
                        "updated_at": failed_at,
                    }
                },
                None,
            )
            .await?;
        Ok(result.modified_count > 0)
    }

    async fn set_awaiting_submission(&self, order_id: String, awaiting: bool) -> StoreResult<()> {
        let result = self
            .collection()
            .update_one(
                doc! {
                    "order_id": order_id.as_str(),
                    "status": PaymentStatus::Completed.as_str(),
                },
                doc! {
                    "$set": {
                        "subscription_details.awaiting_submission": awaiting,
                        "updated_at": DateTime::now(),
                    }
                },
                None,
            )
            .await?;

        if result.matched_count == 0 {
            return Err(StoreError::Invalid(format!(
                "payment {} is not completed",
                order_id
            )));
        }
        Ok(())
    }
}
