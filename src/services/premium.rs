use std::sync::Arc;

use mongodb::bson::{oid::ObjectId, DateTime};
use serde::Serialize;

use super::error::{LifecycleError, LifecycleResult};
use crate::db::{ListingStore, PaymentStore};
use crate::models::{
    Listing, ListingCategory, Payment, PaymentStatus, PlanDuration, PremiumGrant, ServiceType,
};

/// Answer of `GET /{category}/my-premium-status`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PremiumStatus {
    pub has_active_premium_subscription: bool,
    pub active_plan_type: Option<PlanDuration>,
    pub premium_expiry: Option<DateTime>,
    pub order_id: Option<String>,
}

/// Picks the plan to report among the active premium payments of `category`.
/// Yearly beats monthly; within a duration the later expiry wins.
pub fn current_plan(payments: &[Payment], category: ListingCategory, now: DateTime) -> PremiumStatus {
    let best = payments
        .iter()
        .filter(|payment| payment.is_active_premium_for(category, now))
        .filter_map(|payment| {
            let plan = payment.premium_plan()?;
            let expiry = payment.premium_expiry()?;
            Some((plan.duration == PlanDuration::Yearly, expiry, payment, plan.duration))
        })
        .max_by_key(|(is_yearly, expiry, _, _)| (*is_yearly, *expiry));

    match best {
        Some((_, expiry, payment, duration)) => PremiumStatus {
            has_active_premium_subscription: true,
            active_plan_type: Some(duration),
            premium_expiry: Some(expiry),
            order_id: Some(payment.order_id.clone()),
        },
        None => PremiumStatus {
            has_active_premium_subscription: false,
            active_plan_type: None,
            premium_expiry: None,
            order_id: None,
        },
    }
}

/// Checkout layer rule: a monthly plan is redundant while a yearly one is active.
pub fn ensure_purchase_allowed(
    payments: &[Payment],
    service_type: ServiceType,
    now: DateTime,
) -> LifecycleResult<()> {
    let Some(plan) = service_type.premium_plan() else {
        return Ok(());
    };

    let status = current_plan(payments, plan.category, now);
    if plan.duration == PlanDuration::Monthly
        && status.active_plan_type == Some(PlanDuration::Yearly)
    {
        return Err(LifecycleError::Conflict(format!(
            "A yearly {} premium plan is already active",
            plan.category.as_str()
        )));
    }
    Ok(())
}

#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct ActivationReport {
    pub activated: Vec<String>,
    pub unchanged: Vec<String>,
    pub failed: Vec<String>,
    /// No listing yet; applied when the owner creates one.
    pub deferred: bool,
}

pub struct PremiumService<L, P>
where
    L: ListingStore + 'static,
    P: PaymentStore + 'static,
{
    listings: Arc<L>,
    payments: Arc<P>,
}

impl<L, P> PremiumService<L, P>
where
    L: ListingStore + 'static,
    P: PaymentStore + 'static,
{
    pub fn new(listings: Arc<L>, payments: Arc<P>) -> Self {
        Self { listings, payments }
    }

    /// Moves a payment to `completed` and activates what it bought.
    /// Completing an already completed payment only re-runs the idempotent activation.
    pub async fn complete_payment(&self, order_id: &str, now: DateTime) -> LifecycleResult<Payment> {
        let payment = self
            .payments
            .find_by_order_id(order_id.to_string())
            .await?
            .ok_or(LifecycleError::NotFound("Payment"))?;

        let payment = match payment.status {
            PaymentStatus::Failed => {
                return Err(LifecycleError::Conflict(format!(
                    "payment {} has already failed",
                    order_id
                )));
            }
            PaymentStatus::Completed => payment,
            PaymentStatus::Pending => {
                let details = payment.completion_details(now);
                match self
                    .payments
                    .mark_completed(order_id.to_string(), now, details)
                    .await?
                {
                    Some(completed) => {
                        info!(
                            "payments: order {} completed for user {} ({})",
                            order_id, completed.user_id, completed.service_type
                        );
                        completed
                    }
                    // Lost a race with another completion path (webhook vs poll).
                    None => self
                        .payments
                        .find_by_order_id(order_id.to_string())
                        .await?
                        .filter(|p| p.status == PaymentStatus::Completed)
                        .ok_or_else(|| {
                            LifecycleError::Conflict(format!(
                                "payment {} is no longer pending",
                                order_id
                            ))
                        })?,
                }
            }
        };

        self.activate_premium(&payment, now).await?;
        Ok(payment)
    }

    /// Applies premium state to every listing the payer owns in the plan's category.
    /// Listing updates are isolated: one failure is logged and the rest still run.
    pub async fn activate_premium(
        &self,
        payment: &Payment,
        now: DateTime,
    ) -> LifecycleResult<ActivationReport> {
        let mut report = ActivationReport::default();

        if payment.status != PaymentStatus::Completed {
            debug!("premium: order {} is not completed, skipping", payment.order_id);
            return Ok(report);
        }
        let (Some(plan), Some(expiry)) = (payment.premium_plan(), payment.premium_expiry()) else {
            return Ok(report);
        };

        let owned = self
            .listings
            .find_by_owner(plan.category, payment.user_id)
            .await?;

        if owned.is_empty() {
            report.deferred = true;
            if expiry > now && !payment.awaiting_submission() {
                self.payments
                    .set_awaiting_submission(payment.order_id.clone(), true)
                    .await?;
            }
            info!(
                "premium: order {} deferred, user {} has no {} listing yet",
                payment.order_id,
                payment.user_id,
                plan.category.as_str()
            );
            return Ok(report);
        }

        for listing in owned {
            let Some(id) = listing.id else { continue };

            // Never regress a longer expiry, never extend by re-running.
            if listing.is_premium && listing.premium_expiry.map(|e| e >= expiry).unwrap_or(false) {
                report.unchanged.push(id.to_hex());
                continue;
            }

            let grant = PremiumGrant {
                expiry,
                order_id: payment.order_id.clone(),
                granted_at: now,
            };
            match self.listings.apply_premium(plan.category, id, grant).await {
                Ok(false) => {
                    // A longer plan landed first.
                    debug!(
                        "premium: listing {} already holds a later expiry than order {}",
                        id, payment.order_id
                    );
                    report.unchanged.push(id.to_hex());
                }
                Ok(true) => {
                    info!(
                        "premium: listing {} premium until {} (order {})",
                        id, expiry, payment.order_id
                    );
                    report.activated.push(id.to_hex());
                }
                Err(e) => {
                    error!(
                        "premium: failed to activate listing {} of user {} for order {}: {}",
                        id, payment.user_id, payment.order_id, e
                    );
                    report.failed.push(id.to_hex());
                }
            }
        }

        if payment.awaiting_submission() && !report.activated.is_empty() {
            self.payments
                .set_awaiting_submission(payment.order_id.clone(), false)
                .await?;
        }

        Ok(report)
    }

    /// Premium-first path: stamps a new listing with the owner's active plan, if any.
    /// Returns the order ids of every deferred payment of the category, all of which
    /// the new listing settles. Empty when no plan was applied.
    pub async fn apply_to_new_listing(
        &self,
        listing: &mut Listing,
        now: DateTime,
    ) -> LifecycleResult<Vec<String>> {
        let category = listing.category();
        let payments = self.payments.find_by_user(listing.owner_id).await?;
        let status = current_plan(&payments, category, now);

        let (Some(order_id), Some(expiry)) = (status.order_id, status.premium_expiry) else {
            return Ok(Vec::new());
        };

        listing.is_premium = true;
        listing.premium_expiry = Some(expiry);
        listing.premium_order_id = Some(order_id);
        listing.analytics_enabled = true;
        listing.featured_status = true;

        Ok(payments
            .into_iter()
            .filter(|payment| payment.awaiting_submission())
            .filter(|payment| {
                payment
                    .premium_plan()
                    .map(|plan| plan.category == category)
                    .unwrap_or(false)
            })
            .map(|payment| payment.order_id)
            .collect())
    }

    pub async fn premium_status(
        &self,
        owner: ObjectId,
        category: ListingCategory,
        now: DateTime,
    ) -> LifecycleResult<PremiumStatus> {
        let payments = self.payments.find_by_user(owner).await?;
        Ok(current_plan(&payments, category, now))
    }
}
