use std::sync::Arc;

use mongodb::bson::{oid::ObjectId, DateTime};
use serde::Serialize;

use super::error::{LifecycleError, LifecycleResult};
use super::premium::{ensure_purchase_allowed, PremiumService};
use super::stripe::{CheckoutRequest, PaymentGateway, SessionState, StripeEvent};
use crate::db::{ListingStore, PaymentStore};
use crate::models::{
    ListingCategory, Payment, PaymentGateway as GatewayKind, PaymentStatus, PlanDuration,
    PremiumPlan, ServiceType,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogueEntry {
    pub service_type: String,
    pub label: String,
    pub amount: i64,
    pub currency: String,
    pub duration_days: Option<i64>,
}

pub fn catalogue(currency: &str) -> Vec<CatalogueEntry> {
    let premium = ListingCategory::ALL.into_iter().flat_map(|category| {
        [PlanDuration::Monthly, PlanDuration::Yearly]
            .into_iter()
            .map(move |duration| ServiceType::Premium(PremiumPlan { category, duration }))
    });

    premium
        .chain([ServiceType::SponsoredBlog, ServiceType::TourPartnership])
        .map(|service_type| CatalogueEntry {
            service_type: service_type.to_string(),
            label: service_type.label(),
            amount: service_type.price_minor(),
            currency: currency.to_string(),
            duration_days: service_type.premium_plan().map(|plan| plan.duration.days()),
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct CheckoutSettings {
    pub currency: String,
    pub frontend_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckoutStarted {
    pub order_id: String,
    pub session_id: String,
    pub checkout_url: String,
    pub amount: i64,
    pub currency: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    Completed(String),
    Failed(String),
    Ignored,
}

pub struct CheckoutService<L, P, G>
where
    L: ListingStore + 'static,
    P: PaymentStore + 'static,
    G: PaymentGateway + 'static,
{
    payments: Arc<P>,
    gateway: Arc<G>,
    premium: PremiumService<L, P>,
    settings: CheckoutSettings,
}

impl<L, P, G> CheckoutService<L, P, G>
where
    L: ListingStore + 'static,
    P: PaymentStore + 'static,
    G: PaymentGateway + 'static,
{
    pub fn new(listings: Arc<L>, payments: Arc<P>, gateway: Arc<G>, settings: CheckoutSettings) -> Self {
        let premium = PremiumService::new(listings, payments.clone());
        Self {
            payments,
            gateway,
            premium,
            settings,
        }
    }

    /// Records a pending payment and opens a hosted checkout session for it.
    pub async fn start(
        &self,
        user_id: ObjectId,
        customer_email: Option<String>,
        service_type: &str,
        now: DateTime,
    ) -> LifecycleResult<CheckoutStarted> {
        let service_type: ServiceType = service_type
            .parse()
            .map_err(|e: crate::models::UnknownServiceType| {
                LifecycleError::validation("service_type", e.to_string())
            })?;

        let history = self.payments.find_by_user(user_id).await?;
        ensure_purchase_allowed(&history, service_type, now)?;

        let mut payment = Payment::new_pending(
            user_id,
            service_type,
            &self.settings.currency,
            GatewayKind::Stripe,
            now,
        );
        payment.id = Some(self.payments.insert(payment.clone()).await?);

        let base = self.settings.frontend_url.trim_end_matches('/');
        let request = CheckoutRequest {
            order_id: payment.order_id.clone(),
            label: service_type.label(),
            amount_minor: payment.amount,
            currency: payment.currency.clone(),
            service_type: service_type.to_string(),
            customer_email,
            success_url: format!(
                "{}/payment/success?orderId={}&session_id={{CHECKOUT_SESSION_ID}}",
                base, payment.order_id
            ),
            cancel_url: format!("{}/payment/cancel?orderId={}", base, payment.order_id),
        };

        let session = match self.gateway.create_checkout_session(request).await {
            Ok(session) => session,
            Err(e) => {
                if let Err(store_err) = self.payments.mark_failed(payment.order_id.clone(), now).await {
                    error!(
                        "checkout: could not fail order {} after gateway error: {}",
                        payment.order_id, store_err
                    );
                }
                return Err(e.into());
            }
        };

        self.payments
            .attach_gateway_session(payment.order_id.clone(), session.id.clone())
            .await?;

        info!(
            "checkout: order {} ({}) opened for user {}",
            payment.order_id, service_type, user_id
        );

        Ok(CheckoutStarted {
            order_id: payment.order_id,
            session_id: session.id,
            checkout_url: session.url,
            amount: payment.amount,
            currency: payment.currency,
        })
    }

    async fn owned_payment(&self, user_id: ObjectId, order_id: &str) -> LifecycleResult<Payment> {
        let payment = self
            .payments
            .find_by_order_id(order_id.to_string())
            .await?
            .ok_or(LifecycleError::NotFound("Payment"))?;

        if payment.user_id != user_id {
            return Err(LifecycleError::Forbidden(
                "This payment belongs to another user".to_string(),
            ));
        }
        Ok(payment)
    }

    /// Status poll after the redirect back from checkout. A pending payment is
    /// reconciled against the gateway, so a missed webhook still completes it.
    pub async fn refresh_status(
        &self,
        user_id: ObjectId,
        order_id: &str,
        now: DateTime,
    ) -> LifecycleResult<Payment> {
        let payment = self.owned_payment(user_id, order_id).await?;
        if payment.status != PaymentStatus::Pending {
            return Ok(payment);
        }
        let Some(session_id) = payment.gateway_session_id.clone() else {
            return Ok(payment);
        };

        match self.gateway.session_state(session_id).await {
            Ok(SessionState::Paid) => self.premium.complete_payment(order_id, now).await,
            Ok(SessionState::Expired) => {
                self.payments.mark_failed(order_id.to_string(), now).await?;
                info!("checkout: order {} expired at the gateway", order_id);
                self.owned_payment(user_id, order_id).await
            }
            Ok(SessionState::Open) => Ok(payment),
            Err(e) => {
                warn!("checkout: status lookup for {} failed: {}", order_id, e);
                Ok(payment)
            }
        }
    }

    /// Applies a verified gateway event. Unknown orders and repeated deliveries are
    /// acknowledged without effect so the gateway stops retrying.
    pub async fn handle_event(&self, event: &StripeEvent, now: DateTime) -> LifecycleResult<WebhookOutcome> {
        let Some(order_id) = event.order_reference() else {
            debug!("stripe: event {} carries no order reference", event.type_);
            return Ok(WebhookOutcome::Ignored);
        };

        match event.type_.as_str() {
            "checkout.session.completed" | "checkout.session.async_payment_succeeded" => {
                let unpaid = event
                    .data
                    .object
                    .get("payment_status")
                    .and_then(|v| v.as_str())
                    == Some("unpaid");
                if unpaid {
                    // Delayed methods settle later through async_payment_succeeded.
                    return Ok(WebhookOutcome::Ignored);
                }

                match self.premium.complete_payment(&order_id, now).await {
                    Ok(_) => Ok(WebhookOutcome::Completed(order_id)),
                    Err(LifecycleError::NotFound(_)) | Err(LifecycleError::Conflict(_)) => {
                        warn!("stripe: {} for order {} ignored", event.type_, order_id);
                        Ok(WebhookOutcome::Ignored)
                    }
                    Err(e) => Err(e),
                }
            }
            "checkout.session.expired" | "checkout.session.async_payment_failed" => {
                if self.payments.mark_failed(order_id.clone(), now).await? {
                    info!("stripe: order {} failed ({})", order_id, event.type_);
                    Ok(WebhookOutcome::Failed(order_id))
                } else {
                    Ok(WebhookOutcome::Ignored)
                }
            }
            _ => Ok(WebhookOutcome::Ignored),
        }
    }

    /// Development-only shortcut that completes a payment without the gateway.
    pub async fn complete_manually(
        &self,
        user_id: ObjectId,
        order_id: &str,
        now: DateTime,
    ) -> LifecycleResult<Payment> {
        self.owned_payment(user_id, order_id).await?;
        self.premium.complete_payment(order_id, now).await
    }

    /// The owner reports that the content a payment was made for has been submitted.
    pub async fn mark_submitted(&self, user_id: ObjectId, order_id: &str) -> LifecycleResult<Payment> {
        let mut payment = self.owned_payment(user_id, order_id).await?;
        if payment.status != PaymentStatus::Completed {
            return Err(LifecycleError::Conflict(format!(
                "payment {} is {}",
                order_id,
                payment.status.as_str()
            )));
        }

        if payment.awaiting_submission() {
            self.payments
                .set_awaiting_submission(order_id.to_string(), false)
                .await?;
            if let Some(details) = payment.subscription_details.as_mut() {
                details.awaiting_submission = false;
            }
        }
        Ok(payment)
    }

    pub async fn history(&self, user_id: ObjectId) -> LifecycleResult<Vec<Payment>> {
        Ok(self.payments.find_by_user(user_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{MockListingStore, MockPaymentStore};
    use crate::services::stripe::{CheckoutSession, GatewayError, MockPaymentGateway};
    use crate::services::test_support::{at, completed_payment, sample_payment};
    use mockall::predicate::eq;

    fn settings() -> CheckoutSettings {
        CheckoutSettings {
            currency: "usd".into(),
            frontend_url: "http://localhost:5173/".into(),
        }
    }

    fn checkout(
        listings: MockListingStore,
        payments: MockPaymentStore,
        gateway: MockPaymentGateway,
    ) -> CheckoutService<MockListingStore, MockPaymentStore, MockPaymentGateway> {
        CheckoutService::new(Arc::new(listings), Arc::new(payments), Arc::new(gateway), settings())
    }

    fn event(kind: &str, order_id: &str, payment_status: &str) -> StripeEvent {
        serde_json::from_value(serde_json::json!({
            "type": kind,
            "data": { "object": {
                "client_reference_id": order_id,
                "payment_status": payment_status,
            }}
        }))
        .unwrap()
    }

    #[test]
    fn catalogue_lists_every_purchasable_service() {
        let entries = catalogue("usd");
        assert_eq!(entries.len(), 8);
        assert!(entries
            .iter()
            .any(|e| e.service_type == "guide_premium_yearly" && e.duration_days == Some(365)));
        assert!(entries.iter().any(|e| e.service_type == "sponsored_blog" && e.duration_days.is_none()));
    }

    #[tokio::test]
    async fn start_records_pending_payment_and_session() {
        let user = ObjectId::new();

        let mut payments = MockPaymentStore::new();
        payments.expect_find_by_user().returning(|_| Ok(vec![]));
        payments
            .expect_insert()
            .withf(|p| p.status == PaymentStatus::Pending && p.amount == 999)
            .times(1)
            .returning(|_| Ok(ObjectId::new()));
        payments
            .expect_attach_gateway_session()
            .withf(|_, session| session == "cs_test_1")
            .times(1)
            .returning(|_, _| Ok(()));

        let mut gateway = MockPaymentGateway::new();
        gateway
            .expect_create_checkout_session()
            .withf(|req| {
                req.success_url.starts_with("http://localhost:5173/payment/success?orderId=SLX-")
                    && req.amount_minor == 999
            })
            .returning(|_| {
                Ok(CheckoutSession {
                    id: "cs_test_1".into(),
                    url: "https://checkout.stripe.com/c/cs_test_1".into(),
                })
            });

        let started = checkout(MockListingStore::new(), payments, gateway)
            .start(user, None, "vehicle_premium_monthly", at(2024, 1, 1))
            .await
            .unwrap();

        assert!(started.order_id.starts_with("SLX-"));
        assert_eq!(started.checkout_url, "https://checkout.stripe.com/c/cs_test_1");
    }

    #[tokio::test]
    async fn unknown_service_type_is_a_validation_error() {
        let result = checkout(MockListingStore::new(), MockPaymentStore::new(), MockPaymentGateway::new())
            .start(ObjectId::new(), None, "vehicle_premium_weekly", at(2024, 1, 1))
            .await;

        assert!(matches!(
            result,
            Err(LifecycleError::Validation { ref field, .. }) if field == "service_type"
        ));
    }

    #[tokio::test]
    async fn monthly_checkout_blocked_by_active_yearly() {
        let user = ObjectId::new();
        let history = vec![completed_payment(user, "vehicle_premium_yearly", at(2024, 1, 1))];

        let mut payments = MockPaymentStore::new();
        payments
            .expect_find_by_user()
            .returning(move |_| Ok(history.clone()));
        payments.expect_insert().times(0);

        let result = checkout(MockListingStore::new(), payments, MockPaymentGateway::new())
            .start(user, None, "vehicle_premium_monthly", at(2024, 3, 1))
            .await;

        assert!(matches!(result, Err(LifecycleError::Conflict(_))));
    }

    #[tokio::test]
    async fn gateway_failure_fails_the_payment() {
        let mut payments = MockPaymentStore::new();
        payments.expect_find_by_user().returning(|_| Ok(vec![]));
        payments.expect_insert().returning(|_| Ok(ObjectId::new()));
        payments.expect_mark_failed().times(1).returning(|_, _| Ok(true));
        payments.expect_attach_gateway_session().times(0);

        let mut gateway = MockPaymentGateway::new();
        gateway.expect_create_checkout_session().returning(|_| {
            Err(GatewayError::Api {
                status: 500,
                message: "boom".into(),
            })
        });

        let result = checkout(MockListingStore::new(), payments, gateway)
            .start(ObjectId::new(), None, "sponsored_blog", at(2024, 1, 1))
            .await;

        assert!(matches!(result, Err(LifecycleError::Gateway(_))));
    }

    #[tokio::test]
    async fn expired_session_event_fails_pending_payment() {
        let mut payments = MockPaymentStore::new();
        payments
            .expect_mark_failed()
            .with(eq("SLX-1".to_string()), eq(at(2024, 1, 2)))
            .times(1)
            .returning(|_, _| Ok(true));

        let outcome = checkout(MockListingStore::new(), payments, MockPaymentGateway::new())
            .handle_event(&event("checkout.session.expired", "SLX-1", "unpaid"), at(2024, 1, 2))
            .await
            .unwrap();

        assert_eq!(outcome, WebhookOutcome::Failed("SLX-1".into()));
    }

    #[tokio::test]
    async fn unpaid_completion_event_waits_for_async_settlement() {
        let mut payments = MockPaymentStore::new();
        payments.expect_find_by_order_id().times(0);

        let outcome = checkout(MockListingStore::new(), payments, MockPaymentGateway::new())
            .handle_event(&event("checkout.session.completed", "SLX-1", "unpaid"), at(2024, 1, 2))
            .await
            .unwrap();

        assert_eq!(outcome, WebhookOutcome::Ignored);
    }

    #[tokio::test]
    async fn completion_event_for_unknown_order_is_acknowledged() {
        let mut payments = MockPaymentStore::new();
        payments.expect_find_by_order_id().returning(|_| Ok(None));

        let outcome = checkout(MockListingStore::new(), payments, MockPaymentGateway::new())
            .handle_event(&event("checkout.session.completed", "SLX-404", "paid"), at(2024, 1, 2))
            .await
            .unwrap();

        assert_eq!(outcome, WebhookOutcome::Ignored);
    }

    #[tokio::test]
    async fn status_poll_completes_paid_session() {
        let user = ObjectId::new();
        let now = at(2024, 1, 1);
        let mut pending = sample_payment(user, "guide_premium_monthly", PaymentStatus::Pending, now);
        pending.gateway_session_id = Some("cs_paid".into());
        let order_id = pending.order_id.clone();

        let mut completed = pending.clone();
        completed.status = PaymentStatus::Completed;
        completed.completed_at = Some(now);
        completed.subscription_details = pending.completion_details(now);

        let mut payments = MockPaymentStore::new();
        payments
            .expect_find_by_order_id()
            .returning(move |_| Ok(Some(pending.clone())));
        payments
            .expect_mark_completed()
            .times(1)
            .returning(move |_, _, _| Ok(Some(completed.clone())));
        payments.expect_set_awaiting_submission().returning(|_, _| Ok(()));

        let mut listings = MockListingStore::new();
        listings.expect_find_by_owner().returning(|_, _| Ok(vec![]));

        let mut gateway = MockPaymentGateway::new();
        gateway
            .expect_session_state()
            .with(eq("cs_paid".to_string()))
            .returning(|_| Ok(SessionState::Paid));

        let payment = checkout(listings, payments, gateway)
            .refresh_status(user, &order_id, now)
            .await
            .unwrap();

        assert_eq!(payment.status, PaymentStatus::Completed);
    }

    #[tokio::test]
    async fn status_of_someone_elses_order_is_forbidden() {
        let payment = sample_payment(ObjectId::new(), "sponsored_blog", PaymentStatus::Pending, at(2024, 1, 1));
        let order_id = payment.order_id.clone();

        let mut payments = MockPaymentStore::new();
        payments
            .expect_find_by_order_id()
            .returning(move |_| Ok(Some(payment.clone())));

        let mut gateway = MockPaymentGateway::new();
        gateway.expect_session_state().times(0);

        let result = checkout(MockListingStore::new(), payments, gateway)
            .refresh_status(ObjectId::new(), &order_id, at(2024, 1, 1))
            .await;

        assert!(matches!(result, Err(LifecycleError::Forbidden(_))));
    }

    #[tokio::test]
    async fn marking_submitted_clears_the_awaiting_flag() {
        let user = ObjectId::new();
        let blog = completed_payment(user, "sponsored_blog", at(2024, 1, 1));
        assert!(blog.awaiting_submission());
        let order_id = blog.order_id.clone();

        let mut payments = MockPaymentStore::new();
        payments
            .expect_find_by_order_id()
            .returning(move |_| Ok(Some(blog.clone())));
        payments
            .expect_set_awaiting_submission()
            .with(eq(order_id.clone()), eq(false))
            .times(1)
            .returning(|_, _| Ok(()));

        let payment = checkout(MockListingStore::new(), payments, MockPaymentGateway::new())
            .mark_submitted(user, &order_id)
            .await
            .unwrap();

        assert!(!payment.awaiting_submission());
    }
}
