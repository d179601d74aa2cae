use std::sync::Arc;

use mongodb::bson::{oid::ObjectId, DateTime};
use validator::Validate;

use super::error::{LifecycleError, LifecycleResult};
use super::premium::PremiumService;
use super::review;
use crate::db::{ListingStore, PaymentStore};
use crate::models::{
    image_allowance, CreateListingDto, Listing, ListingCategory, ListingContentUpdate,
    ListingDetails, TelemetryCounter, UpdateListingDto,
};
use crate::utils::validate_image_url;

fn check_images(images: &[String], premium: bool) -> LifecycleResult<()> {
    if let Some(bad) = images.iter().find(|url| !validate_image_url(url)) {
        return Err(LifecycleError::validation(
            "images",
            format!("Invalid image URL: {}", bad),
        ));
    }

    let allowed = image_allowance(premium);
    if images.len() > allowed {
        let hint = if premium { "" } else { ", upgrade to premium for more" };
        return Err(LifecycleError::validation(
            "images",
            format!("At most {} image(s) allowed{}", allowed, hint),
        ));
    }
    Ok(())
}

fn check_details(category: ListingCategory, details: &ListingDetails) -> LifecycleResult<()> {
    if details.category() != category {
        return Err(LifecycleError::validation(
            "details",
            format!("Details must describe a {} listing", category.as_str()),
        ));
    }
    details.validate_fields()?;
    Ok(())
}

/// Owner-facing operations on submissions of every category.
pub struct ListingService<L, P>
where
    L: ListingStore + 'static,
    P: PaymentStore + 'static,
{
    listings: Arc<L>,
    payments: Arc<P>,
    premium: PremiumService<L, P>,
}

impl<L, P> ListingService<L, P>
where
    L: ListingStore + 'static,
    P: PaymentStore + 'static,
{
    pub fn new(listings: Arc<L>, payments: Arc<P>) -> Self {
        let premium = PremiumService::new(listings.clone(), payments.clone());
        Self {
            listings,
            payments,
            premium,
        }
    }

    /// New submissions always start pending; an already paid plan is applied on creation.
    pub async fn create(
        &self,
        owner: ObjectId,
        category: ListingCategory,
        dto: CreateListingDto,
        now: DateTime,
    ) -> LifecycleResult<Listing> {
        dto.validate()?;
        check_details(category, &dto.details)?;

        let mut listing = Listing::new_submission(owner, dto, now);
        let settled = self.premium.apply_to_new_listing(&mut listing, now).await?;
        check_images(&listing.images, listing.is_premium_effective(now))?;

        let id = self.listings.insert(listing.clone()).await?;
        listing.id = Some(id);

        info!(
            "listings: {} listing {} submitted by {}",
            category.as_str(),
            id,
            owner
        );

        // The listing already carries the premium fields; a stale flag only costs a reminder.
        for order_id in settled {
            if let Err(e) = self
                .payments
                .set_awaiting_submission(order_id.clone(), false)
                .await
            {
                warn!(
                    "listings: could not clear awaiting flag of order {}: {}",
                    order_id, e
                );
            }
        }

        Ok(listing)
    }

    pub async fn my_submissions(
        &self,
        owner: ObjectId,
        category: ListingCategory,
    ) -> LifecycleResult<Vec<Listing>> {
        Ok(self.listings.find_by_owner(category, owner).await?)
    }

    pub async fn get(
        &self,
        category: ListingCategory,
        id: ObjectId,
        viewer: Option<&ObjectId>,
    ) -> LifecycleResult<Listing> {
        let listing = self
            .listings
            .find_by_id(category, id)
            .await?
            .ok_or(LifecycleError::NotFound("Listing"))?;

        if !review::visible_to(&listing, viewer) {
            return Err(LifecycleError::NotFound("Listing"));
        }
        Ok(listing)
    }

    async fn owned(
        &self,
        owner: ObjectId,
        category: ListingCategory,
        id: ObjectId,
    ) -> LifecycleResult<Listing> {
        let listing = self
            .listings
            .find_by_id(category, id)
            .await?
            .ok_or(LifecycleError::NotFound("Listing"))?;

        if !listing.is_owned_by(&owner) {
            return Err(LifecycleError::Forbidden(
                "You can only manage your own listings".to_string(),
            ));
        }
        Ok(listing)
    }

    /// Content edits. A rejected listing goes back to pending when edited.
    pub async fn update(
        &self,
        owner: ObjectId,
        category: ListingCategory,
        id: ObjectId,
        dto: UpdateListingDto,
        now: DateTime,
    ) -> LifecycleResult<Listing> {
        dto.validate()?;
        let listing = self.owned(owner, category, id).await?;

        if let Some(details) = &dto.details {
            check_details(category, details)?;
        }
        if let Some(images) = &dto.images {
            check_images(images, listing.is_premium_effective(now))?;
        }

        let update = ListingContentUpdate {
            title: dto.title.map(|title| title.trim().to_string()),
            description: dto.description,
            images: dto.images,
            details: dto.details,
            resubmit: review::resubmits(listing.status),
        };

        let applied = self
            .listings
            .update_content(category, id, update, now)
            .await?;
        if !applied {
            return Err(LifecycleError::NotFound("Listing"));
        }

        if review::resubmits(listing.status) {
            info!("listings: {} listing {} resubmitted for review", category.as_str(), id);
        }

        self.listings
            .find_by_id(category, id)
            .await?
            .ok_or(LifecycleError::NotFound("Listing"))
    }

    pub async fn delete(
        &self,
        owner: ObjectId,
        category: ListingCategory,
        id: ObjectId,
    ) -> LifecycleResult<()> {
        self.owned(owner, category, id).await?;

        if !self.listings.delete(category, id).await? {
            return Err(LifecycleError::NotFound("Listing"));
        }
        info!("listings: {} listing {} deleted by {}", category.as_str(), id, owner);
        Ok(())
    }

    /// Views and inquiries are only tracked while the listing is effectively premium.
    /// Returns whether the interaction was counted.
    pub async fn record_interaction(
        &self,
        category: ListingCategory,
        id: ObjectId,
        counter: TelemetryCounter,
        now: DateTime,
    ) -> LifecycleResult<bool> {
        let listing = self
            .listings
            .find_by_id(category, id)
            .await?
            .ok_or(LifecycleError::NotFound("Listing"))?;

        if !review::visible_to(&listing, None) {
            return Err(LifecycleError::NotFound("Listing"));
        }
        if !(listing.analytics_enabled && listing.is_premium_effective(now)) {
            return Ok(false);
        }

        self.listings.increment_counter(category, id, counter).await?;
        Ok(true)
    }

    pub fn premium(&self) -> &PremiumService<L, P> {
        &self.premium
    }
}
