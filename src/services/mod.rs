pub mod checkout;
pub mod error;
pub mod jwt;
pub mod listings;
pub mod premium;
pub mod reminders;
pub mod review;
pub mod stripe;

#[cfg(test)]
pub mod test_support;

pub use checkout::CheckoutService;
pub use error::LifecycleError;
pub use jwt::JwtService;
pub use listings::ListingService;
pub use review::ReviewService;
pub use stripe::StripeService;
