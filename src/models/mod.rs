pub mod user;
pub mod listing;
pub mod payment;

pub use user::*;
pub use listing::*;
pub use payment::*;

use mongodb::bson::DateTime;

/// RFC 3339 rendering used in JSON responses.
pub fn iso(at: DateTime) -> String {
    at.try_to_rfc3339_string()
        .unwrap_or_else(|_| at.timestamp_millis().to_string())
}
