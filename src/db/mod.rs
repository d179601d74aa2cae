pub mod listings;
pub mod payments;

use mongodb::bson::doc;
use mongodb::options::IndexOptions;
use mongodb::{Client, Database, IndexModel};
use rocket::fairing::AdHoc;
use thiserror::Error;

use crate::models::{ListingCategory, Payment, User};

pub use listings::{ListingStore, MongoListingStore};
pub use payments::{MongoPaymentStore, PaymentStore};

#[cfg(test)]
pub use listings::MockListingStore;
#[cfg(test)]
pub use payments::MockPaymentStore;

pub fn init() -> AdHoc {
    AdHoc::on_ignite("MongoDB", |rocket| async {
        match connect().await {
            Ok(database) => {
                info!("✓ MongoDB connected successfully");
                rocket.manage(database)
            }
            Err(e) => {
                error!("✗ Failed to connect to MongoDB: {}", e);
                rocket
            }
        }
    })
}

async fn connect() -> Result<Database, mongodb::error::Error> {
    let uri = crate::config::Config::mongodb_uri();
    let client = Client::with_uri_str(&uri).await?;

    // Test connection
    client
        .database("admin")
        .run_command(doc! {"ping": 1}, None)
        .await?;

    let database = client.database(&crate::config::Config::database_name());
    ensure_indexes(&database).await?;
    Ok(database)
}

async fn ensure_indexes(db: &Database) -> Result<(), mongodb::error::Error> {
    let unique = || IndexOptions::builder().unique(true).build();

    db.collection::<User>("users")
        .create_index(
            IndexModel::builder().keys(doc! { "email": 1 }).options(unique()).build(),
            None,
        )
        .await?;

    let payments = db.collection::<Payment>("payments");
    payments
        .create_index(
            IndexModel::builder().keys(doc! { "order_id": 1 }).options(unique()).build(),
            None,
        )
        .await?;
    payments
        .create_index(
            IndexModel::builder().keys(doc! { "user_id": 1, "created_at": -1 }).build(),
            None,
        )
        .await?;

    for category in ListingCategory::ALL {
        db.collection::<mongodb::bson::Document>(category.collection())
            .create_index(
                IndexModel::builder().keys(doc! { "owner_id": 1 }).build(),
                None,
            )
            .await?;
        db.collection::<mongodb::bson::Document>(category.collection())
            .create_index(
                IndexModel::builder().keys(doc! { "status": 1, "submitted_at": 1 }).build(),
                None,
            )
            .await?;
    }

    Ok(())
}

pub type DbConn = Database;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Mongo(#[from] mongodb::error::Error),
    #[error("failed to encode document: {0}")]
    Encode(#[from] mongodb::bson::ser::Error),
    #[error("unexpected document: {0}")]
    Invalid(String),
}

pub type StoreResult<T> = Result<T, StoreError>;
