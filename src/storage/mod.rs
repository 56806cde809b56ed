pub mod in_memory;
#[cfg(feature = "db")]
pub mod libsql;

pub use in_memory::InMemoryStorage;
#[cfg(feature = "db")]
pub use libsql::LibsqlStorage;

use crate::domain::{
    Attraction, Classification, DateWindow, Event, Image, PriceRange, ProfileUpdate,
    ReviewRecord, SalesWindow, UserProfile, Venue,
};
use crate::error::Result;
use async_trait::async_trait;
use uuid::Uuid;

/// Persistence boundary for event records and their sub-entities.
///
/// The `find_or_create_*` and `upsert_*` operations are atomic per
/// collection: concurrent normalizations racing on the same dedup key
/// observe a single record. Dedup keys: venues (name, point),
/// classifications (segment, genre, subGenre), images (url),
/// attractions (name). Sales and date windows are owned per event and only
/// ever created.
#[async_trait]
pub trait Storage: Send + Sync {
    // Venues
    /// Insert or update in place, matching on (name, latitude, longitude).
    /// Sets `venue.id` to the surviving record's ID.
    async fn upsert_venue(&self, venue: &mut Venue) -> Result<()>;
    async fn get_venue(&self, id: Uuid) -> Result<Option<Venue>>;

    // Classifications
    /// Reuse the record matching the dedup key, else insert. Sets the ID.
    async fn find_or_create_classification(
        &self,
        classification: &mut Classification,
    ) -> Result<()>;
    async fn get_classification(&self, id: Uuid) -> Result<Option<Classification>>;

    // Images
    async fn find_or_create_image(&self, image: &mut Image) -> Result<()>;
    async fn get_image(&self, id: Uuid) -> Result<Option<Image>>;

    // Attractions
    async fn find_or_create_attraction(&self, attraction: &mut Attraction) -> Result<()>;
    async fn get_attraction(&self, id: Uuid) -> Result<Option<Attraction>>;

    // Sales and date windows
    async fn create_sales_window(&self, window: &mut SalesWindow) -> Result<()>;
    async fn get_sales_window(&self, id: Uuid) -> Result<Option<SalesWindow>>;
    async fn create_date_window(&self, window: &mut DateWindow) -> Result<()>;
    async fn get_date_window(&self, id: Uuid) -> Result<Option<DateWindow>>;

    // Price ranges
    async fn create_price_range(&self, range: &mut PriceRange) -> Result<()>;
    async fn get_price_range(&self, id: Uuid) -> Result<Option<PriceRange>>;

    // Events
    async fn create_event(&self, event: &mut Event) -> Result<()>;
    /// Bulk upsert matching on (name, latitude, longitude), so re-ingesting
    /// a window updates rather than duplicates. Returns the number written.
    async fn upsert_events(&self, events: &mut [Event]) -> Result<usize>;
    async fn get_event(&self, id: Uuid) -> Result<Option<Event>>;
    async fn get_events(&self) -> Result<Vec<Event>>;

    // Review records for payloads the normalizer refused
    async fn create_review_record(&self, record: &mut ReviewRecord) -> Result<()>;
    async fn get_review_records(&self) -> Result<Vec<ReviewRecord>>;

    // Profiles
    /// Fails with a store error when the email is already taken.
    async fn create_profile(&self, profile: &mut UserProfile) -> Result<()>;
    async fn get_profile(&self, id: Uuid) -> Result<Option<UserProfile>>;
    async fn update_profile(
        &self,
        id: Uuid,
        update: ProfileUpdate,
    ) -> Result<Option<UserProfile>>;
    async fn delete_profile(&self, id: Uuid) -> Result<bool>;

    /// Administrative wipe: deletes every row in every collection.
    /// Irreversible; intended as a pre-ingestion reset.
    async fn clear_all(&self) -> Result<()>;
}
