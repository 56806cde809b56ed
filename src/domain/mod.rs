use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A latitude/longitude pair. Every persisted Event carries one; an event
/// whose point cannot be resolved is dropped before the write.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// True when the point lies inside the (inclusive) bounding box.
    pub fn within(&self, min_lat: f64, max_lat: f64, min_lng: f64, max_lng: f64) -> bool {
        self.latitude >= min_lat
            && self.latitude <= max_lat
            && self.longitude >= min_lng
            && self.longitude <= max_lng
    }
}

/// Where a record came from: the provider name plus the provider's native ID.
/// Used to keep re-ingestion idempotent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceTag {
    pub provider: String,
    pub provider_id: String,
}

/// Canonical normalized listing persisted for querying. Sub-entities are
/// referenced by ID and joined at read time into an [`EventView`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    #[serde(default)]
    pub id: Option<Uuid>,
    pub name: String,
    #[serde(rename = "type", default)]
    pub event_type: Option<String>,
    pub description: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub locale: Option<String>,
    pub location: GeoPoint,
    pub source: SourceTag,
    pub venue_id: Uuid,
    pub sales_window_id: Uuid,
    pub date_window_id: Uuid,
    #[serde(default)]
    pub classification_ids: Vec<Uuid>,
    #[serde(default)]
    pub image_ids: Vec<Uuid>,
    #[serde(default)]
    pub price_range_ids: Vec<Uuid>,
    #[serde(default)]
    pub attraction_ids: Vec<Uuid>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

/// A venue. Deduplicated by (name, geographic point): an existing venue
/// matching that pair is updated in place, never duplicated.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Venue {
    #[serde(default)]
    pub id: Option<Uuid>,
    pub name: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub postal_code: Option<String>,
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    pub location: GeoPoint,
    #[serde(default)]
    pub markets: Vec<Market>,
    #[serde(default)]
    pub ada: Option<AdaInfo>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Market {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdaInfo {
    #[serde(default)]
    pub ada_phones: Option<String>,
    #[serde(default)]
    pub ada_custom_copy: Option<String>,
    #[serde(default)]
    pub ada_hours: Option<String>,
}

/// Taxonomy tuple. Deduplicated by exact (segment, genre, subGenre) match
/// and shared across events.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    #[serde(default)]
    pub id: Option<Uuid>,
    #[serde(default)]
    pub segment: Option<String>,
    #[serde(default)]
    pub genre: Option<String>,
    #[serde(default)]
    pub sub_genre: Option<String>,
    #[serde(rename = "type", default)]
    pub class_type: Option<String>,
    #[serde(default)]
    pub sub_type: Option<String>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl Classification {
    /// The dedup key: exact match on segment/genre/subGenre.
    pub fn dedup_key(&self) -> (Option<&str>, Option<&str>, Option<&str>) {
        (
            self.segment.as_deref(),
            self.genre.as_deref(),
            self.sub_genre.as_deref(),
        )
    }
}

/// An image attached to an event. Deduplicated by URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Image {
    #[serde(default)]
    pub id: Option<Uuid>,
    #[serde(default)]
    pub ratio: Option<String>,
    pub url: String,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub fallback: bool,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

/// Public on-sale window for one event. Owned by exactly one event and
/// always freshly created, never deduplicated.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SalesWindow {
    #[serde(default)]
    pub id: Option<Uuid>,
    #[serde(default)]
    pub start_date_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_date_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub start_tbd: bool,
    #[serde(default)]
    pub start_tba: bool,
    #[serde(default)]
    pub end_tbd: bool,
    #[serde(default)]
    pub end_tba: bool,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

/// When the event itself takes place. Owned by exactly one event and always
/// freshly created.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DateWindow {
    #[serde(default)]
    pub id: Option<Uuid>,
    #[serde(default)]
    pub start_local_date: Option<NaiveDate>,
    #[serde(default)]
    pub start_local_time: Option<String>,
    #[serde(default)]
    pub start_date_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub date_tbd: bool,
    #[serde(default)]
    pub date_tba: bool,
    #[serde(default)]
    pub time_tba: bool,
    #[serde(default)]
    pub no_specific_time: bool,
    #[serde(default)]
    pub end_local_time: Option<String>,
    #[serde(default)]
    pub end_date_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub approximate: bool,
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub span_multiple_days: bool,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

/// A price range. Only created when both bounds are present in the payload;
/// entries missing a bound are dropped, never stored as placeholders.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceRange {
    #[serde(default)]
    pub id: Option<Uuid>,
    #[serde(rename = "type", default)]
    pub price_type: Option<String>,
    #[serde(default)]
    pub currency: Option<String>,
    pub min: f64,
    pub max: f64,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

/// A performer or attraction. Deduplicated by exact name match.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attraction {
    #[serde(default)]
    pub id: Option<Uuid>,
    pub name: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

/// A payload the normalizer refused because its venue or address was
/// missing. Kept in a side collection so the listing is not silently lost;
/// never returned by event queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewRecord {
    #[serde(default)]
    pub id: Option<Uuid>,
    pub provider_event_id: String,
    pub name: String,
    #[serde(default)]
    pub url: Option<String>,
    pub reason: String,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

/// A user profile managed by the CRUD surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(default)]
    pub id: Option<Uuid>,
    pub name: String,
    pub email: String,
    pub location: GeoPoint,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

/// Partial update for a profile; absent fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub location: Option<GeoPoint>,
    #[serde(default)]
    pub bio: Option<String>,
}

/// An event with every sub-entity joined inline, as served to the map
/// front-end.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventView {
    pub id: Uuid,
    pub name: String,
    #[serde(rename = "type", default)]
    pub event_type: Option<String>,
    pub description: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub locale: Option<String>,
    pub location: GeoPoint,
    pub source: SourceTag,
    #[serde(default)]
    pub venue: Option<Venue>,
    #[serde(default)]
    pub sales_window: Option<SalesWindow>,
    #[serde(default)]
    pub date_window: Option<DateWindow>,
    #[serde(default)]
    pub classifications: Vec<Classification>,
    #[serde(default)]
    pub images: Vec<Image>,
    #[serde(default)]
    pub price_ranges: Vec<PriceRange>,
    #[serde(default)]
    pub attractions: Vec<Attraction>,
}
