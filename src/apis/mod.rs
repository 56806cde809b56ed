pub mod geocode;
pub mod ticketmaster;

use crate::error::Result;
use chrono::{DateTime, Duration, Utc};

pub use ticketmaster::EventPayload;

/// One ingestion request: a city/country/type filter over a date range.
#[derive(Debug, Clone)]
pub struct SearchWindow {
    pub country_code: String,
    pub city: String,
    pub event_type: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl SearchWindow {
    /// A one-week window beginning at `start`.
    pub fn week_from(
        country_code: &str,
        city: &str,
        event_type: &str,
        start: DateTime<Utc>,
    ) -> Self {
        Self {
            country_code: country_code.to_string(),
            city: city.to_string(),
            event_type: event_type.to_string(),
            start,
            end: start + Duration::weeks(1),
        }
    }
}

/// Paginated source of raw event payloads. The production implementation is
/// the Ticketmaster Discovery client; tests substitute fakes.
#[async_trait::async_trait]
pub trait EventSource: Send + Sync {
    /// Provider name recorded on every ingested event.
    fn provider(&self) -> &'static str;

    /// How many payloads one page holds.
    fn page_size(&self) -> u32;

    /// Total number of events matching the window, per the provider.
    /// Retries on the configured budget before giving up.
    async fn count(&self, window: &SearchWindow) -> Result<u64>;

    /// One page of raw payloads. Exhausted retries yield an empty page, not
    /// an error: a failed page is skipped, the rest of the run continues.
    async fn fetch_page(&self, window: &SearchWindow, page: u32) -> Vec<EventPayload>;
}
