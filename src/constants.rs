//! Provider and policy constants shared across the ingestion pipeline.

// Source tag recorded on every ingested Event Record
pub const TICKETMASTER_PROVIDER: &str = "ticketmaster";

// Max allowed per Ticketmaster's Discovery API
pub const DEFAULT_PAGE_SIZE: u32 = 200;

// Hard cap on pages per ingestion window; beyond this the whole window is
// refused with a refine-your-filters signal instead of ingesting a slice
pub const DEFAULT_MAX_PAGES: u32 = 4;

// The backfill scheduler walks this many one-week windows
pub const BACKFILL_WEEKS: u32 = 8;

// Per-page fetch attempts before the page is skipped
pub const DEFAULT_FETCH_ATTEMPTS: u32 = 3;

// Fixed delay between fetch attempts
pub const DEFAULT_RETRY_DELAY_MS: u64 = 2_000;

// Permits for the normalization worker pool
pub const DEFAULT_NORMALIZE_CONCURRENCY: usize = 8;

pub const DEFAULT_TICKETMASTER_BASE_URL: &str =
    "https://app.ticketmaster.com/discovery/v2/events.json";

pub const DEFAULT_NOMINATIM_BASE_URL: &str = "https://nominatim.openstreetmap.org/search";

// Default HTTP port, matching the front-end's expectation
pub const DEFAULT_SERVER_PORT: u16 = 4000;
