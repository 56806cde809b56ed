use crate::apis::{EventSource, SearchWindow};
use crate::config::TicketmasterConfig;
use crate::constants::TICKETMASTER_PROVIDER;
use crate::error::{GigmapError, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// One raw event as returned by the Discovery v2 `events.json` endpoint.
/// Coordinates come over the wire as strings; anything that does not parse
/// to a number counts as absent.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPayload {
    pub id: String,
    pub name: String,
    #[serde(rename = "type", default)]
    pub event_type: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub locale: Option<String>,
    #[serde(default)]
    pub info: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub location: Option<RawLocation>,
    #[serde(default)]
    pub dates: Option<RawDates>,
    #[serde(default)]
    pub sales: Option<RawSales>,
    #[serde(default)]
    pub classifications: Vec<RawClassification>,
    #[serde(default)]
    pub price_ranges: Vec<RawPriceRange>,
    #[serde(default)]
    pub images: Vec<RawImage>,
    #[serde(rename = "_embedded", default)]
    pub embedded: Option<RawEmbedded>,
}

impl EventPayload {
    /// The payload's primary venue, when one is embedded.
    pub fn venue(&self) -> Option<&RawVenue> {
        self.embedded.as_ref().and_then(|e| e.venues.first())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEmbedded {
    #[serde(default)]
    pub venues: Vec<RawVenue>,
    #[serde(default)]
    pub attractions: Vec<RawAttraction>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawVenue {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub postal_code: Option<String>,
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub city: Option<RawNamed>,
    #[serde(default)]
    pub country: Option<RawCountry>,
    #[serde(default)]
    pub address: Option<RawAddress>,
    #[serde(default)]
    pub location: Option<RawLocation>,
    #[serde(default)]
    pub markets: Vec<RawMarket>,
    #[serde(default)]
    pub ada: Option<RawAda>,
}

impl RawVenue {
    pub fn address_line(&self) -> Option<&str> {
        self.address
            .as_ref()
            .and_then(|a| a.line1.as_deref())
            .filter(|line| !line.trim().is_empty())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawAddress {
    #[serde(default)]
    pub line1: Option<String>,
    #[serde(default)]
    pub line2: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawNamed {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawCountry {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub country_code: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawLocation {
    #[serde(default)]
    pub latitude: Option<String>,
    #[serde(default)]
    pub longitude: Option<String>,
}

impl RawLocation {
    /// Both coordinates, provided each parses to a number.
    pub fn numeric(&self) -> Option<(f64, f64)> {
        let lat = self.latitude.as_deref()?.trim().parse::<f64>().ok()?;
        let lng = self.longitude.as_deref()?.trim().parse::<f64>().ok()?;
        Some((lat, lng))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawMarket {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawAda {
    #[serde(default)]
    pub ada_phones: Option<String>,
    #[serde(default)]
    pub ada_custom_copy: Option<String>,
    #[serde(default)]
    pub ada_hours: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawClassification {
    #[serde(default)]
    pub segment: Option<RawNamed>,
    #[serde(default)]
    pub genre: Option<RawNamed>,
    #[serde(default)]
    pub sub_genre: Option<RawNamed>,
    #[serde(rename = "type", default)]
    pub class_type: Option<RawNamed>,
    #[serde(default)]
    pub sub_type: Option<RawNamed>,
    #[serde(default)]
    pub primary: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPriceRange {
    #[serde(rename = "type", default)]
    pub price_type: Option<String>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawImage {
    #[serde(default)]
    pub ratio: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub fallback: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawAttraction {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub aliases: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSales {
    #[serde(default)]
    pub public: Option<RawPublicSale>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPublicSale {
    #[serde(default)]
    pub start_date_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_date_time: Option<DateTime<Utc>>,
    #[serde(rename = "startTBD", default)]
    pub start_tbd: bool,
    #[serde(rename = "startTBA", default)]
    pub start_tba: bool,
    #[serde(rename = "endTBD", default)]
    pub end_tbd: bool,
    #[serde(rename = "endTBA", default)]
    pub end_tba: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawDates {
    #[serde(default)]
    pub start: Option<RawDateStart>,
    #[serde(default)]
    pub end: Option<RawDateEnd>,
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub status: Option<RawStatus>,
    #[serde(default)]
    pub span_multiple_days: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawDateStart {
    #[serde(default)]
    pub local_date: Option<NaiveDate>,
    #[serde(default)]
    pub local_time: Option<String>,
    #[serde(default)]
    pub date_time: Option<DateTime<Utc>>,
    #[serde(rename = "dateTBD", default)]
    pub date_tbd: bool,
    #[serde(rename = "dateTBA", default)]
    pub date_tba: bool,
    #[serde(rename = "timeTBA", default)]
    pub time_tba: bool,
    #[serde(default)]
    pub no_specific_time: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawDateEnd {
    #[serde(default)]
    pub local_time: Option<String>,
    #[serde(default)]
    pub date_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub approximate: bool,
    #[serde(default)]
    pub no_specific_time: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawStatus {
    #[serde(default)]
    pub code: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DiscoveryResponse {
    #[serde(rename = "_embedded", default)]
    embedded: Option<DiscoveryEmbedded>,
    #[serde(default)]
    page: Option<PageDescriptor>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DiscoveryEmbedded {
    #[serde(default)]
    events: Vec<EventPayload>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageDescriptor {
    #[serde(default)]
    total_elements: u64,
    #[serde(default)]
    total_pages: u32,
}

/// Discovery v2 client. Config is injected at construction; nothing here
/// reads the process environment.
pub struct TicketmasterClient {
    client: reqwest::Client,
    config: TicketmasterConfig,
}

impl TicketmasterClient {
    pub fn new(config: TicketmasterConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(GigmapError::Config(
                "TICKETMASTER_API_KEY is not set".to_string(),
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;
        Ok(Self { client, config })
    }

    /// Instants go out as ISO8601 with a trailing 'Z' and whole seconds,
    /// which is the only shape the Discovery API accepts.
    fn format_instant(instant: &DateTime<Utc>) -> String {
        instant.format("%Y-%m-%dT%H:%M:%SZ").to_string()
    }

    fn query_params(&self, window: &SearchWindow, page: u32, size: u32) -> Vec<(String, String)> {
        vec![
            ("apikey".to_string(), self.config.api_key.clone()),
            ("countryCode".to_string(), window.country_code.clone()),
            ("city".to_string(), window.city.clone()),
            (
                "classificationName".to_string(),
                window.event_type.clone(),
            ),
            ("size".to_string(), size.to_string()),
            ("page".to_string(), page.to_string()),
            ("sort".to_string(), "date,asc".to_string()),
            (
                "startDateTime".to_string(),
                Self::format_instant(&window.start),
            ),
            (
                "endDateTime".to_string(),
                Self::format_instant(&window.end),
            ),
        ]
    }

    fn log_rate_limit(headers: &reqwest::header::HeaderMap) {
        let remaining = headers
            .get("rate-limit-available")
            .and_then(|v| v.to_str().ok());
        let limit = headers.get("rate-limit").and_then(|v| v.to_str().ok());
        if let (Some(remaining), Some(limit)) = (remaining, limit) {
            debug!("Rate limit: {}/{} requests remaining", remaining, limit);
        }
    }

    async fn request(
        &self,
        window: &SearchWindow,
        page: u32,
        size: u32,
    ) -> Result<DiscoveryResponse> {
        let response = self
            .client
            .get(&self.config.base_url)
            .query(&self.query_params(window, page, size))
            .send()
            .await?;

        Self::log_rate_limit(response.headers());

        let response = response.error_for_status()?;
        Ok(response.json::<DiscoveryResponse>().await?)
    }

    /// Repeats the request up to the configured attempt budget with a fixed
    /// delay between attempts, returning the last error on exhaustion.
    async fn request_with_retry(
        &self,
        window: &SearchWindow,
        page: u32,
        size: u32,
    ) -> Result<DiscoveryResponse> {
        let attempts = self.config.fetch_attempts.max(1);
        let mut last_error = None;
        for attempt in 1..=attempts {
            match self.request(window, page, size).await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    warn!(
                        "Ticketmaster request failed (attempt {}/{}): {}",
                        attempt, attempts, e
                    );
                    last_error = Some(e);
                    if attempt < attempts {
                        tokio::time::sleep(Duration::from_millis(self.config.retry_delay_ms))
                            .await;
                    }
                }
            }
        }
        Err(last_error.unwrap_or_else(|| GigmapError::Source {
            message: "request failed with no recorded error".to_string(),
        }))
    }
}

#[async_trait::async_trait]
impl EventSource for TicketmasterClient {
    fn provider(&self) -> &'static str {
        TICKETMASTER_PROVIDER
    }

    fn page_size(&self) -> u32 {
        self.config.page_size
    }

    /// Probes with size=1 and reads the page descriptor's element count.
    #[instrument(skip(self, window), fields(city = %window.city))]
    async fn count(&self, window: &SearchWindow) -> Result<u64> {
        let response = self.request_with_retry(window, 0, 1).await?;
        let page = response.page.ok_or_else(|| GigmapError::Source {
            message: "count response carried no page descriptor".to_string(),
        })?;
        debug!(
            "Window matches {} events across {} pages",
            page.total_elements, page.total_pages
        );
        Ok(page.total_elements)
    }

    #[instrument(skip(self, window), fields(city = %window.city, page = page))]
    async fn fetch_page(&self, window: &SearchWindow, page: u32) -> Vec<EventPayload> {
        match self
            .request_with_retry(window, page, self.config.page_size)
            .await
        {
            Ok(response) => {
                let events = response.embedded.unwrap_or_default().events;
                info!("Fetched {} events from page {}", events.len(), page);
                events
            }
            Err(e) => {
                // Retry budget spent. Skip this page; the rest of the run
                // carries on.
                warn!("Giving up on page {} after retries: {}", page, e);
                Vec::new()
            }
        }
    }
}
