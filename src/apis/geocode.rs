use crate::config::GeocoderConfig;
use crate::domain::GeoPoint;
use crate::error::Result;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

/// Address parts to resolve. Any subset may be absent; the non-empty parts
/// are joined into one free-text query.
#[derive(Debug, Clone, Default)]
pub struct AddressQuery {
    pub address: Option<String>,
    pub postal_code: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
}

impl AddressQuery {
    pub fn to_query_string(&self) -> String {
        [
            self.address.as_deref(),
            self.postal_code.as_deref(),
            self.city.as_deref(),
            self.country.as_deref(),
        ]
        .iter()
        .filter_map(|part| *part)
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
    }
}

/// Fallback coordinate resolution for events whose source payload carries no
/// usable point. Failures are swallowed and logged: the caller sees "no
/// coordinates available", never an error.
#[async_trait::async_trait]
pub trait Geocoder: Send + Sync {
    async fn lookup(&self, query: &AddressQuery) -> Option<GeoPoint>;
}

#[derive(Debug, Deserialize)]
struct NominatimPlace {
    lat: String,
    lon: String,
}

/// Nominatim-backed geocoder. Config is injected at construction.
pub struct NominatimGeocoder {
    client: reqwest::Client,
    config: GeocoderConfig,
}

impl NominatimGeocoder {
    pub fn new(config: GeocoderConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;
        Ok(Self { client, config })
    }

    async fn search(&self, q: &str) -> Result<Vec<NominatimPlace>> {
        let response = self
            .client
            .get(&self.config.base_url)
            .query(&[
                ("q", q),
                ("format", "json"),
                ("addressdetails", "1"),
                ("limit", "1"),
            ])
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }
}

#[async_trait::async_trait]
impl Geocoder for NominatimGeocoder {
    async fn lookup(&self, query: &AddressQuery) -> Option<GeoPoint> {
        let q = query.to_query_string();
        if q.is_empty() {
            return None;
        }

        let places = match self.search(&q).await {
            Ok(places) => places,
            Err(e) => {
                warn!("Geocoding lookup failed for '{}': {}", q, e);
                return None;
            }
        };

        let first = places.first()?;
        let latitude = first.lat.parse::<f64>().ok()?;
        let longitude = first.lon.parse::<f64>().ok()?;
        debug!("Geocoded '{}' to ({}, {})", q, latitude, longitude);
        Some(GeoPoint::new(latitude, longitude))
    }
}
