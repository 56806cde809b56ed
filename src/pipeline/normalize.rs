use crate::apis::geocode::{AddressQuery, Geocoder};
use crate::apis::ticketmaster::{EventPayload, RawVenue};
use crate::apis::SearchWindow;
use crate::domain::{
    AdaInfo, Attraction, Classification, DateWindow, Event, GeoPoint, Image, Market,
    PriceRange, ReviewRecord, SalesWindow, SourceTag, Venue,
};
use crate::error::Result;
use crate::storage::Storage;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

const NO_DESCRIPTION: &str = "No description available";

/// Maps one raw provider payload into a ready-to-persist [`Event`] draft,
/// resolving sub-entities find-or-create against the store. Returns
/// `Ok(None)` for payloads that fail the venue/address/coordinate gates;
/// those are rejections, not errors.
pub struct Normalizer {
    storage: Arc<dyn Storage>,
    geocoder: Arc<dyn Geocoder>,
    provider: String,
}

impl Normalizer {
    pub fn new(storage: Arc<dyn Storage>, geocoder: Arc<dyn Geocoder>, provider: &str) -> Self {
        Self {
            storage,
            geocoder,
            provider: provider.to_string(),
        }
    }

    #[instrument(skip(self, payload, window), fields(provider_id = %payload.id))]
    pub async fn normalize(
        &self,
        payload: &EventPayload,
        window: &SearchWindow,
    ) -> Result<Option<Event>> {
        // Gate 1: a venue with a primary address line must be present.
        let Some(venue_payload) = payload.venue().cloned() else {
            debug!("Rejecting {}: no venue", payload.id);
            self.record_review(payload, "missing venue").await;
            return Ok(None);
        };
        let Some(address_line) = venue_payload.address_line().map(str::to_string) else {
            debug!("Rejecting {}: no address line", payload.id);
            self.record_review(payload, "missing address line").await;
            return Ok(None);
        };

        // Gate 2: a numeric point must be resolvable. Event coordinates win,
        // then venue coordinates, then a geocode of the venue address.
        let Some(point) = self
            .resolve_point(payload, &venue_payload, &address_line, window)
            .await
        else {
            debug!("Rejecting {}: no resolvable coordinates", payload.id);
            return Ok(None);
        };

        let classification_ids = self.resolve_classifications(payload).await?;
        let venue_id = self
            .persist_venue(&venue_payload, &address_line, point, window)
            .await?;
        let sales_window_id = self.persist_sales_window(payload).await?;
        let date_window_id = self.persist_date_window(payload).await?;
        let image_ids = self.resolve_images(payload).await?;
        let price_range_ids = self.persist_price_ranges(payload).await?;
        let attraction_ids = self.resolve_attractions(payload).await?;

        let description = payload
            .info
            .clone()
            .or_else(|| payload.description.clone())
            .unwrap_or_else(|| NO_DESCRIPTION.to_string());

        Ok(Some(Event {
            id: None,
            name: payload.name.clone(),
            event_type: payload.event_type.clone(),
            description,
            url: payload.url.clone(),
            locale: payload.locale.clone(),
            location: point,
            source: SourceTag {
                provider: self.provider.clone(),
                provider_id: payload.id.clone(),
            },
            venue_id,
            sales_window_id,
            date_window_id,
            classification_ids,
            image_ids,
            price_range_ids,
            attraction_ids,
            created_at: Utc::now(),
        }))
    }

    /// Coordinate resolution order: event-level, venue-level, geocode. The
    /// request's city/country stand in when the venue omits its own.
    async fn resolve_point(
        &self,
        payload: &EventPayload,
        venue: &RawVenue,
        address_line: &str,
        window: &SearchWindow,
    ) -> Option<GeoPoint> {
        if let Some((lat, lng)) = payload.location.as_ref().and_then(|l| l.numeric()) {
            return Some(GeoPoint::new(lat, lng));
        }
        if let Some((lat, lng)) = venue.location.as_ref().and_then(|l| l.numeric()) {
            return Some(GeoPoint::new(lat, lng));
        }

        let query = AddressQuery {
            address: Some(address_line.to_string()),
            postal_code: venue.postal_code.clone(),
            city: venue
                .city
                .as_ref()
                .and_then(|c| c.name.clone())
                .or_else(|| Some(window.city.clone())),
            country: venue
                .country
                .as_ref()
                .and_then(|c| c.name.clone())
                .or_else(|| Some(window.country_code.clone())),
        };
        self.geocoder.lookup(&query).await
    }

    async fn resolve_classifications(&self, payload: &EventPayload) -> Result<Vec<Uuid>> {
        let mut ids = Vec::new();
        for raw in &payload.classifications {
            let mut classification = Classification {
                id: None,
                segment: raw.segment.as_ref().and_then(|n| n.name.clone()),
                genre: raw.genre.as_ref().and_then(|n| n.name.clone()),
                sub_genre: raw.sub_genre.as_ref().and_then(|n| n.name.clone()),
                class_type: raw.class_type.as_ref().and_then(|n| n.name.clone()),
                sub_type: raw.sub_type.as_ref().and_then(|n| n.name.clone()),
                created_at: Utc::now(),
            };
            self.storage
                .find_or_create_classification(&mut classification)
                .await?;
            if let Some(id) = classification.id {
                ids.push(id);
            }
        }
        Ok(ids)
    }

    async fn persist_venue(
        &self,
        raw: &RawVenue,
        address_line: &str,
        point: GeoPoint,
        window: &SearchWindow,
    ) -> Result<Uuid> {
        let mut venue = Venue {
            id: None,
            name: raw
                .name
                .clone()
                .unwrap_or_else(|| address_line.to_string()),
            url: raw.url.clone(),
            postal_code: raw.postal_code.clone(),
            timezone: raw.timezone.clone(),
            city: raw
                .city
                .as_ref()
                .and_then(|c| c.name.clone())
                .or_else(|| Some(window.city.clone())),
            country: raw
                .country
                .as_ref()
                .and_then(|c| c.name.clone())
                .or_else(|| Some(window.country_code.clone())),
            address: Some(address_line.to_string()),
            location: point,
            markets: raw
                .markets
                .iter()
                .map(|m| Market {
                    name: m.name.clone(),
                    id: m.id.clone(),
                })
                .collect(),
            ada: raw.ada.as_ref().map(|a| AdaInfo {
                ada_phones: a.ada_phones.clone(),
                ada_custom_copy: a.ada_custom_copy.clone(),
                ada_hours: a.ada_hours.clone(),
            }),
            created_at: Utc::now(),
        };
        self.storage.upsert_venue(&mut venue).await?;
        venue.id.ok_or_else(|| crate::error::GigmapError::Store {
            message: "venue upsert returned no id".to_string(),
        })
    }

    async fn persist_sales_window(&self, payload: &EventPayload) -> Result<Uuid> {
        let public = payload.sales.as_ref().and_then(|s| s.public.as_ref());
        let mut window = SalesWindow {
            id: None,
            start_date_time: public.and_then(|p| p.start_date_time),
            end_date_time: public.and_then(|p| p.end_date_time),
            start_tbd: public.map(|p| p.start_tbd).unwrap_or(false),
            start_tba: public.map(|p| p.start_tba).unwrap_or(false),
            end_tbd: public.map(|p| p.end_tbd).unwrap_or(false),
            end_tba: public.map(|p| p.end_tba).unwrap_or(false),
            created_at: Utc::now(),
        };
        self.storage.create_sales_window(&mut window).await?;
        window.id.ok_or_else(|| crate::error::GigmapError::Store {
            message: "sales window create returned no id".to_string(),
        })
    }

    async fn persist_date_window(&self, payload: &EventPayload) -> Result<Uuid> {
        let dates = payload.dates.as_ref();
        let start = dates.and_then(|d| d.start.as_ref());
        let end = dates.and_then(|d| d.end.as_ref());
        let mut window = DateWindow {
            id: None,
            start_local_date: start.and_then(|s| s.local_date),
            start_local_time: start.and_then(|s| s.local_time.clone()),
            start_date_time: start.and_then(|s| s.date_time),
            date_tbd: start.map(|s| s.date_tbd).unwrap_or(false),
            date_tba: start.map(|s| s.date_tba).unwrap_or(false),
            time_tba: start.map(|s| s.time_tba).unwrap_or(false),
            no_specific_time: start.map(|s| s.no_specific_time).unwrap_or(false),
            end_local_time: end.and_then(|e| e.local_time.clone()),
            end_date_time: end.and_then(|e| e.date_time),
            approximate: end.map(|e| e.approximate).unwrap_or(false),
            timezone: dates.and_then(|d| d.timezone.clone()),
            status: dates
                .and_then(|d| d.status.as_ref())
                .and_then(|s| s.code.clone()),
            span_multiple_days: dates.map(|d| d.span_multiple_days).unwrap_or(false),
            created_at: Utc::now(),
        };
        self.storage.create_date_window(&mut window).await?;
        window.id.ok_or_else(|| crate::error::GigmapError::Store {
            message: "date window create returned no id".to_string(),
        })
    }

    /// Images are deduplicated by URL; entries without a URL are skipped.
    async fn resolve_images(&self, payload: &EventPayload) -> Result<Vec<Uuid>> {
        let mut ids = Vec::new();
        for raw in &payload.images {
            let Some(url) = raw.url.clone() else {
                continue;
            };
            let mut image = Image {
                id: None,
                ratio: raw.ratio.clone(),
                url,
                width: raw.width,
                height: raw.height,
                fallback: raw.fallback,
                created_at: Utc::now(),
            };
            self.storage.find_or_create_image(&mut image).await?;
            if let Some(id) = image.id {
                ids.push(id);
            }
        }
        Ok(ids)
    }

    /// Only entries with both bounds become records; the rest are dropped.
    async fn persist_price_ranges(&self, payload: &EventPayload) -> Result<Vec<Uuid>> {
        let mut ids = Vec::new();
        for raw in &payload.price_ranges {
            let (Some(min), Some(max)) = (raw.min, raw.max) else {
                continue;
            };
            let mut range = PriceRange {
                id: None,
                price_type: raw.price_type.clone(),
                currency: raw.currency.clone(),
                min,
                max,
                created_at: Utc::now(),
            };
            self.storage.create_price_range(&mut range).await?;
            if let Some(id) = range.id {
                ids.push(id);
            }
        }
        Ok(ids)
    }

    async fn resolve_attractions(&self, payload: &EventPayload) -> Result<Vec<Uuid>> {
        let raw_attractions = payload
            .embedded
            .as_ref()
            .map(|e| e.attractions.as_slice())
            .unwrap_or_default();

        let mut ids = Vec::new();
        for raw in raw_attractions {
            let Some(name) = raw.name.clone() else {
                continue;
            };
            let mut attraction = Attraction {
                id: None,
                name,
                url: raw.url.clone(),
                aliases: raw.aliases.clone(),
                created_at: Utc::now(),
            };
            self.storage
                .find_or_create_attraction(&mut attraction)
                .await?;
            if let Some(id) = attraction.id {
                ids.push(id);
            }
        }
        Ok(ids)
    }

    /// Keeps a rejected listing around for manual review. A failure here is
    /// only logged; the rejection already stands.
    async fn record_review(&self, payload: &EventPayload, reason: &str) {
        let mut record = ReviewRecord {
            id: None,
            provider_event_id: payload.id.clone(),
            name: payload.name.clone(),
            url: payload.url.clone(),
            reason: reason.to_string(),
            created_at: Utc::now(),
        };
        if let Err(e) = self.storage.create_review_record(&mut record).await {
            warn!("Failed to record review entry for {}: {}", payload.id, e);
        }
    }
}
