use crate::domain::{Event, EventView};
use crate::error::{GigmapError, Result};
use crate::storage::Storage;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

/// Filters for the map view: a mandatory bounding box plus optional
/// category and date criteria. Substring filters are case-insensitive.
#[derive(Debug, Clone)]
pub struct BoundsQuery {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
    pub event_type: Option<String>,
    pub genre: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

/// Read side: bounding-box and ID lookups over persisted events with
/// sub-entities joined inline.
#[derive(Clone)]
pub struct QueryService {
    storage: Arc<dyn Storage>,
}

impl QueryService {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Everything inside the box that passes the optional filters. An empty
    /// result is an empty list, never an error.
    pub async fn events_in_bounds(&self, query: &BoundsQuery) -> Result<Vec<EventView>> {
        let events = self.storage.get_events().await?;
        let mut views = Vec::new();
        for event in events {
            if !event.location.within(
                query.min_lat,
                query.max_lat,
                query.min_lng,
                query.max_lng,
            ) {
                continue;
            }
            let view = self.join(event).await?;
            if Self::matches_filters(&view, query) {
                views.push(view);
            }
        }
        Ok(views)
    }

    /// One event, fully joined. Malformed identifiers are rejected before
    /// the store is touched.
    pub async fn event_by_id(&self, raw_id: &str) -> Result<Option<EventView>> {
        let id = Self::parse_id(raw_id)?;
        match self.storage.get_event(id).await? {
            Some(event) => Ok(Some(self.join(event).await?)),
            None => Ok(None),
        }
    }

    /// A batch of events by ID. All identifiers are validated up front; one
    /// malformed entry rejects the whole request. Unknown IDs are skipped.
    pub async fn events_by_ids(&self, raw_ids: &[String]) -> Result<Vec<EventView>> {
        let ids = raw_ids
            .iter()
            .map(|raw| Self::parse_id(raw))
            .collect::<Result<Vec<_>>>()?;

        let mut views = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(event) = self.storage.get_event(id).await? {
                views.push(self.join(event).await?);
            }
        }
        Ok(views)
    }

    fn parse_id(raw: &str) -> Result<Uuid> {
        Uuid::parse_str(raw.trim())
            .map_err(|_| GigmapError::Invalid(format!("malformed event id: {raw}")))
    }

    async fn join(&self, event: Event) -> Result<EventView> {
        let venue = self.storage.get_venue(event.venue_id).await?;
        let sales_window = self.storage.get_sales_window(event.sales_window_id).await?;
        let date_window = self.storage.get_date_window(event.date_window_id).await?;

        let mut classifications = Vec::with_capacity(event.classification_ids.len());
        for id in &event.classification_ids {
            if let Some(classification) = self.storage.get_classification(*id).await? {
                classifications.push(classification);
            }
        }
        let mut images = Vec::with_capacity(event.image_ids.len());
        for id in &event.image_ids {
            if let Some(image) = self.storage.get_image(*id).await? {
                images.push(image);
            }
        }
        let mut price_ranges = Vec::with_capacity(event.price_range_ids.len());
        for id in &event.price_range_ids {
            if let Some(range) = self.storage.get_price_range(*id).await? {
                price_ranges.push(range);
            }
        }
        let mut attractions = Vec::with_capacity(event.attraction_ids.len());
        for id in &event.attraction_ids {
            if let Some(attraction) = self.storage.get_attraction(*id).await? {
                attractions.push(attraction);
            }
        }

        Ok(EventView {
            id: event.id.unwrap_or_default(),
            name: event.name,
            event_type: event.event_type,
            description: event.description,
            url: event.url,
            locale: event.locale,
            location: event.location,
            source: event.source,
            venue,
            sales_window,
            date_window,
            classifications,
            images,
            price_ranges,
            attractions,
        })
    }

    /// Category filters match against the joined classifications (segment
    /// for the type filter, genre/subGenre for the genre filter) and the
    /// event's own type tag. Date filters compare the date window's start
    /// instant; an event with no start instant fails any date filter.
    fn matches_filters(view: &EventView, query: &BoundsQuery) -> bool {
        if let Some(wanted) = &query.event_type {
            let wanted = wanted.to_lowercase();
            let in_segment = view.classifications.iter().any(|c| {
                c.segment
                    .as_deref()
                    .map(|s| s.to_lowercase().contains(&wanted))
                    .unwrap_or(false)
            });
            let in_type = view
                .event_type
                .as_deref()
                .map(|t| t.to_lowercase().contains(&wanted))
                .unwrap_or(false);
            if !in_segment && !in_type {
                return false;
            }
        }

        if let Some(wanted) = &query.genre {
            let wanted = wanted.to_lowercase();
            let matched = view.classifications.iter().any(|c| {
                let genre = c
                    .genre
                    .as_deref()
                    .map(|g| g.to_lowercase().contains(&wanted))
                    .unwrap_or(false);
                let sub_genre = c
                    .sub_genre
                    .as_deref()
                    .map(|g| g.to_lowercase().contains(&wanted))
                    .unwrap_or(false);
                genre || sub_genre
            });
            if !matched {
                return false;
            }
        }

        if query.start_date.is_some() || query.end_date.is_some() {
            let Some(start) = view.date_window.as_ref().and_then(|d| d.start_date_time)
            else {
                return false;
            };
            if let Some(from) = query.start_date {
                if start < from {
                    return false;
                }
            }
            if let Some(until) = query.end_date {
                if start > until {
                    return false;
                }
            }
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Classification, DateWindow, GeoPoint, SourceTag};
    use chrono::Utc;

    fn base_query() -> BoundsQuery {
        BoundsQuery {
            min_lat: -90.0,
            max_lat: 90.0,
            min_lng: -180.0,
            max_lng: 180.0,
            event_type: None,
            genre: None,
            start_date: None,
            end_date: None,
        }
    }

    fn view_with(classifications: Vec<Classification>, date_window: Option<DateWindow>) -> EventView {
        EventView {
            id: Uuid::new_v4(),
            name: "Gig".into(),
            event_type: Some("event".into()),
            description: "desc".into(),
            url: None,
            locale: None,
            location: GeoPoint::new(51.5, -0.1),
            source: SourceTag {
                provider: "ticketmaster".into(),
                provider_id: "x".into(),
            },
            venue: None,
            sales_window: None,
            date_window,
            classifications,
            images: vec![],
            price_ranges: vec![],
            attractions: vec![],
        }
    }

    fn classification(segment: &str, genre: &str) -> Classification {
        Classification {
            id: None,
            segment: Some(segment.into()),
            genre: Some(genre.into()),
            sub_genre: None,
            class_type: None,
            sub_type: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn substring_filters_are_case_insensitive() {
        let view = view_with(vec![classification("Music", "Rock")], None);

        let mut query = base_query();
        query.event_type = Some("musi".into());
        assert!(QueryService::matches_filters(&view, &query));

        query.event_type = None;
        query.genre = Some("ROCK".into());
        assert!(QueryService::matches_filters(&view, &query));

        query.genre = Some("jazz".into());
        assert!(!QueryService::matches_filters(&view, &query));
    }

    #[test]
    fn date_filter_requires_a_start_instant() {
        let mut query = base_query();
        query.start_date = Some(Utc::now());

        let without_window = view_with(vec![], None);
        assert!(!QueryService::matches_filters(&without_window, &query));

        let window = DateWindow {
            id: None,
            start_local_date: None,
            start_local_time: None,
            start_date_time: Some(Utc::now() + chrono::Duration::days(1)),
            date_tbd: false,
            date_tba: false,
            time_tba: false,
            no_specific_time: false,
            end_local_time: None,
            end_date_time: None,
            approximate: false,
            timezone: None,
            status: None,
            span_multiple_days: false,
            created_at: Utc::now(),
        };
        let with_window = view_with(vec![], Some(window));
        assert!(QueryService::matches_filters(&with_window, &query));

        query.end_date = Some(Utc::now());
        assert!(!QueryService::matches_filters(&with_window, &query));
    }

    #[test]
    fn malformed_ids_are_rejected() {
        assert!(QueryService::parse_id("not-a-uuid").is_err());
        assert!(QueryService::parse_id(&Uuid::new_v4().to_string()).is_ok());
    }
}
