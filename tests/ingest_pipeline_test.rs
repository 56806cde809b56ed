use chrono::Utc;
use serde_json::json;
use std::sync::Arc;

use gigmap::apis::geocode::{AddressQuery, Geocoder};
use gigmap::apis::{EventPayload, EventSource, SearchWindow};
use gigmap::config::IngestConfig;
use gigmap::domain::GeoPoint;
use gigmap::error::Result;
use gigmap::pipeline::{IngestOutcome, Ingestor, Normalizer};
use gigmap::query::{BoundsQuery, QueryService};
use gigmap::storage::{InMemoryStorage, Storage};

struct FakeSource {
    pages: Vec<Vec<EventPayload>>,
    total: u64,
    page_size: u32,
}

#[async_trait::async_trait]
impl EventSource for FakeSource {
    fn provider(&self) -> &'static str {
        "ticketmaster"
    }

    fn page_size(&self) -> u32 {
        self.page_size
    }

    async fn count(&self, _window: &SearchWindow) -> Result<u64> {
        Ok(self.total)
    }

    async fn fetch_page(&self, _window: &SearchWindow, page: u32) -> Vec<EventPayload> {
        self.pages.get(page as usize).cloned().unwrap_or_default()
    }
}

struct FakeGeocoder {
    point: Option<GeoPoint>,
}

#[async_trait::async_trait]
impl Geocoder for FakeGeocoder {
    async fn lookup(&self, _query: &AddressQuery) -> Option<GeoPoint> {
        self.point
    }
}

fn payload(value: serde_json::Value) -> EventPayload {
    serde_json::from_value(value).expect("test payload should deserialize")
}

/// A complete payload with event-level coordinates.
fn payload_with_coords(id: &str, name: &str, lat: &str, lng: &str) -> EventPayload {
    payload(json!({
        "id": id,
        "name": name,
        "type": "event",
        "url": format!("https://tickets.example/{id}"),
        "location": { "latitude": lat, "longitude": lng },
        "dates": {
            "start": { "localDate": "2026-09-03", "dateTime": "2026-09-03T18:30:00Z" },
            "timezone": "Europe/London",
            "status": { "code": "onsale" }
        },
        "classifications": [{
            "segment": { "name": "Music" },
            "genre": { "name": "Rock" },
            "subGenre": { "name": "Indie" }
        }],
        "_embedded": {
            "venues": [{
                "name": format!("Venue {id}"),
                "postalCode": "N5 1RD",
                "city": { "name": "London" },
                "country": { "countryCode": "GB" },
                "address": { "line1": "20-22 Highbury Corner" }
            }]
        }
    }))
}

/// A payload whose only possible coordinate source is the geocoder.
fn payload_needing_geocode(id: &str, name: &str) -> EventPayload {
    payload(json!({
        "id": id,
        "name": name,
        "url": format!("https://tickets.example/{id}"),
        "_embedded": {
            "venues": [{
                "name": format!("Venue {id}"),
                "city": { "name": "London" },
                "address": { "line1": "1 Somewhere Road" }
            }]
        }
    }))
}

fn test_window() -> SearchWindow {
    SearchWindow::week_from("GB", "London", "music", Utc::now())
}

fn build_ingestor(
    pages: Vec<Vec<EventPayload>>,
    total: u64,
    geocode_hit: Option<GeoPoint>,
) -> (Ingestor, Arc<InMemoryStorage>) {
    let storage = Arc::new(InMemoryStorage::new());
    let source = Arc::new(FakeSource {
        pages,
        total,
        page_size: 200,
    });
    let geocoder = Arc::new(FakeGeocoder { point: geocode_hit });
    let normalizer = Arc::new(Normalizer::new(
        storage.clone() as Arc<dyn Storage>,
        geocoder,
        source.provider(),
    ));
    let config = IngestConfig {
        max_pages: 4,
        normalize_concurrency: 4,
        backfill_weeks: 2,
    };
    let ingestor = Ingestor::new(source, normalizer, storage.clone(), config);
    (ingestor, storage)
}

fn summary(outcome: IngestOutcome) -> gigmap::pipeline::IngestSummary {
    match outcome {
        IngestOutcome::Completed(summary) => summary,
        other => panic!("expected completed window, got {other:?}"),
    }
}

fn whole_world() -> BoundsQuery {
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

#[tokio::test]
async fn payloads_missing_venue_or_address_are_rejected() {
    let no_venue = payload(json!({
        "id": "no-venue",
        "name": "Orphan Event",
        "url": "https://tickets.example/no-venue"
    }));
    let no_address = payload(json!({
        "id": "no-address",
        "name": "Vague Event",
        "_embedded": { "venues": [{ "name": "Somewhere", "city": { "name": "London" } }] }
    }));

    let (ingestor, storage) = build_ingestor(vec![vec![no_venue, no_address]], 2, None);
    let outcome = ingestor.run_window(&test_window()).await.unwrap();

    let summary = summary(outcome);
    assert_eq!(summary.persisted, 0);
    assert_eq!(summary.rejected, 2);
    assert!(summary.errors.is_empty());
    assert!(storage.get_events().await.unwrap().is_empty());

    // Both rejects land in the review collection
    let reviews = storage.get_review_records().await.unwrap();
    assert_eq!(reviews.len(), 2);
    let reasons: Vec<_> = reviews.iter().map(|r| r.reason.as_str()).collect();
    assert!(reasons.contains(&"missing venue"));
    assert!(reasons.contains(&"missing address line"));
}

#[tokio::test]
async fn event_level_coordinates_are_used_verbatim() {
    // Venue coordinates and the geocoder would both give different points;
    // neither may win over the event's own.
    let event = payload(json!({
        "id": "has-coords",
        "name": "Pinned Event",
        "location": { "latitude": "51.5000", "longitude": "-0.1000" },
        "_embedded": {
            "venues": [{
                "name": "The Garage",
                "address": { "line1": "20-22 Highbury Corner" },
                "location": { "latitude": "40.0", "longitude": "-70.0" }
            }]
        }
    }));

    let (ingestor, storage) =
        build_ingestor(vec![vec![event]], 1, Some(GeoPoint::new(0.0, 0.0)));
    summary(ingestor.run_window(&test_window()).await.unwrap());

    let events = storage.get_events().await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].location, GeoPoint::new(51.5, -0.1));
}

#[tokio::test]
async fn venue_coordinates_win_over_geocoding() {
    let event = payload(json!({
        "id": "venue-coords",
        "name": "Venue-pinned Event",
        "_embedded": {
            "venues": [{
                "name": "The Garage",
                "address": { "line1": "20-22 Highbury Corner" },
                "location": { "latitude": "51.5465", "longitude": "-0.1058" }
            }]
        }
    }));

    let (ingestor, storage) =
        build_ingestor(vec![vec![event]], 1, Some(GeoPoint::new(0.0, 0.0)));
    summary(ingestor.run_window(&test_window()).await.unwrap());

    let events = storage.get_events().await.unwrap();
    assert_eq!(events[0].location, GeoPoint::new(51.5465, -0.1058));
}

#[tokio::test]
async fn geocode_only_payload_is_rejected_when_lookup_finds_nothing() {
    let event = payload_needing_geocode("geo-miss", "Unlocatable Event");

    let (ingestor, storage) = build_ingestor(vec![vec![event]], 1, None);
    let summary = summary(ingestor.run_window(&test_window()).await.unwrap());

    assert_eq!(summary.persisted, 0);
    assert_eq!(summary.rejected, 1);
    assert!(storage.get_events().await.unwrap().is_empty());
}

#[tokio::test]
async fn repeated_classification_tuples_share_one_record() {
    let a = payload_with_coords("evt-a", "Event A", "51.50", "-0.10");
    let b = payload_with_coords("evt-b", "Event B", "51.51", "-0.11");

    let (ingestor, storage) = build_ingestor(vec![vec![a, b]], 2, None);
    summary(ingestor.run_window(&test_window()).await.unwrap());

    let events = storage.get_events().await.unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].classification_ids.len(), 1);
    assert_eq!(events[0].classification_ids, events[1].classification_ids);

    let shared = storage
        .get_classification(events[0].classification_ids[0])
        .await
        .unwrap()
        .unwrap();
    assert_eq!(shared.genre.as_deref(), Some("Rock"));
}

#[tokio::test]
async fn images_are_deduplicated_by_url() {
    let mut a = payload_with_coords("img-a", "Event A", "51.50", "-0.10");
    let mut b = payload_with_coords("img-b", "Event B", "51.51", "-0.11");
    let image = json!([{ "ratio": "16_9", "url": "https://img.example/shared.jpg" }]);
    a.images = serde_json::from_value(image.clone()).unwrap();
    b.images = serde_json::from_value(image).unwrap();

    let (ingestor, storage) = build_ingestor(vec![vec![a, b]], 2, None);
    summary(ingestor.run_window(&test_window()).await.unwrap());

    let events = storage.get_events().await.unwrap();
    assert_eq!(events[0].image_ids.len(), 1);
    assert_eq!(events[0].image_ids, events[1].image_ids);
}

#[tokio::test]
async fn price_ranges_missing_a_bound_are_dropped() {
    let mut event = payload_with_coords("prices", "Priced Event", "51.50", "-0.10");
    event.price_ranges = serde_json::from_value(json!([
        { "type": "standard", "currency": "GBP", "min": 25.0, "max": 55.0 },
        { "type": "vip", "currency": "GBP", "min": 90.0 },
        { "type": "resale", "currency": "GBP", "max": 120.0 }
    ]))
    .unwrap();

    let (ingestor, storage) = build_ingestor(vec![vec![event]], 1, None);
    summary(ingestor.run_window(&test_window()).await.unwrap());

    let events = storage.get_events().await.unwrap();
    assert_eq!(events[0].price_range_ids.len(), 1);
    let range = storage
        .get_price_range(events[0].price_range_ids[0])
        .await
        .unwrap()
        .unwrap();
    assert_eq!(range.min, 25.0);
    assert_eq!(range.max, 55.0);
}

#[tokio::test]
async fn window_over_the_page_cap_is_refused() {
    // 900 events at 200 per page needs 5 pages; the cap is 4.
    let (ingestor, storage) = build_ingestor(
        vec![vec![payload_with_coords("capped", "Never Ingested", "51.5", "-0.1")]],
        900,
        None,
    );
    let outcome = ingestor.run_window(&test_window()).await.unwrap();

    match outcome {
        IngestOutcome::RefineFilters {
            total_elements,
            required_pages,
            max_pages,
        } => {
            assert_eq!(total_elements, 900);
            assert_eq!(required_pages, 5);
            assert_eq!(max_pages, 4);
        }
        other => panic!("expected refine-filters outcome, got {other:?}"),
    }
    assert!(storage.get_events().await.unwrap().is_empty());
}

#[tokio::test]
async fn astronomical_totals_still_hit_the_page_cap() {
    let (ingestor, storage) = build_ingestor(vec![], u64::MAX, None);
    let outcome = ingestor.run_window(&test_window()).await.unwrap();

    match outcome {
        IngestOutcome::RefineFilters { required_pages, .. } => {
            assert!(required_pages > 4);
        }
        other => panic!("expected refine-filters outcome, got {other:?}"),
    }
    assert!(storage.get_events().await.unwrap().is_empty());
}

#[tokio::test]
async fn two_pages_end_to_end_with_geocode_fallback() {
    let a = payload_with_coords("page1-a", "Event A", "51.5000", "-0.1000");
    let b = payload_needing_geocode("page2-b", "Event B");

    let (ingestor, storage) = build_ingestor(
        vec![vec![a], vec![b]],
        201, // two pages at 200 per page
        Some(GeoPoint::new(51.5465, -0.1058)),
    );
    let summary = summary(ingestor.run_window(&test_window()).await.unwrap());

    assert_eq!(summary.pages_fetched, 2);
    assert_eq!(summary.persisted, 2);
    assert_eq!(summary.rejected, 0);

    let events = storage.get_events().await.unwrap();
    assert_eq!(events.len(), 2);
    for event in &events {
        assert!(event.location.latitude.is_finite());
        assert!(event.location.longitude.is_finite());
        assert!(event.location.latitude != 0.0);
    }
    let b = events
        .iter()
        .find(|e| e.source.provider_id == "page2-b")
        .unwrap();
    assert_eq!(b.location, GeoPoint::new(51.5465, -0.1058));
}

#[tokio::test]
async fn reingesting_the_same_window_updates_instead_of_duplicating() {
    let event = payload_with_coords("repeat", "Recurring Event", "51.50", "-0.10");
    let (ingestor, storage) = build_ingestor(vec![vec![event]], 1, None);

    summary(ingestor.run_window(&test_window()).await.unwrap());
    summary(ingestor.run_window(&test_window()).await.unwrap());

    assert_eq!(storage.get_events().await.unwrap().len(), 1);
}

#[tokio::test]
async fn bounding_box_query_returns_only_contained_events() {
    let a = payload_with_coords("in-box", "Inside", "51.5000", "-0.1000");
    let b = payload_with_coords("out-box", "Outside", "48.8566", "2.3522");

    let (ingestor, storage) = build_ingestor(vec![vec![a, b]], 2, None);
    summary(ingestor.run_window(&test_window()).await.unwrap());

    let query_service = QueryService::new(storage.clone() as Arc<dyn Storage>);
    let mut query = whole_world();
    query.min_lat = 51.0;
    query.max_lat = 52.0;
    query.min_lng = -1.0;
    query.max_lng = 0.0;

    let views = query_service.events_in_bounds(&query).await.unwrap();
    assert_eq!(views.len(), 1);
    assert_eq!(views[0].source.provider_id, "in-box");
    // joined sub-entities come inline
    assert!(views[0].venue.is_some());
    assert_eq!(views[0].classifications.len(), 1);
}

#[tokio::test]
async fn clear_then_query_returns_empty_without_error() {
    let event = payload_with_coords("wiped", "Doomed Event", "51.50", "-0.10");
    let (ingestor, storage) = build_ingestor(vec![vec![event]], 1, None);
    summary(ingestor.run_window(&test_window()).await.unwrap());
    assert_eq!(storage.get_events().await.unwrap().len(), 1);

    storage.clear_all().await.unwrap();

    let query_service = QueryService::new(storage.clone() as Arc<dyn Storage>);
    let views = query_service.events_in_bounds(&whole_world()).await.unwrap();
    assert!(views.is_empty());
}

#[tokio::test]
async fn backfill_walks_independent_weekly_windows() {
    let event = payload_with_coords("weekly", "Weekly Event", "51.50", "-0.10");
    let (ingestor, storage) = build_ingestor(vec![vec![event]], 1, None);

    let outcomes = ingestor.run_backfill("GB", "London", "music").await;
    assert_eq!(outcomes.len(), 2); // backfill_weeks in the test config
    for outcome in outcomes {
        assert!(matches!(outcome, IngestOutcome::Completed(_)));
    }
    // Same event every week upserts into a single record
    assert_eq!(storage.get_events().await.unwrap().len(), 1);
}
