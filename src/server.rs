use crate::domain::{Event, ProfileUpdate, UserProfile};
use crate::error::GigmapError;
use crate::pipeline::Ingestor;
use crate::query::{BoundsQuery, QueryService};
use crate::storage::Storage;
use axum::{
    extract::{Path, Query},
    http::{Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Extension, Router,
};
use chrono::{DateTime, Utc};
use hyper::Server;
use serde::Deserialize;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tracing::error;
use uuid::Uuid;

/// Shared state injected into every handler.
pub struct AppState {
    pub storage: Arc<dyn Storage>,
    pub query: QueryService,
    pub ingestor: Arc<Ingestor>,
}

fn message_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "message": message.into() }))).into_response()
}

fn map_error(e: GigmapError) -> Response {
    match e {
        GigmapError::Invalid(message) => message_response(StatusCode::BAD_REQUEST, message),
        other => {
            error!("Request failed: {}", other);
            message_response(StatusCode::INTERNAL_SERVER_ERROR, other.to_string())
        }
    }
}

/// Health check endpoint
async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "service": "gigmap",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventsParams {
    min_lat: Option<f64>,
    max_lat: Option<f64>,
    min_lng: Option<f64>,
    max_lng: Option<f64>,
    #[serde(rename = "type")]
    event_type: Option<String>,
    genre: Option<String>,
    start_date: Option<DateTime<Utc>>,
    end_date: Option<DateTime<Utc>>,
}

/// GET /api/events — everything inside the bounding box, filters applied.
async fn events_in_bounds(
    Extension(state): Extension<Arc<AppState>>,
    Query(params): Query<EventsParams>,
) -> Response {
    let (Some(min_lat), Some(max_lat), Some(min_lng), Some(max_lng)) = (
        params.min_lat,
        params.max_lat,
        params.min_lng,
        params.max_lng,
    ) else {
        return message_response(
            StatusCode::BAD_REQUEST,
            "minLat, maxLat, minLng and maxLng are required parameters.",
        );
    };

    let query = BoundsQuery {
        min_lat,
        max_lat,
        min_lng,
        max_lng,
        event_type: params.event_type,
        genre: params.genre,
        start_date: params.start_date,
        end_date: params.end_date,
    };
    match state.query.events_in_bounds(&query).await {
        Ok(views) => (StatusCode::OK, Json(views)).into_response(),
        Err(e) => map_error(e),
    }
}

#[derive(Debug, Deserialize)]
struct BatchParams {
    ids: Option<String>,
}

/// GET /api/events/batch?ids=a,b,c
async fn events_batch(
    Extension(state): Extension<Arc<AppState>>,
    Query(params): Query<BatchParams>,
) -> Response {
    let Some(ids) = params.ids.filter(|ids| !ids.trim().is_empty()) else {
        return message_response(StatusCode::BAD_REQUEST, "ids is a required parameter.");
    };
    let raw_ids: Vec<String> = ids.split(',').map(|id| id.trim().to_string()).collect();

    match state.query.events_by_ids(&raw_ids).await {
        Ok(views) => (StatusCode::OK, Json(views)).into_response(),
        Err(e) => map_error(e),
    }
}

/// GET /api/events/:id
async fn event_by_id(
    Extension(state): Extension<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    match state.query.event_by_id(&id).await {
        Ok(Some(view)) => (StatusCode::OK, Json(view)).into_response(),
        Ok(None) => message_response(StatusCode::NOT_FOUND, "Event not found"),
        Err(e) => map_error(e),
    }
}

/// POST /api/events — create a single event record directly.
async fn create_event(
    Extension(state): Extension<Arc<AppState>>,
    Json(mut event): Json<Event>,
) -> Response {
    match state.storage.create_event(&mut event).await {
        Ok(()) => (StatusCode::CREATED, Json(event)).into_response(),
        Err(e) => {
            error!("Error creating event: {}", e);
            message_response(StatusCode::BAD_REQUEST, "Error creating event")
        }
    }
}

#[derive(Debug, Deserialize)]
struct BulkEventsBody {
    events: Vec<Event>,
}

/// POST /api/events/bulk
async fn upload_events(
    Extension(state): Extension<Arc<AppState>>,
    Json(body): Json<BulkEventsBody>,
) -> Response {
    let mut events = body.events;
    match state.storage.upsert_events(&mut events).await {
        Ok(_) => (StatusCode::CREATED, Json(events)).into_response(),
        Err(e) => {
            error!("Error uploading events: {}", e);
            message_response(StatusCode::BAD_REQUEST, "Error uploading events")
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IngestParams {
    country_code: Option<String>,
    city: Option<String>,
    #[serde(rename = "type")]
    event_type: Option<String>,
    #[serde(default)]
    clear: Option<bool>,
}

/// GET /api/ingest — triggers the weekly backfill, optionally wiping the
/// database first.
async fn trigger_ingest(
    Extension(state): Extension<Arc<AppState>>,
    Query(params): Query<IngestParams>,
) -> Response {
    let (Some(country_code), Some(city), Some(event_type)) =
        (params.country_code, params.city, params.event_type)
    else {
        return message_response(
            StatusCode::BAD_REQUEST,
            "countryCode, city, and type are required parameters.",
        );
    };

    if params.clear.unwrap_or(false) {
        if let Err(e) = state.storage.clear_all().await {
            error!("Pre-ingestion clear failed: {}", e);
            return message_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
        }
    }

    let outcomes = state
        .ingestor
        .run_backfill(&country_code, &city, &event_type)
        .await;
    (
        StatusCode::OK,
        Json(json!({
            "message": "Ticketmaster events fetch completed.",
            "windows": outcomes,
        })),
    )
        .into_response()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewProfileBody {
    name: String,
    email: String,
    location: crate::domain::GeoPoint,
    #[serde(default)]
    bio: Option<String>,
}

/// POST /api/profiles
async fn create_profile(
    Extension(state): Extension<Arc<AppState>>,
    Json(body): Json<NewProfileBody>,
) -> Response {
    let mut profile = UserProfile {
        id: None,
        name: body.name,
        email: body.email,
        location: body.location,
        bio: body.bio,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };
    match state.storage.create_profile(&mut profile).await {
        Ok(()) => (StatusCode::CREATED, Json(profile)).into_response(),
        Err(e) => message_response(StatusCode::BAD_REQUEST, e.to_string()),
    }
}

fn parse_profile_id(raw: &str) -> Result<Uuid, Response> {
    Uuid::parse_str(raw).map_err(|_| {
        message_response(
            StatusCode::BAD_REQUEST,
            format!("malformed profile id: {raw}"),
        )
    })
}

/// GET /api/profiles/:id
async fn get_profile(
    Extension(state): Extension<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    let id = match parse_profile_id(&id) {
        Ok(id) => id,
        Err(response) => return response,
    };
    match state.storage.get_profile(id).await {
        Ok(Some(profile)) => (StatusCode::OK, Json(profile)).into_response(),
        Ok(None) => message_response(StatusCode::NOT_FOUND, "Profile not found"),
        Err(e) => map_error(e),
    }
}

/// PUT /api/profiles/:id
async fn update_profile(
    Extension(state): Extension<Arc<AppState>>,
    Path(id): Path<String>,
    Json(update): Json<ProfileUpdate>,
) -> Response {
    let id = match parse_profile_id(&id) {
        Ok(id) => id,
        Err(response) => return response,
    };
    match state.storage.update_profile(id, update).await {
        Ok(Some(profile)) => (StatusCode::OK, Json(profile)).into_response(),
        Ok(None) => message_response(StatusCode::NOT_FOUND, "Profile not found"),
        Err(e) => map_error(e),
    }
}

/// DELETE /api/profiles/:id
async fn delete_profile(
    Extension(state): Extension<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    let id = match parse_profile_id(&id) {
        Ok(id) => id,
        Err(response) => return response,
    };
    match state.storage.delete_profile(id).await {
        Ok(true) => message_response(StatusCode::OK, "Profile deleted successfully"),
        Ok(false) => message_response(StatusCode::NOT_FOUND, "Profile not found"),
        Err(e) => map_error(e),
    }
}

/// Builds the router with all routes and CORS for the map front-end.
pub fn create_server(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/api/events", get(events_in_bounds).post(create_event))
        .route("/api/events/bulk", post(upload_events))
        .route("/api/events/batch", get(events_batch))
        .route("/api/events/:id", get(event_by_id))
        .route("/api/ingest", get(trigger_ingest))
        .route("/api/profiles", post(create_profile))
        .route(
            "/api/profiles/:id",
            get(get_profile).put(update_profile).delete(delete_profile),
        )
        .layer(Extension(state))
        .layer(ServiceBuilder::new().layer(cors))
}

/// Start the HTTP server on the specified port
pub async fn start_server(state: Arc<AppState>, port: u16) -> anyhow::Result<()> {
    let app = create_server(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    println!("🚀 HTTP server running on http://localhost:{port}");
    println!("💚 Health check: http://localhost:{port}/health");
    println!("🗺️  Events API:   http://localhost:{port}/api/events");

    Server::bind(&addr).serve(app.into_make_service()).await?;

    Ok(())
}
