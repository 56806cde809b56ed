use crate::apis::{EventSource, SearchWindow};
use crate::config::IngestConfig;
use crate::domain::Event;
use crate::error::Result;
use crate::pipeline::normalize::Normalizer;
use crate::storage::Storage;
use chrono::{DateTime, Duration, Utc};
use metrics::{counter, histogram};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{error, info, instrument, warn};

/// What happened to one ingestion window.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase", tag = "outcome")]
pub enum IngestOutcome {
    /// The window ran to the end (possibly persisting nothing).
    #[serde(rename = "completed")]
    Completed(IngestSummary),
    /// The window would need more pages than the cap allows; nothing was
    /// ingested. The caller should narrow its filters.
    #[serde(rename = "refineFilters")]
    RefineFilters {
        total_elements: u64,
        required_pages: u64,
        max_pages: u32,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestSummary {
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub total_available: u64,
    pub pages_fetched: u32,
    pub raw_events: usize,
    pub persisted: usize,
    pub rejected: usize,
    pub errors: Vec<String>,
}

impl IngestSummary {
    fn empty(window: &SearchWindow) -> Self {
        Self {
            window_start: window.start,
            window_end: window.end,
            total_available: 0,
            pages_fetched: 0,
            raw_events: 0,
            persisted: 0,
            rejected: 0,
            errors: Vec::new(),
        }
    }

    fn failed(window: &SearchWindow, error: String) -> Self {
        let mut summary = Self::empty(window);
        summary.errors.push(error);
        summary
    }
}

/// Drives one ingestion window end to end: count, cap check, concurrent page
/// fetch, bounded normalization fan-out, bulk persist. Also hosts the weekly
/// backfill scheduler.
pub struct Ingestor {
    source: Arc<dyn EventSource>,
    normalizer: Arc<Normalizer>,
    storage: Arc<dyn Storage>,
    config: IngestConfig,
}

impl Ingestor {
    pub fn new(
        source: Arc<dyn EventSource>,
        normalizer: Arc<Normalizer>,
        storage: Arc<dyn Storage>,
        config: IngestConfig,
    ) -> Self {
        Self {
            source,
            normalizer,
            storage,
            config,
        }
    }

    /// Ingests one window. `Err` is reserved for bulk-persist failures;
    /// every other failure degrades to a skipped unit of work inside the
    /// returned summary.
    #[instrument(skip(self, window), fields(city = %window.city, start = %window.start))]
    pub async fn run_window(&self, window: &SearchWindow) -> Result<IngestOutcome> {
        counter!("gigmap_ingest_windows_total").increment(1);
        let started = std::time::Instant::now();

        let total = match self.source.count(window).await {
            Ok(total) => total,
            Err(e) => {
                // The probe already burned its retry budget; skip the whole
                // window and let the backfill move on.
                warn!("Count probe failed, skipping window: {}", e);
                counter!("gigmap_ingest_errors_total").increment(1);
                return Ok(IngestOutcome::Completed(IngestSummary::failed(
                    window,
                    format!("count probe failed: {e}"),
                )));
            }
        };

        if total == 0 {
            info!("No matching events in window");
            return Ok(IngestOutcome::Completed(IngestSummary::empty(window)));
        }

        let page_size = self.source.page_size().max(1) as u64;
        // u64 until the cap check; narrowing first could wrap under the cap
        let required_pages = total.saturating_add(page_size - 1) / page_size;
        if required_pages > self.config.max_pages as u64 {
            info!(
                "Window matches {} events across {} pages (cap {}); refusing — narrow your filters",
                total, required_pages, self.config.max_pages
            );
            counter!("gigmap_ingest_refused_windows_total").increment(1);
            return Ok(IngestOutcome::RefineFilters {
                total_elements: total,
                required_pages,
                max_pages: self.config.max_pages,
            });
        }
        let required_pages = required_pages as u32;

        let raw_events = self.fetch_pages(window, required_pages).await;
        let raw_count = raw_events.len();
        info!("Fetched {} raw events from {} pages", raw_count, required_pages);

        let (mut drafts, rejected, mut errors) = self.normalize_all(raw_events, window).await;
        counter!("gigmap_events_rejected_total").increment(rejected as u64);
        counter!("gigmap_ingest_errors_total").increment(errors.len() as u64);

        let persisted = if drafts.is_empty() {
            info!("No valid events found in window");
            0
        } else {
            let written = self.storage.upsert_events(&mut drafts).await?;
            counter!("gigmap_events_persisted_total").increment(written as u64);
            info!("Persisted {} events", written);
            written
        };

        if !errors.is_empty() {
            warn!("{} events failed normalization", errors.len());
            errors.truncate(50); // keep summaries bounded
        }

        histogram!("gigmap_ingest_window_duration_seconds")
            .record(started.elapsed().as_secs_f64());

        Ok(IngestOutcome::Completed(IngestSummary {
            window_start: window.start,
            window_end: window.end,
            total_available: total,
            pages_fetched: required_pages,
            raw_events: raw_count,
            persisted,
            rejected,
            errors,
        }))
    }

    /// All pages at once, one task per page; results are concatenated in
    /// page-number order so source order is preserved.
    async fn fetch_pages(&self, window: &SearchWindow, pages: u32) -> Vec<crate::apis::EventPayload> {
        let mut handles = Vec::with_capacity(pages as usize);
        for page in 0..pages {
            let source = self.source.clone();
            let window = window.clone();
            handles.push(tokio::spawn(
                async move { source.fetch_page(&window, page).await },
            ));
        }

        let mut raw_events = Vec::new();
        for (page, handle) in handles.into_iter().enumerate() {
            match handle.await {
                Ok(events) => {
                    counter!("gigmap_pages_fetched_total").increment(1);
                    raw_events.extend(events);
                }
                Err(e) => {
                    warn!("Page {} fetch task panicked: {}", page, e);
                }
            }
        }
        raw_events
    }

    /// One task per payload, gated by a semaphore so a 200-event page does
    /// not turn into 200 in-flight store and geocoder calls. Failures stay
    /// per-item.
    async fn normalize_all(
        &self,
        raw_events: Vec<crate::apis::EventPayload>,
        window: &SearchWindow,
    ) -> (Vec<Event>, usize, Vec<String>) {
        let semaphore = Arc::new(Semaphore::new(self.config.normalize_concurrency.max(1)));
        let mut handles = Vec::with_capacity(raw_events.len());
        for payload in raw_events {
            let semaphore = semaphore.clone();
            let normalizer = self.normalizer.clone();
            let window = window.clone();
            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
                let provider_id = payload.id.clone();
                (provider_id, normalizer.normalize(&payload, &window).await)
            }));
        }

        let mut drafts = Vec::new();
        let mut rejected = 0usize;
        let mut errors = Vec::new();
        for handle in handles {
            match handle.await {
                Ok((_, Ok(Some(event)))) => drafts.push(event),
                Ok((_, Ok(None))) => rejected += 1,
                Ok((provider_id, Err(e))) => {
                    errors.push(format!("normalization failed for {provider_id}: {e}"));
                }
                Err(e) => errors.push(format!("normalization task panicked: {e}")),
            }
        }
        (drafts, rejected, errors)
    }

    /// Walks the configured number of one-week windows forward from now.
    /// Each window is independent; one failing never halts the next.
    #[instrument(skip(self))]
    pub async fn run_backfill(
        &self,
        country_code: &str,
        city: &str,
        event_type: &str,
    ) -> Vec<IngestOutcome> {
        let weeks = self.config.backfill_weeks;
        let mut outcomes = Vec::with_capacity(weeks as usize);
        let mut start = Utc::now();

        for week in 0..weeks {
            let window = SearchWindow::week_from(country_code, city, event_type, start);
            info!(
                "Backfill week {}/{}: {} to {}",
                week + 1,
                weeks,
                window.start,
                window.end
            );
            match self.run_window(&window).await {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    error!("Window {} failed to persist: {}", week + 1, e);
                    outcomes.push(IngestOutcome::Completed(IngestSummary::failed(
                        &window,
                        format!("persist failed: {e}"),
                    )));
                }
            }
            start = start + Duration::weeks(1);
        }
        outcomes
    }
}
