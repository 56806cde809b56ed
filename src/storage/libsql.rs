use crate::domain::{
    Attraction, Classification, DateWindow, Event, Image, PriceRange, ProfileUpdate,
    ReviewRecord, SalesWindow, UserProfile, Venue,
};
use crate::error::{GigmapError, Result};
use crate::storage::Storage;
use async_trait::async_trait;
use chrono::Utc;
use libsql::{Builder, Connection, Database};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::env;
use tracing::info;
use uuid::Uuid;

const COLLECTIONS: &[&str] = &[
    "events",
    "classifications",
    "date_windows",
    "sales_windows",
    "price_ranges",
    "images",
    "attractions",
    "venues",
    "reviews",
    "profiles",
];

fn db_err(context: &str, e: impl std::fmt::Display) -> GigmapError {
    GigmapError::Store {
        message: format!("{context}: {e}"),
    }
}

fn classification_key(classification: &Classification) -> Result<String> {
    Ok(serde_json::to_string(&classification.dedup_key())?)
}

fn venue_key(venue: &Venue) -> Result<String> {
    Ok(serde_json::to_string(&(
        venue.name.as_str(),
        venue.location.latitude,
        venue.location.longitude,
    ))?)
}

fn event_key(event: &Event) -> Result<String> {
    Ok(serde_json::to_string(&(
        event.name.as_str(),
        event.location.latitude,
        event.location.longitude,
    ))?)
}

/// Turso/libSQL-backed storage. Records live as JSON documents in a single
/// `documents` table keyed by (collection, id). Deduplicated collections
/// additionally carry their dedup key in a column with a UNIQUE
/// (collection, dedup_key) index, so find-or-create is atomic at the
/// database: a racing insert hits the index, loses, and adopts the winner's
/// row instead of duplicating it.
pub struct LibsqlStorage {
    db: Database,
}

impl LibsqlStorage {
    /// Connects using `LIBSQL_URL` and `LIBSQL_AUTH_TOKEN` and ensures the
    /// documents table exists.
    pub async fn connect() -> Result<Self> {
        let url = env::var("LIBSQL_URL")
            .map_err(|_| GigmapError::Config("LIBSQL_URL environment variable not set".into()))?;
        let auth_token = env::var("LIBSQL_AUTH_TOKEN").map_err(|_| {
            GigmapError::Config("LIBSQL_AUTH_TOKEN environment variable not set".into())
        })?;

        info!("Connecting to libSQL database at {}", url);
        let db = Builder::new_remote(url, auth_token)
            .build()
            .await
            .map_err(|e| db_err("failed to connect to database", e))?;

        let storage = Self { db };
        storage.migrate().await?;
        Ok(storage)
    }

    /// Opens a database file on local disk. Used by tests and ad-hoc tooling;
    /// production deployments go through [`connect`](Self::connect).
    pub async fn open_local(path: &str) -> Result<Self> {
        let db = Builder::new_local(path)
            .build()
            .await
            .map_err(|e| db_err("failed to open local database", e))?;
        let storage = Self { db };
        storage.migrate().await?;
        Ok(storage)
    }

    async fn migrate(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS documents (
                collection TEXT NOT NULL,
                id TEXT NOT NULL,
                body TEXT NOT NULL,
                dedup_key TEXT,
                PRIMARY KEY (collection, id)
            )",
            libsql::params![],
        )
        .await
        .map_err(|e| db_err("failed to run migration", e))?;
        conn.execute(
            "CREATE UNIQUE INDEX IF NOT EXISTS documents_dedup_key
                ON documents (collection, dedup_key)",
            libsql::params![],
        )
        .await
        .map_err(|e| db_err("failed to create dedup index", e))?;
        Ok(())
    }

    fn conn(&self) -> Result<Connection> {
        self.db
            .connect()
            .map_err(|e| db_err("failed to get database connection", e))
    }

    async fn put<T: Serialize>(&self, collection: &str, id: Uuid, value: &T) -> Result<()> {
        let body = serde_json::to_string(value)?;
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO documents (collection, id, body, dedup_key)
                VALUES (?, ?, ?, NULL)",
            libsql::params![collection, id.to_string(), body],
        )
        .await
        .map_err(|e| db_err("failed to upsert document", e))?;
        Ok(())
    }

    async fn put_keyed<T: Serialize>(
        &self,
        collection: &str,
        id: Uuid,
        key: &str,
        value: &T,
    ) -> Result<()> {
        let body = serde_json::to_string(value)?;
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO documents (collection, id, body, dedup_key)
                VALUES (?, ?, ?, ?)",
            libsql::params![collection, id.to_string(), body, key],
        )
        .await
        .map_err(|e| db_err("failed to upsert document", e))?;
        Ok(())
    }

    /// Inserts only when no row holds the dedup key yet. Returns false when
    /// a concurrent insert won the key; the caller then adopts that row.
    async fn insert_keyed_if_absent<T: Serialize>(
        &self,
        collection: &str,
        id: Uuid,
        key: &str,
        value: &T,
    ) -> Result<bool> {
        let body = serde_json::to_string(value)?;
        let conn = self.conn()?;
        let affected = conn
            .execute(
                "INSERT INTO documents (collection, id, body, dedup_key)
                    VALUES (?, ?, ?, ?)
                    ON CONFLICT (collection, dedup_key) DO NOTHING",
                libsql::params![collection, id.to_string(), body, key],
            )
            .await
            .map_err(|e| db_err("failed to insert document", e))?;
        Ok(affected > 0)
    }

    async fn find_id_by_key(&self, collection: &str, key: &str) -> Result<Option<Uuid>> {
        let conn = self.conn()?;
        let mut rows = conn
            .query(
                "SELECT id FROM documents WHERE collection = ? AND dedup_key = ?",
                libsql::params![collection, key],
            )
            .await
            .map_err(|e| db_err("failed to query dedup key", e))?;

        match rows.next().await.map_err(|e| db_err("failed to read row", e))? {
            Some(row) => {
                let raw: String = row.get(0).map_err(|e| db_err("failed to get id", e))?;
                let id = Uuid::parse_str(&raw).map_err(|e| db_err("malformed stored id", e))?;
                Ok(Some(id))
            }
            None => Ok(None),
        }
    }

    /// The surviving ID for a keyed row that lost an insert race.
    async fn adopt_winner(&self, collection: &str, key: &str) -> Result<Uuid> {
        self.find_id_by_key(collection, key)
            .await?
            .ok_or_else(|| GigmapError::Store {
                message: format!("dedup row vanished after conflict in {collection}"),
            })
    }

    async fn fetch<T: DeserializeOwned>(&self, collection: &str, id: Uuid) -> Result<Option<T>> {
        let conn = self.conn()?;
        let mut rows = conn
            .query(
                "SELECT body FROM documents WHERE collection = ? AND id = ?",
                libsql::params![collection, id.to_string()],
            )
            .await
            .map_err(|e| db_err("failed to query document", e))?;

        match rows.next().await.map_err(|e| db_err("failed to read row", e))? {
            Some(row) => {
                let body: String = row.get(0).map_err(|e| db_err("failed to get body", e))?;
                Ok(Some(serde_json::from_str(&body)?))
            }
            None => Ok(None),
        }
    }

    async fn fetch_all<T: DeserializeOwned>(&self, collection: &str) -> Result<Vec<T>> {
        let conn = self.conn()?;
        let mut rows = conn
            .query(
                "SELECT body FROM documents WHERE collection = ?",
                libsql::params![collection],
            )
            .await
            .map_err(|e| db_err("failed to query collection", e))?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(|e| db_err("failed to read row", e))? {
            let body: String = row.get(0).map_err(|e| db_err("failed to get body", e))?;
            results.push(serde_json::from_str(&body)?);
        }
        Ok(results)
    }

    async fn remove(&self, collection: &str, id: Uuid) -> Result<bool> {
        let conn = self.conn()?;
        let affected = conn
            .execute(
                "DELETE FROM documents WHERE collection = ? AND id = ?",
                libsql::params![collection, id.to_string()],
            )
            .await
            .map_err(|e| db_err("failed to delete document", e))?;
        Ok(affected > 0)
    }
}

#[async_trait]
impl Storage for LibsqlStorage {
    async fn upsert_venue(&self, venue: &mut Venue) -> Result<()> {
        let key = venue_key(venue)?;
        if let Some(id) = self.find_id_by_key("venues", &key).await? {
            venue.id = Some(id);
            return self.put_keyed("venues", id, &key, venue).await;
        }
        let id = Uuid::new_v4();
        venue.id = Some(id);
        if self.insert_keyed_if_absent("venues", id, &key, venue).await? {
            return Ok(());
        }
        let id = self.adopt_winner("venues", &key).await?;
        venue.id = Some(id);
        self.put_keyed("venues", id, &key, venue).await
    }

    async fn get_venue(&self, id: Uuid) -> Result<Option<Venue>> {
        self.fetch("venues", id).await
    }

    async fn find_or_create_classification(
        &self,
        classification: &mut Classification,
    ) -> Result<()> {
        let key = classification_key(classification)?;
        if let Some(id) = self.find_id_by_key("classifications", &key).await? {
            classification.id = Some(id);
            return Ok(());
        }
        let id = Uuid::new_v4();
        classification.id = Some(id);
        if self
            .insert_keyed_if_absent("classifications", id, &key, classification)
            .await?
        {
            return Ok(());
        }
        classification.id = Some(self.adopt_winner("classifications", &key).await?);
        Ok(())
    }

    async fn get_classification(&self, id: Uuid) -> Result<Option<Classification>> {
        self.fetch("classifications", id).await
    }

    async fn find_or_create_image(&self, image: &mut Image) -> Result<()> {
        let key = image.url.clone();
        if let Some(id) = self.find_id_by_key("images", &key).await? {
            image.id = Some(id);
            return Ok(());
        }
        let id = Uuid::new_v4();
        image.id = Some(id);
        if self.insert_keyed_if_absent("images", id, &key, image).await? {
            return Ok(());
        }
        image.id = Some(self.adopt_winner("images", &key).await?);
        Ok(())
    }

    async fn get_image(&self, id: Uuid) -> Result<Option<Image>> {
        self.fetch("images", id).await
    }

    async fn find_or_create_attraction(&self, attraction: &mut Attraction) -> Result<()> {
        let key = attraction.name.clone();
        if let Some(id) = self.find_id_by_key("attractions", &key).await? {
            attraction.id = Some(id);
            return Ok(());
        }
        let id = Uuid::new_v4();
        attraction.id = Some(id);
        if self
            .insert_keyed_if_absent("attractions", id, &key, attraction)
            .await?
        {
            return Ok(());
        }
        attraction.id = Some(self.adopt_winner("attractions", &key).await?);
        Ok(())
    }

    async fn get_attraction(&self, id: Uuid) -> Result<Option<Attraction>> {
        self.fetch("attractions", id).await
    }

    async fn create_sales_window(&self, window: &mut SalesWindow) -> Result<()> {
        let id = Uuid::new_v4();
        window.id = Some(id);
        self.put("sales_windows", id, window).await
    }

    async fn get_sales_window(&self, id: Uuid) -> Result<Option<SalesWindow>> {
        self.fetch("sales_windows", id).await
    }

    async fn create_date_window(&self, window: &mut DateWindow) -> Result<()> {
        let id = Uuid::new_v4();
        window.id = Some(id);
        self.put("date_windows", id, window).await
    }

    async fn get_date_window(&self, id: Uuid) -> Result<Option<DateWindow>> {
        self.fetch("date_windows", id).await
    }

    async fn create_price_range(&self, range: &mut PriceRange) -> Result<()> {
        let id = Uuid::new_v4();
        range.id = Some(id);
        self.put("price_ranges", id, range).await
    }

    async fn get_price_range(&self, id: Uuid) -> Result<Option<PriceRange>> {
        self.fetch("price_ranges", id).await
    }

    async fn create_event(&self, event: &mut Event) -> Result<()> {
        let id = Uuid::new_v4();
        event.id = Some(id);
        self.put("events", id, event).await
    }

    async fn upsert_events(&self, events: &mut [Event]) -> Result<usize> {
        for event in events.iter_mut() {
            let key = event_key(event)?;
            if let Some(id) = self.find_id_by_key("events", &key).await? {
                event.id = Some(id);
                self.put_keyed("events", id, &key, event).await?;
                continue;
            }
            let id = Uuid::new_v4();
            event.id = Some(id);
            if self.insert_keyed_if_absent("events", id, &key, event).await? {
                continue;
            }
            let id = self.adopt_winner("events", &key).await?;
            event.id = Some(id);
            self.put_keyed("events", id, &key, event).await?;
        }
        Ok(events.len())
    }

    async fn get_event(&self, id: Uuid) -> Result<Option<Event>> {
        self.fetch("events", id).await
    }

    async fn get_events(&self) -> Result<Vec<Event>> {
        self.fetch_all("events").await
    }

    async fn create_review_record(&self, record: &mut ReviewRecord) -> Result<()> {
        let id = Uuid::new_v4();
        record.id = Some(id);
        self.put("reviews", id, record).await
    }

    async fn get_review_records(&self) -> Result<Vec<ReviewRecord>> {
        self.fetch_all("reviews").await
    }

    async fn create_profile(&self, profile: &mut UserProfile) -> Result<()> {
        let existing: Vec<UserProfile> = self.fetch_all("profiles").await?;
        if existing.iter().any(|p| p.email == profile.email) {
            return Err(GigmapError::Store {
                message: format!("email already registered: {}", profile.email),
            });
        }
        let id = Uuid::new_v4();
        profile.id = Some(id);
        self.put("profiles", id, profile).await
    }

    async fn get_profile(&self, id: Uuid) -> Result<Option<UserProfile>> {
        self.fetch("profiles", id).await
    }

    async fn update_profile(
        &self,
        id: Uuid,
        update: ProfileUpdate,
    ) -> Result<Option<UserProfile>> {
        let Some(mut profile) = self.fetch::<UserProfile>("profiles", id).await? else {
            return Ok(None);
        };

        if let Some(name) = update.name {
            profile.name = name;
        }
        if let Some(email) = update.email {
            profile.email = email;
        }
        if let Some(location) = update.location {
            profile.location = location;
        }
        if let Some(bio) = update.bio {
            profile.bio = Some(bio);
        }
        profile.updated_at = Utc::now();

        self.put("profiles", id, &profile).await?;
        Ok(Some(profile))
    }

    async fn delete_profile(&self, id: Uuid) -> Result<bool> {
        self.remove("profiles", id).await
    }

    async fn clear_all(&self) -> Result<()> {
        let conn = self.conn()?;
        for collection in COLLECTIONS {
            conn.execute(
                "DELETE FROM documents WHERE collection = ?",
                libsql::params![*collection],
            )
            .await
            .map_err(|e| db_err("failed to clear collection", e))?;
        }
        info!("Cleared all data from database");
        Ok(())
    }
}
