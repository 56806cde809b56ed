use crate::domain::{
    Attraction, Classification, DateWindow, Event, Image, PriceRange, ProfileUpdate,
    ReviewRecord, SalesWindow, UserProfile, Venue,
};
use crate::error::{GigmapError, Result};
use crate::storage::Storage;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::debug;
use uuid::Uuid;

/// In-memory storage for development and testing. One mutex per collection;
/// every find-or-create runs its lookup and insert inside a single lock
/// section, which is what makes the dedup atomic.
pub struct InMemoryStorage {
    venues: Arc<Mutex<HashMap<Uuid, Venue>>>,
    classifications: Arc<Mutex<HashMap<Uuid, Classification>>>,
    images: Arc<Mutex<HashMap<Uuid, Image>>>,
    attractions: Arc<Mutex<HashMap<Uuid, Attraction>>>,
    sales_windows: Arc<Mutex<HashMap<Uuid, SalesWindow>>>,
    date_windows: Arc<Mutex<HashMap<Uuid, DateWindow>>>,
    price_ranges: Arc<Mutex<HashMap<Uuid, PriceRange>>>,
    events: Arc<Mutex<HashMap<Uuid, Event>>>,
    reviews: Arc<Mutex<HashMap<Uuid, ReviewRecord>>>,
    profiles: Arc<Mutex<HashMap<Uuid, UserProfile>>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self {
            venues: Arc::new(Mutex::new(HashMap::new())),
            classifications: Arc::new(Mutex::new(HashMap::new())),
            images: Arc::new(Mutex::new(HashMap::new())),
            attractions: Arc::new(Mutex::new(HashMap::new())),
            sales_windows: Arc::new(Mutex::new(HashMap::new())),
            date_windows: Arc::new(Mutex::new(HashMap::new())),
            price_ranges: Arc::new(Mutex::new(HashMap::new())),
            events: Arc::new(Mutex::new(HashMap::new())),
            reviews: Arc::new(Mutex::new(HashMap::new())),
            profiles: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn upsert_venue(&self, venue: &mut Venue) -> Result<()> {
        let mut venues = self.venues.lock().unwrap();
        let existing_id = venues
            .values()
            .find(|v| v.name == venue.name && v.location == venue.location)
            .and_then(|v| v.id);

        match existing_id {
            Some(id) => {
                venue.id = Some(id);
                venues.insert(id, venue.clone());
                debug!("Updated venue: {} ({})", venue.name, id);
            }
            None => {
                let id = Uuid::new_v4();
                venue.id = Some(id);
                venues.insert(id, venue.clone());
                debug!("Created venue: {} ({})", venue.name, id);
            }
        }
        Ok(())
    }

    async fn get_venue(&self, id: Uuid) -> Result<Option<Venue>> {
        Ok(self.venues.lock().unwrap().get(&id).cloned())
    }

    async fn find_or_create_classification(
        &self,
        classification: &mut Classification,
    ) -> Result<()> {
        let mut classifications = self.classifications.lock().unwrap();
        if let Some(existing) = classifications
            .values()
            .find(|c| c.dedup_key() == classification.dedup_key())
        {
            classification.id = existing.id;
            return Ok(());
        }

        let id = Uuid::new_v4();
        classification.id = Some(id);
        classifications.insert(id, classification.clone());
        debug!("Created classification {:?} ({})", classification.dedup_key(), id);
        Ok(())
    }

    async fn get_classification(&self, id: Uuid) -> Result<Option<Classification>> {
        Ok(self.classifications.lock().unwrap().get(&id).cloned())
    }

    async fn find_or_create_image(&self, image: &mut Image) -> Result<()> {
        let mut images = self.images.lock().unwrap();
        if let Some(existing) = images.values().find(|i| i.url == image.url) {
            image.id = existing.id;
            return Ok(());
        }

        let id = Uuid::new_v4();
        image.id = Some(id);
        images.insert(id, image.clone());
        Ok(())
    }

    async fn get_image(&self, id: Uuid) -> Result<Option<Image>> {
        Ok(self.images.lock().unwrap().get(&id).cloned())
    }

    async fn find_or_create_attraction(&self, attraction: &mut Attraction) -> Result<()> {
        let mut attractions = self.attractions.lock().unwrap();
        if let Some(existing) = attractions.values().find(|a| a.name == attraction.name) {
            attraction.id = existing.id;
            return Ok(());
        }

        let id = Uuid::new_v4();
        attraction.id = Some(id);
        attractions.insert(id, attraction.clone());
        debug!("Created attraction: {} ({})", attraction.name, id);
        Ok(())
    }

    async fn get_attraction(&self, id: Uuid) -> Result<Option<Attraction>> {
        Ok(self.attractions.lock().unwrap().get(&id).cloned())
    }

    async fn create_sales_window(&self, window: &mut SalesWindow) -> Result<()> {
        let id = Uuid::new_v4();
        window.id = Some(id);
        self.sales_windows.lock().unwrap().insert(id, window.clone());
        Ok(())
    }

    async fn get_sales_window(&self, id: Uuid) -> Result<Option<SalesWindow>> {
        Ok(self.sales_windows.lock().unwrap().get(&id).cloned())
    }

    async fn create_date_window(&self, window: &mut DateWindow) -> Result<()> {
        let id = Uuid::new_v4();
        window.id = Some(id);
        self.date_windows.lock().unwrap().insert(id, window.clone());
        Ok(())
    }

    async fn get_date_window(&self, id: Uuid) -> Result<Option<DateWindow>> {
        Ok(self.date_windows.lock().unwrap().get(&id).cloned())
    }

    async fn create_price_range(&self, range: &mut PriceRange) -> Result<()> {
        let id = Uuid::new_v4();
        range.id = Some(id);
        self.price_ranges.lock().unwrap().insert(id, range.clone());
        Ok(())
    }

    async fn get_price_range(&self, id: Uuid) -> Result<Option<PriceRange>> {
        Ok(self.price_ranges.lock().unwrap().get(&id).cloned())
    }

    async fn create_event(&self, event: &mut Event) -> Result<()> {
        let id = Uuid::new_v4();
        event.id = Some(id);
        self.events.lock().unwrap().insert(id, event.clone());
        debug!("Created event: {} ({})", event.name, id);
        Ok(())
    }

    async fn upsert_events(&self, events: &mut [Event]) -> Result<usize> {
        let mut stored = self.events.lock().unwrap();
        for event in events.iter_mut() {
            let existing_id = stored
                .values()
                .find(|e| e.name == event.name && e.location == event.location)
                .and_then(|e| e.id);
            let id = existing_id.unwrap_or_else(Uuid::new_v4);
            event.id = Some(id);
            stored.insert(id, event.clone());
        }
        Ok(events.len())
    }

    async fn get_event(&self, id: Uuid) -> Result<Option<Event>> {
        Ok(self.events.lock().unwrap().get(&id).cloned())
    }

    async fn get_events(&self) -> Result<Vec<Event>> {
        Ok(self.events.lock().unwrap().values().cloned().collect())
    }

    async fn create_review_record(&self, record: &mut ReviewRecord) -> Result<()> {
        let id = Uuid::new_v4();
        record.id = Some(id);
        self.reviews.lock().unwrap().insert(id, record.clone());
        Ok(())
    }

    async fn get_review_records(&self) -> Result<Vec<ReviewRecord>> {
        Ok(self.reviews.lock().unwrap().values().cloned().collect())
    }

    async fn create_profile(&self, profile: &mut UserProfile) -> Result<()> {
        let mut profiles = self.profiles.lock().unwrap();
        if profiles.values().any(|p| p.email == profile.email) {
            return Err(GigmapError::Store {
                message: format!("email already registered: {}", profile.email),
            });
        }

        let id = Uuid::new_v4();
        profile.id = Some(id);
        profiles.insert(id, profile.clone());
        Ok(())
    }

    async fn get_profile(&self, id: Uuid) -> Result<Option<UserProfile>> {
        Ok(self.profiles.lock().unwrap().get(&id).cloned())
    }

    async fn update_profile(
        &self,
        id: Uuid,
        update: ProfileUpdate,
    ) -> Result<Option<UserProfile>> {
        let mut profiles = self.profiles.lock().unwrap();
        let Some(profile) = profiles.get_mut(&id) else {
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

        Ok(Some(profile.clone()))
    }

    async fn delete_profile(&self, id: Uuid) -> Result<bool> {
        Ok(self.profiles.lock().unwrap().remove(&id).is_some())
    }

    async fn clear_all(&self) -> Result<()> {
        self.events.lock().unwrap().clear();
        self.classifications.lock().unwrap().clear();
        self.date_windows.lock().unwrap().clear();
        self.sales_windows.lock().unwrap().clear();
        self.price_ranges.lock().unwrap().clear();
        self.images.lock().unwrap().clear();
        self.attractions.lock().unwrap().clear();
        self.venues.lock().unwrap().clear();
        self.reviews.lock().unwrap().clear();
        self.profiles.lock().unwrap().clear();
        debug!("Cleared all collections");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::GeoPoint;

    fn venue(name: &str, lat: f64, lng: f64) -> Venue {
        Venue {
            id: None,
            name: name.to_string(),
            url: None,
            postal_code: None,
            timezone: None,
            city: None,
            country: None,
            address: None,
            location: GeoPoint::new(lat, lng),
            markets: vec![],
            ada: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn venue_upsert_matches_on_name_and_point() {
        let storage = InMemoryStorage::new();

        let mut first = venue("The Garage", 51.5465, -0.1058);
        storage.upsert_venue(&mut first).await.unwrap();

        let mut again = venue("The Garage", 51.5465, -0.1058);
        again.url = Some("https://thegarage.example".to_string());
        storage.upsert_venue(&mut again).await.unwrap();

        assert_eq!(first.id, again.id);
        let stored = storage.get_venue(first.id.unwrap()).await.unwrap().unwrap();
        assert_eq!(stored.url.as_deref(), Some("https://thegarage.example"));

        // Same name elsewhere is a different venue
        let mut elsewhere = venue("The Garage", 53.4808, -2.2426);
        storage.upsert_venue(&mut elsewhere).await.unwrap();
        assert_ne!(first.id, elsewhere.id);
    }

    #[tokio::test]
    async fn classification_dedup_is_exact_tuple_match() {
        let storage = InMemoryStorage::new();

        let mut a = Classification {
            id: None,
            segment: Some("Music".into()),
            genre: Some("Rock".into()),
            sub_genre: Some("Indie".into()),
            class_type: None,
            sub_type: None,
            created_at: Utc::now(),
        };
        let mut b = a.clone();
        let mut c = Classification {
            genre: Some("Jazz".into()),
            ..a.clone()
        };

        storage.find_or_create_classification(&mut a).await.unwrap();
        storage.find_or_create_classification(&mut b).await.unwrap();
        storage.find_or_create_classification(&mut c).await.unwrap();

        assert_eq!(a.id, b.id);
        assert_ne!(a.id, c.id);
    }

    #[tokio::test]
    async fn duplicate_profile_email_is_refused() {
        let storage = InMemoryStorage::new();
        let mut profile = UserProfile {
            id: None,
            name: "Sam".into(),
            email: "sam@example.com".into(),
            location: GeoPoint::new(51.5, -0.1),
            bio: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        storage.create_profile(&mut profile).await.unwrap();

        let mut duplicate = UserProfile {
            id: None,
            ..profile.clone()
        };
        assert!(storage.create_profile(&mut duplicate).await.is_err());
    }
}
