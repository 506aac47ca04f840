//! # In-Memory Offer Repository
//!
//! In-memory implementation of [`OfferRepository`].

use crate::domain::entities::offer::Offer;
use crate::domain::value_objects::{OfferId, OfferState};
use crate::infrastructure::persistence::traits::{OfferRepository, RepositoryResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// In-memory implementation of [`OfferRepository`].
#[derive(Debug, Clone, Default)]
pub struct InMemoryOfferRepository {
    storage: Arc<RwLock<HashMap<OfferId, Offer>>>,
}

impl InMemoryOfferRepository {
    /// Creates a new empty in-memory offer repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OfferRepository for InMemoryOfferRepository {
    async fn save(&self, offer: &Offer) -> RepositoryResult<()> {
        let mut storage = self.storage.write().await;
        storage.insert(offer.id().clone(), offer.clone());
        Ok(())
    }

    async fn get(&self, id: &OfferId) -> RepositoryResult<Option<Offer>> {
        let storage = self.storage.read().await;
        Ok(storage.get(id).cloned())
    }

    async fn find_available(&self) -> RepositoryResult<Vec<Offer>> {
        let storage = self.storage.read().await;
        Ok(storage
            .values()
            .filter(|o| o.state() == OfferState::Available)
            .cloned()
            .collect())
    }

    async fn delete(&self, id: &OfferId) -> RepositoryResult<bool> {
        let mut storage = self.storage.write().await;
        Ok(storage.remove(id).is_some())
    }
}
