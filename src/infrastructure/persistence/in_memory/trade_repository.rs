//! # In-Memory Trade Repository
//!
//! In-memory implementation of [`TradeRepository`].
//!
//! Uses a thread-safe `HashMap` for storage. Backs the test suite and
//! single-process deployments without external storage.

use crate::domain::entities::trade::Trade;
use crate::domain::value_objects::{TradeId, TradePhase};
use crate::infrastructure::persistence::traits::{RepositoryResult, TradeRepository};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// In-memory implementation of [`TradeRepository`].
#[derive(Debug, Clone, Default)]
pub struct InMemoryTradeRepository {
    storage: Arc<RwLock<HashMap<TradeId, Trade>>>,
}

impl InMemoryTradeRepository {
    /// Creates a new empty in-memory trade repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears all trades from the repository.
    pub async fn clear(&self) {
        let mut storage = self.storage.write().await;
        storage.clear();
    }
}

#[async_trait]
impl TradeRepository for InMemoryTradeRepository {
    async fn save(&self, trade: &Trade) -> RepositoryResult<()> {
        let mut storage = self.storage.write().await;
        storage.insert(trade.id().clone(), trade.clone());
        Ok(())
    }

    async fn get(&self, id: &TradeId) -> RepositoryResult<Option<Trade>> {
        let storage = self.storage.read().await;
        Ok(storage.get(id).cloned())
    }

    async fn find_active(&self) -> RepositoryResult<Vec<Trade>> {
        let storage = self.storage.read().await;
        Ok(storage
            .values()
            .filter(|t| t.is_active())
            .cloned()
            .collect())
    }

    async fn find_failed(&self) -> RepositoryResult<Vec<Trade>> {
        let storage = self.storage.read().await;
        Ok(storage
            .values()
            .filter(|t| t.phase() == TradePhase::Failed)
            .cloned()
            .collect())
    }

    async fn delete(&self, id: &TradeId) -> RepositoryResult<bool> {
        let mut storage = self.storage.write().await;
        Ok(storage.remove(id).is_some())
    }

    async fn count(&self) -> RepositoryResult<u64> {
        let storage = self.storage.read().await;
        Ok(storage.len() as u64)
    }
}
