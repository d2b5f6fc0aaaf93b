//! In-process table used for local development and tests.
//!
//! Items of a partition are kept in insertion order, which stands in for the
//! sort-key order of the managed table. Overwriting a key keeps its position.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{QueryRequest, StorageProvider};
use crate::error::{Result, VoyageError};
use crate::models::{Item, TripKey};

#[derive(Debug, Default)]
pub struct MemoryStorage {
    partitions: RwLock<HashMap<String, Vec<(String, Item)>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored items across all partitions.
    pub async fn len(&self) -> usize {
        self.partitions.read().await.values().map(Vec::len).sum()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl StorageProvider for MemoryStorage {
    async fn query(&self, request: QueryRequest) -> Result<Vec<Item>> {
        let partitions = self.partitions.read().await;
        let Some(rows) = partitions.get(&request.partition_key) else {
            return Ok(Vec::new());
        };

        let ordered: Box<dyn Iterator<Item = &(String, Item)>> = if request.scan_forward {
            Box::new(rows.iter())
        } else {
            Box::new(rows.iter().rev())
        };
        let limit = request.limit.map_or(usize::MAX, |l| l as usize);

        // Limit first, filter second: same evaluation order as the managed table.
        let items = ordered
            .take(limit)
            .filter(|(_, item)| request.filter.as_ref().map_or(true, |f| f.matches(item)))
            .map(|(_, item)| item.clone())
            .collect();
        Ok(items)
    }

    async fn get_item(&self, key: &TripKey) -> Result<Option<Item>> {
        let partitions = self.partitions.read().await;
        Ok(partitions.get(&key.user_id).and_then(|rows| {
            rows.iter()
                .find(|(sort_key, _)| *sort_key == key.conversation_id)
                .map(|(_, item)| item.clone())
        }))
    }

    async fn put_item(&self, item: Item) -> Result<()> {
        let key = TripKey::from_item(&item).ok_or_else(|| {
            VoyageError::InvalidArgument(
                "item must carry string userId and conversationId attributes".to_string(),
            )
        })?;

        let mut partitions = self.partitions.write().await;
        let rows = partitions.entry(key.user_id).or_default();
        match rows.iter_mut().find(|(sort_key, _)| *sort_key == key.conversation_id) {
            Some(existing) => existing.1 = item,
            None => rows.push((key.conversation_id, item)),
        }
        Ok(())
    }

    async fn delete_item(&self, key: &TripKey) -> Result<()> {
        let mut partitions = self.partitions.write().await;
        if let Some(rows) = partitions.get_mut(&key.user_id) {
            rows.retain(|(sort_key, _)| *sort_key != key.conversation_id);
        }
        Ok(())
    }

    async fn health(&self) -> Result<String> {
        Ok(format!("in-memory ({} items)", self.len().await))
    }

    fn name(&self) -> &str {
        "memory"
    }
}
