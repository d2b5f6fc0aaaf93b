//! Storage provider abstraction for the trip table.
//!
//! The table is keyed by `userId` (partition) and `conversationId` (sort).
//! Queries follow key-range-then-filter semantics: the provider reads up to
//! `limit` items of the partition in key order, and only then drops the ones
//! the filter rejects. A restrictive filter can therefore return fewer than
//! `limit` items even though more matching data exists further along.

pub mod dynamo;
pub mod memory;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::models::{Item, TripKey};

pub use dynamo::DynamoStorage;
pub use memory::MemoryStorage;

/// A single condition on a string attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    Equals { attribute: String, value: String },
    /// Case-sensitive substring match.
    Contains { attribute: String, value: String },
}

impl Condition {
    pub fn attribute(&self) -> &str {
        match self {
            Self::Equals { attribute, .. } | Self::Contains { attribute, .. } => attribute,
        }
    }

    pub fn value(&self) -> &str {
        match self {
            Self::Equals { value, .. } | Self::Contains { value, .. } => value,
        }
    }

    pub fn matches(&self, item: &Item) -> bool {
        let Some(actual) = item.get(self.attribute()).and_then(Value::as_str) else {
            return false;
        };
        match self {
            Self::Equals { value, .. } => actual == value,
            Self::Contains { value, .. } => actual.contains(value.as_str()),
        }
    }
}

/// Conjunction of conditions, evaluated by the provider after the key-range read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterExpression {
    conditions: Vec<Condition>,
}

impl FilterExpression {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, attribute: impl Into<String>, value: impl Into<String>) -> Self {
        self.conditions.push(Condition::Equals {
            attribute: attribute.into(),
            value: value.into(),
        });
        self
    }

    pub fn contains(mut self, attribute: impl Into<String>, value: impl Into<String>) -> Self {
        self.conditions.push(Condition::Contains {
            attribute: attribute.into(),
            value: value.into(),
        });
        self
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn matches(&self, item: &Item) -> bool {
        self.conditions.iter().all(|c| c.matches(item))
    }
}

/// Partition query.
#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub partition_key: String,
    pub filter: Option<FilterExpression>,
    /// Bounds the number of key matches read, not the number returned.
    pub limit: Option<u32>,
    /// `false` walks the sort key newest-first.
    pub scan_forward: bool,
}

impl QueryRequest {
    pub fn newest_first(partition_key: impl Into<String>) -> Self {
        Self {
            partition_key: partition_key.into(),
            filter: None,
            limit: None,
            scan_forward: false,
        }
    }

    pub fn with_filter(mut self, filter: FilterExpression) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Abstraction over the table holding trip records.
#[async_trait]
pub trait StorageProvider: Send + Sync {
    async fn query(&self, request: QueryRequest) -> Result<Vec<Item>>;

    async fn get_item(&self, key: &TripKey) -> Result<Option<Item>>;

    /// Full overwrite of the item at the key carried in its attributes.
    async fn put_item(&self, item: Item) -> Result<()>;

    /// Idempotent: deleting a missing key succeeds.
    async fn delete_item(&self, key: &TripKey) -> Result<()>;

    /// Short status string for health reporting.
    async fn health(&self) -> Result<String>;

    /// Backend name for logging.
    fn name(&self) -> &str;
}
