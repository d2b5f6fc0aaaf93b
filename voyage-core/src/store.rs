//! Trip store: structured access to a user's trip records.
//!
//! Every read goes through the record codec, so callers only ever see decoded
//! records. "Newest first" is the table's native sort-key order walked
//! backwards; no secondary sort is applied. Filters run after the key-range
//! read, so `limit` bounds scanned key matches, not results, and no
//! continuation is followed.

use std::sync::Arc;

use serde_json::Value;

use crate::codec::{self, Payload, ITINERARY};
use crate::error::{Result, VoyageError};
use crate::models::trip::{BUDGET_TIER, DATA_TYPE, DESTINATION};
use crate::models::{DataType, DayPlan, NewTrip, TripKey, TripRecord};
use crate::storage::{FilterExpression, QueryRequest, StorageProvider};

pub const DEFAULT_TRIPS_LIMIT: u32 = 20;
pub const DEFAULT_PARAMETERS_LIMIT: u32 = 10;
pub const DEFAULT_ALL_DATA_LIMIT: u32 = 50;

/// How far back the itinerary fallback looks when the addressed record only
/// holds trip parameters.
pub const ITINERARY_FALLBACK_SCAN: u32 = 50;

#[derive(Clone)]
pub struct TripStore {
    provider: Arc<dyn StorageProvider>,
}

impl TripStore {
    pub fn new(provider: Arc<dyn StorageProvider>) -> Self {
        Self { provider }
    }

    pub fn provider(&self) -> &dyn StorageProvider {
        self.provider.as_ref()
    }

    /// Most recent itinerary records, decoded. `limit` defaults to 20.
    pub async fn list_trips(&self, user_id: &str, limit: Option<i64>) -> Result<Vec<TripRecord>> {
        let limit = resolve_limit(limit, DEFAULT_TRIPS_LIMIT)?;
        self.query_decoded(user_id, Some(type_filter(DataType::Itinerary)), Some(limit), &Payload::ALL)
            .await
    }

    /// Point lookup. A missing key is `Ok(None)`, not an error.
    pub async fn get_trip(&self, user_id: &str, conversation_id: &str) -> Result<Option<TripRecord>> {
        let key = validate_key(user_id, conversation_id)?;
        match self.provider.get_item(&key).await? {
            Some(item) => codec::decode_record(item).map(Some),
            None => {
                tracing::debug!(user_id = %user_id, conversation_id = %conversation_id, "Trip not found");
                Ok(None)
            }
        }
    }

    /// Most recent parameter records; only `tripJson` is decoded. `limit` defaults to 10.
    pub async fn list_parameters(&self, user_id: &str, limit: Option<i64>) -> Result<Vec<TripRecord>> {
        let limit = resolve_limit(limit, DEFAULT_PARAMETERS_LIMIT)?;
        self.query_decoded(
            user_id,
            Some(type_filter(DataType::Parameters)),
            Some(limit),
            &[Payload::TripJson],
        )
        .await
    }

    /// Itinerary records whose destination contains `destination` (case-sensitive)
    /// and whose `budget_tier` equals `budget_tier`. Empty criteria are ignored.
    /// Unbounded: no limit is sent to the provider.
    pub async fn search_trips(
        &self,
        user_id: &str,
        destination: Option<&str>,
        budget_tier: Option<&str>,
    ) -> Result<Vec<TripRecord>> {
        let mut filter = type_filter(DataType::Itinerary);
        if let Some(destination) = destination.filter(|d| !d.is_empty()) {
            filter = filter.contains(DESTINATION, destination);
        }
        if let Some(tier) = budget_tier.filter(|t| !t.is_empty()) {
            filter = filter.eq(BUDGET_TIER, tier);
        }
        self.query_decoded(user_id, Some(filter), None, &[Payload::FullItinerary])
            .await
    }

    /// Idempotent delete.
    pub async fn delete_trip(&self, user_id: &str, conversation_id: &str) -> Result<()> {
        let key = validate_key(user_id, conversation_id)?;
        self.provider.delete_item(&key).await?;
        tracing::info!(user_id = %user_id, conversation_id = %conversation_id, "Trip deleted");
        Ok(())
    }

    /// Every record kind, decoded. `limit` defaults to 50.
    pub async fn list_all_data(&self, user_id: &str, limit: Option<i64>) -> Result<Vec<TripRecord>> {
        let limit = resolve_limit(limit, DEFAULT_ALL_DATA_LIMIT)?;
        self.query_decoded(user_id, None, Some(limit), &Payload::ALL).await
    }

    /// Write (or overwrite) a record, encoding its payloads.
    pub async fn save_trip(&self, trip: NewTrip) -> Result<()> {
        validate_key(&trip.key.user_id, &trip.key.conversation_id)?;
        let item = codec::encode_record(trip)?;
        self.provider.put_item(item).await
    }

    /// Find the day plans to enrich for a conversation.
    ///
    /// A supplied itinerary is used as-is. Otherwise the record is fetched; a
    /// `parameters` record falls back to the first itinerary among the user's
    /// 50 most recent records (provider scan order, no relevance ranking). An
    /// itinerary wrapped as `{"itinerary": [...]}` is unwrapped once.
    pub async fn resolve_full_itinerary(
        &self,
        user_id: &str,
        conversation_id: &str,
        supplied: Option<Value>,
    ) -> Result<Vec<DayPlan>> {
        if let Some(itinerary) = supplied.filter(|v| !v.is_null()) {
            return parse_day_plans(itinerary);
        }

        let mut record = self.get_trip(user_id, conversation_id).await?.ok_or_else(|| {
            VoyageError::NotFound(format!("trip {user_id}/{conversation_id}"))
        })?;

        if record.data_type() == Some(DataType::Parameters) {
            let recent = self
                .list_trips(user_id, Some(i64::from(ITINERARY_FALLBACK_SCAN)))
                .await?;
            record = recent
                .into_iter()
                .find(|r| r.data_type() == Some(DataType::Itinerary))
                .ok_or_else(|| {
                    VoyageError::NotFound(format!("no complete itinerary found for user {user_id}"))
                })?;
        }

        let mut itinerary = record
            .into_fields()
            .remove(ITINERARY)
            .ok_or_else(|| VoyageError::InvalidItinerary("record has no itinerary".to_string()))?;

        if let Value::Object(ref mut wrapper) = itinerary {
            if let Some(inner) = wrapper.remove(ITINERARY) {
                itinerary = inner;
            }
        }
        parse_day_plans(itinerary)
    }

    async fn query_decoded(
        &self,
        user_id: &str,
        filter: Option<FilterExpression>,
        limit: Option<u32>,
        payloads: &[Payload],
    ) -> Result<Vec<TripRecord>> {
        validate_user(user_id)?;
        let mut request = QueryRequest::newest_first(user_id);
        request.filter = filter;
        request.limit = limit;

        let items = self.provider.query(request).await?;
        let records = codec::decode_records(items, payloads).map_err(|e| {
            tracing::error!(user_id = %user_id, error = %e, "Stored trip payload is corrupt");
            e
        })?;
        tracing::debug!(user_id = %user_id, count = records.len(), backend = self.provider.name(), "Trip query");
        Ok(records)
    }
}

fn type_filter(data_type: DataType) -> FilterExpression {
    FilterExpression::new().eq(DATA_TYPE, data_type.as_str())
}

/// Apply the default and reject non-positive limits.
fn resolve_limit(limit: Option<i64>, default: u32) -> Result<u32> {
    match limit {
        None => Ok(default),
        Some(l) if l > 0 => Ok(u32::try_from(l).unwrap_or(u32::MAX)),
        Some(l) => Err(VoyageError::InvalidArgument(format!(
            "limit must be a positive integer, got {l}"
        ))),
    }
}

fn validate_user(user_id: &str) -> Result<()> {
    if user_id.trim().is_empty() {
        return Err(VoyageError::InvalidArgument("userId is required".to_string()));
    }
    Ok(())
}

fn validate_key(user_id: &str, conversation_id: &str) -> Result<TripKey> {
    validate_user(user_id)?;
    if conversation_id.trim().is_empty() {
        return Err(VoyageError::InvalidArgument(
            "conversationId is required".to_string(),
        ));
    }
    Ok(TripKey::new(user_id, conversation_id))
}

/// Validate an itinerary value as a non-empty array of day plans.
pub fn parse_day_plans(itinerary: Value) -> Result<Vec<DayPlan>> {
    match itinerary {
        Value::Array(days) if !days.is_empty() => days
            .into_iter()
            .map(|day| {
                serde_json::from_value::<DayPlan>(day)
                    .map_err(|e| VoyageError::InvalidItinerary(format!("bad day plan: {e}")))
            })
            .collect(),
        Value::Array(_) => Err(VoyageError::InvalidItinerary(
            "itinerary has no days".to_string(),
        )),
        other => Err(VoyageError::InvalidItinerary(format!(
            "expected an array of day plans, found {}",
            json_kind(&other)
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
