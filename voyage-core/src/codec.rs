//! Record codec: JSON sub-documents stored as text inside flat trip records.
//!
//! The trip table stores two structured payloads as JSON-encoded strings:
//! `fullItinerary` (decoded into `itinerary`) and `tripJson` (decoded into
//! `tripData`). Decoding removes the encoded attribute and inserts the decoded
//! one under the new name; it never leaves both side by side. A missing
//! attribute is left missing.
//!
//! Values that are already structured (a table migrated to native nested
//! documents) are moved across under the decoded name without parsing.

use serde_json::Value;

use crate::error::{Result, VoyageError};
use crate::models::{Item, NewTrip, TripRecord};
use crate::models::trip::{CONVERSATION_ID, DATA_TYPE, USER_ID};

pub const FULL_ITINERARY: &str = "fullItinerary";
pub const TRIP_JSON: &str = "tripJson";
pub const ITINERARY: &str = "itinerary";
pub const TRIP_DATA: &str = "tripData";

/// One encoded payload attribute and its decoded counterpart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Payload {
    FullItinerary,
    TripJson,
}

impl Payload {
    pub const ALL: [Payload; 2] = [Payload::FullItinerary, Payload::TripJson];

    pub fn encoded_name(&self) -> &'static str {
        match self {
            Self::FullItinerary => FULL_ITINERARY,
            Self::TripJson => TRIP_JSON,
        }
    }

    pub fn decoded_name(&self) -> &'static str {
        match self {
            Self::FullItinerary => ITINERARY,
            Self::TripJson => TRIP_DATA,
        }
    }
}

/// Decode both payload attributes of a stored item.
pub fn decode_record(item: Item) -> Result<TripRecord> {
    decode_payloads(item, &Payload::ALL)
}

/// Decode only the listed payload attributes; others pass through untouched.
pub fn decode_payloads(mut item: Item, payloads: &[Payload]) -> Result<TripRecord> {
    for payload in payloads {
        let Some(raw) = item.remove(payload.encoded_name()) else {
            continue;
        };
        let decoded = match raw {
            Value::String(text) => serde_json::from_str(&text).map_err(|e| {
                VoyageError::MalformedPayload {
                    field: payload.encoded_name(),
                    message: e.to_string(),
                }
            })?,
            structured => structured,
        };
        item.insert(payload.decoded_name().to_string(), decoded);
    }
    Ok(TripRecord::from_decoded(item))
}

/// Element-wise [`decode_payloads`]; the first malformed record fails the batch.
pub fn decode_records(items: Vec<Item>, payloads: &[Payload]) -> Result<Vec<TripRecord>> {
    items
        .into_iter()
        .map(|item| decode_payloads(item, payloads))
        .collect()
}

/// Flatten a new record into the stored shape, JSON-encoding its payloads.
pub fn encode_record(trip: NewTrip) -> Result<Item> {
    let mut item = trip.attributes;
    for payload in Payload::ALL {
        item.remove(payload.decoded_name());
    }
    item.insert(USER_ID.to_string(), Value::String(trip.key.user_id));
    item.insert(CONVERSATION_ID.to_string(), Value::String(trip.key.conversation_id));
    item.insert(
        DATA_TYPE.to_string(),
        Value::String(trip.data_type.as_str().to_string()),
    );

    let encoded = [
        (Payload::FullItinerary, trip.itinerary),
        (Payload::TripJson, trip.trip_data),
    ];
    for (payload, value) in encoded {
        if let Some(value) = value {
            let text = serde_json::to_string(&value).map_err(|e| {
                VoyageError::InvalidArgument(format!(
                    "cannot encode {}: {}",
                    payload.decoded_name(),
                    e
                ))
            })?;
            item.insert(payload.encoded_name().to_string(), Value::String(text));
        }
    }
    Ok(item)
}
