use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A flat attribute map as held by the storage provider.
pub type Item = Map<String, Value>;

pub const USER_ID: &str = "userId";
pub const CONVERSATION_ID: &str = "conversationId";
pub const DATA_TYPE: &str = "dataType";
pub const DESTINATION: &str = "destination";
pub const BUDGET_TIER: &str = "budget_tier";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    /// Initial trip-planning inputs supplied by the user.
    Parameters,
    /// The finalized multi-day plan produced by the agent.
    Itinerary,
}

impl DataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Parameters => "parameters",
            Self::Itinerary => "itinerary",
        }
    }
}

/// Composite key of a trip record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TripKey {
    pub user_id: String,
    pub conversation_id: String,
}

impl TripKey {
    pub fn new(user_id: impl Into<String>, conversation_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            conversation_id: conversation_id.into(),
        }
    }

    /// Extract the key from a stored item, if both halves are string attributes.
    pub fn from_item(item: &Item) -> Option<Self> {
        let user_id = item.get(USER_ID)?.as_str()?;
        let conversation_id = item.get(CONVERSATION_ID)?.as_str()?;
        Some(Self::new(user_id, conversation_id))
    }
}

/// A decoded trip record.
///
/// Only the record codec builds these from stored items, so a `TripRecord`
/// never carries `fullItinerary` or `tripJson` next to their decoded forms.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct TripRecord {
    fields: Item,
}

impl TripRecord {
    pub(crate) fn from_decoded(fields: Item) -> Self {
        Self { fields }
    }

    pub fn user_id(&self) -> Option<&str> {
        self.str_field(USER_ID)
    }

    pub fn conversation_id(&self) -> Option<&str> {
        self.str_field(CONVERSATION_ID)
    }

    /// `None` when the discriminator is missing or not one of the known kinds.
    pub fn data_type(&self) -> Option<DataType> {
        match self.str_field(DATA_TYPE)? {
            "parameters" => Some(DataType::Parameters),
            "itinerary" => Some(DataType::Itinerary),
            _ => None,
        }
    }

    pub fn destination(&self) -> Option<&str> {
        self.str_field(DESTINATION)
    }

    pub fn itinerary(&self) -> Option<&Value> {
        self.fields.get(crate::codec::ITINERARY)
    }

    pub fn trip_data(&self) -> Option<&Value> {
        self.fields.get(crate::codec::TRIP_DATA)
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn fields(&self) -> &Item {
        &self.fields
    }

    pub fn into_fields(self) -> Item {
        self.fields
    }

    fn str_field(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(Value::as_str)
    }
}

/// A record about to be written: plain attributes plus the structured
/// payloads the codec stores as JSON text.
#[derive(Debug, Clone)]
pub struct NewTrip {
    pub key: TripKey,
    pub data_type: DataType,
    pub itinerary: Option<Value>,
    pub trip_data: Option<Value>,
    pub attributes: Item,
}

impl NewTrip {
    pub fn new(key: TripKey, data_type: DataType) -> Self {
        Self {
            key,
            data_type,
            itinerary: None,
            trip_data: None,
            attributes: Item::new(),
        }
    }

    pub fn with_itinerary(mut self, itinerary: Value) -> Self {
        self.itinerary = Some(itinerary);
        self
    }

    pub fn with_trip_data(mut self, trip_data: Value) -> Self {
        self.trip_data = Some(trip_data);
        self
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }
}
