use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One day of a decoded itinerary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayPlan {
    #[serde(default)]
    pub day: Option<u32>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub theme: Option<String>,
    #[serde(default)]
    pub activities: Vec<Activity>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    /// Everything else the agent attached (time, description, cost, ...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Activity {
    /// Free-text geocoder query: `"name, address"` when an address is known.
    pub fn geocode_query(&self) -> String {
        match self.address.as_deref() {
            Some(address) if !address.is_empty() => format!("{}, {}", self.name, address),
            _ => self.name.clone(),
        }
    }
}

/// A resolved geocode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
    pub formatted_address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub place_id: Option<String>,
}
