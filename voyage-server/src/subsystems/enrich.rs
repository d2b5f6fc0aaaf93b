//! Location enrichment subsystem: attaches coordinates to place names
//!
//! Three entry points share one rule: a geocoding fault or an empty match
//! marks that one location as failed (`null` coordinates) and the batch
//! carries on. Lookups run a few at a time and results keep input order.

use futures::stream::{self, StreamExt};
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;
use voyage_core::geocode::GeocodingProvider;
use voyage_core::models::{Activity, DayPlan, GeoPoint};

/// Concurrent geocoder requests per enrichment call
const MAX_CONCURRENT_LOOKUPS: usize = 4;

/// Key an enriched activity carries its coordinates under
const COORDINATES: &str = "coordinates";

/// A place to look up, optionally narrowed by a context such as a city.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationQuery {
    pub name: String,
    pub context: Option<String>,
}

impl LocationQuery {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            context: None,
        }
    }

    /// Accepts a plain string or `{"name": .., "context": ..}`.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(name) => Some(Self::named(name.clone())),
            Value::Object(fields) => {
                let name = fields.get("name")?.as_str()?;
                let context = fields
                    .get("context")
                    .and_then(Value::as_str)
                    .filter(|c| !c.is_empty())
                    .map(str::to_string);
                Some(Self {
                    name: name.to_string(),
                    context,
                })
            }
            _ => None,
        }
    }

    /// Text sent to the geocoder: `"name, context"` when a context is present.
    pub fn query_text(&self) -> String {
        match &self.context {
            Some(context) => format!("{}, {}", self.name, context),
            None => self.name.clone(),
        }
    }
}

/// Result of `enrich_locations` / `enrich_batch`.
#[derive(Debug, Clone, Serialize)]
pub struct LocationReport {
    /// Keyed by name in request order; a repeated name keeps its first position.
    pub locations: IndexMap<String, Option<GeoPoint>>,
    pub failed_count: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failed_locations: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EnrichedActivity {
    #[serde(flatten)]
    pub activity: Activity,
    pub coordinates: Option<GeoPoint>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EnrichedDay {
    pub day: Option<u32>,
    pub date: Option<String>,
    pub theme: Option<String>,
    pub activities: Vec<EnrichedActivity>,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct EnrichmentSummary {
    pub total_locations: usize,
    pub enriched: usize,
    pub failed: usize,
}

/// Result of `enrich_itinerary`.
#[derive(Debug, Clone, Serialize)]
pub struct ItineraryReport {
    pub itinerary_with_coords: Vec<EnrichedDay>,
    pub summary: EnrichmentSummary,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failed_locations: Vec<String>,
}

/// Geocode a single query; failures are logged and reported as no match.
async fn lookup(geocoder: &dyn GeocodingProvider, query: String) -> Option<GeoPoint> {
    match geocoder.geocode(&query).await {
        Ok(Some(point)) => Some(point),
        Ok(None) => {
            tracing::debug!(query = %query, "No geocoding match");
            None
        }
        Err(e) => {
            tracing::warn!(query = %query, error = %e, "Geocoding failed, location marked as failed");
            None
        }
    }
}

/// Geocode every query, preserving input order.
async fn lookup_all(geocoder: &dyn GeocodingProvider, queries: Vec<String>) -> Vec<Option<GeoPoint>> {
    stream::iter(queries)
        .map(|query| lookup(geocoder, query))
        .buffered(MAX_CONCURRENT_LOOKUPS)
        .collect()
        .await
}

/// Geocode plain place names.
pub async fn enrich_locations(geocoder: &dyn GeocodingProvider, names: &[String]) -> LocationReport {
    let queries: Vec<LocationQuery> = names.iter().map(LocationQuery::named).collect();
    enrich_batch(geocoder, &queries).await
}

/// Geocode names with optional context; the report is keyed by bare name.
pub async fn enrich_batch(geocoder: &dyn GeocodingProvider, queries: &[LocationQuery]) -> LocationReport {
    let results = lookup_all(geocoder, queries.iter().map(LocationQuery::query_text).collect()).await;

    let mut locations = IndexMap::new();
    let mut failed_locations = Vec::new();
    for (query, result) in queries.iter().zip(results) {
        if result.is_none() {
            failed_locations.push(query.name.clone());
        }
        locations.insert(query.name.clone(), result);
    }

    LocationReport {
        locations,
        failed_count: failed_locations.len(),
        failed_locations,
    }
}

/// Attach coordinates to every activity of an itinerary.
pub async fn enrich_itinerary(geocoder: &dyn GeocodingProvider, days: Vec<DayPlan>) -> ItineraryReport {
    let queries: Vec<String> = days
        .iter()
        .flat_map(|day| day.activities.iter().map(Activity::geocode_query))
        .collect();
    let total_locations = queries.len();
    let mut results = lookup_all(geocoder, queries).await.into_iter();

    let mut failed_locations = Vec::new();
    let mut itinerary_with_coords = Vec::with_capacity(days.len());
    for day in days {
        let mut activities = Vec::with_capacity(day.activities.len());
        for mut activity in day.activities {
            let coordinates = results.next().flatten();
            if coordinates.is_none() {
                failed_locations.push(activity.name.clone());
            }
            activity.extra.remove(COORDINATES);
            activities.push(EnrichedActivity {
                activity,
                coordinates,
            });
        }
        itinerary_with_coords.push(EnrichedDay {
            day: day.day,
            date: day.date,
            theme: day.theme,
            activities,
        });
    }

    let failed = failed_locations.len();
    ItineraryReport {
        itinerary_with_coords,
        summary: EnrichmentSummary {
            total_locations,
            enriched: total_locations - failed,
            failed,
        },
        failed_locations,
    }
}

// ============================================================================
// TESTS
// ============================================================================
