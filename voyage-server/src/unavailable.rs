//! Stand-ins for collaborators that are not configured.
//!
//! The gateway still starts without agent IDs or a maps key so the trip
//! endpoints stay usable; the affected endpoints report the missing setting
//! on every call.

use async_trait::async_trait;
use voyage_core::geocode::GeocodingProvider;
use voyage_core::models::GeoPoint;
use voyage_core::relay::{AgentEventStream, AgentInvocation, AgentProvider};
use voyage_core::{Result, VoyageError};

pub struct UnavailableAgent {
    reason: String,
}

impl UnavailableAgent {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl AgentProvider for UnavailableAgent {
    async fn invoke_agent(&self, _invocation: AgentInvocation) -> Result<AgentEventStream> {
        Err(VoyageError::AgentInvocation(format!(
            "agent is not available: {}",
            self.reason
        )))
    }

    fn name(&self) -> &str {
        "unavailable"
    }
}

pub struct UnavailableGeocoder {
    reason: String,
}

impl UnavailableGeocoder {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl GeocodingProvider for UnavailableGeocoder {
    async fn geocode(&self, _query: &str) -> Result<Option<GeoPoint>> {
        Err(VoyageError::Geocoding(format!(
            "geocoder is not available: {}",
            self.reason
        )))
    }

    fn name(&self) -> &str {
        "unavailable"
    }
}
