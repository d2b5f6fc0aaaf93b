use thiserror::Error;

#[derive(Error, Debug)]
pub enum VoyageError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Malformed payload in '{field}': {message}")]
    MalformedPayload { field: &'static str, message: String },

    #[error("Invalid itinerary: {0}")]
    InvalidItinerary(String),

    #[error("Agent invocation failed: {0}")]
    AgentInvocation(String),

    #[error("Storage provider error: {0}")]
    StorageProvider(String),

    #[error("Geocoding error: {0}")]
    Geocoding(String),

    #[error("Missing configuration value: {0}")]
    MissingConfig(&'static str),

    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),
}

impl VoyageError {
    /// Stable snake_case tag carried in error envelopes.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "invalid_argument",
            Self::NotFound(_) => "not_found",
            Self::MalformedPayload { .. } => "malformed_payload",
            Self::InvalidItinerary(_) => "invalid_itinerary",
            Self::AgentInvocation(_) => "agent_invocation_error",
            Self::StorageProvider(_) => "storage_provider_error",
            Self::Geocoding(_) => "geocoding_error",
            Self::MissingConfig(_) | Self::Config(_) => "config_error",
        }
    }
}

pub type Result<T> = std::result::Result<T, VoyageError>;
