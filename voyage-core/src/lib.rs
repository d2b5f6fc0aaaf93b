pub mod aws;
pub mod bedrock;
pub mod codec;
pub mod config;
pub mod envelope;
pub mod error;
pub mod geocode;
pub mod models;
pub mod relay;
pub mod storage;
pub mod store;

pub use bedrock::BedrockAgentProvider;
pub use config::VoyageConfig;
pub use envelope::ApiResponse;
pub use error::{Result, VoyageError};
pub use geocode::{GeocodingProvider, GoogleMapsGeocoder};
pub use relay::{
    AgentEvent, AgentEventStream, AgentInvocation, AgentProvider, AgentReply, AgentSessionRelay,
    DeltaStream, StreamFrame,
};
pub use storage::{DynamoStorage, MemoryStorage, StorageProvider};
pub use store::TripStore;
