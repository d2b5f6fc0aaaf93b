use std::sync::Arc;
use std::time::Duration;

use aws_config::timeout::TimeoutConfig;
use aws_config::{BehaviorVersion, SdkConfig};
use aws_sdk_dynamodb::config::{Credentials, Region};

use crate::bedrock::BedrockAgentProvider;
use crate::config::{AgentConfig, AwsConfig, StorageConfig, VoyageConfig};
use crate::error::Result;
use crate::relay::AgentProvider;
use crate::storage::{DynamoStorage, MemoryStorage, StorageProvider};

/// Shared SDK settings: region plus static keys when both are configured,
/// otherwise the default credential chain.
pub async fn load_sdk_config(aws: &AwsConfig) -> SdkConfig {
    let mut loader =
        aws_config::defaults(BehaviorVersion::latest()).region(Region::new(aws.region.clone()));

    if let Some((access_key_id, secret_access_key)) = aws.static_credentials() {
        loader = loader.credentials_provider(Credentials::new(
            access_key_id,
            secret_access_key,
            None,
            None,
            "voyage-config",
        ));
    }
    loader.load().await
}

pub fn create_dynamo_client(sdk: &SdkConfig, storage: &StorageConfig) -> aws_sdk_dynamodb::Client {
    let mut builder = aws_sdk_dynamodb::config::Builder::from(sdk);
    if let Some(url) = storage.endpoint_url.as_deref().filter(|u| !u.is_empty()) {
        builder = builder.endpoint_url(url);
    }
    aws_sdk_dynamodb::Client::from_conf(builder.build())
}

/// Agent runtime client with the long read timeout agent replies need.
pub fn create_agent_client(
    sdk: &SdkConfig,
    agent: &AgentConfig,
) -> aws_sdk_bedrockagentruntime::Client {
    let timeouts = TimeoutConfig::builder()
        .connect_timeout(Duration::from_secs(agent.connect_timeout_secs))
        .read_timeout(Duration::from_secs(agent.read_timeout_secs))
        .build();
    let conf = aws_sdk_bedrockagentruntime::config::Builder::from(sdk)
        .timeout_config(timeouts)
        .build();
    aws_sdk_bedrockagentruntime::Client::from_conf(conf)
}

/// Build the configured trip table backend.
pub fn create_storage(config: &VoyageConfig, sdk: &SdkConfig) -> Arc<dyn StorageProvider> {
    if config.uses_memory_storage() {
        tracing::warn!("Using in-memory trip storage; records are lost on restart");
        return Arc::new(MemoryStorage::new());
    }
    let client = create_dynamo_client(sdk, &config.storage);
    tracing::info!(table = %config.storage.table_name, "Using DynamoDB trip storage");
    Arc::new(DynamoStorage::new(client, config.storage.table_name.clone()))
}

pub fn create_agent(config: &VoyageConfig, sdk: &SdkConfig) -> Result<Arc<dyn AgentProvider>> {
    let client = create_agent_client(sdk, &config.agent);
    Ok(Arc::new(BedrockAgentProvider::new(client, &config.agent)?))
}

/// Probe the storage backend, returning a short status line.
pub async fn storage_health(storage: &dyn StorageProvider) -> Result<String> {
    let status = storage.health().await?;
    Ok(format!("{}: {}", storage.name(), status))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_backend_needs_no_aws() {
        let config = VoyageConfig::from_toml("[storage]\nbackend = \"memory\"").unwrap();
        let sdk = SdkConfig::builder()
            .behavior_version(BehaviorVersion::latest())
            .build();

        let storage = create_storage(&config, &sdk);

        assert_eq!(storage.name(), "memory");
        assert_eq!(
            storage_health(storage.as_ref()).await.unwrap(),
            "memory: in-memory (0 items)"
        );
    }

    #[tokio::test]
    async fn test_agent_requires_ids() {
        let config = VoyageConfig::default();
        let sdk = SdkConfig::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new("us-east-1"))
            .build();

        assert!(create_agent(&config, &sdk).is_err());
    }
}
