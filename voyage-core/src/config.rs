use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct VoyageConfig {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub aws: AwsConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub maps: MapsConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServiceConfig {
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AwsConfig {
    pub region: String,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
}

impl Default for AwsConfig {
    fn default() -> Self {
        Self {
            region: "us-east-1".to_string(),
            access_key_id: None,
            secret_access_key: None,
        }
    }
}

impl AwsConfig {
    /// Static credentials, only when both halves are configured.
    pub fn static_credentials(&self) -> Option<(&str, &str)> {
        match (self.access_key_id.as_deref(), self.secret_access_key.as_deref()) {
            (Some(id), Some(secret)) if !id.is_empty() && !secret.is_empty() => Some((id, secret)),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AgentConfig {
    pub agent_id: String,
    pub agent_alias_id: String,
    pub connect_timeout_secs: u64,
    pub read_timeout_secs: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            agent_id: String::new(),
            agent_alias_id: String::new(),
            connect_timeout_secs: 60,
            read_timeout_secs: 300,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: String,
    pub table_name: String,
    pub endpoint_url: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: "dynamodb".to_string(),
            table_name: "TravelPlannerConversations".to_string(),
            endpoint_url: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MapsConfig {
    pub api_key: String,
    pub base_url: String,
    pub timeout_secs: u64,
    pub max_retries: usize,
    pub retry_delay_ms: u64,
}

impl Default for MapsConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://maps.googleapis.com".to_string(),
            timeout_secs: 10,
            max_retries: 2,
            retry_delay_ms: 200,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            cors_origins: vec!["http://localhost:3000".to_string()],
        }
    }
}

fn environment() -> Environment {
    Environment::with_prefix("VOYAGE")
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("http.cors_origins")
}

impl VoyageConfig {
    /// Load from an optional TOML file, overridden by `VOYAGE__SECTION__KEY` variables.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(environment())
            .build()?;
        s.try_deserialize()
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::from_str(contents, FileFormat::Toml))
            .build()?;
        s.try_deserialize()
    }

    pub fn uses_memory_storage(&self) -> bool {
        self.storage.backend.eq_ignore_ascii_case("memory")
    }
}
