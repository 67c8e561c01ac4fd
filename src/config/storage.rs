//! Storage configuration types.

use serde::Deserialize;

use super::ConfigError;

/// DynamoDB table configuration.
///
/// Region, endpoint and credentials fall back to the AWS SDK's own
/// resolution (environment, profile, instance metadata) when unset.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Name of the single table holding every item.
    pub table_name: String,
    /// AWS region override.
    pub region: Option<String>,
    /// Endpoint override, e.g. `http://localhost:8000` for DynamoDB Local.
    pub endpoint_url: Option<String>,
    /// Static access key id. Must be set together with `secret_access_key`.
    pub access_key_id: Option<String>,
    /// Static secret access key.
    pub secret_access_key: Option<String>,
    /// Create the table and enable TTL at startup if missing.
    /// Intended for local development.
    pub create_table: bool,
}

impl StorageConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.table_name.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "storage.table_name cannot be empty".to_string(),
            ));
        }
        if self.access_key_id.is_some() != self.secret_access_key.is_some() {
            return Err(ConfigError::Invalid(
                "storage.access_key_id and storage.secret_access_key must be set together"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            table_name: "user_profiles".to_string(),
            region: None,
            endpoint_url: None,
            access_key_id: None,
            secret_access_key: None,
            create_table: false,
        }
    }
}
