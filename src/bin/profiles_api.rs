//! profiles-api: REST service for personalization profiles
//!
//! Serves profile, segment and blob reads and writes over HTTP, backed by a
//! single DynamoDB table.
//!
//! ## Architecture
//! ```text
//! [HTTP client] -> [profiles-api] -> [ProfileStore] -> [DynamoDB table]
//! ```
//!
//! ## Configuration
//! - `--config <path>` or PROFILES_CONFIG: YAML config file
//! - PROFILES__SERVER__PORT: REST API port (default: 8080)
//! - PROFILES__STORAGE__TABLE_NAME: table name (default: user_profiles)
//! - PROFILES__STORAGE__ENDPOINT_URL: endpoint override, e.g. DynamoDB Local
//! - PROFILES__STORAGE__CREATE_TABLE: create the table on startup
//! - PROFILES_LOG: tracing filter (default: info)

use std::sync::Arc;

use tracing::info;

use profiles::config::Config;
use profiles::handlers::rest;
use profiles::storage::{DynamoItemStore, ProfileStore};
use profiles::utils::bootstrap::{init_tracing, parse_config_path, shutdown_signal};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    init_tracing();

    let config_path = parse_config_path();
    let config = Config::load(config_path.as_deref())?;
    let addr = config.server.bind_address();

    info!(
        address = %addr,
        table = %config.storage.table_name,
        "starting profiles-api"
    );

    let items = DynamoItemStore::connect(&config.storage).await;
    if config.storage.create_table {
        items.ensure_table().await?;
    }

    let store = Arc::new(ProfileStore::new(Arc::new(items)));
    rest::serve(store, &addr, shutdown_signal()).await
}
