//! DynamoDB item store.
//!
//! Table schema:
//! - `pk`: partition key (String), `USER#{profile_id}`
//! - `sk`: sort key (String), see [`crate::storage::keys`]
//! - `ttl`: expiry in Unix seconds, the table's TTL attribute

mod expression;

pub use expression::Expressions;

use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_dynamodb::client::Waiters;
use aws_sdk_dynamodb::config::{Credentials, Region};
use aws_sdk_dynamodb::error::{BuildError, DisplayErrorContext};
use aws_sdk_dynamodb::operation::create_table::CreateTableError;
use aws_sdk_dynamodb::types::{
    AttributeDefinition, AttributeValue, BillingMode, KeySchemaElement, KeyType, PutRequest,
    ScalarAttributeType, TimeToLiveSpecification, WriteRequest,
};
use aws_sdk_dynamodb::Client;
use tracing::{debug, info, warn};

use crate::config::StorageConfig;
use crate::storage::{
    duplicate_key, Item, ItemKey, ItemStore, Projection, Query, Result, StorageError,
    PARTITION_KEY_ATTR, SORT_KEY_ATTR, TTL_ATTR,
};

/// Most items a single BatchWriteItem call accepts.
pub const BATCH_WRITE_LIMIT: usize = 25;

/// How long `ensure_table` waits for a new table to become active.
const TABLE_ACTIVE_TIMEOUT: Duration = Duration::from_secs(60);

/// DynamoDB implementation of ItemStore.
pub struct DynamoItemStore {
    client: Client,
    table_name: String,
}

impl DynamoItemStore {
    /// Wrap an existing client.
    pub fn new(client: Client, table_name: impl Into<String>) -> Self {
        Self {
            client,
            table_name: table_name.into(),
        }
    }

    /// Build a client from the SDK defaults, overridden by whatever region,
    /// endpoint and static credentials the configuration sets.
    pub async fn connect(config: &StorageConfig) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(region) = &config.region {
            loader = loader.region(Region::new(region.clone()));
        }
        if let (Some(key_id), Some(secret)) = (&config.access_key_id, &config.secret_access_key) {
            loader = loader.credentials_provider(Credentials::new(
                key_id.clone(),
                secret.clone(),
                None,
                None,
                "profiles-config",
            ));
        }
        let sdk_config = loader.load().await;

        let client = if let Some(endpoint) = &config.endpoint_url {
            let dynamo_config = aws_sdk_dynamodb::config::Builder::from(&sdk_config)
                .endpoint_url(endpoint)
                .build();
            Client::from_conf(dynamo_config)
        } else {
            Client::new(&sdk_config)
        };

        info!(
            table = %config.table_name,
            endpoint = config.endpoint_url.as_deref().unwrap_or("default"),
            "Connected to DynamoDB for profiles"
        );

        Self::new(client, config.table_name.clone())
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Create the table if it does not exist and enable TTL on `ttl`.
    ///
    /// Meant for local development and tests; production tables are
    /// provisioned outside the service.
    pub async fn ensure_table(&self) -> Result<()> {
        let created = self
            .client
            .create_table()
            .table_name(&self.table_name)
            .attribute_definitions(string_attribute(PARTITION_KEY_ATTR)?)
            .attribute_definitions(string_attribute(SORT_KEY_ATTR)?)
            .key_schema(key_element(PARTITION_KEY_ATTR, KeyType::Hash)?)
            .key_schema(key_element(SORT_KEY_ATTR, KeyType::Range)?)
            .billing_mode(BillingMode::PayPerRequest)
            .send()
            .await;

        match created {
            Ok(_) => info!(table = %self.table_name, "Created DynamoDB table"),
            Err(e)
                if matches!(
                    e.as_service_error(),
                    Some(CreateTableError::ResourceInUseException(_))
                ) =>
            {
                debug!(table = %self.table_name, "DynamoDB table already exists");
            }
            Err(e) => return Err(backend_error("create_table", e)),
        }

        self.client
            .wait_until_table_exists()
            .table_name(&self.table_name)
            .wait(TABLE_ACTIVE_TIMEOUT)
            .await
            .map_err(|e| backend_error("wait_until_table_exists", e))?;

        let ttl = TimeToLiveSpecification::builder()
            .attribute_name(TTL_ATTR)
            .enabled(true)
            .build()
            .map_err(build_error)?;

        // Fails when TTL is already enabled, which is fine.
        if let Err(e) = self
            .client
            .update_time_to_live()
            .table_name(&self.table_name)
            .time_to_live_specification(ttl)
            .send()
            .await
        {
            warn!(
                table = %self.table_name,
                error = %DisplayErrorContext(&e),
                "Could not enable TTL"
            );
        }

        Ok(())
    }
}

#[async_trait]
impl ItemStore for DynamoItemStore {
    async fn get_item(
        &self,
        key: &ItemKey,
        projection: Option<&Projection>,
    ) -> Result<Option<Item>> {
        let expr = Expressions::for_get(projection);

        let result = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key(
                PARTITION_KEY_ATTR,
                AttributeValue::S(key.partition_key.clone()),
            )
            .key(SORT_KEY_ATTR, AttributeValue::S(key.sort_key.clone()))
            .set_projection_expression(expr.projection.clone())
            .set_expression_attribute_names(expr.names())
            .send()
            .await
            .map_err(|e| backend_error("get_item", e))?;

        debug!(
            pk = %key.partition_key,
            sk = %key.sort_key,
            found = result.item.is_some(),
            "Read item from DynamoDB"
        );
        Ok(result.item)
    }

    async fn query(&self, query: &Query) -> Result<Vec<Item>> {
        let expr = Expressions::for_query(query);

        let mut pages = self
            .client
            .query()
            .table_name(&self.table_name)
            .set_key_condition_expression(expr.key_condition.clone())
            .set_projection_expression(expr.projection.clone())
            .set_expression_attribute_names(expr.names())
            .set_expression_attribute_values(expr.values())
            .into_paginator()
            .items()
            .send();

        let mut items = Vec::new();
        while let Some(item) = pages.next().await {
            items.push(item.map_err(|e| backend_error("query", e))?);
        }

        debug!(
            pk = %query.partition_key,
            count = items.len(),
            "Queried partition in DynamoDB"
        );
        Ok(items)
    }

    async fn put_item(&self, item: Item) -> Result<()> {
        self.client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(item))
            .send()
            .await
            .map_err(|e| backend_error("put_item", e))?;
        Ok(())
    }

    async fn batch_put(&self, items: Vec<Item>) -> Result<()> {
        // A duplicate in a later chunk would otherwise pass after earlier
        // chunks were written.
        if let Some(key) = duplicate_key(&items) {
            return Err(StorageError::DuplicateItemKey {
                partition_key: key.partition_key,
                sort_key: key.sort_key,
            });
        }

        let mut requests = items
            .into_iter()
            .map(|item| {
                let put = PutRequest::builder()
                    .set_item(Some(item))
                    .build()
                    .map_err(build_error)?;
                Ok(WriteRequest::builder().put_request(put).build())
            })
            .collect::<Result<Vec<WriteRequest>>>()?;

        // Chunks are sent in order; the first one with leftovers stops the rest.
        while !requests.is_empty() {
            let batch: Vec<_> = requests
                .drain(..requests.len().min(BATCH_WRITE_LIMIT))
                .collect();
            let size = batch.len();

            let output = self
                .client
                .batch_write_item()
                .request_items(&self.table_name, batch)
                .send()
                .await
                .map_err(|e| backend_error("batch_write_item", e))?;

            let unprocessed = output
                .unprocessed_items()
                .and_then(|tables| tables.get(&self.table_name))
                .map_or(0, Vec::len);
            if unprocessed > 0 {
                warn!(
                    table = %self.table_name,
                    unprocessed,
                    "Batch write left unprocessed items"
                );
                return Err(StorageError::UnprocessedItems { count: unprocessed });
            }

            debug!(table = %self.table_name, items = size, "Wrote batch to DynamoDB");
        }

        Ok(())
    }
}

fn string_attribute(name: &str) -> Result<AttributeDefinition> {
    AttributeDefinition::builder()
        .attribute_name(name)
        .attribute_type(ScalarAttributeType::S)
        .build()
        .map_err(build_error)
}

fn key_element(name: &str, key_type: KeyType) -> Result<KeySchemaElement> {
    KeySchemaElement::builder()
        .attribute_name(name)
        .key_type(key_type)
        .build()
        .map_err(build_error)
}

fn backend_error<E>(operation: &str, error: E) -> StorageError
where
    E: std::error::Error + 'static,
{
    StorageError::Backend(format!(
        "DynamoDB {} failed: {}",
        operation,
        DisplayErrorContext(&error)
    ))
}

fn build_error(error: BuildError) -> StorageError {
    StorageError::Backend(format!("invalid DynamoDB request: {}", error))
}
