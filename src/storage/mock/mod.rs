//! In-memory item store for testing.
//!
//! Emulates the parts of DynamoDB the access layer relies on: items keyed
//! by (pk, sk), queries returned in ascending sort key order, begins_with
//! conditions and projections of nested map paths.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use aws_sdk_dynamodb::types::AttributeValue;
use tokio::sync::RwLock;

use super::{
    duplicate_key, item_key, Item, ItemKey, ItemStore, Projection, Query, Result, StorageError,
};

/// Mock item store that keeps items in memory.
#[derive(Default)]
pub struct MockItemStore {
    items: RwLock<BTreeMap<ItemKey, Item>>,
    fail_on_write: RwLock<bool>,
    fail_on_read: RwLock<bool>,
}

impl MockItemStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_fail_on_write(&self, fail: bool) {
        *self.fail_on_write.write().await = fail;
    }

    pub async fn set_fail_on_read(&self, fail: bool) {
        *self.fail_on_read.write().await = fail;
    }

    /// Number of stored items.
    pub async fn len(&self) -> usize {
        self.items.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.read().await.is_empty()
    }

    /// Full copy of a stored item, bypassing projections.
    pub async fn raw_item(&self, key: &ItemKey) -> Option<Item> {
        self.items.read().await.get(key).cloned()
    }

    async fn check_read(&self) -> Result<()> {
        if *self.fail_on_read.read().await {
            return Err(StorageError::Backend("mock read failure".to_string()));
        }
        Ok(())
    }

    async fn check_write(&self) -> Result<()> {
        if *self.fail_on_write.read().await {
            return Err(StorageError::Backend("mock write failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ItemStore for MockItemStore {
    async fn get_item(
        &self,
        key: &ItemKey,
        projection: Option<&Projection>,
    ) -> Result<Option<Item>> {
        self.check_read().await?;
        let items = self.items.read().await;
        Ok(items.get(key).map(|item| project(item, projection)))
    }

    async fn query(&self, query: &Query) -> Result<Vec<Item>> {
        self.check_read().await?;
        let items = self.items.read().await;
        Ok(items
            .iter()
            .filter(|(key, _)| key.partition_key == query.partition_key)
            .filter(|(key, _)| {
                query
                    .sort_key
                    .as_ref()
                    .map_or(true, |cond| cond.matches(&key.sort_key))
            })
            .map(|(_, item)| project(item, query.projection.as_ref()))
            .collect())
    }

    async fn put_item(&self, item: Item) -> Result<()> {
        self.check_write().await?;
        let key = require_key(&item)?;
        self.items.write().await.insert(key, item);
        Ok(())
    }

    async fn batch_put(&self, items: Vec<Item>) -> Result<()> {
        self.check_write().await?;
        if let Some(key) = duplicate_key(&items) {
            return Err(StorageError::DuplicateItemKey {
                partition_key: key.partition_key,
                sort_key: key.sort_key,
            });
        }
        let keyed = items
            .into_iter()
            .map(|item| Ok((require_key(&item)?, item)))
            .collect::<Result<Vec<_>>>()?;
        let mut store = self.items.write().await;
        store.extend(keyed);
        Ok(())
    }
}

fn require_key(item: &Item) -> Result<ItemKey> {
    item_key(item).ok_or_else(|| {
        StorageError::Backend("item is missing its string pk/sk attributes".to_string())
    })
}

/// Apply a projection the way DynamoDB does: keep only the selected paths,
/// preserving map nesting. Paths that do not resolve are skipped.
fn project(item: &Item, projection: Option<&Projection>) -> Item {
    let Some(projection) = projection.filter(|p| !p.is_empty()) else {
        return item.clone();
    };

    let mut projected = HashMap::new();
    for path in projection.paths() {
        project_path(item, path, &mut projected);
    }
    projected
}

fn project_path(source: &Item, path: &[String], target: &mut Item) {
    let Some((head, rest)) = path.split_first() else {
        return;
    };
    let Some(value) = source.get(head) else {
        return;
    };

    if rest.is_empty() {
        target.insert(head.clone(), value.clone());
        return;
    }

    if let AttributeValue::M(inner) = value {
        let mut nested = match target.remove(head) {
            Some(AttributeValue::M(existing)) => existing,
            _ => HashMap::new(),
        };
        project_path(inner, rest, &mut nested);
        if !nested.is_empty() {
            target.insert(head.clone(), AttributeValue::M(nested));
        }
    }
}
