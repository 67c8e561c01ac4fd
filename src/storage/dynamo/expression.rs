//! Key condition and projection expressions.
//!
//! Every attribute name goes through an `#name` placeholder since several
//! of ours (`ttl`, `typ`) collide with DynamoDB reserved words.

use std::collections::HashMap;

use aws_sdk_dynamodb::types::AttributeValue;

use crate::storage::{Projection, Query, SortKeyCondition, PARTITION_KEY_ATTR, SORT_KEY_ATTR};

/// Expressions and placeholder maps for one request.
#[derive(Debug, Default, PartialEq)]
pub struct Expressions {
    pub key_condition: Option<String>,
    pub projection: Option<String>,
    pub names: HashMap<String, String>,
    pub values: HashMap<String, AttributeValue>,
}

impl Expressions {
    /// Expressions for a point read.
    pub fn for_get(projection: Option<&Projection>) -> Self {
        let mut expr = Self::default();
        if let Some(projection) = projection.filter(|p| !p.is_empty()) {
            expr.add_projection(projection);
        }
        expr
    }

    /// Expressions for a partition query.
    pub fn for_query(query: &Query) -> Self {
        let mut expr = Self::default();

        expr.names
            .insert("#pk".to_string(), PARTITION_KEY_ATTR.to_string());
        expr.values.insert(
            ":pk".to_string(),
            AttributeValue::S(query.partition_key.clone()),
        );

        let condition = match &query.sort_key {
            None => "#pk = :pk".to_string(),
            Some(cond) => {
                expr.names
                    .insert("#sk".to_string(), SORT_KEY_ATTR.to_string());
                let (op, value) = match cond {
                    SortKeyCondition::Equals(sk) => ("#pk = :pk AND #sk = :sk", sk),
                    SortKeyCondition::BeginsWith(prefix) => {
                        ("#pk = :pk AND begins_with(#sk, :sk)", prefix)
                    }
                };
                expr.values
                    .insert(":sk".to_string(), AttributeValue::S(value.clone()));
                op.to_string()
            }
        };
        expr.key_condition = Some(condition);

        if let Some(projection) = query.projection.as_ref().filter(|p| !p.is_empty()) {
            expr.add_projection(projection);
        }
        expr
    }

    /// Names map for the SDK, `None` when empty since DynamoDB rejects an
    /// empty map.
    pub fn names(&self) -> Option<HashMap<String, String>> {
        (!self.names.is_empty()).then(|| self.names.clone())
    }

    pub fn values(&self) -> Option<HashMap<String, AttributeValue>> {
        (!self.values.is_empty()).then(|| self.values.clone())
    }

    fn add_projection(&mut self, projection: &Projection) {
        let mut placeholders: HashMap<&str, String> = HashMap::new();
        let mut rendered = Vec::with_capacity(projection.paths().len());

        for path in projection.paths() {
            let parts: Vec<String> = path
                .iter()
                .map(|name| {
                    let next = placeholders.len();
                    placeholders
                        .entry(name.as_str())
                        .or_insert_with(|| format!("#p{}", next))
                        .clone()
                })
                .collect();
            rendered.push(parts.join("."));
        }

        for (name, placeholder) in placeholders {
            self.names.insert(placeholder, name.to_string());
        }
        self.projection = Some(rendered.join(", "));
    }
}
