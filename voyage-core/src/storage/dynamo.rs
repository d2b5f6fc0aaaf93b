//! DynamoDB-backed trip table.

use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_dynamodb::error::DisplayErrorContext;
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client;
use serde_json::{Map, Number, Value};

use super::{Condition, QueryRequest, StorageProvider};
use crate::error::{Result, VoyageError};
use crate::models::trip::{CONVERSATION_ID, USER_ID};
use crate::models::{Item, TripKey};

#[derive(Debug, Clone)]
pub struct DynamoStorage {
    client: Client,
    table_name: String,
}

impl DynamoStorage {
    pub fn new(client: Client, table_name: impl Into<String>) -> Self {
        Self {
            client,
            table_name: table_name.into(),
        }
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    fn key_attributes(key: &TripKey) -> HashMap<String, AttributeValue> {
        HashMap::from([
            (USER_ID.to_string(), AttributeValue::S(key.user_id.clone())),
            (
                CONVERSATION_ID.to_string(),
                AttributeValue::S(key.conversation_id.clone()),
            ),
        ])
    }
}

fn provider_error<E>(err: E) -> VoyageError
where
    E: std::error::Error,
{
    VoyageError::StorageProvider(DisplayErrorContext(&err).to_string())
}

/// Expression fragments for a key-range query with an optional filter.
#[derive(Debug, Default, PartialEq)]
struct QueryExpressions {
    key_condition: String,
    filter: Option<String>,
    names: HashMap<String, String>,
    values: HashMap<String, AttributeValue>,
}

fn build_expressions(request: &QueryRequest) -> QueryExpressions {
    let mut expr = QueryExpressions {
        key_condition: "#pk = :pk".to_string(),
        ..Default::default()
    };
    expr.names.insert("#pk".to_string(), USER_ID.to_string());
    expr.values.insert(
        ":pk".to_string(),
        AttributeValue::S(request.partition_key.clone()),
    );

    let Some(filter) = request.filter.as_ref().filter(|f| !f.is_empty()) else {
        return expr;
    };

    let clauses: Vec<String> = filter
        .conditions()
        .iter()
        .enumerate()
        .map(|(i, condition)| {
            let name = format!("#f{i}");
            let value = format!(":f{i}");
            expr.names.insert(name.clone(), condition.attribute().to_string());
            expr.values.insert(
                value.clone(),
                AttributeValue::S(condition.value().to_string()),
            );
            match condition {
                Condition::Equals { .. } => format!("{name} = {value}"),
                Condition::Contains { .. } => format!("contains({name}, {value})"),
            }
        })
        .collect();
    expr.filter = Some(clauses.join(" AND "));
    expr
}

/// Convert a stored attribute into a JSON value. Sets become arrays.
pub fn attribute_to_json(value: AttributeValue) -> Value {
    match value {
        AttributeValue::S(s) => Value::String(s),
        AttributeValue::N(n) => number_to_json(&n),
        AttributeValue::Bool(b) => Value::Bool(b),
        AttributeValue::Null(_) => Value::Null,
        AttributeValue::M(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, attribute_to_json(v)))
                .collect(),
        ),
        AttributeValue::L(list) => Value::Array(list.into_iter().map(attribute_to_json).collect()),
        AttributeValue::Ss(set) => Value::Array(set.into_iter().map(Value::String).collect()),
        AttributeValue::Ns(set) => Value::Array(set.iter().map(|n| number_to_json(n)).collect()),
        AttributeValue::B(blob) => {
            Value::String(String::from_utf8_lossy(blob.as_ref()).into_owned())
        }
        _ => Value::Null,
    }
}

fn number_to_json(n: &str) -> Value {
    if let Ok(i) = n.parse::<i64>() {
        return Value::Number(i.into());
    }
    n.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map_or_else(|| Value::String(n.to_string()), Value::Number)
}

/// Convert a JSON value into a stored attribute.
pub fn json_to_attribute(value: Value) -> AttributeValue {
    match value {
        Value::String(s) => AttributeValue::S(s),
        Value::Number(n) => AttributeValue::N(n.to_string()),
        Value::Bool(b) => AttributeValue::Bool(b),
        Value::Null => AttributeValue::Null(true),
        Value::Array(list) => AttributeValue::L(list.into_iter().map(json_to_attribute).collect()),
        Value::Object(map) => AttributeValue::M(
            map.into_iter()
                .map(|(k, v)| (k, json_to_attribute(v)))
                .collect(),
        ),
    }
}

fn item_from_attributes(attributes: HashMap<String, AttributeValue>) -> Item {
    attributes
        .into_iter()
        .map(|(k, v)| (k, attribute_to_json(v)))
        .collect::<Map<String, Value>>()
}

#[async_trait]
impl StorageProvider for DynamoStorage {
    async fn query(&self, request: QueryRequest) -> Result<Vec<Item>> {
        let expr = build_expressions(&request);
        let limit = request
            .limit
            .map(|l| i32::try_from(l).unwrap_or(i32::MAX));

        let output = self
            .client
            .query()
            .table_name(&self.table_name)
            .key_condition_expression(expr.key_condition)
            .set_filter_expression(expr.filter)
            .set_expression_attribute_names(Some(expr.names))
            .set_expression_attribute_values(Some(expr.values))
            .set_limit(limit)
            .scan_index_forward(request.scan_forward)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(partition = %request.partition_key, error = %DisplayErrorContext(&e), "DynamoDB query failed");
                provider_error(e)
            })?;

        Ok(output
            .items
            .unwrap_or_default()
            .into_iter()
            .map(item_from_attributes)
            .collect())
    }

    async fn get_item(&self, key: &TripKey) -> Result<Option<Item>> {
        let output = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .set_key(Some(Self::key_attributes(key)))
            .send()
            .await
            .map_err(provider_error)?;

        Ok(output.item.map(item_from_attributes))
    }

    async fn put_item(&self, item: Item) -> Result<()> {
        if TripKey::from_item(&item).is_none() {
            return Err(VoyageError::InvalidArgument(
                "item must carry string userId and conversationId attributes".to_string(),
            ));
        }
        let attributes: HashMap<String, AttributeValue> = item
            .into_iter()
            .map(|(k, v)| (k, json_to_attribute(v)))
            .collect();

        self.client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(attributes))
            .send()
            .await
            .map_err(provider_error)?;
        Ok(())
    }

    async fn delete_item(&self, key: &TripKey) -> Result<()> {
        self.client
            .delete_item()
            .table_name(&self.table_name)
            .set_key(Some(Self::key_attributes(key)))
            .send()
            .await
            .map_err(provider_error)?;
        Ok(())
    }

    async fn health(&self) -> Result<String> {
        let output = self
            .client
            .describe_table()
            .table_name(&self.table_name)
            .send()
            .await
            .map_err(provider_error)?;

        let status = output
            .table()
            .and_then(|t| t.table_status())
            .map(|s| s.as_str().to_string())
            .unwrap_or_else(|| "UNKNOWN".to_string());
        Ok(format!("{} ({})", self.table_name, status))
    }

    fn name(&self) -> &str {
        "dynamodb"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::FilterExpression;
    use aws_sdk_dynamodb::primitives::Blob;
    use serde_json::json;

    fn blob(bytes: &[u8]) -> AttributeValue {
        AttributeValue::B(Blob::new(bytes.to_vec()))
    }

    #[test]
    fn test_key_only_query_expressions() {
        let expr = build_expressions(&QueryRequest::newest_first("u1"));
        assert_eq!(expr.key_condition, "#pk = :pk");
        assert!(expr.filter.is_none());
        assert_eq!(expr.names["#pk"], "userId");
        assert_eq!(expr.values[":pk"], AttributeValue::S("u1".into()));
    }

    #[test]
    fn test_filter_expression_joins_conditions() {
        let request = QueryRequest::newest_first("u1").with_filter(
            FilterExpression::new()
                .eq("dataType", "itinerary")
                .contains("destination", "Tokyo")
                .eq("budget_tier", "mid"),
        );
        let expr = build_expressions(&request);
        assert_eq!(
            expr.filter.as_deref(),
            Some("#f0 = :f0 AND contains(#f1, :f1) AND #f2 = :f2")
        );
        assert_eq!(expr.names["#f1"], "destination");
        assert_eq!(expr.values[":f1"], AttributeValue::S("Tokyo".into()));
        assert_eq!(expr.names.len(), 4);
    }

    #[test]
    fn test_empty_filter_is_omitted() {
        let request = QueryRequest::newest_first("u1").with_filter(FilterExpression::new());
        assert!(build_expressions(&request).filter.is_none());
    }

    #[test]
    fn test_attribute_conversion_of_nested_values() {
        let attr = AttributeValue::M(HashMap::from([
            ("days".to_string(), AttributeValue::N("3".into())),
            ("rating".to_string(), AttributeValue::N("4.5".into())),
            (
                "tags".to_string(),
                AttributeValue::L(vec![AttributeValue::S("food".into()), AttributeValue::Bool(true)]),
            ),
            ("gone".to_string(), AttributeValue::Null(true)),
            ("ids".to_string(), AttributeValue::Ss(vec!["a".into()])),
            ("raw".to_string(), blob(b"hi")),
        ]));

        assert_eq!(
            attribute_to_json(attr),
            json!({
                "days": 3,
                "rating": 4.5,
                "tags": ["food", true],
                "gone": null,
                "ids": ["a"],
                "raw": "hi"
            })
        );
    }

    #[test]
    fn test_json_to_attribute_numbers_and_nulls() {
        assert_eq!(json_to_attribute(json!(7)), AttributeValue::N("7".into()));
        assert_eq!(json_to_attribute(json!(null)), AttributeValue::Null(true));
        assert_eq!(
            json_to_attribute(json!({"a": [1]})),
            AttributeValue::M(HashMap::from([(
                "a".to_string(),
                AttributeValue::L(vec![AttributeValue::N("1".into())])
            )]))
        );
    }

    #[test]
    fn test_unparseable_number_falls_back_to_string() {
        assert_eq!(attribute_to_json(AttributeValue::N("1e400".into())), json!("1e400"));
    }
}
