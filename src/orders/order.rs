//! Order and ready-event payloads
//!
//! Orders arrive as `{"tableId": <integer>, "foodName": <string>}` and ready
//! events leave as `{"foodName": <string>}` on `table/{tableId}/food`.
//!
//! Parsing is strict about JSON types: booleans and floats (`3.0` included)
//! are not table ids, and numeric strings such as `"3"` are rejected. Any
//! JSON integer from `i64::MIN` to `u64::MAX` is a table id. Extra fields are
//! ignored.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::utils::error::OrderError;

/// Subscription filter covering every table's ready topic.
pub const READY_TOPIC_FILTER: &str = "table/+/food";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub table_id: i128,
    pub food_name: String,
}

impl Order {
    pub fn new(table_id: i128, food_name: impl Into<String>) -> Self {
        Self {
            table_id,
            food_name: food_name.into(),
        }
    }

    /// Decodes and validates an order payload.
    pub fn parse(payload: &[u8]) -> Result<Self, OrderError> {
        let value: Value = serde_json::from_slice(payload).map_err(OrderError::Decode)?;

        let fields = value.as_object().ok_or_else(|| {
            OrderError::Validation(format!("expected a JSON object, got {}", kind(&value)))
        })?;

        let table_id = match fields.get("tableId") {
            Some(v) => integer(v).ok_or_else(|| {
                OrderError::Validation(format!("tableId must be an integer, got {}", kind(v)))
            })?,
            None => return Err(OrderError::Validation("tableId is missing".to_string())),
        };

        let food_name = match fields.get("foodName") {
            Some(Value::String(name)) => name.clone(),
            Some(v) => {
                return Err(OrderError::Validation(format!(
                    "foodName must be a string, got {}",
                    kind(v)
                )));
            }
            None => return Err(OrderError::Validation("foodName is missing".to_string())),
        };

        Ok(Self {
            table_id,
            food_name,
        })
    }

    pub fn to_payload(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}

fn integer(value: &Value) -> Option<i128> {
    value
        .as_i64()
        .map(i128::from)
        .or_else(|| value.as_u64().map(i128::from))
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(n) if n.is_f64() => "a float",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Published once per cooked order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadyEvent {
    pub food_name: String,
}

/// Topic a table's ready events are published to.
pub fn ready_topic(table_id: i128) -> String {
    format!("table/{table_id}/food")
}

/// Inverse of [`ready_topic`].
pub fn parse_ready_topic(topic: &str) -> Option<i128> {
    let mut levels = topic.split('/');
    match (levels.next(), levels.next(), levels.next(), levels.next()) {
        (Some("table"), Some(id), Some("food"), None) => id.parse().ok(),
        _ => None,
    }
}
