//! Query builder: pure mapping from sync actions to API requests.
//!
//! No I/O and no state beyond the base URL. Inputs are not validated;
//! a bad task id produces a well-typed request that the API will reject.

use serde_json::json;

use super::{ApiRequest, Method, API_BASE_URL};

/// A custom-field value, shaped by the field type it was mapped through.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Epoch milliseconds, for `date` fields.
    Date(i64),
    /// Numeric value, for `number` and `money` fields.
    Number(f64),
    /// Everything else travels as a string.
    Text(String),
}

impl FieldValue {
    /// JSON value as embedded in a create-task `custom_fields` array.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Date(ms) => json!(ms),
            Self::Number(n) => json!(n),
            Self::Text(s) => json!(s),
        }
    }
}

/// Builds API requests for task operations.
#[derive(Debug, Clone)]
pub struct Query {
    base_url: String,
}

impl Default for Query {
    fn default() -> Self {
        Self::new()
    }
}

impl Query {
    pub fn new() -> Self {
        Self {
            base_url: API_BASE_URL.to_string(),
        }
    }

    /// Whether a URL addresses the create-task endpoint. The dispatcher
    /// uses this to recognize which 200 responses must carry a task id.
    pub fn is_create_task_url(&self, url: &str) -> bool {
        url.starts_with(&format!("{}list/", self.base_url))
    }

    /// Create a task in a list, carrying the name and all custom fields
    /// in one call.
    pub fn create_task(
        &self,
        list_id: &str,
        name: &str,
        custom_fields: &[(String, FieldValue)],
    ) -> ApiRequest {
        let fields: Vec<serde_json::Value> = custom_fields
            .iter()
            .map(|(id, value)| json!({ "id": id, "value": value.to_json() }))
            .collect();

        ApiRequest {
            method: Method::Post,
            url: format!("{}list/{}/task", self.base_url, list_id),
            body: Some(json!({ "name": name, "custom_fields": fields })),
        }
    }

    /// Update a task's name. Custom fields must be updated separately,
    /// one call per field.
    pub fn update_task(&self, task_id: &str, name: &str) -> ApiRequest {
        ApiRequest {
            method: Method::Put,
            url: format!("{}task/{}", self.base_url, task_id),
            body: Some(json!({ "name": name })),
        }
    }

    /// Update one custom field on a task. The body shape follows the
    /// value variant: dates request time-of-day precision, numbers travel
    /// bare, text travels as a string.
    pub fn update_custom_field(
        &self,
        task_id: &str,
        field_id: &str,
        value: &FieldValue,
    ) -> ApiRequest {
        let body = match value {
            FieldValue::Date(ms) => json!({
                "value": ms,
                "value_options": { "time": true },
            }),
            FieldValue::Number(n) => json!({ "value": n }),
            FieldValue::Text(s) => json!({ "value": s }),
        };

        ApiRequest {
            method: Method::Post,
            url: format!("{}task/{}/field/{}", self.base_url, task_id, field_id),
            body: Some(body),
        }
    }

    /// Delete a task.
    pub fn delete_task(&self, task_id: &str) -> ApiRequest {
        ApiRequest {
            method: Method::Delete,
            url: format!("{}task/{}", self.base_url, task_id),
            body: None,
        }
    }
}
