use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Arbitrary JSON object whose keys name template placeholders or form fields.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[schema(value_type = Object, example = json!({"name": "Jane Doe", "date": "2025-11-05"}))]
pub struct TemplatePayload(pub serde_json::Value);

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    #[schema(example = "healthy")]
    pub status: String,
    pub timestamp: DateTime<Utc>,
}

impl HealthResponse {
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ServiceIndex {
    #[schema(example = "OK")]
    pub status: String,
    #[schema(example = "html")]
    pub renderer: String,
    pub endpoints: Vec<String>,
}
