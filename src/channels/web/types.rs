//! Request and response DTOs for the gateway API.

use serde::{Deserialize, Serialize};

use crate::permissions::PermissionRecord;
use crate::prompt::PromptMessage;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub channel: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PromptListResponse {
    pub prompts: Vec<PromptMessage>,
}

/// Body of `POST /api/prompts/{correlation_id}`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptDecisionRequest {
    /// Optional; when present it must match the path.
    #[serde(default)]
    pub correlation_id: Option<String>,
    pub confirm: bool,
    #[serde(default)]
    pub remember_permission: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PermissionListResponse {
    pub permissions: Vec<PermissionRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ActionResponse {
    pub success: bool,
    pub message: String,
}

impl ActionResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }
}
