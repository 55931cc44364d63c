//! Shared DTO types used across multiple endpoints.

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

/// `?limit=` query parameter of history endpoints.
#[derive(Debug, Clone, Copy, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct HistoryQuery {
    /// Maximum number of entries (1–1000). Defaults per endpoint.
    #[serde(default)]
    pub limit: Option<usize>,
}

impl HistoryQuery {
    /// The requested limit clamped to `1..=1000`, or `default`.
    #[must_use]
    pub fn limit_or(&self, default: usize) -> usize {
        self.limit.unwrap_or(default).clamp(1, 1000)
    }
}

/// Generic acknowledgement.
#[derive(Debug, Serialize, ToSchema)]
pub struct MessageResponse {
    /// Whether the operation took effect.
    pub success: bool,
    /// Human-readable outcome.
    pub message: String,
}

impl MessageResponse {
    /// A successful acknowledgement.
    #[must_use]
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }
}
