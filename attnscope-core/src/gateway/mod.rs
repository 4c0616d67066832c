//! # HTTP Gateway
//!
//! JSON API over the attention pipeline: tokenization, processed attention,
//! before/after comparison and masked-word prediction, plus health and model
//! listing endpoints.

mod server;

pub use server::{router as gateway_router, run as run_gateway, ApiError, AppState};

use serde::{Deserialize, Serialize};

/// Configuration for the HTTP gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Host to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Answer CORS preflights for any origin.
    pub cors_allow_any: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            cors_allow_any: true,
        }
    }
}

impl GatewayConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
