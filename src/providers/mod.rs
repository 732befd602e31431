//! Completion endpoint transports

pub mod gemini;

use async_trait::async_trait;
use serde_json::Value;
use crate::snapshot::BackendDescriptor;

// Re-export for convenience
pub use gemini::GeminiTransport;

/// Raw HTTP result of one generation attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse
{   pub status: u16
  , pub body: String
}

impl TransportResponse
{   pub fn new(status: u16, body: impl Into<String>) -> Self
    {   TransportResponse
        {   status
          , body: body.into()
        }
    }

    pub fn is_success(&self) -> bool
    {   (200..300).contains(&self.status)
    }

    pub fn is_rate_limited(&self) -> bool
    {   self.status == 429
    }
}

/// Delivers one request envelope to one backend.
/// `Err` means the transport failed before any HTTP status was seen.
#[async_trait]
pub trait GenerationTransport: Send + Sync
{   async fn post(
      &self
    , backend: &BackendDescriptor
    , api_key: &str
    , envelope: &Value
    ) -> Result<TransportResponse, crate::error::Error>;
}
