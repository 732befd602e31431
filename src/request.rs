//! Generation request, options and per-backend outcome types

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_TOP_K: u32 = 40;
pub const DEFAULT_TOP_P: f32 = 0.95;
pub const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 8192;

/// Caller-supplied generation options; unset fields take defaults
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationOptions
{   pub temperature: Option<f32>
  , pub top_k: Option<u32>
  , pub top_p: Option<f32>
  , pub max_output_tokens: Option<u32>
  , pub use_search: Option<bool>
  , /// Structured-output constraint
    pub response_schema: Option<Value>
}

impl GenerationOptions
{   /// Layer `overrides` on top of `self`; set fields in `overrides` win
    pub fn merged_with(
      self
    , overrides: GenerationOptions
    ) -> GenerationOptions
    {   GenerationOptions
        {   temperature: overrides.temperature.or(self.temperature)
          , top_k: overrides.top_k.or(self.top_k)
          , top_p: overrides.top_p.or(self.top_p)
          , max_output_tokens: overrides.max_output_tokens
              .or(self.max_output_tokens)
          , use_search: overrides.use_search.or(self.use_search)
          , response_schema: overrides.response_schema
              .or(self.response_schema)
        }
    }
}

/// A single generation request, constructed per call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest
{   pub prompt: String
  , pub temperature: f32
  , pub top_k: u32
  , pub top_p: f32
  , pub max_output_tokens: u32
  , pub use_search: bool
  , pub response_schema: Option<Value>
}

impl GenerationRequest
{   pub fn new(
      prompt: impl Into<String>
    , options: GenerationOptions
    ) -> Self
    {   GenerationRequest
        {   prompt: prompt.into()
          , temperature: options.temperature
              .unwrap_or(DEFAULT_TEMPERATURE)
          , top_k: options.top_k.unwrap_or(DEFAULT_TOP_K)
          , top_p: options.top_p.unwrap_or(DEFAULT_TOP_P)
          , max_output_tokens: options.max_output_tokens
              .unwrap_or(DEFAULT_MAX_OUTPUT_TOKENS)
          , use_search: options.use_search.unwrap_or(false)
          , response_schema: options.response_schema
        }
    }
}

/// Result of delivering one request to one backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationOutcome
{   Success(String)
  , RateLimited
  , HttpError(u16)
  , EmptyResponse
  , Exception(String)
}

impl GenerationOutcome
{   /// Short description used in logs and the exhaustion error
    pub fn describe(&self) -> String
    {   match self
        {   GenerationOutcome::Success(_) => "success".to_string()
          , GenerationOutcome::RateLimited => "rate limited".to_string()
          , GenerationOutcome::HttpError(status) => {
              format!("HTTP {}", status)
            }
          , GenerationOutcome::EmptyResponse => {
              "empty response".to_string()
            }
          , GenerationOutcome::Exception(msg) => {
              format!("exception: {}", msg)
            }
        }
    }
}
