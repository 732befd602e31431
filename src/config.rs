//! Configuration for the dispatcher, its store and failover behavior

use std::path::Path;
use std::time::Duration;
use serde::{Deserialize, Serialize};
use log::{debug, warn};

pub const DEFAULT_API_BASE: &str
  = "https://generativelanguage.googleapis.com";

/// Configuration store (Supabase/PostgREST) connection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig
{   /// Project URL, e.g. https://xyz.supabase.co
    pub url: String
  , /// Anonymous (public) API key
    pub anon_key: String
}

/// Failover configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FailoverConfig
{   /// Retries per backend after the initial attempt
    pub max_retries: usize
  , /// Backoff multiplier for retries
    pub backoff_multiplier: f32
  , /// Initial backoff duration in milliseconds
    pub initial_backoff_ms: u64
  , /// How long a rate-limited backend stays excluded
    pub exclusion_ms: u64
}

impl Default for FailoverConfig
{   fn default() -> Self
    {   FailoverConfig
        {   max_retries: 2
          , backoff_multiplier: 2.0
          , initial_backoff_ms: 500
          , exclusion_ms: 300_000
        }
    }
}

/// Dispatcher configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig
{   /// Completion endpoint credential; absent means simulation mode
    pub api_key: Option<String>
  , /// Completion endpoint base URL
    pub api_base: String
  , /// Remote configuration store, if any
    pub store: Option<StoreConfig>
  , /// Lifetime of a configuration snapshot in seconds
    pub cache_ttl_secs: u64
  , /// Transport-level request timeout in seconds
    pub timeout_secs: Option<u64>
  , /// Failover configuration
    pub failover: FailoverConfig
}

impl Default for DispatcherConfig
{   fn default() -> Self
    {   DispatcherConfig
        {   api_key: None
          , api_base: DEFAULT_API_BASE.to_string()
          , store: None
          , cache_ttl_secs: 300
          , timeout_secs: None
          , failover: FailoverConfig::default()
        }
    }
}

impl DispatcherConfig
{   /// Build configuration from environment variables
    pub fn from_env() -> Self
    {   let mut config = DispatcherConfig::default();

        config.api_key = std::env::var("GEMINI_API_KEY").ok();
        if let Ok(base) = std::env::var("GEMINI_API_BASE")
        {   config.api_base = base;
        }

        match (
          std::env::var("SUPABASE_URL")
        , std::env::var("SUPABASE_ANON_KEY")
        )
        {   (Ok(url), Ok(anon_key)) => {
              config.store = Some(StoreConfig { url, anon_key });
            }
          , (Ok(_), Err(_)) => {
              warn!("SUPABASE_URL set without SUPABASE_ANON_KEY; \
                     using built-in configuration");
            }
          , _ => {}
        }

        if let Ok(raw) = std::env::var("AIDISPATCH_TIMEOUT_SECS")
        {   match raw.parse::<u64>()
            {   Ok(secs) => config.timeout_secs = Some(secs)
              , Err(_) => warn!(
                  "Ignoring invalid AIDISPATCH_TIMEOUT_SECS: {}", raw
                )
            }
        }

        debug!(
          "Loaded config from env (api key: {}, store: {})",
          config.has_api_key(),
          config.store.is_some()
        );
        config
    }

    /// Load configuration from a JSON file
    pub fn from_json_file(path: impl AsRef<Path>)
      -> Result<Self, crate::error::Error>
    {   let path = path.as_ref();
        debug!("Loading config from {}", path.display());
        let raw = std::fs::read_to_string(path).map_err(|e| {
          crate::error::Error::InvalidConfiguration(
            format!("{}: {}", path.display(), e)
          )
        })?;
        serde_json::from_str(&raw).map_err(|e| {
          crate::error::Error::InvalidConfiguration(
            format!("{}: {}", path.display(), e)
          )
        })
    }

    /// Whether a non-blank credential is configured
    pub fn has_api_key(&self) -> bool
    {   self.api_key
          .as_deref()
          .map(|k| !k.trim().is_empty())
          .unwrap_or(false)
    }

    pub fn cache_ttl(&self) -> Duration
    {   Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn exclusion_duration(&self) -> Duration
    {   Duration::from_millis(self.failover.exclusion_ms)
    }
}
