//! Backend descriptors, prompt templates and the cached configuration
//! snapshot

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::Instant;
use log::{debug, trace};

/// Endpoint version on which the search tool is available
pub const SEARCH_ENDPOINT_VERSION: &str = "v1beta";

/// One named, versioned completion backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendDescriptor
{   /// Model identifier, e.g. "gemini-2.0-flash"
    pub name: String
  , /// API version segment, e.g. "v1beta"
    #[serde(alias = "api_version")]
    pub endpoint_version: String
  , /// Higher is tried first
    #[serde(default)]
    pub priority: i32
  , #[serde(default, alias = "supports_search")]
    pub supports_web_search: bool
  , #[serde(default = "enabled_by_default")]
    pub enabled: bool
}

fn enabled_by_default() -> bool
{   true
}

impl BackendDescriptor
{   pub fn new(
      name: impl Into<String>
    , endpoint_version: impl Into<String>
    , priority: i32
    , supports_web_search: bool
    ) -> Self
    {   BackendDescriptor
        {   name: name.into()
          , endpoint_version: endpoint_version.into()
          , priority
          , supports_web_search
          , enabled: true
        }
    }

    /// Whether a search-tool directive may be attached for this backend
    pub fn supports_search(&self) -> bool
    {   self.supports_web_search
          && self.endpoint_version == SEARCH_ENDPOINT_VERSION
    }
}

/// Named prompt with placeholder variables and default options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptTemplate
{   #[serde(alias = "prompt_key")]
    pub key: String
  , #[serde(alias = "prompt_template")]
    pub template: String
  , #[serde(default)]
    pub description: Option<String>
  , #[serde(default)]
    pub use_search: Option<bool>
  , #[serde(default)]
    pub temperature: Option<f32>
  , #[serde(default, alias = "max_tokens")]
    pub max_output_tokens: Option<u32>
  , #[serde(default)]
    pub response_schema: Option<Value>
}

impl PromptTemplate
{   /// The template's recorded generation options
    pub fn options(&self) -> crate::request::GenerationOptions
    {   crate::request::GenerationOptions
        {   temperature: self.temperature
          , max_output_tokens: self.max_output_tokens
          , use_search: self.use_search
          , response_schema: self.response_schema.clone()
          , ..Default::default()
        }
    }
}

/// Cached bundle of backend, template and settings configuration
#[derive(Debug, Clone)]
pub struct ConfigurationSnapshot
{   pub backends: Vec<BackendDescriptor>
  , pub prompt_templates: HashMap<String, PromptTemplate>
  , pub general_settings: HashMap<String, Value>
  , pub fetched_at: Instant
}

impl ConfigurationSnapshot
{   pub fn new(
      mut backends: Vec<BackendDescriptor>
    , templates: Vec<PromptTemplate>
    , general_settings: HashMap<String, Value>
    ) -> Self
    {   // stable: equal priorities keep store order
        backends.sort_by(|a, b| b.priority.cmp(&a.priority));
        let prompt_templates = templates
          .into_iter()
          .map(|t| (t.key.clone(), t))
          .collect();
        ConfigurationSnapshot
        {   backends
          , prompt_templates
          , general_settings
          , fetched_at: Instant::now()
        }
    }

    /// Hardcoded snapshot used when the store is unreachable
    pub fn builtin() -> Self
    {   debug!("Building built-in configuration snapshot");
        ConfigurationSnapshot::new(
          vec![
            BackendDescriptor::new(
              "gemini-2.5-flash", SEARCH_ENDPOINT_VERSION, 100, true
            )
          , BackendDescriptor::new(
              "gemini-2.0-flash", SEARCH_ENDPOINT_VERSION, 90, true
            )
          , BackendDescriptor::new(
              "gemini-1.5-flash", "v1", 80, false
            )
          ]
        , vec![]
        , HashMap::new()
        )
    }

    pub fn enabled_backends(&self)
      -> impl Iterator<Item = &BackendDescriptor>
    {   self.backends.iter().filter(|b| b.enabled)
    }

    pub fn template(&self, key: &str) -> Option<&PromptTemplate>
    {   self.prompt_templates.get(key)
    }

    pub fn setting(&self, key: &str) -> Option<&Value>
    {   self.general_settings.get(key)
    }

    /// Numeric setting; accepts JSON numbers and numeric strings
    pub fn setting_u64(&self, key: &str) -> Option<u64>
    {   match self.setting(key)?
        {   Value::Number(n) => n.as_u64()
          , Value::String(s) => s.trim().parse().ok()
          , _ => None
        }
    }

    pub fn age(&self) -> Duration
    {   self.fetched_at.elapsed()
    }
}

/// Single-slot snapshot cache with a fixed time-to-live
#[derive(Debug)]
pub struct SnapshotCache
{   ttl: Duration
  , current: Option<Arc<ConfigurationSnapshot>>
}

impl SnapshotCache
{   pub fn new(ttl: Duration) -> Self
    {   SnapshotCache
        {   ttl
          , current: None
        }
    }

    /// The cached snapshot if it is younger than the TTL
    pub fn fresh(&self) -> Option<Arc<ConfigurationSnapshot>>
    {   let snapshot = self.current.as_ref()?;
        if snapshot.age() < self.ttl
        {   trace!("Snapshot cache hit (age {:?})", snapshot.age());
            Some(Arc::clone(snapshot))
        } else
        {   debug!("Snapshot expired (age {:?})", snapshot.age());
            None
        }
    }

    /// Replace the cached snapshot wholesale
    pub fn store(
      &mut self
    , snapshot: ConfigurationSnapshot
    ) -> Arc<ConfigurationSnapshot>
    {   let snapshot = Arc::new(snapshot);
        self.current = Some(Arc::clone(&snapshot));
        snapshot
    }

    pub fn invalidate(&mut self)
    {   self.current = None;
    }
}

#[cfg(test)]
mod tests
{   use super::*;

    #[test]
    fn builtin_snapshot_is_usable()
    {   let snapshot = ConfigurationSnapshot::builtin();
        assert_eq!(snapshot.enabled_backends().count(), 3);
        assert_eq!(snapshot.backends[0].name, "gemini-2.5-flash");
        assert!(snapshot.prompt_templates.is_empty());
    }

    #[test]
    fn backends_sorted_by_descending_priority()
    {   let snapshot = ConfigurationSnapshot::new(
          vec![
            BackendDescriptor::new("low", "v1", 1, false)
          , BackendDescriptor::new("high", "v1", 10, false)
          , BackendDescriptor::new("mid-a", "v1", 5, false)
          , BackendDescriptor::new("mid-b", "v1", 5, false)
          ]
        , vec![]
        , HashMap::new()
        );
        let names: Vec<&str> = snapshot.backends
          .iter()
          .map(|b| b.name.as_str())
          .collect();
        assert_eq!(names, vec!["high", "mid-a", "mid-b", "low"]);
    }

    #[test]
    fn search_needs_flag_and_beta_endpoint()
    {   assert!(BackendDescriptor::new("a", "v1beta", 0, true)
          .supports_search());
        assert!(!BackendDescriptor::new("b", "v1", 0, true)
          .supports_search());
        assert!(!BackendDescriptor::new("c", "v1beta", 0, false)
          .supports_search());
    }

    #[test]
    fn descriptor_reads_store_column_names()
    {   let row = serde_json::json!({
          "name": "gemini-2.0-flash",
          "api_version": "v1beta",
          "priority": 7,
          "supports_search": true
        });
        let backend: BackendDescriptor
          = serde_json::from_value(row).unwrap();
        assert_eq!(backend.endpoint_version, "v1beta");
        assert!(backend.supports_web_search);
        assert!(backend.enabled);
    }

    #[test]
    fn numeric_settings_accept_strings()
    {   let mut settings = HashMap::new();
        settings.insert("a".to_string(), serde_json::json!(1500));
        settings.insert("b".to_string(), serde_json::json!(" 42 "));
        settings.insert("c".to_string(), serde_json::json!(true));
        let snapshot = ConfigurationSnapshot::new(
          vec![], vec![], settings
        );
        assert_eq!(snapshot.setting_u64("a"), Some(1500));
        assert_eq!(snapshot.setting_u64("b"), Some(42));
        assert_eq!(snapshot.setting_u64("c"), None);
        assert_eq!(snapshot.setting_u64("missing"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn cache_expires_after_ttl()
    {   let mut cache = SnapshotCache::new(Duration::from_secs(300));
        assert!(cache.fresh().is_none());

        cache.store(ConfigurationSnapshot::builtin());
        tokio::time::advance(Duration::from_secs(299)).await;
        assert!(cache.fresh().is_some());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(cache.fresh().is_none());
    }
}
