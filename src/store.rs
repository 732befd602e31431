//! Read-only configuration store: backends, prompt templates, settings

use std::collections::HashMap;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use log::{debug, error, trace};
use crate::snapshot::{BackendDescriptor, ConfigurationSnapshot, PromptTemplate};

pub const BACKENDS_TABLE: &str = "ai_models";
pub const TEMPLATES_TABLE: &str = "ai_prompts";
pub const SETTINGS_TABLE: &str = "ai_settings";

/// Source of dispatcher configuration
#[async_trait]
pub trait ConfigStore: Send + Sync
{   /// Enabled backends, highest priority first
    async fn load_backends(&self)
      -> Result<Vec<BackendDescriptor>, crate::error::Error>;

    /// Enabled prompt templates
    async fn load_templates(&self)
      -> Result<Vec<PromptTemplate>, crate::error::Error>;

    /// General key/value settings
    async fn load_settings(&self)
      -> Result<HashMap<String, Value>, crate::error::Error>;
}

#[derive(Debug, Deserialize)]
struct SettingRow
{   key: String
  , value: Value
}

/// Supabase (PostgREST) backed store
pub struct SupabaseStore
{   rest_base: String
  , anon_key: String
  , http_client: reqwest::Client
}

impl SupabaseStore
{   pub fn new(
      config: &crate::config::StoreConfig
    , http_client: reqwest::Client
    ) -> Self
    {   debug!("Creating SupabaseStore for {}", config.url);
        SupabaseStore
        {   rest_base: format!(
              "{}/rest/v1", config.url.trim_end_matches('/')
            )
          , anon_key: config.anon_key.clone()
          , http_client
        }
    }

    async fn select<T>(
      &self
    , table: &str
    , query: &[(&str, &str)]
    ) -> Result<Vec<T>, crate::error::Error>
    where T: serde::de::DeserializeOwned
    {   let url = format!("{}/{}", self.rest_base, table);
        trace!("Store select {} {:?}", url, query);

        let response = self.http_client
          .get(&url)
          .query(&[("select", "*")])
          .query(query)
          .header("apikey", &self.anon_key)
          .header("Authorization", format!("Bearer {}", self.anon_key))
          .send()
          .await
          .map_err(|e| {
            error!("Store request to {} failed: {}", table, e);
            crate::error::Error::HttpError(e.to_string())
          })?;

        let status = response.status();
        if !status.is_success()
        {   let error_text = response.text().await
              .unwrap_or_else(|_|
                "Unknown error".to_string()
              );
            error!("Store error on {}: {} {}", table, status, error_text);
            return Err(crate::error::Error::StoreError(
              format!("{} ({}): {}", table, status, error_text)
            ));
        }

        response.json().await.map_err(|e| {
          error!("Parse error on {}: {}", table, e);
          crate::error::Error::ParseError(e.to_string())
        })
    }
}

#[async_trait]
impl ConfigStore for SupabaseStore
{   async fn load_backends(&self)
      -> Result<Vec<BackendDescriptor>, crate::error::Error>
    {   self.select(
          BACKENDS_TABLE,
          &[("enabled", "eq.true"), ("order", "priority.desc")]
        ).await
    }

    async fn load_templates(&self)
      -> Result<Vec<PromptTemplate>, crate::error::Error>
    {   self.select(TEMPLATES_TABLE, &[("enabled", "eq.true")]).await
    }

    async fn load_settings(&self)
      -> Result<HashMap<String, Value>, crate::error::Error>
    {   let rows: Vec<SettingRow>
          = self.select(SETTINGS_TABLE, &[]).await?;
        Ok(rows.into_iter().map(|r| (r.key, r.value)).collect())
    }
}

/// In-memory store serving a fixed configuration
pub struct StaticStore
{   backends: Vec<BackendDescriptor>
  , templates: Vec<PromptTemplate>
  , settings: HashMap<String, Value>
}

impl StaticStore
{   pub fn new(
      backends: Vec<BackendDescriptor>
    , templates: Vec<PromptTemplate>
    , settings: HashMap<String, Value>
    ) -> Self
    {   StaticStore { backends, templates, settings }
    }

    /// Serve the built-in backend list
    pub fn builtin() -> Self
    {   let snapshot = ConfigurationSnapshot::builtin();
        StaticStore::new(
          snapshot.backends
        , snapshot.prompt_templates.into_values().collect()
        , snapshot.general_settings
        )
    }
}

#[async_trait]
impl ConfigStore for StaticStore
{   async fn load_backends(&self)
      -> Result<Vec<BackendDescriptor>, crate::error::Error>
    {   Ok(self.backends.iter().filter(|b| b.enabled).cloned().collect())
    }

    async fn load_templates(&self)
      -> Result<Vec<PromptTemplate>, crate::error::Error>
    {   Ok(self.templates.clone())
    }

    async fn load_settings(&self)
      -> Result<HashMap<String, Value>, crate::error::Error>
    {   Ok(self.settings.clone())
    }
}
