//! Resilient generation dispatcher
//!
//! Owns the configuration cache and the backend exclusion list. Every
//! method takes `&mut self`: one dispatcher is one single-threaded
//! context, and [`crate::client::DispatcherService`] serializes access
//! when it has to be shared.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use log::{debug, error, info, trace, warn};

use crate::config::DispatcherConfig;
use crate::error::Error;
use crate::failover::{ExclusionList, FailoverSequence, RetryPolicy};
use crate::providers::{gemini, GenerationTransport};
use crate::request::{GenerationOptions, GenerationOutcome, GenerationRequest};
use crate::snapshot::{BackendDescriptor, ConfigurationSnapshot, SnapshotCache};
use crate::store::{ConfigStore, StaticStore, SupabaseStore};

/// General setting overriding the rate-limit cooldown
pub const COOLDOWN_SETTING: &str = "model_cooldown_ms";

pub struct Dispatcher
{   api_key: Option<String>
  , store: Arc<dyn ConfigStore>
  , transport: Arc<dyn GenerationTransport>
  , retry: RetryPolicy
  , exclusion_duration: Duration
  , cache: SnapshotCache
  , exclusions: ExclusionList
}

impl Dispatcher
{   pub fn new(
      config: &DispatcherConfig
    , store: Arc<dyn ConfigStore>
    , transport: Arc<dyn GenerationTransport>
    ) -> Self
    {   debug!("Creating Dispatcher");
        Dispatcher
        {   api_key: config.api_key
              .clone()
              .filter(|k| !k.trim().is_empty())
          , store
          , transport
          , retry: RetryPolicy::from_config(&config.failover)
          , exclusion_duration: config.exclusion_duration()
          , cache: SnapshotCache::new(config.cache_ttl())
          , exclusions: ExclusionList::new()
        }
    }

    /// Wire up the reqwest-backed store and transport from `config`
    pub fn from_config(config: &DispatcherConfig)
      -> Result<Self, Error>
    {   let mut builder = reqwest::Client::builder();
        if let Some(secs) = config.timeout_secs
        {   builder = builder.timeout(Duration::from_secs(secs));
        }
        let http_client = builder.build().map_err(|e| {
          error!("Failed to build HTTP client: {}", e);
          Error::InvalidConfiguration(e.to_string())
        })?;

        let store: Arc<dyn ConfigStore> = match &config.store
        {   Some(store_config) => Arc::new(
              SupabaseStore::new(store_config, http_client.clone())
            )
          , None => {
              info!("No configuration store; using built-in backends");
              Arc::new(StaticStore::builtin())
            }
        };
        let transport = Arc::new(
          gemini::GeminiTransport::new(&config.api_base, http_client)
        );
        Ok(Dispatcher::new(config, store, transport))
    }

    pub fn has_api_key(&self) -> bool
    {   self.api_key.is_some()
    }

    /// Current configuration snapshot; refreshed when older than the TTL.
    /// Store failures fall back to the built-in snapshot.
    pub async fn fetch_configuration(&mut self)
      -> Arc<ConfigurationSnapshot>
    {   if let Some(snapshot) = self.cache.fresh()
        {   return snapshot;
        }

        debug!("Refreshing configuration snapshot");
        let loaded = tokio::try_join!(
          self.store.load_backends(),
          self.store.load_templates(),
          self.store.load_settings(),
        );

        let snapshot = match loaded
        {   Ok((backends, templates, settings))
              if backends.iter().any(|b| b.enabled) => {
              info!(
                "Loaded {} backends and {} templates",
                backends.len(), templates.len()
              );
              ConfigurationSnapshot::new(backends, templates, settings)
            }
          , Ok(_) => {
              warn!("Store returned no enabled backends; using built-in");
              ConfigurationSnapshot::builtin()
            }
          , Err(e) => {
              warn!("Configuration fetch failed, using built-in: {}", e);
              ConfigurationSnapshot::builtin()
            }
        };
        self.cache.store(snapshot)
    }

    /// Drop the cached snapshot so the next call refreshes it
    pub fn invalidate_configuration(&mut self)
    {   self.cache.invalidate();
    }

    pub fn is_excluded(&mut self, backend_name: &str) -> bool
    {   self.exclusions.is_excluded(backend_name)
    }

    pub fn exclude(&mut self, backend_name: &str, duration: Duration)
    {   self.exclusions.exclude(backend_name, duration);
    }

    /// Deliver `request` to one backend with bounded retries
    pub async fn dispatch_to_backend(
      &self
    , backend: &BackendDescriptor
    , request: &GenerationRequest
    ) -> GenerationOutcome
    {   let Some(api_key) = self.api_key.as_deref()
        else
        {   return GenerationOutcome::Exception(
              Error::MissingApiKey("completion endpoint".to_string())
                .to_string()
            );
        };
        let envelope = gemini::build_envelope(backend, request);
        let max_attempts = self.retry.max_attempts();

        let mut attempt = 0;
        loop
        {   let outcome = match self.transport
              .post(backend, api_key, &envelope)
              .await
            {   Ok(response) if response.is_rate_limited() => {
                  return GenerationOutcome::RateLimited;
                }
              , Ok(response) if response.is_success() => {
                  return match gemini::extract_text(&response.body)
                  {   Some(text) => GenerationOutcome::Success(text)
                    , None => {
                        warn!(
                          "{} returned no text (finish reason: {})",
                          backend.name,
                          gemini::finish_reason(&response.body)
                            .as_deref()
                            .unwrap_or("none")
                        );
                        GenerationOutcome::EmptyResponse
                      }
                  };
                }
              , Ok(response) => log_failure(
                  backend,
                  attempt,
                  GenerationOutcome::HttpError(response.status)
                )
              , Err(e) => log_failure(
                  backend,
                  attempt,
                  GenerationOutcome::Exception(e.to_string())
                )
            };

            attempt += 1;
            if attempt >= max_attempts
            {   return outcome;
            }
            let delay = self.retry.backoff_for_attempt(attempt - 1);
            debug!(
              "Retrying {} in {:?} (attempt {}/{})",
              backend.name, delay, attempt + 1, max_attempts
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// Text from the first backend that succeeds.
    /// `Ok(None)` without an API key; `Err` only when every backend fails.
    pub async fn generate(
      &mut self
    , prompt: &str
    , options: GenerationOptions
    ) -> Result<Option<String>, Error>
    {   if !self.has_api_key()
        {   info!("No API key configured; skipping generation");
            return Ok(None);
        }

        let snapshot = self.fetch_configuration().await;
        let cooldown = snapshot
          .setting_u64(COOLDOWN_SETTING)
          .map(Duration::from_millis)
          .unwrap_or(self.exclusion_duration);
        let request = GenerationRequest::new(prompt, options);

        let mut sequence = FailoverSequence::plan(
          snapshot.enabled_backends(),
          &mut self.exclusions
        );
        if sequence.bypassed_exclusions
        {   debug!("Dispatching despite active exclusions");
        }
        let mut attempted = Vec::new();
        let mut last_failure = "no backends configured".to_string();

        while let Some(backend) = sequence.current().cloned()
        {   trace!("Dispatching to {}", backend.name);
            attempted.push(backend.name.clone());
            let outcome = self.dispatch_to_backend(&backend, &request).await;
            match outcome
            {   GenerationOutcome::Success(text) => {
                  debug!("{} succeeded ({} chars)", backend.name, text.len());
                  return Ok(Some(text));
                }
              , GenerationOutcome::RateLimited => {
                  warn!("{} is rate limited; excluding", backend.name);
                  self.exclusions.exclude(&backend.name, cooldown);
                  last_failure = format!("{}: rate limited", backend.name);
                }
              , other => {
                  warn!("{} failed: {}", backend.name, other.describe());
                  last_failure = format!(
                    "{}: {}", backend.name, other.describe()
                  );
                }
            }
            sequence.advance();
        }

        error!("All backends failed; last failure: {}", last_failure);
        Err(Error::AllBackendsFailed { attempted, last_failure })
    }

    /// Render a stored prompt template and generate from it
    pub async fn generate_from_template(
      &mut self
    , template_key: &str
    , variables: &HashMap<String, String>
    , options: GenerationOptions
    ) -> Result<Option<String>, Error>
    {   let snapshot = self.fetch_configuration().await;
        let template = snapshot.template(template_key).ok_or_else(|| {
          error!("Template not found: {}", template_key);
          Error::TemplateNotFound(template_key.to_string())
        })?;

        let prompt = crate::template::render(&template.template, variables);
        let options = template.options().merged_with(options);
        debug!("Generating from template {}", template_key);
        self.generate(&prompt, options).await
    }
}

fn log_failure(
  backend: &BackendDescriptor
, attempt: usize
, outcome: GenerationOutcome
) -> GenerationOutcome
{   warn!(
      "{} attempt {} failed: {}",
      backend.name, attempt + 1, outcome.describe()
    );
    outcome
}
