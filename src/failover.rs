//! Failover and retry logic for backend fallbacks

use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;
use log::{debug, warn};
use crate::snapshot::BackendDescriptor;

/// Retry policy for failed requests to a single backend
#[derive(Debug, Clone)]
pub struct RetryPolicy
{   pub max_retries: usize
  , pub backoff_multiplier: f32
  , pub initial_backoff: Duration
}

impl RetryPolicy
{   /// Create a new retry policy
    pub fn new(
      max_retries: usize
    , backoff_multiplier: f32
    , initial_backoff_ms: u64
    ) -> Self
    {   RetryPolicy
        {   max_retries
          , backoff_multiplier
          , initial_backoff: Duration::from_millis(
              initial_backoff_ms
            )
        }
    }

    pub fn from_config(config: &crate::config::FailoverConfig) -> Self
    {   RetryPolicy::new(
          config.max_retries
        , config.backoff_multiplier
        , config.initial_backoff_ms
        )
    }

    /// Total attempts per backend, initial one included
    pub fn max_attempts(&self) -> usize
    {   self.max_retries + 1
    }

    /// Calculate backoff duration after the given (zero-based) attempt
    pub fn backoff_for_attempt(
      &self
    , attempt: usize
    ) -> Duration
    {   let multiplier
          = self.backoff_multiplier.powi(attempt as i32);
        Duration::from_millis(
          (self.initial_backoff.as_millis() as f32
            * multiplier) as u64
        )
    }
}

impl Default for RetryPolicy
{   fn default() -> Self
    {   RetryPolicy::new(2, 2.0, 500)
    }
}

/// Temporary per-backend exclusions after rate-limit signals
#[derive(Debug, Default)]
pub struct ExclusionList
{   until: HashMap<String, Instant>
}

impl ExclusionList
{   pub fn new() -> Self
    {   ExclusionList::default()
    }

    /// True while an unexpired entry exists; expired entries are evicted
    pub fn is_excluded(&mut self, backend_name: &str) -> bool
    {   let now = Instant::now();
        self.until.retain(|_, until| *until > now);
        self.until.contains_key(backend_name)
    }

    /// Exclude `backend_name` for `duration`; overwrites any prior expiry
    pub fn exclude(&mut self, backend_name: &str, duration: Duration)
    {   debug!(
          "Excluding backend {} for {:?}", backend_name, duration
        );
        self.until.insert(
          backend_name.to_string(),
          Instant::now() + duration
        );
    }

    /// Entries currently held, expired or not
    pub fn len(&self) -> usize
    {   self.until.len()
    }

    pub fn is_empty(&self) -> bool
    {   self.until.is_empty()
    }
}

/// Ordered backend candidates for one generation call
#[derive(Debug, Clone)]
pub struct FailoverSequence
{   pub backends: Vec<BackendDescriptor>
  , pub current_index: usize
  , /// Set when every backend was excluded and the full list is used
    pub bypassed_exclusions: bool
}

impl FailoverSequence
{   /// Create a sequence over `backends` in the order given
    pub fn new(backends: Vec<BackendDescriptor>) -> Self
    {   debug!(
          "Creating failover sequence with {} backends",
          backends.len()
        );
        FailoverSequence
        {   backends
          , current_index: 0
          , bypassed_exclusions: false
        }
    }

    /// Enabled, non-excluded backends by descending priority.
    /// Falls back to every enabled backend when all are excluded.
    pub fn plan<'a>(
      backends: impl IntoIterator<Item = &'a BackendDescriptor>
    , exclusions: &mut ExclusionList
    ) -> Self
    {   let mut all: Vec<BackendDescriptor> = backends
          .into_iter()
          .filter(|b| b.enabled)
          .cloned()
          .collect();
        all.sort_by(|a, b| b.priority.cmp(&a.priority));

        let available: Vec<BackendDescriptor> = all
          .iter()
          .filter(|b| !exclusions.is_excluded(&b.name))
          .cloned()
          .collect();

        if available.is_empty() && !all.is_empty()
        {   warn!(
              "All {} backends are excluded; retrying the full list",
              all.len()
            );
            let mut sequence = FailoverSequence::new(all);
            sequence.bypassed_exclusions = true;
            return sequence;
        }
        FailoverSequence::new(available)
    }

    /// Get the current backend
    pub fn current(&self) -> Option<&BackendDescriptor>
    {   self.backends.get(self.current_index)
    }

    /// Move to the next backend
    pub fn advance(&mut self) -> Option<&BackendDescriptor>
    {   self.current_index += 1;
        self.current()
    }
}
