//! aidispatch: resilient text generation over a ranked list of Gemini
//! backends.
//!
//! [`Dispatcher`] is the single-owner context holding the configuration
//! cache and the backend exclusion list. [`DispatcherService`] runs one
//! on a background task and exposes it through channels.

pub mod error;
pub mod config;
pub mod request;
pub mod snapshot;
pub mod failover;
pub mod template;
pub mod store;
pub mod providers;
pub mod dispatcher;
pub mod client;

use std::collections::HashMap;

pub use client::DispatcherService;
pub use config::DispatcherConfig;
pub use dispatcher::Dispatcher;
pub use error::Error;
pub use request::{GenerationOptions, GenerationOutcome, GenerationRequest};
pub use snapshot::{BackendDescriptor, ConfigurationSnapshot, PromptTemplate};
pub use template::clean_and_parse_json;

/// DISPATCHER SERVICE INTERFACE:

// ===== Generate =====

/// `Ok(None)` means no API key is configured (simulation mode)
pub type GenerateReply = Result<Option<String>, crate::error::Error>;
pub type GenerateReplySender
  = tokio::sync::mpsc::UnboundedSender<GenerateReply>;

pub struct GenerateArgs
{   pub prompt: String
  , pub options: GenerationOptions
  , pub reply: GenerateReplySender
}

// ===== GenerateFromTemplate =====

pub struct GenerateFromTemplateArgs
{   pub template_key: String
  , pub variables: HashMap<String, String>
  , pub options: GenerationOptions
  , pub reply: GenerateReplySender
}

// ===== RefreshConfiguration =====

pub type RefreshConfigurationReply
  = Result<Vec<BackendDescriptor>, crate::error::Error>;
pub type RefreshConfigurationReplySender
  = tokio::sync::mpsc::UnboundedSender<RefreshConfigurationReply>;

pub struct RefreshConfigurationArgs
{   pub reply: RefreshConfigurationReplySender
}

// ===== KillProcess =====

pub type KillProcessReply = Result<(), crate::error::Error>;
pub type KillProcessReplySender
  = tokio::sync::mpsc::UnboundedSender<KillProcessReply>;

pub struct KillProcessArgs
{   pub reply: KillProcessReplySender
}

// ===== DispatcherHand (sender side) =====

pub struct DispatcherHand
{   pub generate_tx
      : tokio::sync::mpsc::UnboundedSender<GenerateArgs>
  , pub generate_from_template_tx
      : tokio::sync::mpsc::UnboundedSender<GenerateFromTemplateArgs>
  , pub refresh_configuration_tx
      : tokio::sync::mpsc::UnboundedSender<RefreshConfigurationArgs>
  , pub kill_process_tx
      : tokio::sync::mpsc::UnboundedSender<KillProcessArgs>
}

// ===== DispatcherFoot (receiver side) =====

pub struct DispatcherFoot
{   pub generate_rx
      : tokio::sync::mpsc::UnboundedReceiver<GenerateArgs>
  , pub generate_from_template_rx
      : tokio::sync::mpsc::UnboundedReceiver<GenerateFromTemplateArgs>
  , pub refresh_configuration_rx
      : tokio::sync::mpsc::UnboundedReceiver<RefreshConfigurationArgs>
  , pub kill_process_rx
      : tokio::sync::mpsc::UnboundedReceiver<KillProcessArgs>
}
