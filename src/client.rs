use std::collections::HashMap;
use tokio::sync::mpsc;
use log::{debug, error, info};
use crate::DispatcherFoot;

/// Public API for a dispatcher running on its own task
pub struct DispatcherService
{   hand: crate::DispatcherHand
  , _task_handle: tokio::task::JoinHandle<()>
}

impl DispatcherService
{   /// Spawn a task that owns `dispatcher`.
    /// Returns immediately; commands are served one at a time.
    pub fn spawn(dispatcher: crate::Dispatcher) -> Self
    {   debug!("Creating DispatcherService with task ownership");

        let (generate_tx, generate_rx)
          = mpsc::unbounded_channel();
        let (generate_from_template_tx, generate_from_template_rx)
          = mpsc::unbounded_channel();
        let (refresh_configuration_tx, refresh_configuration_rx)
          = mpsc::unbounded_channel();
        let (kill_process_tx, kill_process_rx)
          = mpsc::unbounded_channel();

        let hand = crate::DispatcherHand
        {   generate_tx
          , generate_from_template_tx
          , refresh_configuration_tx
          , kill_process_tx
        };

        let foot = crate::DispatcherFoot
        {   generate_rx
          , generate_from_template_rx
          , refresh_configuration_rx
          , kill_process_rx
        };

        let _task_handle = tokio::spawn(async move {
          run_dispatcher_loop(foot, dispatcher).await
        });

        DispatcherService
        {   hand
          , _task_handle
        }
    }

    /// Queue a prompt - returns almost immediately
    pub async fn generate(
      &self
    , prompt: String
    , options: crate::GenerationOptions
    ) -> Result<
        mpsc::UnboundedReceiver<crate::GenerateReply>,
        crate::error::Error
      >
    {   debug!("generate queuing prompt ({} chars)", prompt.len());
        let (reply_tx, reply_rx)
          = mpsc::unbounded_channel();

        let cmd = crate::GenerateArgs
        {   prompt
          , options
          , reply: reply_tx
        };

        self.hand.generate_tx
          .send(cmd)
          .map_err(|_| disconnected())?;

        Ok(reply_rx)
    }

    /// Queue a template render and generation - returns almost immediately
    pub async fn generate_from_template(
      &self
    , template_key: String
    , variables: HashMap<String, String>
    , options: crate::GenerationOptions
    ) -> Result<
        mpsc::UnboundedReceiver<crate::GenerateReply>,
        crate::error::Error
      >
    {   debug!("generate_from_template queuing {}", template_key);
        let (reply_tx, reply_rx)
          = mpsc::unbounded_channel();

        let cmd = crate::GenerateFromTemplateArgs
        {   template_key
          , variables
          , options
          , reply: reply_tx
        };

        self.hand.generate_from_template_tx
          .send(cmd)
          .map_err(|_| disconnected())?;

        Ok(reply_rx)
    }

    /// Force a configuration refresh - returns almost immediately
    pub async fn refresh_configuration(
      &self
    ) -> Result<
        mpsc::UnboundedReceiver<crate::RefreshConfigurationReply>,
        crate::error::Error
      >
    {   debug!("refresh_configuration queuing command");
        let (reply_tx, reply_rx)
          = mpsc::unbounded_channel();

        let cmd = crate::RefreshConfigurationArgs
        {   reply: reply_tx
        };

        self.hand.refresh_configuration_tx
          .send(cmd)
          .map_err(|_| disconnected())?;

        Ok(reply_rx)
    }

    /// Gracefully shutdown the service
    pub async fn shutdown(self)
      -> Result<(), crate::error::Error>
    {   debug!("Shutting down DispatcherService");
        let (reply_tx, mut reply_rx)
          = mpsc::unbounded_channel();

        let cmd = crate::KillProcessArgs
        {   reply: reply_tx
        };

        self.hand.kill_process_tx
          .send(cmd)
          .map_err(|_| {
            error!("Dispatcher channel already closed");
            crate::error::Error::Disconnected
          })?;

        // Wait for shutdown confirmation
        match reply_rx.recv().await
        {   Some(result) => {
              debug!("Dispatcher shutdown confirmed");
              result
            }
          , None => {
              error!("Dispatcher stopped without confirming shutdown");
              Err(crate::error::Error::Disconnected)
            }
        }
    }
}

fn disconnected() -> crate::error::Error
{   error!("Dispatcher channel closed");
    crate::error::Error::Disconnected
}

/// Main dispatcher event loop
///
/// Commands are handled to completion one at a time, so the cache and
/// exclusion list never see interleaved mutation.
async fn run_dispatcher_loop(
  foot: crate::DispatcherFoot
, mut dispatcher: crate::Dispatcher
)
{   debug!("Starting dispatcher event loop");
    let DispatcherFoot
    {   mut generate_rx
      , mut generate_from_template_rx
      , mut refresh_configuration_rx
      , mut kill_process_rx
    } = foot;

    loop
    { tokio::select!
      { Some(cmd) = generate_rx.recv() => {
          debug!("Received Generate");
          let result = dispatcher
            .generate(&cmd.prompt, cmd.options)
            .await;
          let _ = cmd.reply.send(result);
        }
      , Some(cmd) = generate_from_template_rx.recv() => {
          debug!("Received GenerateFromTemplate: {}", cmd.template_key);
          let result = dispatcher
            .generate_from_template(
              &cmd.template_key,
              &cmd.variables,
              cmd.options
            )
            .await;
          let _ = cmd.reply.send(result);
        }
      , Some(cmd) = refresh_configuration_rx.recv() => {
          debug!("Received RefreshConfiguration");
          dispatcher.invalidate_configuration();
          let snapshot = dispatcher.fetch_configuration().await;
          let _ = cmd.reply.send(Ok(snapshot.backends.clone()));
        }
      , Some(cmd) = kill_process_rx.recv() => {
          debug!("Received KillProcess");
          let _ = cmd.reply.send(Ok(()));
          info!("Dispatcher shutting down");
          break;
        }
      , else => {
          debug!("All command channels closed");
          break;
        }
      }
    }
}
