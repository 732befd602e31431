use std::collections::HashMap;
use std::path::PathBuf;
use std::process::ExitCode;
use clap::Parser;
use log::{debug, error, warn};
use aidispatch::{
  clean_and_parse_json, Dispatcher, DispatcherConfig, DispatcherService,
  GenerationOptions
};

/// Generate text through the resilient Gemini dispatcher
#[derive(Debug, Parser)]
#[command(name = "aidispatch", version)]
struct Cli
{   /// Prompt text (ignored with --template)
    prompt: Option<String>
  , /// Render this stored prompt template instead of a raw prompt
    #[arg(long)]
    template: Option<String>
  , /// Template variable, repeatable: --var company=Acme
    #[arg(long = "var", value_parser = parse_var)]
    vars: Vec<(String, String)>
  , /// Ask for web-search grounding where supported
    #[arg(long)]
    search: bool
  , #[arg(long)]
    temperature: Option<f32>
  , #[arg(long)]
    max_output_tokens: Option<u32>
  , /// Extract and pretty-print a JSON object from the reply
    #[arg(long)]
    json: bool
  , /// Load configuration from a JSON file instead of the environment
    #[arg(long)]
    config: Option<PathBuf>
}

fn parse_var(raw: &str) -> Result<(String, String), String>
{   raw.split_once('=')
      .map(|(k, v)| (k.trim().to_string(), v.to_string()))
      .ok_or_else(|| format!("expected NAME=VALUE, got {:?}", raw))
}

/// Shut the service down; a failure only loses the confirmation
async fn stop(service: DispatcherService)
{   if let Err(e) = service.shutdown().await
    {   warn!("Dispatcher shutdown failed: {}", e);
    }
}

#[tokio::main]
async fn main() -> ExitCode
{   env_logger::init();
    let cli = Cli::parse();

    match run(cli).await
    {   Ok(()) => ExitCode::SUCCESS
      , Err(e) => {
          error!("{}", e);
          eprintln!("aidispatch: {}", e);
          ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), aidispatch::Error>
{   let config = match &cli.config
    {   Some(path) => DispatcherConfig::from_json_file(path)?
      , None => DispatcherConfig::from_env()
    };
    let service = DispatcherService::spawn(
      Dispatcher::from_config(&config)?
    );

    let options = GenerationOptions
    {   temperature: cli.temperature
      , max_output_tokens: cli.max_output_tokens
      , use_search: cli.search.then_some(true)
      , ..GenerationOptions::default()
    };

    let mut reply_rx = match (cli.template, cli.prompt)
    {   (Some(key), _) => {
          let variables: HashMap<String, String>
            = cli.vars.into_iter().collect();
          service.generate_from_template(key, variables, options).await?
        }
      , (None, Some(prompt)) => {
          service.generate(prompt, options).await?
        }
      , (None, None) => {
          return Err(aidispatch::Error::InvalidConfiguration(
            "a prompt or --template is required".to_string()
          ));
        }
    };

    let reply = reply_rx.recv().await
      .ok_or(aidispatch::Error::Disconnected)?;
    stop(service).await;

    match reply?
    {   Some(text) if cli.json => {
          let value = clean_and_parse_json(&text);
          let pretty = serde_json::to_string_pretty(&value)
            .map_err(|e| aidispatch::Error::ParseError(e.to_string()))?;
          println!("{}", pretty);
        }
      , Some(text) => println!("{}", text)
      , None => {
          debug!("Simulation mode");
          eprintln!("aidispatch: GEMINI_API_KEY not set; nothing generated");
        }
    }
    Ok(())
}
