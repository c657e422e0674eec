//! Command implementations for the CLI
//!
//! SBIO pattern: Commands return Results and formatted output, I/O is handled by caller

use std::path::Path;
use std::sync::Arc;

use serde_json::{json, Value};
use thiserror::Error;

use super::display::{
    format_guard_outcome, format_json, format_model_records, format_models_in_deployment,
};
use super::{Cli, Commands, DeployArgs, EnsureArgs, PredictArgs, UpdateArgs};
use crate::auth::{CredentialProvider, EnvToken, StaticToken};
use crate::client::{ClientError, DeployAttributes, ModelClient, UpdateAttributes};
use crate::config::{load_config, ClientConfig, ConfigError};
use crate::deployment::deploy_model_if_not_exists;

/// Errors that can occur during command execution
#[derive(Error, Debug)]
pub enum CommandError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type for commands
pub type CommandResult<T> = Result<T, CommandError>;

// ============================================================================
// Setup (pure, apart from reading config and env)
// ============================================================================

/// Config file and environment, then command-line overrides
pub fn resolve_config(cli: &Cli) -> CommandResult<ClientConfig> {
    let config = load_config(cli.config.as_deref())?;
    let config = apply_overrides(config, cli);
    config.validate()?;
    Ok(config)
}

/// Apply global flags on top of a loaded config
pub fn apply_overrides(mut config: ClientConfig, cli: &Cli) -> ClientConfig {
    if let Some(ref url) = cli.api_url {
        config.api_url = url.clone();
    }
    if cli.insecure {
        config.verify_ssl = false;
    }
    if cli.lenient_polling {
        config.strict_polling = false;
    }
    if let Some(max_attempts) = cli.max_attempts {
        config.max_attempts = max_attempts;
    }
    config
}

/// `--token` (or its environment variable) if set, otherwise re-read the
/// environment on every request
pub fn credentials_for(cli: &Cli) -> Arc<dyn CredentialProvider> {
    match cli.token {
        Some(ref token) => Arc::new(StaticToken::new(token.clone())),
        None => Arc::new(EnvToken::default()),
    }
}

/// Parse the prediction body from `--input` or `--input-file`
pub fn parse_input(input: Option<&str>, input_file: Option<&Path>) -> CommandResult<Value> {
    let text = match (input, input_file) {
        (Some(text), _) => text.to_string(),
        (None, Some(path)) => std::fs::read_to_string(path)?,
        (None, None) => {
            return Err(CommandError::InvalidInput(
                "either --input or --input-file is required".to_string(),
            ))
        }
    };
    Ok(serde_json::from_str(&text)?)
}

pub fn deploy_attributes(args: &DeployArgs) -> DeployAttributes {
    DeployAttributes {
        disable_gpu: args.disable_gpu.then_some(true),
        batch_size: args.batch_size,
        max_input: args.max_input,
        transformers_cache: args.transformers_cache.clone(),
        model_class: args.model_class.clone(),
        return_plaintext_arrays: args.return_plaintext_arrays.then_some(true),
        preloaded_adapters: args.preloaded_adapters.then_some(true),
        ..DeployAttributes::new(&args.identifier, &args.model_name, &args.model_type)
    }
}

pub fn update_attributes(args: &UpdateArgs) -> CommandResult<UpdateAttributes> {
    let attributes = UpdateAttributes {
        disable_gpu: args.disable_gpu,
        batch_size: args.batch_size,
        max_input: args.max_input,
        return_plaintext_arrays: args.return_plaintext_arrays,
    };
    if attributes.is_empty() {
        return Err(CommandError::InvalidInput(
            "nothing to update: pass at least one attribute".to_string(),
        ));
    }
    Ok(attributes)
}

/// Skill arguments as the deployment guard expects them
pub fn skill_args(args: &EnsureArgs) -> Value {
    let mut value = json!({ "base_model": args.base_model });
    if let Some(ref adapter) = args.adapter {
        value["adapter"] = json!(adapter);
    }
    value
}

// ============================================================================
// Execution
// ============================================================================

/// Run one command and return the text to print
pub async fn execute(client: &ModelClient, command: &Commands) -> CommandResult<String> {
    let output = match command {
        Commands::Predict(args) => predict(client, args).await?,
        Commands::Stats { model } => format_json(&client.stats(model).await?)?,
        Commands::Models => format_model_records(&client.deployed_models().await?),
        Commands::Workers => format_json(&client.deployed_model_workers().await?)?,
        Commands::Deploy(args) => format_json(&client.deploy(&deploy_attributes(args)).await?)?,
        Commands::Remove { model } => format_json(&client.remove(model).await?)?,
        Commands::Update(args) => {
            let attributes = update_attributes(args)?;
            format_json(&client.update(&args.model, &attributes).await?)?
        }
        Commands::AddWorker { model, number } => {
            format_json(&client.add_worker(model, *number).await?)?
        }
        Commands::RemoveWorker { model, number } => {
            format_json(&client.remove_worker(model, *number).await?)?
        }
        Commands::InDeployment => {
            format_models_in_deployment(&client.get_models_in_deployment().await?)
        }
        Commands::Ensure(args) => {
            let outcome = deploy_model_if_not_exists(client, &skill_args(args)).await?;
            format_guard_outcome(&args.base_model, &outcome)
        }
    };
    Ok(output)
}

async fn predict(client: &ModelClient, args: &PredictArgs) -> CommandResult<String> {
    let input = parse_input(args.input.as_deref(), args.input_file.as_deref())?;
    if args.raw {
        let result = client.predict_raw(&args.model, &args.method, &input).await?;
        Ok(format_json(&result)?)
    } else {
        let response = client.predict(&args.model, &args.method, &input).await?;
        Ok(format_json(&response)?)
    }
}
