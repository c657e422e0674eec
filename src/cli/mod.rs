//! CLI module for square-model
//!
//! Provides kubectl-like subcommands over the model API:
//! - `square-model predict` - Run a prediction and print decoded outputs
//! - `square-model models` / `workers` / `stats` - Inspect deployments
//! - `square-model deploy` / `remove` / `update` - Manage models
//! - `square-model add-worker` / `remove-worker` - Scale models
//! - `square-model in-deployment` - List deployments in flight
//! - `square-model ensure` - Deploy a base model unless already present

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod display;

pub use commands::*;
pub use display::*;

#[derive(Parser, Debug)]
#[command(name = "square-model")]
#[command(about = "Client for the asynchronous SQuARE model API")]
#[command(version)]
pub struct Cli {
    /// Enable verbose logging output (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to config file (default: ~/.square/config)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Path to a .env file loaded before reading the environment
    #[arg(long, value_name = "FILE", global = true)]
    pub env_file: Option<PathBuf>,

    /// Base URL of the model API (overrides the config file)
    #[arg(long, value_name = "URL", env = "SQUARE_API_URL", global = true)]
    pub api_url: Option<String>,

    /// Bearer token sent with every request
    #[arg(long, env = "SQUARE_API_TOKEN", hide_env_values = true, global = true)]
    pub token: Option<String>,

    /// Skip TLS certificate verification
    #[arg(long, global = true)]
    pub insecure: bool,

    /// Retry every non-200 task poll instead of failing on hard errors
    #[arg(long, global = true)]
    pub lenient_polling: bool,

    /// Override the task poll attempt budget
    #[arg(long, value_name = "N", global = true)]
    pub max_attempts: Option<u32>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a prediction
    Predict(PredictArgs),

    /// Show statistics of a deployed model
    Stats {
        /// Model identifier
        model: String,
    },

    /// List deployed models
    #[command(name = "models", visible_alias = "deployed-models")]
    Models,

    /// Show workers of deployed models
    Workers,

    /// Deploy a new model and wait for the deployment
    Deploy(DeployArgs),

    /// Remove a deployed model
    Remove {
        /// Model identifier
        model: String,
    },

    /// Update attributes of a deployed model
    Update(UpdateArgs),

    /// Add workers to a model
    AddWorker {
        /// Model identifier
        model: String,

        /// Number of workers to add
        number: u32,
    },

    /// Remove workers from a model
    RemoveWorker {
        /// Model identifier
        model: String,

        /// Number of workers to remove
        number: u32,
    },

    /// List models currently being deployed
    InDeployment,

    /// Deploy a base model unless it is deployed or being deployed
    Ensure(EnsureArgs),
}

/// Arguments for the predict command
#[derive(Parser, Debug)]
pub struct PredictArgs {
    /// Model identifier
    pub model: String,

    /// Prediction method (embedding, sequence-classification,
    /// token-classification, generation, question-answering)
    pub method: String,

    /// Request body as JSON
    #[arg(long, conflicts_with = "input_file")]
    pub input: Option<String>,

    /// Read the request body from a JSON file
    #[arg(long, value_name = "FILE")]
    pub input_file: Option<PathBuf>,

    /// Print the task result without decoding model outputs
    #[arg(long)]
    pub raw: bool,
}

/// Arguments for the deploy command
#[derive(Parser, Debug)]
pub struct DeployArgs {
    /// Identifier of the new deployment
    pub identifier: String,

    /// Underlying model name (e.g. bert-base-uncased)
    #[arg(long)]
    pub model_name: String,

    /// Model type
    #[arg(long, default_value = "transformer")]
    pub model_type: String,

    #[arg(long)]
    pub batch_size: Option<u32>,

    #[arg(long)]
    pub max_input: Option<u32>,

    /// Run the model on CPU only
    #[arg(long)]
    pub disable_gpu: bool,

    #[arg(long)]
    pub model_class: Option<String>,

    #[arg(long)]
    pub transformers_cache: Option<String>,

    #[arg(long)]
    pub return_plaintext_arrays: bool,

    #[arg(long)]
    pub preloaded_adapters: bool,
}

/// Arguments for the update command
#[derive(Parser, Debug)]
pub struct UpdateArgs {
    /// Model identifier
    pub model: String,

    #[arg(long)]
    pub batch_size: Option<u32>,

    #[arg(long)]
    pub max_input: Option<u32>,

    #[arg(long)]
    pub disable_gpu: Option<bool>,

    #[arg(long)]
    pub return_plaintext_arrays: Option<bool>,
}

/// Arguments for the ensure command
#[derive(Parser, Debug)]
pub struct EnsureArgs {
    /// Base model name
    pub base_model: String,

    /// Adapter to serve on top of the base model (switches the type to adapter)
    #[arg(long)]
    pub adapter: Option<String>,
}
