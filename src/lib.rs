//! Client for the asynchronous SQuARE model API.
//!
//! Predictions and management operations are accepted by the server under a
//! task id and finished later; [`ModelClient`] submits them, waits for the
//! task through [`task::TaskPoller`], and decodes numeric model outputs with
//! [`codec`]. [`deployment::deploy_model_if_not_exists`] avoids triggering a
//! second deployment of a model that is deployed or already on its way.

pub mod auth;
pub mod cli;
pub mod client;
pub mod codec;
pub mod config;
pub mod deployment;
pub mod task;
pub mod transport;

pub use auth::{CredentialError, CredentialProvider, EnvToken, StaticToken};
pub use client::{ClientError, ClientResult, ModelClient, PredictionMethod};
pub use codec::{DecodedValue, NumericArray, PredictionResponse};
pub use config::ClientConfig;
pub use deployment::{deploy_model_if_not_exists, GuardOutcome, ModelManagement, ModelType};
pub use task::{PollSettings, TaskError, TaskPoller};
