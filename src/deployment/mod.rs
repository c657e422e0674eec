//! Idempotent deployment
//!
//! Before deploying a model, check that no deployed model and no in-flight
//! deployment already covers the same `(model_name, model_type)` pair.
//!
//! The check and the deploy are separate requests, so two callers racing
//! through the checks can both trigger a deployment. Closing that window
//! needs a compare-and-swap or lock on the server; this module only narrows
//! it.

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use crate::client::{ClientResult, DeployAttributes, ModelClient, ModelRecord};

/// Kind of model a deployment serves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelType {
    Transformer,
    Adapter,
}

impl ModelType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transformer => "transformer",
            Self::Adapter => "adapter",
        }
    }

    /// "adapter" when the skill arguments name an adapter, else "transformer"
    pub fn from_skill_args(skill_args: &Value) -> Self {
        if skill_args.get("adapter").is_some() {
            Self::Adapter
        } else {
            Self::Transformer
        }
    }
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What [`deploy_model_if_not_exists`] decided
#[derive(Debug, Clone, PartialEq)]
pub enum GuardOutcome {
    /// The skill arguments name no base model
    NothingToDeploy,
    AlreadyDeployed,
    InDeployment,
    /// A deployment was triggered; holds the deploy task result
    Deployed(Value),
}

// ============================================================================
// SBIO: Trait for abstraction (allows mocking in tests)
// ============================================================================

/// The three facade operations the guard needs
#[async_trait]
pub trait ModelManagement: Send + Sync {
    async fn deployed_models(&self) -> ClientResult<Vec<ModelRecord>>;
    async fn models_in_deployment(&self) -> ClientResult<BTreeMap<String, String>>;
    async fn deploy(&self, attributes: &DeployAttributes) -> ClientResult<Value>;
}

#[async_trait]
impl ModelManagement for ModelClient {
    async fn deployed_models(&self) -> ClientResult<Vec<ModelRecord>> {
        ModelClient::deployed_models(self).await
    }

    async fn models_in_deployment(&self) -> ClientResult<BTreeMap<String, String>> {
        self.get_models_in_deployment().await
    }

    async fn deploy(&self, attributes: &DeployAttributes) -> ClientResult<Value> {
        ModelClient::deploy(self, attributes).await
    }
}

/// Deploy the skill's `base_model` unless it is deployed or being deployed.
///
/// Best effort only: see the module docs for the race window.
pub async fn deploy_model_if_not_exists(
    api: &dyn ModelManagement,
    skill_args: &Value,
) -> ClientResult<GuardOutcome> {
    let model_name = match skill_args.get("base_model").and_then(Value::as_str) {
        Some(name) if !name.is_empty() => name,
        _ => {
            info!("No base_model in the skill args. Nothing to deploy.");
            return Ok(GuardOutcome::NothingToDeploy);
        }
    };
    let model_type = ModelType::from_skill_args(skill_args);
    info!(
        "Checking if model={} with model_type={} is already deployed.",
        model_name, model_type
    );

    let deployed = api.deployed_models().await?;
    if deployed
        .iter()
        .any(|m| m.matches(model_name, model_type.as_str()))
    {
        info!(
            "model={} with model_type={} is already deployed.",
            model_name, model_type
        );
        return Ok(GuardOutcome::AlreadyDeployed);
    }

    let deploying = api.models_in_deployment().await?;
    if deploying.get(model_name).map(String::as_str) == Some(model_type.as_str()) {
        info!(
            "model={} with model_type={} is in deployment.",
            model_name, model_type
        );
        return Ok(GuardOutcome::InDeployment);
    }

    info!(
        "model={} with model_type={} is not deployed. Starting deployment.",
        model_name, model_type
    );
    let attributes = DeployAttributes::new(model_name, model_name, model_type.as_str());
    let result = api.deploy(&attributes).await?;
    Ok(GuardOutcome::Deployed(result))
}
