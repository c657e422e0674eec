use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A deployed model as reported by `GET /models/deployed-models`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRecord {
    #[serde(default)]
    pub identifier: String,
    #[serde(default)]
    pub model_name: String,
    #[serde(default)]
    pub model_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disable_gpu: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_input: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number_of_workers: Option<u32>,
    /// Server fields this client does not interpret
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ModelRecord {
    pub fn matches(&self, model_name: &str, model_type: &str) -> bool {
        self.model_name == model_name && self.model_type == model_type
    }
}

/// Body of a deploy request. Unset options are left out of the JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeployAttributes {
    pub identifier: String,
    pub model_name: String,
    pub model_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disable_gpu: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_input: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transformers_cache: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_class: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_plaintext_arrays: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preloaded_adapters: Option<bool>,
}

impl DeployAttributes {
    pub fn new(
        identifier: impl Into<String>,
        model_name: impl Into<String>,
        model_type: impl Into<String>,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            model_name: model_name.into(),
            model_type: model_type.into(),
            ..Self::default()
        }
    }
}

/// Body of an update request; only these attributes can change after deploy
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateAttributes {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disable_gpu: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_input: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_plaintext_arrays: Option<bool>,
}

impl UpdateAttributes {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// One entry for [`super::ModelClient::predict_many`]
#[derive(Debug, Clone)]
pub struct PredictionRequest {
    pub model_id: String,
    pub method: String,
    pub input: Value,
}

impl PredictionRequest {
    pub fn new(model_id: impl Into<String>, method: impl Into<String>, input: Value) -> Self {
        Self {
            model_id: model_id.into(),
            method: method.into(),
            input,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_minimal_deploy_body() {
        let attrs = DeployAttributes::new("bert", "bert", "transformer");
        assert_eq!(
            serde_json::to_value(&attrs).unwrap(),
            json!({"identifier": "bert", "model_name": "bert", "model_type": "transformer"})
        );
    }

    #[test]
    fn test_model_record_keeps_unknown_fields() {
        let record: ModelRecord = serde_json::from_value(json!({
            "identifier": "bert",
            "model_name": "bert-base-uncased",
            "model_type": "transformer",
            "batch_size": 32,
            "model_class": "base"
        }))
        .unwrap();

        assert!(record.matches("bert-base-uncased", "transformer"));
        assert!(!record.matches("bert-base-uncased", "adapter"));
        assert_eq!(record.batch_size, Some(32));
        assert_eq!(record.extra["model_class"], json!("base"));
    }

    #[test]
    fn test_update_attributes_is_empty() {
        assert!(UpdateAttributes::default().is_empty());
        let attrs = UpdateAttributes {
            batch_size: Some(8),
            ..Default::default()
        };
        assert!(!attrs.is_empty());
        assert_eq!(serde_json::to_value(&attrs).unwrap(), json!({"batch_size": 8}));
    }
}
