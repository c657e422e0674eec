//! Prediction and management facade for the model API
//!
//! Every call fetches a fresh bearer token, issues one request, and maps any
//! non-2xx answer to [`ClientError::Api`]. Asynchronous operations hand the
//! returned `task_id` to the [`TaskPoller`] and return the polled result.

pub mod types;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use futures::future::join_all;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::auth::{CredentialError, CredentialProvider};
use crate::codec::{decode_prediction, DecodeError, PredictionResponse};
use crate::config::ClientConfig;
use crate::task::{PollSettings, TaskError, TaskPoller};
use crate::transport::{ApiRequest, ApiResponse, HttpMethod, ReqwestTransport, Transport, TransportError};

pub use types::{DeployAttributes, ModelRecord, PredictionRequest, UpdateAttributes};

/// Celery task name the server uses for deployments
pub const DEPLOY_TASK_NAME: &str = "tasks.tasks.deploy_task";

#[derive(Error, Debug)]
pub enum ClientError {
    #[error(
        "Unknown prediction method '{0}', expected one of: {names}",
        names = PredictionMethod::names().join(", ")
    )]
    InvalidPredictionMethod(String),

    #[error("API error: {status} - {body}")]
    Api { status: u16, body: Value },

    #[error("Accepted response carried no task_id: {0}")]
    MissingTaskId(Value),

    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Task(#[from] TaskError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Credential(#[from] CredentialError),
}

pub type ClientResult<T> = Result<T, ClientError>;

/// Prediction endpoints exposed under `/main/{model_id}/`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredictionMethod {
    Embedding,
    SequenceClassification,
    TokenClassification,
    Generation,
    QuestionAnswering,
}

impl PredictionMethod {
    pub const ALL: [PredictionMethod; 5] = [
        Self::Embedding,
        Self::SequenceClassification,
        Self::TokenClassification,
        Self::Generation,
        Self::QuestionAnswering,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Embedding => "embedding",
            Self::SequenceClassification => "sequence-classification",
            Self::TokenClassification => "token-classification",
            Self::Generation => "generation",
            Self::QuestionAnswering => "question-answering",
        }
    }

    pub fn names() -> Vec<&'static str> {
        Self::ALL.iter().map(|m| m.as_str()).collect()
    }
}

impl FromStr for PredictionMethod {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| ClientError::InvalidPredictionMethod(s.to_string()))
    }
}

impl fmt::Display for PredictionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Client
// ============================================================================

/// Stateless client: cheap to clone, safe to share across tasks
#[derive(Clone)]
pub struct ModelClient {
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    credentials: Arc<dyn CredentialProvider>,
    poller: TaskPoller,
}

impl ModelClient {
    /// Client over HTTP(S), honouring `verify_ssl` and `request_timeout_secs`
    pub fn new(config: ClientConfig, credentials: Arc<dyn CredentialProvider>) -> ClientResult<Self> {
        let transport = ReqwestTransport::new(config.verify_ssl, config.request_timeout())?;
        Ok(Self::with_transport(config, Arc::new(transport), credentials))
    }

    pub fn with_transport(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Self {
        let poller = TaskPoller::new(transport.clone(), credentials.clone(), config.base_url());
        Self {
            config,
            transport,
            credentials,
            poller,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn poller(&self) -> &TaskPoller {
        &self.poller
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url(), path)
    }

    fn poll_settings(&self) -> PollSettings {
        PollSettings::from_config(&self.config)
    }

    async fn send(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<Value>,
    ) -> ClientResult<ApiResponse> {
        let token = self.credentials.token().await?;
        let url = self.url(path);
        debug!("{} {}", method, url);

        let mut request = ApiRequest::new(method, url, token);
        if let Some(body) = body {
            request = request.with_body(body);
        }
        Ok(self.transport.send(request).await?)
    }

    /// Synchronous endpoint: the 2xx body is the answer
    async fn call(&self, method: HttpMethod, path: &str, body: Option<Value>) -> ClientResult<Value> {
        let response = self.send(method, path, body).await?;
        if !response.is_success() {
            return Err(ClientError::Api {
                status: response.status,
                body: response.body,
            });
        }
        Ok(response.body)
    }

    /// Asynchronous endpoint: the 2xx body names a task to wait for
    async fn call_task(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<Value>,
        settings: &PollSettings,
    ) -> ClientResult<Value> {
        let accepted = self.call(method, path, body).await?;
        let task_id = match accepted.get("task_id").and_then(Value::as_str) {
            Some(id) => id.to_string(),
            None => return Err(ClientError::MissingTaskId(accepted)),
        };
        Ok(self.poller.wait_for_task(&task_id, settings).await?)
    }

    // ------------------------------------------------------------------------
    // Predictions
    // ------------------------------------------------------------------------

    /// Run a prediction and return the task result without decoding outputs
    pub async fn predict_raw(&self, model_id: &str, method: &str, input: &Value) -> ClientResult<Value> {
        let method: PredictionMethod = method.parse()?;
        let path = format!("/main/{}/{}", model_id, method);
        debug!("Requesting prediction from {} with input {}", path, input);
        self.call_task(HttpMethod::Post, &path, Some(input.clone()), &self.poll_settings())
            .await
    }

    /// Run a prediction and decode its `model_outputs` into arrays
    pub async fn predict(
        &self,
        model_id: &str,
        method: &str,
        input: &Value,
    ) -> ClientResult<PredictionResponse> {
        let result = self.predict_raw(model_id, method, input).await?;
        Ok(decode_prediction(result)?)
    }

    /// Run several predictions concurrently; results keep the input order
    pub async fn predict_many(
        &self,
        requests: &[PredictionRequest],
    ) -> Vec<ClientResult<PredictionResponse>> {
        join_all(
            requests
                .iter()
                .map(|r| self.predict(&r.model_id, &r.method, &r.input)),
        )
        .await
    }

    pub async fn stats(&self, model_id: &str) -> ClientResult<Value> {
        self.call(HttpMethod::Get, &format!("/main/{}/stats", model_id), None)
            .await
    }

    // ------------------------------------------------------------------------
    // Model management
    // ------------------------------------------------------------------------

    pub async fn deployed_models(&self) -> ClientResult<Vec<ModelRecord>> {
        let body = self.call(HttpMethod::Get, "/models/deployed-models", None).await?;
        serde_json::from_value(body)
            .map_err(|e| ClientError::UnexpectedResponse(format!("deployed models: {}", e)))
    }

    pub async fn deployed_model_workers(&self) -> ClientResult<Value> {
        self.call(HttpMethod::Get, "/models/deployed-model-workers", None)
            .await
    }

    /// Deploy a model and wait for the deployment task (slow poll interval)
    pub async fn deploy(&self, attributes: &DeployAttributes) -> ClientResult<Value> {
        let body = serde_json::to_value(attributes)
            .map_err(|e| ClientError::UnexpectedResponse(e.to_string()))?;
        let settings = self
            .poll_settings()
            .with_interval(self.config.deploy_poll_interval());
        self.call_task(HttpMethod::Post, "/models/deploy", Some(body), &settings)
            .await
    }

    pub async fn remove(&self, model_id: &str) -> ClientResult<Value> {
        self.call_task(
            HttpMethod::Delete,
            &format!("/models/remove/{}", model_id),
            Some(Value::from(model_id)),
            &self.poll_settings(),
        )
        .await
    }

    /// Update attributes of a deployed model; answers directly, no task
    pub async fn update(&self, model_id: &str, attributes: &UpdateAttributes) -> ClientResult<Value> {
        let body = serde_json::to_value(attributes)
            .map_err(|e| ClientError::UnexpectedResponse(e.to_string()))?;
        self.call(
            HttpMethod::Patch,
            &format!("/models/update/{}", model_id),
            Some(body),
        )
        .await
    }

    pub async fn add_worker(&self, model_id: &str, number: u32) -> ClientResult<Value> {
        self.call_task(
            HttpMethod::Patch,
            &format!("/models/{}/add_worker/{}", model_id, number),
            Some(Value::from(model_id)),
            &self.poll_settings(),
        )
        .await
    }

    pub async fn remove_worker(&self, model_id: &str, number: u32) -> ClientResult<Value> {
        self.call_task(
            HttpMethod::Patch,
            &format!("/models/{}/remove_worker/{}", model_id, number),
            Some(Value::from(model_id)),
            &self.poll_settings(),
        )
        .await
    }

    /// Model name to model type for every deployment currently queued or running
    pub async fn get_models_in_deployment(&self) -> ClientResult<BTreeMap<String, String>> {
        let running = self.call(HttpMethod::Get, "/models/task", None).await?;
        debug!("get running tasks {}", running);
        parse_models_in_deployment(&running)
    }
}

/// Scan `worker -> queue -> [task]` for deploy tasks (pure).
///
/// Null queues are treated as empty. A deploy task whose first argument lacks
/// `MODEL_NAME` or `MODEL_TYPE` is an error rather than being skipped.
pub fn parse_models_in_deployment(running: &Value) -> ClientResult<BTreeMap<String, String>> {
    let unexpected = |what: &str| ClientError::UnexpectedResponse(format!("running tasks: {}", what));

    let workers = running
        .as_object()
        .ok_or_else(|| unexpected("expected an object of workers"))?;

    let mut in_deployment = BTreeMap::new();
    for (worker, queues) in workers {
        let queues = match queues {
            Value::Object(queues) => queues,
            Value::Null => continue,
            _ => return Err(unexpected(&format!("worker {} is not an object", worker))),
        };
        for (queue, tasks) in queues {
            let tasks = match tasks {
                Value::Array(tasks) => tasks,
                Value::Null => continue,
                _ => return Err(unexpected(&format!("queue {}/{} is not a list", worker, queue))),
            };
            for task in tasks {
                if task.get("name").and_then(Value::as_str) != Some(DEPLOY_TASK_NAME) {
                    continue;
                }
                let args = task.get("args").and_then(|a| a.get(0));
                let field = |key: &str| {
                    args.and_then(|a| a.get(key))
                        .and_then(Value::as_str)
                        .map(str::to_string)
                        .ok_or_else(|| unexpected(&format!("deploy task without {}", key)))
                };
                in_deployment.insert(field("MODEL_NAME")?, field("MODEL_TYPE")?);
            }
        }
    }

    Ok(in_deployment)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticToken;
    use crate::codec::{encode_array, DecodedValue, NumericArray};
    use ndarray::arr1;
    use crate::transport::mock::MockTransport;
    use serde_json::json;

    const BASE: &str = "http://api";

    fn client(transport: Arc<MockTransport>) -> ModelClient {
        let mut config = ClientConfig::new(format!("{}/", BASE));
        config.poll_interval_secs = 0;
        config.deploy_poll_interval_secs = 0;
        config.max_attempts = 5;
        ModelClient::with_transport(config, transport, Arc::new(StaticToken::new("secret")))
    }

    fn task_url(id: &str) -> String {
        format!("{}/main/task_result/{}", BASE, id)
    }

    #[test]
    fn test_prediction_method_parse() {
        for method in PredictionMethod::ALL {
            assert_eq!(method.as_str().parse::<PredictionMethod>().unwrap(), method);
        }
        assert!(matches!(
            "bogus".parse::<PredictionMethod>(),
            Err(ClientError::InvalidPredictionMethod(m)) if m == "bogus"
        ));
    }

    #[tokio::test]
    async fn test_predict_rejects_unknown_method_without_network() {
        let transport = Arc::new(MockTransport::new());
        let err = client(transport.clone())
            .predict("bert", "bogus", &json!({"input": ["hi"]}))
            .await
            .unwrap_err();

        assert!(matches!(err, ClientError::InvalidPredictionMethod(_)));
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn test_predict_polls_and_decodes() {
        let logits = NumericArray::Float32(arr1(&[0.25, 0.75]).into_dyn());
        let transport = Arc::new(
            MockTransport::new()
                .respond(
                    HttpMethod::Post,
                    "http://api/main/bert/sequence-classification",
                    200,
                    json!({"task_id": "t1"}),
                )
                .respond(HttpMethod::Get, &task_url("t1"), 202, Value::Null)
                .respond(
                    HttpMethod::Get,
                    &task_url("t1"),
                    200,
                    json!({"result": {
                        "model_output_is_encoded": true,
                        "model_outputs": {"logits": encode_array(&logits).unwrap()}
                    }}),
                ),
        );

        let response = client(transport.clone())
            .predict("bert", "sequence-classification", &json!({"input": ["hi"]}))
            .await
            .unwrap();

        assert_eq!(response.model_outputs["logits"], DecodedValue::Array(logits));
        assert_eq!(transport.calls_to(HttpMethod::Get, &task_url("t1")), 2);

        let requests = transport.requests();
        assert_eq!(requests[0].body, Some(json!({"input": ["hi"]})));
        assert!(requests.iter().all(|r| r.bearer_token == "secret"));
    }

    #[tokio::test]
    async fn test_async_call_rejected_returns_api_error() {
        let transport = Arc::new(MockTransport::new().respond(
            HttpMethod::Delete,
            "http://api/models/remove/bert",
            403,
            json!({"detail": "forbidden"}),
        ));

        let err = client(transport.clone()).remove("bert").await.unwrap_err();
        assert!(matches!(err, ClientError::Api { status: 403, .. }));
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test]
    async fn test_async_call_without_task_id() {
        let transport = Arc::new(MockTransport::new().respond(
            HttpMethod::Patch,
            "http://api/models/bert/add_worker/2",
            200,
            json!({"message": "ok"}),
        ));

        let err = client(transport).add_worker("bert", 2).await.unwrap_err();
        assert!(matches!(err, ClientError::MissingTaskId(_)));
    }

    #[tokio::test]
    async fn test_scaling_sends_identifier_body() {
        let transport = Arc::new(
            MockTransport::new()
                .respond(
                    HttpMethod::Patch,
                    "http://api/models/bert/remove_worker/1",
                    200,
                    json!({"task_id": "t9"}),
                )
                .respond(HttpMethod::Get, &task_url("t9"), 200, json!({"result": "removed"})),
        );

        let result = client(transport.clone()).remove_worker("bert", 1).await.unwrap();
        assert_eq!(result, json!("removed"));
        assert_eq!(transport.requests()[0].body, Some(json!("bert")));
    }

    #[tokio::test]
    async fn test_update_returns_body_without_polling() {
        let transport = Arc::new(MockTransport::new().respond(
            HttpMethod::Patch,
            "http://api/models/update/bert",
            200,
            json!({"batch_size": 16}),
        ));
        let attrs = UpdateAttributes {
            batch_size: Some(16),
            ..Default::default()
        };

        let result = client(transport.clone()).update("bert", &attrs).await.unwrap();
        assert_eq!(result, json!({"batch_size": 16}));
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test]
    async fn test_stats_error_status_is_raised() {
        let transport = Arc::new(MockTransport::new().respond(
            HttpMethod::Get,
            "http://api/main/bert/stats",
            500,
            json!("oops"),
        ));
        let err = client(transport).stats("bert").await.unwrap_err();
        assert!(matches!(err, ClientError::Api { status: 500, .. }));
    }

    #[tokio::test]
    async fn test_deployed_models_parsed() {
        let transport = Arc::new(MockTransport::new().respond(
            HttpMethod::Get,
            "http://api/models/deployed-models",
            200,
            json!([{"identifier": "bert", "model_name": "bert", "model_type": "transformer"}]),
        ));
        let models = client(transport).deployed_models().await.unwrap();
        assert_eq!(models.len(), 1);
        assert!(models[0].matches("bert", "transformer"));
    }

    #[tokio::test]
    async fn test_deploy_waits_for_task() {
        let transport = Arc::new(
            MockTransport::new()
                .respond(HttpMethod::Post, "http://api/models/deploy", 200, json!({"task_id": "d1"}))
                .respond(HttpMethod::Get, &task_url("d1"), 200, json!({"result": {"success": true}})),
        );
        let result = client(transport.clone())
            .deploy(&DeployAttributes::new("bert", "bert-base-uncased", "transformer"))
            .await
            .unwrap();

        assert_eq!(result, json!({"success": true}));
        assert_eq!(
            transport.requests()[0].body,
            Some(json!({
                "identifier": "bert",
                "model_name": "bert-base-uncased",
                "model_type": "transformer"
            }))
        );
    }

    #[tokio::test]
    async fn test_predict_many_keeps_order() {
        let transport = Arc::new(
            MockTransport::new()
                .respond(HttpMethod::Post, "http://api/main/a/embedding", 200, json!({"task_id": "ta"}))
                .respond(HttpMethod::Post, "http://api/main/b/embedding", 200, json!({"task_id": "tb"}))
                .respond(
                    HttpMethod::Get,
                    &task_url("ta"),
                    200,
                    json!({"result": {"model_output_is_encoded": false, "model_outputs": {"e": [1]}}}),
                )
                .respond(
                    HttpMethod::Get,
                    &task_url("tb"),
                    200,
                    json!({"result": {"model_output_is_encoded": false, "model_outputs": {"e": [2]}}}),
                ),
        );
        let requests = vec![
            PredictionRequest::new("a", "embedding", json!({})),
            PredictionRequest::new("b", "embedding", json!({})),
            PredictionRequest::new("c", "bogus", json!({})),
        ];

        let results = client(transport).predict_many(&requests).await;
        let first = results[0].as_ref().unwrap();
        let second = results[1].as_ref().unwrap();
        assert_eq!(
            first.model_outputs["e"],
            DecodedValue::Array(NumericArray::Int64(arr1(&[1]).into_dyn()))
        );
        assert_eq!(
            second.model_outputs["e"],
            DecodedValue::Array(NumericArray::Int64(arr1(&[2]).into_dyn()))
        );
        assert!(matches!(results[2], Err(ClientError::InvalidPredictionMethod(_))));
    }

    #[test]
    fn test_parse_models_in_deployment() {
        let running = json!({
            "worker1@host": {
                "active": [
                    {"name": DEPLOY_TASK_NAME, "args": [{"MODEL_NAME": "bert", "MODEL_TYPE": "transformer"}]},
                    {"name": "tasks.tasks.predict", "args": []}
                ],
                "reserved": [
                    {"name": DEPLOY_TASK_NAME, "args": [{"MODEL_NAME": "roberta", "MODEL_TYPE": "adapter"}]}
                ]
            },
            "worker2@host": {"active": null}
        });

        let models = parse_models_in_deployment(&running).unwrap();
        assert_eq!(models.len(), 2);
        assert_eq!(models["bert"], "transformer");
        assert_eq!(models["roberta"], "adapter");
    }

    #[test]
    fn test_parse_models_in_deployment_malformed() {
        let running = json!({"w": {"active": [{"name": DEPLOY_TASK_NAME, "args": []}]}});
        assert!(matches!(
            parse_models_in_deployment(&running),
            Err(ClientError::UnexpectedResponse(_))
        ));
    }

    #[tokio::test]
    async fn test_models_in_deployment_raises_on_error_status() {
        let transport = Arc::new(MockTransport::new().respond(
            HttpMethod::Get,
            "http://api/models/task",
            503,
            Value::Null,
        ));
        let err = client(transport).get_models_in_deployment().await.unwrap_err();
        assert!(matches!(err, ClientError::Api { status: 503, .. }));
    }
}
