//! Named model configurations and the provider clients that serve them.
//!
//! The registry is an explicit value built from a configuration snapshot.
//! Both maps sit behind read-mostly locks; the locks are released before any
//! provider call is made.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use agentflow_core::config::{AppConfig, ModelConfig};
use agentflow_core::error::{AgentFlowError, Result};
use agentflow_core::traits::ProviderClient;
use agentflow_core::types::{ChatMessage, ChatRequest, ChatResponse};

use crate::retry::with_retry;

/// Per-call overrides of a model's configured sampling parameters.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct InvokeOptions {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl InvokeOptions {
    pub fn with_temperature(temperature: f32) -> Self {
        Self {
            temperature: Some(temperature),
            max_tokens: None,
        }
    }
}

pub struct ModelRegistry {
    models: RwLock<HashMap<String, ModelConfig>>,
    clients: RwLock<HashMap<String, Arc<dyn ProviderClient>>>,
    priority: Vec<String>,
}

impl ModelRegistry {
    /// Build a registry from a full snapshot of models and provider clients
    /// (keyed by provider tag).
    pub fn new(
        models: impl IntoIterator<Item = (String, ModelConfig)>,
        clients: HashMap<String, Arc<dyn ProviderClient>>,
    ) -> Self {
        Self {
            models: RwLock::new(models.into_iter().collect()),
            clients: RwLock::new(clients),
            priority: AppConfig::default().registry.priority,
        }
    }

    /// Replace the fallback priority list.
    pub fn with_priority(mut self, priority: Vec<String>) -> Self {
        self.priority = priority;
        self
    }

    /// Build the model table from config and one client per provider tag.
    pub fn from_config(config: &AppConfig) -> Self {
        let catalog = config.model_catalog();
        let mut clients: HashMap<String, Arc<dyn ProviderClient>> = HashMap::new();
        for model in catalog.values() {
            clients
                .entry(model.provider.clone())
                .or_insert_with(|| crate::create_client(&model.provider));
        }

        let available = catalog.values().filter(|m| m.has_credentials()).count();
        info!(
            models = catalog.len(),
            available,
            providers = clients.len(),
            "Model registry initialized"
        );

        Self::new(catalog, clients).with_priority(config.registry.priority.clone())
    }

    /// Insert or replace a model configuration. Credentials are not validated.
    pub async fn register_model(&self, name: impl Into<String>, config: ModelConfig) {
        let name = name.into();
        debug!(model = %name, provider = %config.provider, "Registering model");
        self.models.write().await.insert(name, config);
    }

    /// Alias of [`register_model`](Self::register_model) for configuration updates.
    pub async fn set_model(&self, name: impl Into<String>, config: ModelConfig) {
        self.register_model(name, config).await;
    }

    /// Insert or replace the client for a provider tag.
    pub async fn register_client(&self, provider: impl Into<String>, client: Arc<dyn ProviderClient>) {
        self.clients.write().await.insert(provider.into(), client);
    }

    pub async fn get_model(&self, name: &str) -> Option<ModelConfig> {
        self.models.read().await.get(name).cloned()
    }

    /// All registered model names, sorted.
    pub async fn list_models(&self) -> Vec<String> {
        let mut names: Vec<String> = self.models.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Models that have credentials, sorted.
    pub async fn available_models(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .models
            .read()
            .await
            .iter()
            .filter(|(_, m)| m.has_credentials())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// A model is available iff it is registered and has a non-empty API key.
    pub async fn is_available(&self, name: &str) -> bool {
        self.models
            .read()
            .await
            .get(name)
            .is_some_and(|m| m.has_credentials())
    }

    /// Pick the model to use: `preferred` if available, then the priority
    /// list, then any available model in name order.
    pub async fn resolve_for_use(&self, preferred: &str) -> Result<String> {
        let models = self.models.read().await;
        let usable = |name: &str| models.get(name).is_some_and(|m| m.has_credentials());

        if !preferred.is_empty() && usable(preferred) {
            return Ok(preferred.to_string());
        }

        if let Some(name) = self.priority.iter().find(|name| usable(name)) {
            if !preferred.is_empty() {
                warn!(preferred = %preferred, fallback = %name, "Preferred model unavailable, falling back");
            }
            return Ok(name.clone());
        }

        let mut rest: Vec<&String> = models
            .iter()
            .filter(|(_, m)| m.has_credentials())
            .map(|(name, _)| name)
            .collect();
        rest.sort();
        rest.first()
            .map(|name| name.to_string())
            .ok_or(AgentFlowError::NoAvailableModel)
    }

    /// Call a model by logical name.
    ///
    /// The caller's cancellation token is honored for the request and any
    /// retry backoff. Models with a `retry` block retry transient failures.
    pub async fn invoke(
        &self,
        cancel: &CancellationToken,
        model_name: &str,
        messages: Vec<ChatMessage>,
        options: InvokeOptions,
    ) -> Result<ChatResponse> {
        let config = self
            .get_model(model_name)
            .await
            .ok_or_else(|| AgentFlowError::ModelNotFound(model_name.to_string()))?;

        let client = self
            .clients
            .read()
            .await
            .get(&config.provider)
            .cloned()
            .ok_or_else(|| AgentFlowError::ProviderUnavailable {
                model: model_name.to_string(),
                provider: config.provider.clone(),
            })?;

        let request = ChatRequest {
            model: config.model_name.clone(),
            messages,
            max_tokens: options.max_tokens.unwrap_or(config.max_tokens),
            temperature: options.temperature.unwrap_or(config.temperature),
            top_p: config.top_p,
        };

        debug!(
            model = %model_name,
            provider = %config.provider,
            temperature = request.temperature,
            "Invoking model"
        );

        let call = || {
            let client = client.clone();
            let config = config.clone();
            let request = request.clone();
            async move {
                tokio::select! {
                    _ = cancel.cancelled() => Err(AgentFlowError::Cancelled),
                    result = client.chat(&config, request) => result,
                }
            }
        };

        let result = match &config.retry {
            Some(retry) => with_retry(retry, model_name, cancel, call).await,
            None => call().await,
        };

        // Normalize errors so callers see the logical model name.
        result.map_err(|e| match e {
            AgentFlowError::Provider { message, .. } => AgentFlowError::Provider {
                model: model_name.to_string(),
                message,
            },
            other => other,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentflow_test_utils::MockProvider;

    fn keyed(provider: &str, key: &str) -> ModelConfig {
        ModelConfig::new(provider, "remote-name").with_api_key(key)
    }

    async fn registry_with(mock: Arc<MockProvider>) -> ModelRegistry {
        let mut clients: HashMap<String, Arc<dyn ProviderClient>> = HashMap::new();
        clients.insert("mock".into(), mock);
        ModelRegistry::new(
            vec![
                ("alpha".to_string(), keyed("mock", "k1")),
                ("beta".to_string(), keyed("mock", "")),
                ("glm-4".to_string(), keyed("mock", "k3")),
            ],
            clients,
        )
    }

    #[tokio::test]
    async fn test_is_available_requires_key() {
        let reg = registry_with(Arc::new(MockProvider::new())).await;
        assert!(reg.is_available("alpha").await);
        assert!(!reg.is_available("beta").await);
        assert!(!reg.is_available("missing").await);
        assert_eq!(reg.available_models().await, vec!["alpha", "glm-4"]);
        assert_eq!(reg.list_models().await, vec!["alpha", "beta", "glm-4"]);
    }

    #[tokio::test]
    async fn test_register_model_is_upsert() {
        let reg = registry_with(Arc::new(MockProvider::new())).await;
        reg.register_model("beta", keyed("mock", "now-set")).await;
        assert!(reg.is_available("beta").await);
        reg.set_model("beta", keyed("mock", "")).await;
        assert!(!reg.is_available("beta").await);
        assert_eq!(reg.list_models().await.len(), 3);
    }

    #[tokio::test]
    async fn test_resolve_prefers_requested() {
        let reg = registry_with(Arc::new(MockProvider::new())).await;
        assert_eq!(reg.resolve_for_use("alpha").await.unwrap(), "alpha");
    }

    #[tokio::test]
    async fn test_resolve_falls_back_to_priority_list() {
        let reg = registry_with(Arc::new(MockProvider::new())).await;
        // glm-4 is in the default priority list, alpha is not.
        assert_eq!(reg.resolve_for_use("beta").await.unwrap(), "glm-4");
        assert_eq!(reg.resolve_for_use("").await.unwrap(), "glm-4");
    }

    #[tokio::test]
    async fn test_resolve_falls_back_to_any_available() {
        let reg = registry_with(Arc::new(MockProvider::new()))
            .await
            .with_priority(vec!["gpt-4".into()]);
        assert_eq!(reg.resolve_for_use("beta").await.unwrap(), "alpha");
    }

    #[tokio::test]
    async fn test_resolve_fails_without_credentials() {
        let reg = ModelRegistry::new(vec![("x".to_string(), keyed("mock", ""))], HashMap::new());
        assert!(matches!(
            reg.resolve_for_use("x").await,
            Err(AgentFlowError::NoAvailableModel)
        ));
    }

    #[tokio::test]
    async fn test_invoke_unknown_model() {
        let reg = registry_with(Arc::new(MockProvider::new())).await;
        let err = reg
            .invoke(&CancellationToken::new(), "nope", vec![ChatMessage::user("hi")], InvokeOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AgentFlowError::ModelNotFound(_)));
    }

    #[tokio::test]
    async fn test_invoke_without_client() {
        let reg = ModelRegistry::new(vec![("x".to_string(), keyed("nobody", "k"))], HashMap::new());
        let err = reg
            .invoke(&CancellationToken::new(), "x", vec![ChatMessage::user("hi")], InvokeOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AgentFlowError::ProviderUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_invoke_uses_remote_name_and_overrides() {
        let mock = Arc::new(MockProvider::new().with_reply("remote-name", "pong"));
        let reg = registry_with(mock.clone()).await;
        let resp = reg
            .invoke(
                &CancellationToken::new(),
                "alpha",
                vec![ChatMessage::user("ping")],
                InvokeOptions::with_temperature(0.3),
            )
            .await
            .unwrap();
        assert_eq!(resp.content, "pong");

        let calls = mock.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].model, "remote-name");
        assert!((calls[0].temperature - 0.3).abs() < 1e-6);
        assert_eq!(calls[0].max_tokens, 4096);
    }

    #[tokio::test]
    async fn test_provider_error_carries_logical_name() {
        let mock = Arc::new(MockProvider::new().with_failure("remote-name", "HTTP 400: bad"));
        let reg = registry_with(mock).await;
        let err = reg
            .invoke(&CancellationToken::new(), "alpha", vec![ChatMessage::user("x")], InvokeOptions::default())
            .await
            .unwrap_err();
        match err {
            AgentFlowError::Provider { model, message } => {
                assert_eq!(model, "alpha");
                assert!(message.contains("400"));
            }
            other => panic!("Expected Provider error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_invoke_honors_cancellation() {
        let mock = Arc::new(
            MockProvider::new()
                .with_reply("remote-name", "late")
                .with_delay("remote-name", std::time::Duration::from_secs(30)),
        );
        let reg = registry_with(mock).await;
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = reg
            .invoke(&cancel, "alpha", vec![ChatMessage::user("x")], InvokeOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AgentFlowError::Cancelled));
    }

    #[tokio::test]
    async fn test_invoke_retries_when_configured() {
        let mock = Arc::new(
            MockProvider::new()
                .with_failures_then_reply("remote-name", 1, "HTTP 503: busy", "recovered"),
        );
        let reg = registry_with(mock.clone()).await;
        let mut cfg = keyed("mock", "k");
        cfg.retry = Some(agentflow_core::config::RetryConfig {
            max_retries: 2,
            initial_backoff_ms: 1,
            max_backoff_ms: 1,
        });
        reg.register_model("retrying", cfg).await;

        let resp = reg
            .invoke(&CancellationToken::new(), "retrying", vec![ChatMessage::user("x")], InvokeOptions::default())
            .await
            .unwrap();
        assert_eq!(resp.content, "recovered");
        assert_eq!(mock.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_from_config_builds_catalog() {
        let config = AppConfig::default().with_credentials_from(|var| {
            (var == "DEEPSEEK_API_KEY").then(|| "sk".to_string())
        });
        let reg = ModelRegistry::from_config(&config);
        assert!(reg.list_models().await.len() >= 16);
        assert_eq!(reg.available_models().await, vec!["deepseek-chat", "deepseek-coder"]);
        assert_eq!(reg.resolve_for_use("gpt-4").await.unwrap(), "deepseek-chat");
    }
}
