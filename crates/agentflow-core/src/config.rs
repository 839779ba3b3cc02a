use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{AgentFlowError, Result};
use crate::types::AgentProfile;

/// Top-level AgentFlow configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub registry: RegistryConfig,
    /// Per-provider credentials, keyed by provider tag.
    #[serde(default)]
    pub providers: HashMap<String, ProviderCredentials>,
    /// User-declared models. Entries override the built-in catalog by name.
    #[serde(default)]
    pub models: HashMap<String, ModelConfig>,
    #[serde(default)]
    pub consensus: ConsensusConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub flows: FlowsConfig,
    #[serde(default)]
    pub agents: Vec<AgentProfile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    #[serde(default = "default_model_name")]
    pub default_model: String,
    /// Fallback order used when a preferred model has no credentials.
    #[serde(default = "default_priority")]
    pub priority: Vec<String>,
    /// Register the built-in model catalog.
    #[serde(default = "default_true")]
    pub builtin_catalog: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            default_model: default_model_name(),
            priority: default_priority(),
            builtin_catalog: true,
        }
    }
}

fn default_model_name() -> String { "gpt-4".to_string() }
fn default_true() -> bool { true }

fn default_priority() -> Vec<String> {
    [
        "gpt-4",
        "glm-4",
        "glm-4-plus",
        "claude-3-opus",
        "moonshot-v1-8k-chat",
        "qwen-turbo",
        "deepseek-chat",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ProviderCredentials {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    pub model_name: String,
    /// Empty means the model has no credentials and is unavailable.
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default)]
    pub top_p: Option<f32>,
    #[serde(default)]
    pub retry: Option<RetryConfig>,
}

fn default_provider() -> String { "openai".to_string() }
fn default_max_tokens() -> u32 { 4096 }
fn default_temperature() -> f32 { 0.7 }

impl ModelConfig {
    pub fn new(provider: impl Into<String>, model_name: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model_name: model_name.into(),
            api_key: String::new(),
            base_url: None,
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            top_p: None,
            retry: None,
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = key.into();
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn has_credentials(&self) -> bool {
        !self.api_key.is_empty()
    }
}

/// Retry configuration for provider requests.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

fn default_max_retries() -> u32 { 3 }
fn default_initial_backoff() -> u64 { 1000 }
fn default_max_backoff() -> u64 { 30000 }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusConfig {
    /// Per-call timeout for each fanned-out model request.
    #[serde(default = "default_vote_timeout")]
    pub timeout_secs: u64,
    /// Sampling temperatures for single-model consensus, in label order
    /// conservative, balanced, creative.
    #[serde(default = "default_single_model_temperatures")]
    pub single_model_temperatures: Vec<f32>,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_vote_timeout(),
            single_model_temperatures: default_single_model_temperatures(),
        }
    }
}

fn default_vote_timeout() -> u64 { 60 }
fn default_single_model_temperatures() -> Vec<f32> { vec![0.3, 0.7, 1.0] }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Model used by LLM/agent nodes that do not name one.
    #[serde(default)]
    pub default_model: Option<String>,
    #[serde(default = "default_llm_system_prompt")]
    pub llm_system_prompt: String,
    #[serde(default = "default_agent_system_prompt")]
    pub agent_system_prompt: String,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            default_model: None,
            llm_system_prompt: default_llm_system_prompt(),
            agent_system_prompt: default_agent_system_prompt(),
        }
    }
}

fn default_llm_system_prompt() -> String {
    "你是一个AI助手，请简洁地回答用户问题。".to_string()
}

fn default_agent_system_prompt() -> String {
    "你是一个AI助手，请帮助用户解决问题。".to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlowsConfig {
    /// Directory of `<flow id>.json` definitions.
    #[serde(default)]
    pub dir: Option<String>,
    /// Flow run for inbound channel messages.
    #[serde(default)]
    pub default_flow: Option<String>,
}

/// Environment variable carrying the API key for a provider tag.
pub fn provider_env_var(provider: &str) -> Option<&'static str> {
    match provider {
        "openai" => Some("OPENAI_API_KEY"),
        "anthropic" | "claude" => Some("ANTHROPIC_API_KEY"),
        "glm" | "zhipu" => Some("ZHIPU_API_KEY"),
        "minimax" => Some("MINIMAX_API_KEY"),
        "kimi" | "moonshot" => Some("KIMI_API_KEY"),
        "qwen" | "dashscope" => Some("DASHSCOPE_API_KEY"),
        "deepseek" => Some("DEEPSEEK_API_KEY"),
        _ => None,
    }
}

/// The built-in model catalog, without credentials.
pub fn builtin_models() -> Vec<(String, ModelConfig)> {
    const GLM: &str = "https://open.bigmodel.cn/api/paas/v4";
    const MINIMAX: &str = "https://api.minimax.chat/v1";
    const KIMI: &str = "https://api.moonshot.cn/v1";
    const QWEN: &str = "https://dashscope.aliyuncs.com/compatible-mode/v1";
    const DEEPSEEK: &str = "https://api.deepseek.com/v1";

    let entries: Vec<(&str, ModelConfig)> = vec![
        ("gpt-4", ModelConfig::new("openai", "gpt-4")),
        ("gpt-3.5-turbo", ModelConfig::new("openai", "gpt-3.5-turbo")),
        ("claude-3-opus", ModelConfig::new("anthropic", "claude-3-opus-20240229")),
        ("claude-3-sonnet", ModelConfig::new("anthropic", "claude-3-sonnet-20240229")),
        ("glm-4", ModelConfig::new("glm", "glm-4").with_base_url(GLM)),
        ("glm-4-plus", ModelConfig::new("glm", "glm-4-plus").with_base_url(GLM)),
        ("glm-4-flash", ModelConfig::new("glm", "glm-4-flash").with_base_url(GLM)),
        ("glm-3-turbo", ModelConfig::new("glm", "glm-3-turbo").with_base_url(GLM)),
        ("abab6.5s-chat", ModelConfig::new("minimax", "abab6.5s-chat").with_base_url(MINIMAX)),
        (
            "moonshot-v1-8k-chat",
            ModelConfig::new("kimi", "moonshot-v1-8k").with_base_url(KIMI),
        ),
        (
            "moonshot-v1-32k-chat",
            ModelConfig::new("kimi", "moonshot-v1-32k")
                .with_base_url(KIMI)
                .with_max_tokens(32768),
        ),
        ("qwen-turbo", ModelConfig::new("qwen", "qwen-turbo").with_base_url(QWEN)),
        (
            "qwen-plus",
            ModelConfig::new("qwen", "qwen-plus")
                .with_base_url(QWEN)
                .with_max_tokens(32768),
        ),
        ("qwen-max", ModelConfig::new("qwen", "qwen-max").with_base_url(QWEN)),
        ("deepseek-chat", ModelConfig::new("deepseek", "deepseek-chat").with_base_url(DEEPSEEK)),
        ("deepseek-coder", ModelConfig::new("deepseek", "deepseek-coder").with_base_url(DEEPSEEK)),
    ];

    entries
        .into_iter()
        .map(|(name, cfg)| (name.to_string(), cfg))
        .collect()
}

impl AppConfig {
    /// Load config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| AgentFlowError::ConfigNotFound(path.display().to_string()))?;
        Self::parse(&content)
    }

    /// Parse config from TOML text, expanding `${ENV_VAR}` references.
    pub fn parse(content: &str) -> Result<Self> {
        let expanded = expand_env_vars(content);
        let config: Self =
            toml::from_str(&expanded).map_err(|e| AgentFlowError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.consensus.timeout_secs == 0 {
            return Err(AgentFlowError::Config(
                "consensus.timeout_secs must be greater than zero".into(),
            ));
        }
        if self.consensus.single_model_temperatures.is_empty() {
            return Err(AgentFlowError::Config(
                "consensus.single_model_temperatures must not be empty".into(),
            ));
        }
        for (name, model) in &self.models {
            if model.model_name.trim().is_empty() {
                return Err(AgentFlowError::Config(format!(
                    "models.{}: model_name must not be empty",
                    name
                )));
            }
        }
        Ok(())
    }

    /// Fill missing provider API keys from the process environment.
    pub fn with_env_credentials(self) -> Self {
        self.with_credentials_from(|var| std::env::var(var).ok())
    }

    /// Fill missing provider API keys from an arbitrary lookup.
    pub fn with_credentials_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut tags: Vec<String> = builtin_models()
            .into_iter()
            .map(|(_, m)| m.provider)
            .chain(self.models.values().map(|m| m.provider.clone()))
            .collect();
        tags.sort();
        tags.dedup();

        for tag in tags {
            let Some(var) = provider_env_var(&tag) else {
                continue;
            };
            let entry = self.providers.entry(tag).or_default();
            if entry.api_key.as_deref().map_or(true, str::is_empty) {
                if let Some(key) = lookup(var).filter(|k| !k.is_empty()) {
                    tracing::debug!(env = var, "Provider key taken from environment");
                    entry.api_key = Some(key);
                }
            }
        }
        self
    }

    /// The full model table: built-in catalog overlaid with user models,
    /// with provider credentials applied where a model carries none.
    pub fn model_catalog(&self) -> BTreeMap<String, ModelConfig> {
        let mut catalog: BTreeMap<String, ModelConfig> = if self.registry.builtin_catalog {
            builtin_models().into_iter().collect()
        } else {
            BTreeMap::new()
        };
        for (name, model) in &self.models {
            catalog.insert(name.clone(), model.clone());
        }

        for model in catalog.values_mut() {
            let Some(creds) = self.providers.get(&model.provider) else {
                continue;
            };
            if model.api_key.is_empty() {
                if let Some(key) = &creds.api_key {
                    model.api_key = key.clone();
                }
            }
            if let Some(url) = &creds.base_url {
                model.base_url = Some(url.clone());
            }
        }
        catalog
    }

    /// Resolve the flow directory (expand ~).
    pub fn flows_dir(&self) -> Option<PathBuf> {
        let dir = self.flows.dir.as_deref()?;
        if let Some(rest) = dir.strip_prefix("~/") {
            if let Some(home) = dirs_home() {
                return Some(home.join(rest));
            }
        }
        Some(PathBuf::from(dir))
    }
}

/// Expand `${ENV_VAR}` patterns in a string.
fn expand_env_vars(input: &str) -> String {
    let re = match regex::Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}") {
        Ok(re) => re,
        Err(_) => return input.to_string(),
    };
    re.replace_all(input, |caps: &regex::Captures<'_>| {
        // Keep original if env var not set
        std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
    })
    .into_owned()
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_env_vars() {
        std::env::set_var("TEST_AGENTFLOW_VAR", "hello");
        let result = expand_env_vars("key = \"${TEST_AGENTFLOW_VAR}\"");
        assert_eq!(result, "key = \"hello\"");
        std::env::remove_var("TEST_AGENTFLOW_VAR");
    }

    #[test]
    fn test_expand_env_vars_missing() {
        let result = expand_env_vars("key = \"${NONEXISTENT_AGENTFLOW_VAR}\"");
        assert_eq!(result, "key = \"${NONEXISTENT_AGENTFLOW_VAR}\"");
    }

    #[test]
    fn test_defaults_from_empty_toml() {
        let config = AppConfig::parse("").unwrap();
        assert_eq!(config.registry.default_model, "gpt-4");
        assert_eq!(config.registry.priority.len(), 7);
        assert_eq!(config.consensus.timeout_secs, 60);
        assert_eq!(config.consensus.single_model_temperatures, vec![0.3, 0.7, 1.0]);
        assert!(config.executor.default_model.is_none());
        assert!(config.agents.is_empty());
    }

    #[test]
    fn test_builtin_catalog_has_no_credentials() {
        let catalog = AppConfig::default().model_catalog();
        assert_eq!(catalog.len(), 16);
        assert!(catalog.values().all(|m| !m.has_credentials()));
        assert_eq!(catalog["qwen-plus"].max_tokens, 32768);
        assert_eq!(catalog["gpt-4"].temperature, 0.7);
        assert_eq!(catalog["claude-3-opus"].provider, "anthropic");
    }

    #[test]
    fn test_provider_credentials_apply_to_catalog() {
        let config = AppConfig::parse(
            r#"
[providers.deepseek]
api_key = "sk-ds"

[providers.glm]
api_key = "glm-key"
base_url = "https://proxy.local/v4"
"#,
        )
        .unwrap();
        let catalog = config.model_catalog();
        assert_eq!(catalog["deepseek-chat"].api_key, "sk-ds");
        assert_eq!(catalog["deepseek-coder"].api_key, "sk-ds");
        assert_eq!(catalog["glm-4"].base_url.as_deref(), Some("https://proxy.local/v4"));
        assert!(catalog["gpt-4"].api_key.is_empty());
    }

    #[test]
    fn test_user_model_overrides_catalog() {
        let config = AppConfig::parse(
            r#"
[models.gpt-4]
provider = "openai"
model_name = "gpt-4o"
api_key = "sk-own"
temperature = 0.2
"#,
        )
        .unwrap();
        let catalog = config.model_catalog();
        assert_eq!(catalog["gpt-4"].model_name, "gpt-4o");
        assert_eq!(catalog["gpt-4"].api_key, "sk-own");
        assert_eq!(catalog["gpt-4"].max_tokens, 4096);
    }

    #[test]
    fn test_credentials_from_lookup() {
        let config = AppConfig::default().with_credentials_from(|var| match var {
            "KIMI_API_KEY" => Some("kimi".into()),
            "OPENAI_API_KEY" => Some(String::new()),
            _ => None,
        });
        let catalog = config.model_catalog();
        assert_eq!(catalog["moonshot-v1-8k-chat"].api_key, "kimi");
        assert!(catalog["gpt-4"].api_key.is_empty());
    }

    #[test]
    fn test_explicit_provider_key_wins_over_env() {
        let mut config = AppConfig::default();
        config.providers.insert(
            "openai".into(),
            ProviderCredentials {
                api_key: Some("from-file".into()),
                base_url: None,
            },
        );
        let config = config.with_credentials_from(|_| Some("from-env".into()));
        assert_eq!(config.model_catalog()["gpt-4"].api_key, "from-file");
    }

    #[test]
    fn test_disable_builtin_catalog() {
        let config = AppConfig::parse(
            r#"
[registry]
builtin_catalog = false

[models.local]
model_name = "llama3"
api_key = "none"
base_url = "http://localhost:11434/v1"
"#,
        )
        .unwrap();
        let catalog = config.model_catalog();
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog["local"].provider, "openai");
    }

    #[test]
    fn test_validation_rejects_empty_temperatures() {
        let err = AppConfig::parse(
            r#"
[consensus]
single_model_temperatures = []
"#,
        )
        .unwrap_err();
        assert!(matches!(err, AgentFlowError::Config(_)));
    }

    #[test]
    fn test_validation_rejects_zero_timeout() {
        let err = AppConfig::parse(
            r#"
[consensus]
timeout_secs = 0
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("timeout_secs"));
        assert!(AppConfig::default().validate().is_ok());
    }

    #[test]
    fn test_agent_profiles() {
        let config = AppConfig::parse(
            r#"
[[agents]]
id = "support"
system_prompt = "You answer billing questions."
vote_models = ["gpt-4", "glm-4"]
"#,
        )
        .unwrap();
        assert_eq!(config.agents[0].id, "support");
        assert_eq!(config.agents[0].vote_models.len(), 2);
        assert!(config.agents[0].context.is_none());
    }
}
