/// A named provider preset for OpenAI-compatible APIs.
pub struct ProviderPreset {
    pub default_endpoint: &'static str,
    pub needs_api_key: bool,
}

/// Look up a provider preset by name.
pub fn get_preset(provider: &str) -> Option<ProviderPreset> {
    match provider {
        "openai" => Some(ProviderPreset {
            default_endpoint: "https://api.openai.com/v1/chat/completions",
            needs_api_key: true,
        }),
        "glm" | "zhipu" => Some(ProviderPreset {
            default_endpoint: "https://open.bigmodel.cn/api/paas/v4/chat/completions",
            needs_api_key: true,
        }),
        "minimax" => Some(ProviderPreset {
            default_endpoint: "https://api.minimax.chat/v1/chat/completions",
            needs_api_key: true,
        }),
        "kimi" | "moonshot" => Some(ProviderPreset {
            default_endpoint: "https://api.moonshot.cn/v1/chat/completions",
            needs_api_key: true,
        }),
        "qwen" | "dashscope" => Some(ProviderPreset {
            default_endpoint: "https://dashscope.aliyuncs.com/compatible-mode/v1/chat/completions",
            needs_api_key: true,
        }),
        "deepseek" => Some(ProviderPreset {
            default_endpoint: "https://api.deepseek.com/v1/chat/completions",
            needs_api_key: true,
        }),
        "ollama" => Some(ProviderPreset {
            default_endpoint: "http://localhost:11434/v1/chat/completions",
            needs_api_key: false,
        }),
        _ => None,
    }
}

/// Resolve the chat-completions endpoint for a model.
///
/// `base_url` may be an API root (`https://host/v1`) or a full endpoint.
pub fn chat_endpoint(provider: &str, base_url: Option<&str>) -> String {
    match base_url.map(|u| u.trim_end_matches('/')) {
        Some(url) if url.ends_with("/chat/completions") => url.to_string(),
        Some(url) if !url.is_empty() => format!("{}/chat/completions", url),
        _ => get_preset(provider)
            .or_else(|| get_preset("openai"))
            .map(|p| p.default_endpoint.to_string())
            .unwrap_or_default(),
    }
}

/// List all known preset provider names.
pub fn all_preset_names() -> &'static [&'static str] {
    &["openai", "glm", "minimax", "kimi", "qwen", "deepseek", "ollama"]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_listed_preset_resolves() {
        for name in all_preset_names() {
            let preset = get_preset(name).unwrap();
            assert!(preset.default_endpoint.ends_with("/chat/completions"));
        }
        assert!(!get_preset("ollama").unwrap().needs_api_key);
    }

    #[test]
    fn test_chat_endpoint_from_api_root() {
        assert_eq!(
            chat_endpoint("glm", Some("https://open.bigmodel.cn/api/paas/v4/")),
            "https://open.bigmodel.cn/api/paas/v4/chat/completions"
        );
    }

    #[test]
    fn test_chat_endpoint_full_url_kept() {
        let url = "http://proxy.local/v1/chat/completions";
        assert_eq!(chat_endpoint("openai", Some(url)), url);
    }

    #[test]
    fn test_chat_endpoint_falls_back_to_preset() {
        assert_eq!(
            chat_endpoint("deepseek", None),
            "https://api.deepseek.com/v1/chat/completions"
        );
        assert_eq!(
            chat_endpoint("custom", Some("")),
            "https://api.openai.com/v1/chat/completions"
        );
    }
}
