//! # Specforge Models
//!
//! LLM provider selection for the decision oracle. Every agent role can run
//! on its own provider/model; anything not overridden falls back to the
//! global settings.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Supported LLM providers
///
/// API keys are read from the environment by each provider:
/// - Anthropic (Claude) - `ANTHROPIC_API_KEY`
/// - OpenAI (GPT) - `OPENAI_API_KEY`
/// - Gemini (Google) - `GEMINI_API_KEY`
/// - OpenRouter (Gateway) - `OPENROUTER_API_KEY`
/// - Grok (xAI) - `XAI_API_KEY`
/// - DeepSeek - `DEEPSEEK_API_KEY`
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    #[default]
    Anthropic,
    #[serde(rename = "openai")]
    OpenAI,
    Gemini,
    OpenRouter,
    Grok,
    DeepSeek,
}

impl LlmProvider {
    pub fn display_name(&self) -> &'static str {
        match self {
            LlmProvider::Anthropic => "Anthropic",
            LlmProvider::OpenAI => "OpenAI",
            LlmProvider::Gemini => "Gemini",
            LlmProvider::OpenRouter => "OpenRouter",
            LlmProvider::Grok => "Grok",
            LlmProvider::DeepSeek => "DeepSeek",
        }
    }

    /// Whether this provider supports custom base URL
    pub fn supports_base_url(&self) -> bool {
        matches!(self, LlmProvider::OpenAI)
    }

    /// Model used when neither the role nor the global settings name one
    pub fn default_model(&self) -> &'static str {
        match self {
            LlmProvider::Anthropic => "claude-sonnet-4-20250514",
            LlmProvider::OpenAI => "gpt-4o",
            LlmProvider::Gemini => "gemini-2.0-flash-exp",
            LlmProvider::OpenRouter => "anthropic/claude-3.5-sonnet",
            LlmProvider::Grok => "grok-2",
            LlmProvider::DeepSeek => "deepseek-chat",
        }
    }

    /// Parse a provider name as written in config files and CLI flags
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "anthropic" => Some(LlmProvider::Anthropic),
            "openai" => Some(LlmProvider::OpenAI),
            "gemini" => Some(LlmProvider::Gemini),
            "openrouter" => Some(LlmProvider::OpenRouter),
            "grok" => Some(LlmProvider::Grok),
            "deepseek" => Some(LlmProvider::DeepSeek),
            _ => None,
        }
    }
}

/// Configuration for one oracle client
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelConfig {
    #[serde(default)]
    pub provider: LlmProvider,
    /// Model name (e.g., "claude-sonnet-4-20250514", "gpt-4o")
    pub model: String,
    /// Optional base URL override for OpenAI-compatible APIs
    pub base_url: Option<String>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self::with_provider(LlmProvider::Anthropic, LlmProvider::Anthropic.default_model())
    }
}

impl ModelConfig {
    pub fn with_provider(provider: LlmProvider, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            base_url: None,
        }
    }

    /// Set base URL (for OpenAI-compatible endpoints)
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }
}

/// Global and per-role model selection, as persisted in the config file
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ModelSettings {
    #[serde(default)]
    pub global_provider: LlmProvider,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// role name -> model
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub per_role_models: HashMap<String, String>,
    /// role name -> provider
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub per_role_providers: HashMap<String, LlmProvider>,
}

impl ModelSettings {
    /// Resolve the model config for a role: role override, then global, then provider default
    pub fn resolve(&self, role: &str) -> ModelConfig {
        let provider = self
            .per_role_providers
            .get(role)
            .cloned()
            .unwrap_or_else(|| self.global_provider.clone());

        let model = self
            .per_role_models
            .get(role)
            .or(self.global_model.as_ref())
            .cloned()
            .unwrap_or_else(|| provider.default_model().to_string());

        let base_url = if provider.supports_base_url() {
            self.base_url.clone()
        } else {
            None
        };

        ModelConfig {
            provider,
            model,
            base_url,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ModelConfig::default();
        assert_eq!(config.provider, LlmProvider::Anthropic);
        assert!(config.model.contains("claude"));
    }

    #[test]
    fn test_provider_parse() {
        assert_eq!(LlmProvider::parse("OpenAI"), Some(LlmProvider::OpenAI));
        assert_eq!(LlmProvider::parse(" deepseek "), Some(LlmProvider::DeepSeek));
        assert_eq!(LlmProvider::parse("llama"), None);
    }

    #[test]
    fn test_resolve_prefers_role_override() {
        let mut settings = ModelSettings {
            global_model: Some("claude-3-haiku".to_string()),
            ..ModelSettings::default()
        };
        settings
            .per_role_providers
            .insert("analyst".to_string(), LlmProvider::OpenAI);
        settings.base_url = Some("http://localhost:11434/v1".to_string());

        let analyst = settings.resolve("analyst");
        assert_eq!(analyst.provider, LlmProvider::OpenAI);
        assert_eq!(analyst.model, "claude-3-haiku");
        assert_eq!(analyst.base_url.as_deref(), Some("http://localhost:11434/v1"));

        let reviewer = settings.resolve("reviewer");
        assert_eq!(reviewer.provider, LlmProvider::Anthropic);
        assert!(reviewer.base_url.is_none());
    }

    #[test]
    fn test_resolve_falls_back_to_provider_default() {
        let settings = ModelSettings {
            global_provider: LlmProvider::Gemini,
            ..ModelSettings::default()
        };
        assert_eq!(settings.resolve("interviewer").model, "gemini-2.0-flash-exp");
    }

    #[test]
    fn test_model_config_serialization() {
        let config = ModelConfig::with_provider(LlmProvider::OpenAI, "gpt-4o");
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("openai"));
        assert!(json.contains("gpt-4o"));
    }
}
