//! # LLM Helpers
//!
//! Provider dispatch for radkit structured-output calls, shared by every
//! oracle request type.

/// Run an `LlmFunction` producing `$output` on whichever provider the
/// `ModelConfig` names. Evaluates to `anyhow::Result<$output>`.
#[macro_export]
macro_rules! run_llm_function {
    ($config:expr, $output:ty, $system:expr, $input:expr) => {{
        use radkit::agent::LlmFunction;
        use radkit::models::providers::{
            AnthropicLlm, DeepSeekLlm, GeminiLlm, GrokLlm, OpenAILlm, OpenRouterLlm,
        };
        use $crate::models::LlmProvider;

        let model_config = $config;
        let system = $system;
        let input = $input;
        tracing::debug!(
            provider = model_config.provider.display_name(),
            model = %model_config.model,
            "Calling LLM function"
        );

        let outcome: anyhow::Result<$output> = match model_config.provider {
            LlmProvider::Anthropic => {
                LlmFunction::<$output>::new_with_system_instructions(AnthropicLlm::from_env(&model_config.model)?, system)
                    .run(input)
                    .await
                    .map_err(Into::into)
            }
            LlmProvider::OpenAI => {
                let client = match &model_config.base_url {
                    Some(url) => OpenAILlm::from_env(&model_config.model)?.with_base_url(url),
                    None => OpenAILlm::from_env(&model_config.model)?,
                };
                LlmFunction::<$output>::new_with_system_instructions(client, system)
                    .run(input)
                    .await
                    .map_err(Into::into)
            }
            LlmProvider::Gemini => {
                LlmFunction::<$output>::new_with_system_instructions(GeminiLlm::from_env(&model_config.model)?, system)
                    .run(input)
                    .await
                    .map_err(Into::into)
            }
            LlmProvider::OpenRouter => {
                LlmFunction::<$output>::new_with_system_instructions(OpenRouterLlm::from_env(&model_config.model)?, system)
                    .run(input)
                    .await
                    .map_err(Into::into)
            }
            LlmProvider::Grok => {
                LlmFunction::<$output>::new_with_system_instructions(GrokLlm::from_env(&model_config.model)?, system)
                    .run(input)
                    .await
                    .map_err(Into::into)
            }
            LlmProvider::DeepSeek => {
                LlmFunction::<$output>::new_with_system_instructions(DeepSeekLlm::from_env(&model_config.model)?, system)
                    .run(input)
                    .await
                    .map_err(Into::into)
            }
        };
        outcome
    }};
}
