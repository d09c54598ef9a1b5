//! OpenAI-compatible reasoning engine
//!
//! Each stage prompt becomes one chat completion: the rendered instructions as the
//! system message, the rendered inputs (and tool transcript) as the user message.
//! JSON mode is requested so every answer parses as a JSON object.

use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequest,
        CreateChatCompletionRequestArgs, ResponseFormat,
    },
    Client,
};
use async_trait::async_trait;
use std::time::Instant;

use sqlthought_core::{Prompt, ReasoningEngine, ReasoningError};

use crate::config::LlmConfig;
use crate::error::EngineError;

pub struct OpenAiEngine {
    client: Client<OpenAIConfig>,
    settings: LlmConfig,
}

impl OpenAiEngine {
    pub fn new(api_key: String, settings: LlmConfig) -> Self {
        let mut openai_config = OpenAIConfig::new().with_api_key(api_key);
        if let Some(base) = &settings.api_base {
            openai_config = openai_config.with_api_base(base);
        }

        Self {
            client: Client::with_config(openai_config),
            settings,
        }
    }

    fn build_request(&self, prompt: &Prompt) -> Result<CreateChatCompletionRequest, EngineError> {
        let messages = vec![
            ChatCompletionRequestMessage::System(
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(prompt.render_system())
                    .build()?,
            ),
            ChatCompletionRequestMessage::User(
                ChatCompletionRequestUserMessageArgs::default()
                    .content(prompt.render_user())
                    .build()?,
            ),
        ];

        let mut request = CreateChatCompletionRequestArgs::default();
        request
            .model(&self.settings.model)
            .messages(messages)
            .temperature(self.settings.temperature)
            .response_format(ResponseFormat::JsonObject);
        if let Some(max_tokens) = self.settings.max_tokens {
            request.max_completion_tokens(max_tokens);
        }

        Ok(request.build()?)
    }

    async fn chat(&self, prompt: &Prompt) -> Result<String, EngineError> {
        let request = self.build_request(prompt)?;

        let start = Instant::now();
        let response = self.client.chat().create(request).await?;

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or(EngineError::NoContent)?;

        tracing::debug!(
            stage = %prompt.stage,
            model = %self.settings.model,
            ms = start.elapsed().as_millis() as u64,
            prompt_tokens = response.usage.as_ref().map(|u| u.prompt_tokens),
            completion_tokens = response.usage.as_ref().map(|u| u.completion_tokens),
            "chat completion"
        );

        Ok(content)
    }
}

#[async_trait]
impl ReasoningEngine for OpenAiEngine {
    async fn complete(&self, prompt: &Prompt) -> Result<String, ReasoningError> {
        match self.chat(prompt).await {
            Ok(content) => Ok(content),
            Err(EngineError::NoContent) => Err(ReasoningError::EmptyResponse),
            Err(e) => {
                tracing::error!(stage = %prompt.stage, error = %e, "reasoning request failed");
                Err(ReasoningError::Request(e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlthought_core::Stage;
    use sqlthought_core::reasoning::OutputField;

    const OUTPUT: OutputField = OutputField {
        name: "sql",
        description: "the SQL query",
        shape: r#"{"sql": "SELECT ..."}"#,
    };

    #[test]
    fn test_request_carries_settings_and_both_messages() {
        let engine = OpenAiEngine::new(
            "sk-test".to_string(),
            LlmConfig {
                model: "gpt-4o".to_string(),
                temperature: 0.2,
                max_tokens: Some(512),
                ..Default::default()
            },
        );
        let prompt = Prompt::new(Stage::Synthesis, "Write SQL.", OUTPUT).input("question", "count repos");

        let request = engine.build_request(&prompt).unwrap();

        assert_eq!(request.model, "gpt-4o");
        assert_eq!(request.temperature, Some(0.2));
        assert_eq!(request.max_completion_tokens, Some(512));
        assert_eq!(request.messages.len(), 2);
        assert!(matches!(request.messages[0], ChatCompletionRequestMessage::System(_)));
        assert!(matches!(request.messages[1], ChatCompletionRequestMessage::User(_)));
        assert!(matches!(request.response_format, Some(ResponseFormat::JsonObject)));
    }
}
