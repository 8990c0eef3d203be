use async_openai::{
    Client,
    config::OpenAIConfig,
    types::{ChatCompletionRequestMessage, CreateChatCompletionRequestArgs, ResponseFormat},
};

use serde_json::Value;

use crate::config::GenerationConfig;

/// One text generation candidate of the waterfall.
pub trait GenerationBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Generate a completion for `prompt`. With `json_mode` the backend is asked
    /// for a bare JSON document instead of free text.
    fn generate(
        &self,
        prompt: &str,
        json_mode: bool,
    ) -> impl Future<Output = anyhow::Result<String>> + Send;
}

/// A model behind an OpenAI compatible chat completions endpoint.
#[derive(Clone)]
pub struct ChatBackend {
    client: Client<OpenAIConfig>,
    model: String,
}

impl ChatBackend {
    pub fn new(client: Client<OpenAIConfig>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }

    /// One backend per configured model, in priority order, sharing one client.
    pub fn from_config(config: &GenerationConfig, api_key: &str) -> Vec<Self> {
        let client = Client::with_config(
            OpenAIConfig::default()
                .with_api_base(&config.api_base)
                .with_api_key(api_key),
        );
        config
            .models
            .iter()
            .map(|model| Self::new(client.clone(), model))
            .collect()
    }
}

impl GenerationBackend for ChatBackend {
    fn name(&self) -> &str {
        &self.model
    }

    fn generate(
        &self,
        prompt: &str,
        json_mode: bool,
    ) -> impl Future<Output = anyhow::Result<String>> + Send {
        let prompt = prompt.to_string();
        async move {
            let mut args = CreateChatCompletionRequestArgs::default();
            args.model(self.model.as_str())
                .messages(vec![ChatCompletionRequestMessage::User(prompt.into())]);
            // json_object mode only promises a top-level object; tags and quizzes are
            // arrays, so a strict endpoint may answer `{"items": [...]}`
            if json_mode {
                args.response_format(ResponseFormat::JsonObject);
            }
            let request = args.build()?;
            let response = self.client.chat().create(request).await?;
            let output = response
                .choices
                .first()
                .ok_or(anyhow::anyhow!("No response from {}", self.model))?
                .message
                .content
                .clone()
                .ok_or(anyhow::anyhow!("Empty response from {}", self.model))?;
            Ok(if json_mode { unwrap_array(output) } else { output })
        }
    }
}

/// Unwrap an object whose only field is an array into the bare array.
/// Anything else is returned untouched.
fn unwrap_array(output: String) -> String {
    let Ok(Value::Object(map)) = serde_json::from_str::<Value>(output.trim()) else {
        return output;
    };
    let mut fields = map.into_iter();
    match (fields.next(), fields.next()) {
        (Some((_, array @ Value::Array(_))), None) => array.to_string(),
        _ => output,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_backend_per_model_in_order() {
        let config = GenerationConfig::default();
        let backends = ChatBackend::from_config(&config, "key");
        let names: Vec<_> = backends.iter().map(|b| b.name().to_string()).collect();
        assert_eq!(names, config.models);
        assert_eq!(names[0], "gemini-2.5-flash");
    }

    #[test]
    fn object_wrapped_array_is_unwrapped() {
        assert_eq!(unwrap_array(r#"{"items": ["rust", "axum"]}"#.into()), r#"["rust","axum"]"#);
        assert_eq!(unwrap_array(r#"["rust"]"#.into()), r#"["rust"]"#);
        let two_fields = r#"{"a": [], "b": []}"#.to_string();
        assert_eq!(unwrap_array(two_fields.clone()), two_fields);
        let not_array = r#"{"tags": "rust"}"#.to_string();
        assert_eq!(unwrap_array(not_array.clone()), not_array);
        assert_eq!(unwrap_array("plain text".into()), "plain text");
    }
}
