use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{TranslateError, Translator};

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

/// Prompts a local Ollama model through `/api/generate`.
#[derive(Clone)]
pub struct OllamaTranslator {
    client: reqwest::Client,
    url: String,
    model: String,
}

impl OllamaTranslator {
    pub fn new(url: &str, model: &str, timeout: Duration) -> Result<Self, TranslateError> {
        let client = reqwest::ClientBuilder::new().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.trim_end_matches('/').to_owned(),
            model: model.to_owned(),
        })
    }

    async fn generate(&self, prompt: &str) -> Result<String, TranslateError> {
        let body: GenerateResponse = self
            .client
            .post(format!("{}/api/generate", self.url))
            .json(&GenerateRequest {
                model: &self.model,
                prompt,
                stream: false,
            })
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let text = body.response.trim();
        if text.is_empty() {
            return Err(TranslateError::EmptyResponse);
        }
        Ok(text.to_owned())
    }
}

#[async_trait]
impl Translator for OllamaTranslator {
    async fn detect_language(&self, text: &str) -> Result<String, TranslateError> {
        let prompt = format!(
            "What language is this text? Reply with ONLY the ISO language code (e.g. en, pt, es, fr): {text}"
        );
        self.generate(&prompt).await
    }

    async fn translate(&self, text: &str, from: &str, to: &str) -> Result<String, TranslateError> {
        let prompt = format!(
            "Translate the following text from {from} to {to}. Return ONLY the translation, nothing else: {text}"
        );
        self.generate(&prompt).await
    }
}
