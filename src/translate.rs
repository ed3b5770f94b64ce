//! Language detection and translation, memoised through [`TranslationCache`].

mod cache;
mod ollama;

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

pub use cache::TranslationCache;
pub use ollama::OllamaTranslator;

#[derive(Debug, Error)]
pub enum TranslateError {
    #[error("translation backend request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("translation backend returned an empty response")]
    EmptyResponse,
    #[error("translation backend error: {0}")]
    Backend(String),
}

/// External detection/translation capability.
#[async_trait]
pub trait Translator: Send + Sync {
    /// ISO code of the language `text` is written in.
    async fn detect_language(&self, text: &str) -> Result<String, TranslateError>;

    async fn translate(&self, text: &str, from: &str, to: &str) -> Result<String, TranslateError>;
}

pub struct TranslationService {
    backend: Arc<dyn Translator>,
    cache: TranslationCache,
}

impl TranslationService {
    pub fn new(backend: Arc<dyn Translator>, cache_ttl: Duration) -> Self {
        Self {
            backend,
            cache: TranslationCache::new(cache_ttl),
        }
    }

    pub fn cache(&self) -> &TranslationCache {
        &self.cache
    }

    pub async fn detect_language(&self, text: &str) -> Result<String, TranslateError> {
        let code = self.backend.detect_language(text).await?;
        let code = code.trim();
        if code.is_empty() {
            return Err(TranslateError::EmptyResponse);
        }
        Ok(code.to_owned())
    }

    /// Concurrent misses on the same key may each reach the backend.
    pub async fn translate(&self, text: &str, from: &str, to: &str) -> Result<String, TranslateError> {
        if let Some(hit) = self.cache.lookup(from, to, text) {
            debug!(from, to, "translation cache hit");
            return Ok(hit);
        }
        let translated = self.backend.translate(text, from, to).await?;
        let translated = translated.trim().to_owned();
        self.cache.store(from, to, text, &translated);
        Ok(translated)
    }
}
