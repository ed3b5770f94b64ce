pub mod appresult;
pub mod config;
pub mod hub;
pub mod index;
pub mod msg;
pub mod ratelimit;
pub mod rooms;
pub mod translate;

use std::sync::Arc;

use axum::{Router, extract::FromRef, routing::get};
use tower_http::cors::CorsLayer;

pub use appresult::{AppError, AppResult};
pub use config::Config;
pub use hub::{Hub, HubError};
pub use ratelimit::RateLimiter;
pub use translate::{OllamaTranslator, TranslationService, Translator};

#[derive(Clone, FromRef)]
pub struct AppState {
    pub hub: Arc<Hub>,
    pub translator: Arc<TranslationService>,
    pub limiter: Arc<RateLimiter>,
}

impl AppState {
    pub fn new(config: &Config, backend: Arc<dyn Translator>) -> Self {
        Self {
            hub: Arc::new(Hub::new(config.close_grace)),
            translator: Arc::new(TranslationService::new(backend, config.cache_ttl)),
            limiter: Arc::new(RateLimiter::new(
                config.rate_limit,
                config.rate_limit_window,
            )),
        }
    }
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(index::index))
        .route("/health", get(index::health))
        .merge(rooms::router())
        .with_state(state)
        .layer(CorsLayer::permissive())
}
