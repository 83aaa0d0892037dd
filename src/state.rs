use std::sync::Arc;

use crate::config::AppConfig;
use crate::render::{self, RenderPool, Renderer};
use crate::storage::OutputStore;
use crate::template::TemplateResolver;

/// Shared, read-only state handed to every request.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub resolver: TemplateResolver,
    pub store: OutputStore,
    pub renderer: Arc<dyn Renderer>,
    pub render_pool: RenderPool,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        let renderer = render::from_config(&config);
        Self::with_renderer(config, renderer)
    }

    /// Same as [`AppState::new`] with an explicit engine.
    pub fn with_renderer(config: AppConfig, renderer: Arc<dyn Renderer>) -> Self {
        Self {
            resolver: TemplateResolver::from_config(&config),
            store: OutputStore::new(config.output_root.clone()),
            render_pool: RenderPool::new(config.render_concurrency, config.render_timeout),
            renderer,
            config: Arc::new(config),
        }
    }
}
