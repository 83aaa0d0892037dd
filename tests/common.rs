#![allow(dead_code)]

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use actix_web::web;
use async_trait::async_trait;
use pdf_template_server::config::{AppConfig, RendererKind};
use pdf_template_server::render::{RenderError, RenderJob, Renderer};
use pdf_template_server::template::{merge_text, merge_text_strict};
use pdf_template_server::AppState;
use tempfile::TempDir;

/// Stand-in for the browser: merges the way the HTML engine does and wraps
/// the text in a PDF shell.
pub struct EchoRenderer {
    pub strict: bool,
}

#[async_trait]
impl Renderer for EchoRenderer {
    async fn render(&self, job: RenderJob) -> Result<Vec<u8>, RenderError> {
        let template = fs::read_to_string(&job.template_path).map_err(RenderError::ReadTemplate)?;
        let merged = if self.strict {
            merge_text_strict(&template, &job.payload)?
        } else {
            merge_text(&template, &job.payload)
        };
        Ok(format!("%PDF-1.7\n{}\n%%EOF", merged).into_bytes())
    }
}

/// Never finishes within a test timeout.
pub struct StalledRenderer;

#[async_trait]
impl Renderer for StalledRenderer {
    async fn render(&self, _job: RenderJob) -> Result<Vec<u8>, RenderError> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(Vec::new())
    }
}

/// A content root in a temporary directory. Deployment roots point at paths
/// that do not exist so only the local fallbacks are used.
pub struct TestEnv {
    pub dir: TempDir,
    pub config: AppConfig,
}

impl TestEnv {
    pub fn new(renderer: RendererKind) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::new(renderer, dir.path().join("content"));
        config.templates_root = dir.path().join("deploy").join(renderer.templates_dir_name());
        config.logos_root = config.templates_root.join("logos");
        fs::create_dir_all(config.fallback_templates_root()).unwrap();
        Self { dir, config }
    }

    pub fn html() -> Self {
        Self::new(RendererKind::Html)
    }

    pub fn add_template(&self, name: &str, contents: impl AsRef<[u8]>) -> PathBuf {
        let path = self
            .config
            .fallback_templates_root()
            .join(format!("{}.{}", name, self.config.renderer.template_extension()));
        fs::write(&path, contents).unwrap();
        path
    }

    pub fn stored_files(&self) -> Vec<String> {
        match fs::read_dir(&self.config.output_root) {
            Ok(entries) => entries
                .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    pub fn state(&self) -> web::Data<AppState> {
        web::Data::new(AppState::new(self.config.clone()))
    }

    /// State with an [`EchoRenderer`] that honours `strict_text_merge`.
    pub fn echo_state(&self) -> web::Data<AppState> {
        self.state_with(Arc::new(EchoRenderer {
            strict: self.config.strict_text_merge,
        }))
    }

    pub fn state_with(&self, renderer: Arc<dyn Renderer>) -> web::Data<AppState> {
        web::Data::new(AppState::with_renderer(self.config.clone(), renderer))
    }
}
