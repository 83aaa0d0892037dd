//! Rendering engines - turn a resolved template plus payload into PDF bytes.
//!
//! This module contains one engine per template kind:
//! - `ChromiumRenderer` - HTML templates printed by a headless Chromium process
//! - `AcroFormRenderer` - fillable PDF templates written with `lopdf`
//!
//! Both run behind a [`RenderPool`] that caps concurrent renders and bounds
//! each one with a hard timeout.

pub mod acroform;
pub mod chromium;
pub mod pool;

pub use acroform::{AcroForm, AcroFormRenderer};
pub use chromium::ChromiumRenderer;
pub use pool::RenderPool;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::config::{AppConfig, RendererKind};
use crate::template::{MergeError, TemplateError, TemplateResolver};

/// Errors that can occur while producing a PDF.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error(transparent)]
    Merge(#[from] MergeError),
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error("failed to read template: {0}")]
    ReadTemplate(#[source] std::io::Error),
    #[error("failed to create temporary directory: {0}")]
    TempDir(#[source] std::io::Error),
    #[error("failed to write browser input: {0}")]
    WriteSource(#[source] std::io::Error),
    #[error("failed to launch browser: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("browser exited with status {code}: {stderr}")]
    BrowserExit { code: i32, stderr: String },
    #[error("failed to read generated PDF: {0}")]
    ReadPdf(#[source] std::io::Error),
    #[error("failed to process PDF template: {0}")]
    Pdf(#[from] lopdf::Error),
    #[error("failed to write filled PDF: {0}")]
    WritePdf(#[source] std::io::Error),
    #[error("Template has no AcroForm fields.")]
    NoAcroForm,
    #[error("Template has no pages.")]
    NoPages,
    #[error("failed to read logo: {0}")]
    ReadLogo(#[source] std::io::Error),
    #[error("failed to decode logo: {0}")]
    Logo(#[from] image::ImageError),
    #[error("rendering did not finish within {0:?}")]
    Timeout(Duration),
    #[error("render pool is closed")]
    PoolClosed,
    #[error("render task failed: {0}")]
    Task(String),
}

/// Everything an engine needs for one document.
#[derive(Debug, Clone)]
pub struct RenderJob {
    pub template_name: String,
    pub template_path: PathBuf,
    pub payload: Value,
}

#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(&self, job: RenderJob) -> Result<Vec<u8>, RenderError>;
}

/// Builds the engine selected by the configuration.
pub fn from_config(config: &AppConfig) -> Arc<dyn Renderer> {
    match config.renderer {
        RendererKind::Html => Arc::new(ChromiumRenderer::new(
            config.chromium_path.clone(),
            config.strict_text_merge,
        )),
        RendererKind::AcroForm => Arc::new(AcroFormRenderer::new(TemplateResolver::from_config(
            config,
        ))),
    }
}
