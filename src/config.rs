//! Startup configuration.
//!
//! Everything the service needs to know about its environment is read once in
//! [`AppConfig::from_env`] and handed to each component by value.

use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

const DOCKER_OUTPUT_ROOT: &str = "/data";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_RENDER_TIMEOUT_SECS: u64 = 60;
const DEFAULT_RENDER_CONCURRENCY: usize = 4;
const DEFAULT_MAX_PAYLOAD_BYTES: usize = 1024 * 1024;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {value:?}")]
    InvalidValue { var: &'static str, value: String },
    #[error("unknown PDF_RENDERER {0:?}, expected \"html\" or \"acroform\"")]
    UnknownRenderer(String),
    #[error("failed to determine working directory: {0}")]
    WorkingDir(#[source] std::io::Error),
}

/// Which engine turns a merged template into PDF bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RendererKind {
    /// HTML templates printed by headless Chromium.
    Html,
    /// Fillable PDF templates with AcroForm fields.
    AcroForm,
}

impl RendererKind {
    /// File extension of templates for this renderer.
    pub fn template_extension(&self) -> &'static str {
        match self {
            Self::Html => "html",
            Self::AcroForm => "pdf",
        }
    }

    /// Directory name used both for the deployment root and the local fallback.
    pub fn templates_dir_name(&self) -> &'static str {
        match self {
            Self::Html => "templates",
            Self::AcroForm => "templates-pdf",
        }
    }
}

impl FromStr for RendererKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "html" | "chromium" => Ok(Self::Html),
            "acroform" | "form" | "pdf" => Ok(Self::AcroForm),
            other => Err(ConfigError::UnknownRenderer(other.to_string())),
        }
    }
}

impl fmt::Display for RendererKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Html => f.write_str("html"),
            Self::AcroForm => f.write_str("acroform"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub renderer: RendererKind,
    pub content_root: PathBuf,
    pub templates_root: PathBuf,
    pub logos_root: PathBuf,
    pub output_root: PathBuf,
    pub static_root: PathBuf,
    pub chromium_path: PathBuf,
    pub render_timeout: Duration,
    pub render_concurrency: usize,
    pub strict_text_merge: bool,
    pub max_payload_bytes: usize,
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
}

impl AppConfig {
    /// Defaults for a renderer, rooted at `content_root`. The output root is
    /// `<content_root>/data` so nothing is created until [`Self::from_env`]
    /// decides between `/data` and the local directory.
    pub fn new(renderer: RendererKind, content_root: impl Into<PathBuf>) -> Self {
        let content_root = content_root.into();
        let templates_root = Path::new("/").join(renderer.templates_dir_name());
        Self {
            renderer,
            logos_root: templates_root.join("logos"),
            templates_root,
            output_root: content_root.join("data"),
            static_root: content_root.join("wwwroot"),
            content_root,
            chromium_path: PathBuf::from("chromium"),
            render_timeout: Duration::from_secs(DEFAULT_RENDER_TIMEOUT_SECS),
            render_concurrency: DEFAULT_RENDER_CONCURRENCY,
            strict_text_merge: false,
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            cors_origins: Vec::new(),
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let renderer = match env::var("PDF_RENDERER") {
            Ok(value) => value.parse()?,
            Err(_) => RendererKind::Html,
        };
        let content_root = match env::var("CONTENT_ROOT") {
            Ok(value) => PathBuf::from(value),
            Err(_) => env::current_dir().map_err(ConfigError::WorkingDir)?,
        };

        let mut config = Self::new(renderer, content_root);

        if let Ok(value) = env::var("TEMPLATES_ROOT") {
            config.templates_root = PathBuf::from(value);
            config.logos_root = config.templates_root.join("logos");
        }
        if let Ok(value) = env::var("LOGOS_ROOT") {
            config.logos_root = PathBuf::from(value);
        }
        config.output_root = match env::var("OUTPUT_ROOT") {
            Ok(value) => PathBuf::from(value),
            Err(_) => resolve_output_root(&config.content_root),
        };
        if let Ok(value) = env::var("STATIC_ROOT") {
            config.static_root = PathBuf::from(value);
        }
        if let Ok(value) = env::var("CHROMIUM_PATH") {
            config.chromium_path = PathBuf::from(value);
        }
        if let Some(secs) = parse_var::<u64>("RENDER_TIMEOUT_SECS")? {
            config.render_timeout = Duration::from_secs(secs);
        }
        if let Some(permits) = parse_var::<usize>("RENDER_CONCURRENCY")? {
            config.render_concurrency = permits.max(1);
        }
        if let Some(strict) = parse_var::<bool>("STRICT_TEXT_MERGE")? {
            config.strict_text_merge = strict;
        }
        if let Some(limit) = parse_var::<usize>("MAX_PAYLOAD_BYTES")? {
            config.max_payload_bytes = limit;
        }
        if let Ok(value) = env::var("HOST") {
            config.host = value;
        }
        if let Some(port) = parse_var::<u16>("PORT")? {
            config.port = port;
        }
        if let Ok(value) = env::var("CORS_ALLOWED_ORIGINS") {
            config.cors_origins = value
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        Ok(config)
    }

    /// Development fallback for templates, under the content root.
    pub fn fallback_templates_root(&self) -> PathBuf {
        self.content_root.join(self.renderer.templates_dir_name())
    }

    /// Development fallback for logos, under the content root.
    pub fn fallback_logos_root(&self) -> PathBuf {
        self.content_root.join("templates-pdf").join("logos")
    }
}

fn parse_var<T: FromStr>(var: &'static str) -> Result<Option<T>, ConfigError> {
    match env::var(var) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { var, value }),
        Err(_) => Ok(None),
    }
}

/// Prefer the container volume, fall back to a local `data` directory when it
/// cannot be created.
fn resolve_output_root(content_root: &Path) -> PathBuf {
    match std::fs::create_dir_all(DOCKER_OUTPUT_ROOT) {
        Ok(()) => PathBuf::from(DOCKER_OUTPUT_ROOT),
        Err(e) => {
            let local = content_root.join("data");
            log::warn!(
                "Cannot use {} ({}), writing generated files to {}",
                DOCKER_OUTPUT_ROOT,
                e,
                local.display()
            );
            local
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_renderer_kind_parsing() {
        assert_eq!("html".parse::<RendererKind>().unwrap(), RendererKind::Html);
        assert_eq!("AcroForm".parse::<RendererKind>().unwrap(), RendererKind::AcroForm);
        assert_eq!(" form ".parse::<RendererKind>().unwrap(), RendererKind::AcroForm);
        assert!(matches!(
            "word".parse::<RendererKind>(),
            Err(ConfigError::UnknownRenderer(_))
        ));
    }

    #[test]
    fn test_defaults_follow_renderer() {
        let html = AppConfig::new(RendererKind::Html, "/srv/app");
        assert_eq!(html.templates_root, PathBuf::from("/templates"));
        assert_eq!(html.fallback_templates_root(), PathBuf::from("/srv/app/templates"));

        let form = AppConfig::new(RendererKind::AcroForm, "/srv/app");
        assert_eq!(form.templates_root, PathBuf::from("/templates-pdf"));
        assert_eq!(form.logos_root, PathBuf::from("/templates-pdf/logos"));
        assert_eq!(
            form.fallback_logos_root(),
            PathBuf::from("/srv/app/templates-pdf/logos")
        );
        assert_eq!(form.output_root, PathBuf::from("/srv/app/data"));
        assert!(!form.strict_text_merge);
    }
}
