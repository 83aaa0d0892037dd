use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::AppConfig;
use crate::storage::MAX_FILE_NAME_BYTES;

const LOGO_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("Template not found: {0}")]
    NotFound(String),
    #[error("failed to inspect {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Locates template files by name under a deployment root with a local
/// fallback. Candidates are canonicalized and must stay inside their root.
#[derive(Debug, Clone)]
pub struct TemplateResolver {
    roots: Vec<PathBuf>,
    logo_roots: Vec<PathBuf>,
    extension: &'static str,
}

impl TemplateResolver {
    pub fn new(roots: Vec<PathBuf>, logo_roots: Vec<PathBuf>, extension: &'static str) -> Self {
        Self {
            roots,
            logo_roots,
            extension,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            vec![config.templates_root.clone(), config.fallback_templates_root()],
            vec![config.logos_root.clone(), config.fallback_logos_root()],
            config.renderer.template_extension(),
        )
    }

    pub fn resolve(&self, template_name: &str) -> Result<PathBuf, TemplateError> {
        if !is_plain_name(template_name) {
            log::warn!("Rejected template name {:?}", template_name);
            return Err(TemplateError::NotFound(template_name.to_string()));
        }

        let file_name = format!("{}.{}", template_name, self.extension);
        for root in &self.roots {
            if let Some(path) = contained_file(root, &file_name)? {
                log::debug!("Template '{}' resolved to {}", template_name, path.display());
                return Ok(path);
            }
        }

        Err(TemplateError::NotFound(template_name.to_string()))
    }

    /// `<name>-logo.{png,jpg,jpeg}`, extensions in that order, each checked in
    /// the primary logo root before the fallback.
    pub fn resolve_logo(&self, template_name: &str) -> Result<Option<PathBuf>, TemplateError> {
        if !is_plain_name(template_name) {
            return Ok(None);
        }

        for extension in LOGO_EXTENSIONS {
            let file_name = format!("{}-logo.{}", template_name, extension);
            for root in &self.logo_roots {
                if let Some(path) = contained_file(root, &file_name)? {
                    return Ok(Some(path));
                }
            }
        }

        Ok(None)
    }
}

/// A bare file stem: no separators, no NUL, not `.` or `..`.
fn is_plain_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0'])
}

/// Canonical path of `root/file_name` if it is an existing file inside `root`.
pub(crate) fn contained_file(root: &Path, file_name: &str) -> Result<Option<PathBuf>, TemplateError> {
    // No such file can exist, and the OS would answer ENAMETOOLONG instead.
    if file_name.len() > MAX_FILE_NAME_BYTES {
        return Ok(None);
    }
    let candidate = root.join(file_name);
    let canonical = match candidate.canonicalize() {
        Ok(path) => path,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(TemplateError::Io {
                path: candidate,
                source,
            })
        }
    };
    let canonical_root = root.canonicalize().map_err(|source| TemplateError::Io {
        path: root.to_path_buf(),
        source,
    })?;

    if !canonical.starts_with(&canonical_root) {
        log::warn!(
            "{} resolves outside {}, ignoring it",
            candidate.display(),
            canonical_root.display()
        );
        return Ok(None);
    }
    if !canonical.is_file() {
        return Ok(None);
    }

    Ok(Some(canonical))
}
