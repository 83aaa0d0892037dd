use std::ffi::OsStr;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tempfile::NamedTempFile;
use thiserror::Error;
use uuid::Uuid;

const PDF_EXTENSION: &str = ".pdf";
/// Longest single path component common filesystems accept.
pub(crate) const MAX_FILE_NAME_BYTES: usize = 255;
/// `-<yyyyMMddHHmmss>-<32 hex>.pdf`
const GENERATED_SUFFIX_BYTES: usize = 1 + 14 + 1 + 32 + PDF_EXTENSION.len();

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Invalid file name.")]
    InvalidName(String),
    #[error("Only PDF files are allowed.")]
    InvalidExtension(String),
    #[error("File not found: {0}")]
    NotFound(String),
    #[error("output directory I/O failed: {0}")]
    Io(#[from] io::Error),
}

/// A document written to the output directory.
#[derive(Debug, Clone)]
pub struct StoredDocument {
    pub file_name: String,
    pub path: PathBuf,
}

/// Flat, unindexed directory of generated PDFs. The directory listing is the
/// only source of truth.
#[derive(Debug, Clone)]
pub struct OutputStore {
    root: PathBuf,
}

impl OutputStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Writes `bytes` under a fresh name. The file only becomes visible once
    /// it is complete.
    pub fn save(&self, template_name: &str, bytes: &[u8]) -> Result<StoredDocument, StorageError> {
        fs::create_dir_all(&self.root)?;

        let file_name = generate_file_name(template_name, Utc::now());
        let path = self.root.join(&file_name);

        let mut temp_file = NamedTempFile::new_in(&self.root)?;
        temp_file.write_all(bytes)?;
        temp_file.as_file().sync_all()?;
        temp_file
            .persist_noclobber(&path)
            .map_err(|e| StorageError::Io(e.error))?;

        log::debug!("Wrote {} bytes to {}", bytes.len(), path.display());
        Ok(StoredDocument { file_name, path })
    }

    /// Bare names of stored PDFs, newest first. A missing directory is empty.
    pub fn list(&self) -> Result<Vec<String>, StorageError> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if name.ends_with(PDF_EXTENSION) {
                    names.push(name.to_string());
                }
            }
        }

        names.sort_unstable_by(|a, b| b.cmp(a));
        Ok(names)
    }

    /// Path of a stored PDF, after checking the name cannot reach outside the
    /// output directory.
    pub fn fetch(&self, file_name: &str) -> Result<PathBuf, StorageError> {
        validate_file_name(file_name)?;
        if file_name.len() > MAX_FILE_NAME_BYTES {
            return Err(StorageError::NotFound(file_name.to_string()));
        }

        let candidate = self.root.join(file_name);
        let canonical = match candidate.canonicalize() {
            Ok(path) => path,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound(file_name.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        let root = self.root.canonicalize()?;

        if !canonical.starts_with(&root) {
            log::warn!("{} resolves outside the output directory", file_name);
            return Err(StorageError::InvalidName(file_name.to_string()));
        }
        if !canonical.is_file() {
            return Err(StorageError::NotFound(file_name.to_string()));
        }

        Ok(canonical)
    }
}

/// Replaces directory separators with `-`; everything else is kept.
pub fn sanitize_template_name(template_name: &str) -> String {
    template_name.replace(['/', '\\'], "-")
}

/// `<template>-<yyyyMMddHHmmss>-<32 hex>.pdf`, with the template part cut
/// short when the whole name would not fit in one path component.
pub fn generate_file_name(template_name: &str, now: DateTime<Utc>) -> String {
    let mut stem = sanitize_template_name(template_name);
    let max_stem = MAX_FILE_NAME_BYTES - GENERATED_SUFFIX_BYTES;
    if stem.len() > max_stem {
        let cut = (0..=max_stem).rev().find(|&i| stem.is_char_boundary(i)).unwrap_or(0);
        stem.truncate(cut);
    }
    format!(
        "{}-{}-{}{}",
        stem,
        now.format("%Y%m%d%H%M%S"),
        Uuid::new_v4().simple(),
        PDF_EXTENSION
    )
}

/// Accepts only a bare `*.pdf` file name.
pub fn validate_file_name(file_name: &str) -> Result<(), StorageError> {
    let bare = Path::new(file_name).file_name().and_then(OsStr::to_str);
    if file_name.is_empty() || file_name.contains(['\\', '\0']) || bare != Some(file_name) {
        return Err(StorageError::InvalidName(file_name.to_string()));
    }
    if !file_name.to_ascii_lowercase().ends_with(PDF_EXTENSION) {
        return Err(StorageError::InvalidExtension(file_name.to_string()));
    }
    Ok(())
}
