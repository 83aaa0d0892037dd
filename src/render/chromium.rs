//! Headless Chromium rendering engine.
//!
//! Writes the merged HTML to a temporary directory, asks the browser to print
//! it, and reads the PDF back.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tempfile::tempdir;
use tokio::process::Command;

use super::{RenderError, RenderJob, Renderer};
use crate::template::{merge_text, merge_text_strict};

const SOURCE_FILE: &str = "page.html";
const OUTPUT_FILE: &str = "output.pdf";
/// Virtual time the page gets to load resources before printing.
const QUIESCENCE_BUDGET_MS: u32 = 10_000;
const PRINT_STYLES: &str = "<style>@page { size: A4; } \
html { -webkit-print-color-adjust: exact; print-color-adjust: exact; }</style>";

pub struct ChromiumRenderer {
    chromium_path: PathBuf,
    strict_merge: bool,
}

impl ChromiumRenderer {
    pub fn new(chromium_path: PathBuf, strict_merge: bool) -> Self {
        Self {
            chromium_path,
            strict_merge,
        }
    }

    fn command(&self, source: &Path, output: &Path) -> Command {
        let mut command = Command::new(&self.chromium_path);
        command
            .arg("--headless")
            .arg("--disable-gpu")
            .arg("--no-pdf-header-footer")
            .arg("--run-all-compositor-stages-before-draw")
            .arg(format!("--virtual-time-budget={}", QUIESCENCE_BUDGET_MS))
            .arg(format!("--print-to-pdf={}", output.display()))
            .arg(format!("file://{}", source.display()))
            .stdin(Stdio::null())
            .kill_on_drop(true);
        command
    }
}

#[async_trait]
impl Renderer for ChromiumRenderer {
    async fn render(&self, job: RenderJob) -> Result<Vec<u8>, RenderError> {
        let html = tokio::fs::read_to_string(&job.template_path)
            .await
            .map_err(RenderError::ReadTemplate)?;
        let merged = if self.strict_merge {
            merge_text_strict(&html, &job.payload)?
        } else {
            merge_text(&html, &job.payload)
        };

        let temp_dir = tempdir().map_err(RenderError::TempDir)?;
        let source = temp_dir.path().join(SOURCE_FILE);
        let output = temp_dir.path().join(OUTPUT_FILE);
        tokio::fs::write(&source, with_print_styles(&merged))
            .await
            .map_err(RenderError::WriteSource)?;

        log::debug!("Printing '{}' with {}", job.template_name, self.chromium_path.display());
        let result = self
            .command(&source, &output)
            .output()
            .await
            .map_err(RenderError::Spawn)?;

        if !result.status.success() {
            return Err(RenderError::BrowserExit {
                code: result.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&result.stderr).trim().to_string(),
            });
        }

        let pdf = tokio::fs::read(&output).await.map_err(RenderError::ReadPdf)?;
        log::debug!("Browser produced {} bytes for '{}'", pdf.len(), job.template_name);
        Ok(pdf)
    }
}

/// Injects the A4 page size and background printing rules into `<head>`, or
/// in front of the document when it has none.
fn with_print_styles(html: &str) -> String {
    let lower = html.to_ascii_lowercase();
    let head_end = lower
        .match_indices("<head")
        .map(|(start, _)| start)
        .find(|&start| {
            matches!(lower.as_bytes().get(start + 5), Some(b) if *b == b'>' || b.is_ascii_whitespace())
        })
        .and_then(|start| html[start..].find('>').map(|end| start + end + 1));

    match head_end {
        Some(index) => format!("{}{}{}", &html[..index], PRINT_STYLES, &html[index..]),
        None => format!("{}{}", PRINT_STYLES, html),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_styles_go_inside_head() {
        let html = r#"<html><HEAD lang="en"><title>x</title></HEAD><body></body></html>"#;
        let styled = with_print_styles(html);
        assert!(styled.starts_with(r#"<html><HEAD lang="en"><style>@page"#));
        assert!(styled.ends_with("<title>x</title></HEAD><body></body></html>"));
    }

    #[test]
    fn test_styles_prepended_without_head() {
        let styled = with_print_styles("<header>top</header><p>hi</p>");
        assert!(styled.starts_with("<style>"));
        assert!(styled.ends_with("<header>top</header><p>hi</p>"));

        let styled = with_print_styles("<p>hi</p>");
        assert!(styled.starts_with("<style>"));
        assert!(styled.ends_with("<p>hi</p>"));
    }

    #[test]
    fn test_command_arguments() {
        let renderer = ChromiumRenderer::new(PathBuf::from("/usr/bin/chromium"), false);
        let command = renderer.command(Path::new("/tmp/x/page.html"), Path::new("/tmp/x/output.pdf"));
        let args: Vec<String> = command
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();

        assert!(args.contains(&"--headless".to_string()));
        assert!(args.contains(&"--print-to-pdf=/tmp/x/output.pdf".to_string()));
        assert_eq!(args.last().unwrap(), "file:///tmp/x/page.html");
    }

    #[tokio::test]
    async fn test_missing_browser_is_a_spawn_error() {
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("t.html");
        std::fs::write(&template, "<p>{{a}}</p>").unwrap();

        let renderer = ChromiumRenderer::new(dir.path().join("no-such-browser"), false);
        let result = renderer
            .render(RenderJob {
                template_name: "t".to_string(),
                template_path: template,
                payload: json!({"a": 1}),
            })
            .await;
        assert!(matches!(result, Err(RenderError::Spawn(_))));
    }

    #[tokio::test]
    async fn test_strict_merge_fails_before_launching() {
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("t.html");
        std::fs::write(&template, "<p>{{a}}</p>").unwrap();

        let renderer = ChromiumRenderer::new(dir.path().join("no-such-browser"), true);
        let result = renderer
            .render(RenderJob {
                template_name: "t".to_string(),
                template_path: template,
                payload: json!({"a": 1, "b": 2}),
            })
            .await;
        assert!(matches!(result, Err(RenderError::Merge(_))));
    }
}
