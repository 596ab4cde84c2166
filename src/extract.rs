//! PDF → markdown (+ figures) extraction.
//!
//! An [`Extractor`] fills a workspace directory with an extraction bundle:
//!
//! ```text
//! <root>/content.md            markdown text of the whole document
//! <root>/images/page_{p}_img_{i}_{o}.png
//! <root>/img_descriptions.md   optional <PAGE_p_IMAGE_i>…</PAGE_p_IMAGE_i> blocks
//! ```
//!
//! Three backends:
//!
//! | Mode | Extractor | Images |
//! |------|-----------|--------|
//! | `text` | [`TextExtractor`]: the PDF text layer via `pdf-extract` | none |
//! | `command` | [`CommandExtractor`]: an external OCR/layout program | yes |
//! | `bundle` | [`BundleExtractor`]: a bundle produced earlier | yes |
//!
//! Any failure, or a bundle without text, is
//! [`QaError::ExtractionUnavailable`].

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::config::ExtractionConfig;
use crate::error::{QaError, QaResult};

pub const CONTENT_FILE: &str = "content.md";
pub const DESCRIPTIONS_FILE: &str = "img_descriptions.md";
pub const IMAGES_DIR: &str = "images";

/// Text produced for one PDF; figures are left in `<root>/images`.
#[derive(Debug, Clone)]
pub struct Extraction {
    pub markdown: String,
    pub descriptions: String,
}

#[async_trait]
pub trait Extractor: Send + Sync {
    /// Backend name recorded in the workspace manifest.
    fn name(&self) -> &'static str;

    /// Extract `pdf` into the (empty) directory `root`.
    async fn extract(&self, pdf: &Path, root: &Path) -> QaResult<Extraction>;
}

fn unavailable(pdf: &Path, reason: impl Into<String>) -> QaError {
    QaError::ExtractionUnavailable {
        path: pdf.to_path_buf(),
        reason: reason.into(),
    }
}

/// Direct text-layer extraction. Pages become `## Page N` sections.
pub struct TextExtractor;

#[async_trait]
impl Extractor for TextExtractor {
    fn name(&self) -> &'static str {
        "text"
    }

    async fn extract(&self, pdf: &Path, root: &Path) -> QaResult<Extraction> {
        let bytes = tokio::fs::read(pdf)
            .await
            .map_err(|e| unavailable(pdf, e.to_string()))?;

        let text = tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes))
            .await
            .map_err(|e| unavailable(pdf, e.to_string()))?
            .map_err(|e| unavailable(pdf, e.to_string()))?;

        let markdown = pages_to_markdown(&text);
        if markdown.trim().is_empty() {
            return Err(unavailable(pdf, "PDF has no text layer"));
        }
        tokio::fs::write(root.join(CONTENT_FILE), &markdown)
            .await
            .map_err(|e| unavailable(pdf, e.to_string()))?;

        Ok(Extraction {
            markdown,
            descriptions: String::new(),
        })
    }
}

/// Split `pdf-extract` output on form feeds into `## Page N` sections,
/// skipping blank pages.
pub fn pages_to_markdown(text: &str) -> String {
    let mut out = String::new();
    for (i, page) in text.split('\x0C').enumerate() {
        let page = page.trim();
        if page.is_empty() {
            continue;
        }
        out.push_str(&format!("## Page {}\n\n{}\n\n", i + 1, page));
    }
    out
}

/// Runs an external OCR/layout program that writes a bundle.
///
/// `{pdf}` and `{out}` in the argv are replaced by the input path and the
/// bundle directory.
pub struct CommandExtractor {
    argv: Vec<String>,
}

impl CommandExtractor {
    pub fn new(argv: Vec<String>) -> Self {
        Self { argv }
    }

    fn render_args(&self, pdf: &Path, root: &Path) -> Vec<String> {
        self.argv
            .iter()
            .map(|a| {
                a.replace("{pdf}", &pdf.to_string_lossy())
                    .replace("{out}", &root.to_string_lossy())
            })
            .collect()
    }
}

#[async_trait]
impl Extractor for CommandExtractor {
    fn name(&self) -> &'static str {
        "command"
    }

    async fn extract(&self, pdf: &Path, root: &Path) -> QaResult<Extraction> {
        let args = self.render_args(pdf, root);
        let (program, rest) = args
            .split_first()
            .ok_or_else(|| unavailable(pdf, "extraction.command is empty"))?;

        debug!(program = %program, "running extraction command");
        let output = tokio::process::Command::new(program)
            .args(rest)
            .output()
            .await
            .map_err(|e| unavailable(pdf, format!("failed to run {}: {}", program, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(unavailable(
                pdf,
                format!("{} exited with {}: {}", program, output.status, stderr.trim()),
            ));
        }

        load_bundle(root).map_err(|reason| unavailable(pdf, reason))
    }
}

/// Copies a bundle produced elsewhere into the workspace.
pub struct BundleExtractor {
    dir: PathBuf,
}

impl BundleExtractor {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }
}

#[async_trait]
impl Extractor for BundleExtractor {
    fn name(&self) -> &'static str {
        "bundle"
    }

    async fn extract(&self, pdf: &Path, root: &Path) -> QaResult<Extraction> {
        copy_bundle(&self.dir, root).map_err(|e| unavailable(pdf, e.to_string()))?;
        load_bundle(root).map_err(|reason| unavailable(pdf, reason))
    }
}

/// Read `content.md` and the optional description sidecar from `root`.
pub fn load_bundle(root: &Path) -> Result<Extraction, String> {
    let content_path = root.join(CONTENT_FILE);
    let markdown = std::fs::read_to_string(&content_path)
        .map_err(|e| format!("cannot read {}: {}", content_path.display(), e))?;
    if markdown.trim().is_empty() {
        return Err(format!("{} is empty", content_path.display()));
    }
    let descriptions = std::fs::read_to_string(root.join(DESCRIPTIONS_FILE)).unwrap_or_default();
    Ok(Extraction {
        markdown,
        descriptions,
    })
}

fn copy_bundle(src: &Path, dst: &Path) -> anyhow::Result<()> {
    if src == dst {
        return Ok(());
    }
    for name in [CONTENT_FILE, DESCRIPTIONS_FILE] {
        let from = src.join(name);
        if from.is_file() {
            std::fs::copy(&from, dst.join(name))?;
        }
    }

    let images = src.join(IMAGES_DIR);
    if images.is_dir() {
        let target = dst.join(IMAGES_DIR);
        std::fs::create_dir_all(&target)?;
        let mut copied = 0;
        for entry in WalkDir::new(&images).min_depth(1).max_depth(1) {
            let entry = entry?;
            if entry.file_type().is_file() {
                std::fs::copy(entry.path(), target.join(entry.file_name()))?;
                copied += 1;
            }
        }
        info!(copied, from = %images.display(), "copied bundle images");
    }
    Ok(())
}

/// Pick the extractor for `config.mode`; `bundle` overrides the mode.
pub fn create_extractor(
    config: &ExtractionConfig,
    bundle: Option<&Path>,
) -> anyhow::Result<Box<dyn Extractor>> {
    if let Some(dir) = bundle {
        return Ok(Box::new(BundleExtractor::new(dir.to_path_buf())));
    }
    match config.mode.as_str() {
        "text" => Ok(Box::new(TextExtractor)),
        "command" => Ok(Box::new(CommandExtractor::new(config.command.clone()))),
        "bundle" => anyhow::bail!("extraction.mode = \"bundle\" needs a bundle directory (--bundle)"),
        other => anyhow::bail!("Unknown extraction mode: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pages_to_markdown() {
        let md = pages_to_markdown("first page\x0C  \x0Cthird page\n");
        assert_eq!(md, "## Page 1\n\nfirst page\n\n## Page 3\n\nthird page\n\n");
        assert_eq!(pages_to_markdown("only"), "## Page 1\n\nonly\n\n");
        assert!(pages_to_markdown(" \x0C \n").is_empty());
    }

    #[test]
    fn test_load_bundle_requires_text() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(load_bundle(tmp.path()).is_err());
        std::fs::write(tmp.path().join(CONTENT_FILE), "  \n").unwrap();
        assert!(load_bundle(tmp.path()).is_err());
        std::fs::write(tmp.path().join(CONTENT_FILE), "# Title\ntext").unwrap();
        let ex = load_bundle(tmp.path()).unwrap();
        assert_eq!(ex.descriptions, "");
    }

    #[tokio::test]
    async fn test_bundle_extractor_copies_into_workspace() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        std::fs::write(src.path().join(CONTENT_FILE), "# Paper\nbody").unwrap();
        std::fs::write(
            src.path().join(DESCRIPTIONS_FILE),
            "<PAGE_1_IMAGE_1>\nchart\n</PAGE_1_IMAGE_1>\n",
        )
        .unwrap();
        std::fs::create_dir_all(src.path().join(IMAGES_DIR)).unwrap();
        std::fs::write(src.path().join("images/page_1_img_1_1.png"), b"png").unwrap();

        let ex = BundleExtractor::new(src.path().to_path_buf())
            .extract(Path::new("paper.pdf"), dst.path())
            .await
            .unwrap();
        assert_eq!(ex.markdown, "# Paper\nbody");
        assert!(ex.descriptions.contains("chart"));
        assert!(dst.path().join("images/page_1_img_1_1.png").is_file());
    }

    #[tokio::test]
    async fn test_text_extractor_rejects_non_pdf() {
        let tmp = tempfile::tempdir().unwrap();
        let fake = tmp.path().join("fake.pdf");
        std::fs::write(&fake, b"not a pdf").unwrap();
        let err = TextExtractor.extract(&fake, tmp.path()).await.unwrap_err();
        assert!(matches!(err, QaError::ExtractionUnavailable { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_extractor_runs_program() {
        let tmp = tempfile::tempdir().unwrap();
        let extractor = CommandExtractor::new(vec![
            "sh".into(),
            "-c".into(),
            "printf '# From OCR\\nrecognised text' > \"$1/content.md\"".into(),
            "sh".into(),
            "{out}".into(),
        ]);
        let ex = extractor
            .extract(Path::new("in.pdf"), tmp.path())
            .await
            .unwrap();
        assert!(ex.markdown.starts_with("# From OCR"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_failure_is_extraction_unavailable() {
        let tmp = tempfile::tempdir().unwrap();
        let extractor = CommandExtractor::new(vec!["sh".into(), "-c".into(), "exit 3".into()]);
        let err = extractor
            .extract(Path::new("in.pdf"), tmp.path())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("in.pdf"));
    }

    #[test]
    fn test_create_extractor() {
        let cfg = ExtractionConfig::default();
        assert_eq!(create_extractor(&cfg, None).unwrap().name(), "text");
        assert_eq!(
            create_extractor(&cfg, Some(Path::new("/tmp/b"))).unwrap().name(),
            "bundle"
        );
        let cfg = ExtractionConfig {
            mode: "bundle".into(),
            ..ExtractionConfig::default()
        };
        assert!(create_extractor(&cfg, None).is_err());
    }
}
