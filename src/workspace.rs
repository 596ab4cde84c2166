//! On-disk state of the loaded document.
//!
//! ```text
//! <dir>/content.md           extracted markdown
//! <dir>/images/              catalog images
//! <dir>/img_descriptions.md  tagged image descriptions
//! <dir>/manifest.json        document metadata and image records
//! <dir>/index.json           chunks and, for dense indexes, their vectors
//! ```
//!
//! The directory is wiped at the start of every ingestion. To avoid wiping
//! an unrelated directory by accident, [`Workspace::clear`] refuses to
//! touch a non-empty directory that has no `manifest.json`.

use std::path::{Component, Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::extract::{CONTENT_FILE, DESCRIPTIONS_FILE, IMAGES_DIR};
use crate::index::IndexSnapshot;
use crate::models::ImageRecord;

pub const MANIFEST_FILE: &str = "manifest.json";
pub const INDEX_FILE: &str = "index.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub source: String,
    pub fingerprint: String,
    pub ingested_at: DateTime<Utc>,
    /// Extraction backend (`text`, `command` or `bundle`).
    pub extractor: String,
    /// `dense` or `sparse`.
    pub index_backend: String,
    pub chunk_count: usize,
    pub images: Vec<ImageRecord>,
}

#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn has_document(&self) -> bool {
        self.root.join(MANIFEST_FILE).is_file()
    }

    /// Remove everything from a previous ingestion and recreate the directory.
    pub fn clear(&self) -> Result<()> {
        if self.root.is_dir() {
            let non_empty = std::fs::read_dir(&self.root)?.next().is_some();
            if non_empty && !self.has_document() {
                bail!(
                    "Refusing to clear {}: not empty and not a pdf-qa workspace",
                    self.root.display()
                );
            }
            std::fs::remove_dir_all(&self.root)
                .with_context(|| format!("Failed to clear workspace {}", self.root.display()))?;
        }
        std::fs::create_dir_all(self.root.join(IMAGES_DIR))
            .with_context(|| format!("Failed to create workspace {}", self.root.display()))?;
        Ok(())
    }

    pub fn read_content(&self) -> Result<String> {
        let path = self.root.join(CONTENT_FILE);
        std::fs::read_to_string(&path).with_context(|| format!("Failed to read {}", path.display()))
    }

    pub fn write_content(&self, markdown: &str) -> Result<()> {
        std::fs::write(self.root.join(CONTENT_FILE), markdown)?;
        Ok(())
    }

    pub fn read_descriptions(&self) -> String {
        std::fs::read_to_string(self.root.join(DESCRIPTIONS_FILE)).unwrap_or_default()
    }

    pub fn write_descriptions(&self, text: &str) -> Result<()> {
        std::fs::write(self.root.join(DESCRIPTIONS_FILE), text)?;
        Ok(())
    }

    pub fn save_manifest(&self, manifest: &Manifest) -> Result<()> {
        write_json(&self.root.join(MANIFEST_FILE), manifest)
    }

    pub fn load_manifest(&self) -> Result<Manifest> {
        read_json(&self.root.join(MANIFEST_FILE))
    }

    pub fn save_index(&self, snapshot: &IndexSnapshot) -> Result<()> {
        write_json(&self.root.join(INDEX_FILE), snapshot)
    }

    pub fn load_index(&self) -> Result<Option<IndexSnapshot>> {
        let path = self.root.join(INDEX_FILE);
        if !path.is_file() {
            return Ok(None);
        }
        read_json(&path).map(Some)
    }

    /// Absolute path of a record's relative image path, rejecting paths that
    /// would leave the workspace.
    pub fn image_path(&self, relative: &str) -> Result<PathBuf> {
        let rel = Path::new(relative);
        if rel
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            bail!("Invalid image path: {}", relative);
        }
        Ok(self.root.join(rel))
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest() -> Manifest {
        Manifest {
            source: "paper.pdf".into(),
            fingerprint: "abc".into(),
            ingested_at: Utc::now(),
            extractor: "text".into(),
            index_backend: "sparse".into(),
            chunk_count: 3,
            images: vec![],
        }
    }

    #[test]
    fn test_clear_creates_layout() {
        let tmp = tempfile::tempdir().unwrap();
        let ws = Workspace::new(tmp.path().join("ws"));
        ws.clear().unwrap();
        assert!(ws.root().join("images").is_dir());
        assert!(!ws.has_document());
    }

    #[test]
    fn test_clear_wipes_previous_document() {
        let tmp = tempfile::tempdir().unwrap();
        let ws = Workspace::new(tmp.path().join("ws"));
        ws.clear().unwrap();
        ws.write_content("old").unwrap();
        ws.save_manifest(&manifest()).unwrap();

        ws.clear().unwrap();
        assert!(ws.read_content().is_err());
        assert!(!ws.has_document());
    }

    #[test]
    fn test_clear_refuses_foreign_directory() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("thesis.tex"), "precious").unwrap();
        let ws = Workspace::new(tmp.path());
        assert!(ws.clear().is_err());
        assert!(tmp.path().join("thesis.tex").exists());
    }

    #[test]
    fn test_manifest_roundtrip_and_missing_index() {
        let tmp = tempfile::tempdir().unwrap();
        let ws = Workspace::new(tmp.path().join("ws"));
        ws.clear().unwrap();
        ws.save_manifest(&manifest()).unwrap();
        assert_eq!(ws.load_manifest().unwrap().chunk_count, 3);
        assert!(ws.load_index().unwrap().is_none());
        assert_eq!(ws.read_descriptions(), "");
    }

    #[test]
    fn test_image_path_rejects_traversal() {
        let ws = Workspace::new("/ws");
        assert_eq!(
            ws.image_path("images/page_1_img_1_1.png").unwrap(),
            PathBuf::from("/ws/images/page_1_img_1_1.png")
        );
        assert!(ws.image_path("../etc/passwd").is_err());
        assert!(ws.image_path("/etc/passwd").is_err());
    }
}
