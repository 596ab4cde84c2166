//! Figure catalog built once per ingestion.
//!
//! Image files follow the extraction bundle's naming scheme
//! `page_{page}_img_{index}_{ordinal}.png`. The catalog is an explicit
//! list sorted by ordinal, so "the N-th image" never depends on directory
//! listing order.
//!
//! Files are skipped when their name contains `table`, when they are
//! smaller than the configured minimum size, or when they are blank
//! (every RGB channel of every pixel ≥ 250). A file that cannot be decoded
//! is skipped with a warning; it never fails the ingestion.

use std::path::Path;

use anyhow::Result;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::config::ExtractionConfig;
use crate::models::{ImageRecord, RoutingDecision};

static IMAGE_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^page_(\d+)_img_(\d+)_(\d+)\.png$").expect("static regex")
});

/// Returned in place of a description when the sidecar has no block for an image.
pub const DESCRIPTION_NOT_FOUND: &str = "image description not found";

/// `(page, index, ordinal)` encoded in an image file name.
pub fn parse_image_name(name: &str) -> Option<(u32, u32, u32)> {
    let caps = IMAGE_NAME.captures(name)?;
    Some((
        caps[1].parse().ok()?,
        caps[2].parse().ok()?,
        caps[3].parse().ok()?,
    ))
}

pub fn image_file_name(page: u32, index: u32, ordinal: u32) -> String {
    format!("page_{}_img_{}_{}.png", page, index, ordinal)
}

/// Wrap a description in its page/image tags.
pub fn description_block(page: u32, index: u32, text: &str) -> String {
    format!(
        "<PAGE_{p}_IMAGE_{i}>\n{text}\n</PAGE_{p}_IMAGE_{i}>\n",
        p = page,
        i = index,
        text = text.trim()
    )
}

/// Text inside the `<PAGE_p_IMAGE_i>…</PAGE_p_IMAGE_i>` block, trimmed.
pub fn extract_description(descriptions: &str, page: u32, index: u32) -> Option<String> {
    let open = format!("<PAGE_{}_IMAGE_{}>", page, index);
    let close = format!("</PAGE_{}_IMAGE_{}>", page, index);
    let start = descriptions.find(&open)? + open.len();
    let len = descriptions[start..].find(&close)?;
    let text = descriptions[start..start + len].trim();
    (!text.is_empty()).then(|| text.to_string())
}

/// Size thresholds applied while scanning the image directory.
#[derive(Debug, Clone, Copy)]
pub struct ImageFilter {
    pub min_width: u32,
    pub min_height: u32,
}

impl ImageFilter {
    pub fn from_config(config: &ExtractionConfig) -> Self {
        Self {
            min_width: config.min_image_width,
            min_height: config.min_image_height,
        }
    }
}

/// Stored figures of the loaded document, in ordinal order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImageCatalog {
    records: Vec<ImageRecord>,
}

impl ImageCatalog {
    pub fn new(mut records: Vec<ImageRecord>) -> Self {
        records.sort_by_key(|r| (r.ordinal, r.page, r.index));
        Self { records }
    }

    /// Scan `root/images` and attach descriptions from `descriptions`.
    ///
    /// Record paths are relative to `root` (e.g. `images/page_1_img_1_1.png`).
    pub fn scan(root: &Path, filter: ImageFilter, descriptions: &str) -> Result<Self> {
        let dir = root.join("images");
        if !dir.is_dir() {
            return Ok(Self::default());
        }

        let mut records = Vec::new();
        for entry in WalkDir::new(&dir).min_depth(1).max_depth(1) {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if name.contains("table") {
                debug!(file = %name, "skipping table image");
                continue;
            }
            let Some((page, index, ordinal)) = parse_image_name(&name) else {
                debug!(file = %name, "skipping file with unrecognised name");
                continue;
            };

            let img = match image::open(entry.path()) {
                Ok(img) => img,
                Err(e) => {
                    warn!(file = %name, error = %e, "skipping undecodable image");
                    continue;
                }
            };
            let (width, height) = (img.width(), img.height());
            if width < filter.min_width || height < filter.min_height {
                debug!(file = %name, width, height, "skipping small image");
                continue;
            }
            if is_blank(&img) {
                debug!(file = %name, "skipping blank image");
                continue;
            }

            records.push(ImageRecord {
                page,
                index,
                ordinal,
                path: format!("images/{}", name),
                width,
                height,
                description: extract_description(descriptions, page, index),
            });
        }

        Ok(Self::new(records))
    }

    pub fn records(&self) -> &[ImageRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// The N-th image of the document (1-based).
    pub fn by_ordinal(&self, n: u32) -> Option<&ImageRecord> {
        let n = usize::try_from(n).ok()?;
        n.checked_sub(1).and_then(|i| self.records.get(i))
    }

    /// Image `index` on `page`.
    pub fn by_page(&self, page: u32, index: u32) -> Option<&ImageRecord> {
        self.records
            .iter()
            .find(|r| r.page == page && r.index == index)
    }

    /// The record a routing decision points at, if any.
    pub fn resolve(&self, decision: &RoutingDecision) -> Option<&ImageRecord> {
        if !decision.is_image_question || decision.ordinal == 0 {
            return None;
        }
        if decision.page == 0 {
            self.by_ordinal(decision.ordinal)
        } else {
            self.by_page(decision.page, decision.ordinal)
        }
    }

    /// Attach descriptions from a (re)generated sidecar.
    pub fn attach_descriptions(&mut self, descriptions: &str) {
        for r in &mut self.records {
            r.description = extract_description(descriptions, r.page, r.index);
        }
    }
}

fn is_blank(img: &image::DynamicImage) -> bool {
    img.to_rgb8()
        .pixels()
        .all(|p| p.0.iter().all(|&c| c >= 250))
}
