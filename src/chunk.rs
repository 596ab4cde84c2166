//! Markdown header-aware text chunker.
//!
//! Splits the extracted markdown into [`Chunk`]s in two passes:
//!
//! 1. **Sections.** ATX header lines (`#` up to `max_header_level`) start a
//!    new section. Each section records the full chain of enclosing header
//!    titles; a header of level L closes every open header of level ≥ L.
//!    Lines inside fenced code blocks are never treated as headers.
//! 2. **Windows.** Each section is re-split into windows of at most
//!    `chunk_size` characters, consecutive windows sharing `chunk_overlap`
//!    characters. A window prefers to end after a paragraph break, a
//!    newline, a sentence terminator or a space found in its second half.
//!
//! Every chunk is an exact byte span of the source text, so walking the
//! chunks in order and skipping each one's overlap with its predecessor
//! reproduces the document (minus whitespace-only sections, which are
//! dropped, and header lines when `strip_headers` is set).
//!
//! # Example
//!
//! ```rust
//! use pdf_qa::chunk::chunk_markdown;
//! use pdf_qa::config::ChunkingConfig;
//!
//! let chunks = chunk_markdown("# A\nalpha\n## B\nbeta\n", &ChunkingConfig::default());
//! assert_eq!(chunks.len(), 2);
//! assert_eq!(chunks[1].heading_path(), vec!["A", "B"]);
//! ```

use sha2::{Digest, Sha256};

use crate::config::ChunkingConfig;
use crate::models::{Chunk, Heading};

const SENTENCE_END: &[char] = &['.', '!', '?', '。', '！', '？'];

/// A header-delimited byte range of the document.
#[derive(Debug, Clone)]
struct Section {
    start: usize,
    end: usize,
    headings: Vec<Heading>,
}

/// Split markdown into ordered, header-tagged, overlapping chunks.
pub fn chunk_markdown(text: &str, config: &ChunkingConfig) -> Vec<Chunk> {
    let mut chunks = Vec::new();

    for section in split_sections(text, config.max_header_level, config.strip_headers) {
        let body = &text[section.start..section.end];
        for (start, end) in windows(body, config.chunk_size, config.chunk_overlap) {
            let content = &body[start..end];
            if content.trim().is_empty() {
                continue;
            }
            chunks.push(make_chunk(
                chunks.len(),
                content,
                section.headings.clone(),
                section.start + start,
                section.start + end,
            ));
        }
    }

    chunks
}

fn make_chunk(
    index: usize,
    content: &str,
    headings: Vec<Heading>,
    start: usize,
    end: usize,
) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        index,
        content: content.to_string(),
        headings,
        start,
        end,
        hash,
    }
}

/// Parse an ATX header line into `(level, title)`.
fn parse_header(line: &str, max_level: u8) -> Option<(u8, String)> {
    let line = line.trim_end_matches(['\n', '\r']);
    let hashes = line.chars().take_while(|c| *c == '#').count();
    if hashes == 0 || hashes > max_level as usize {
        return None;
    }
    let rest = &line[hashes..];
    if !rest.starts_with([' ', '\t']) {
        return None;
    }
    // Closing hashes ("## Title ##") are decoration.
    let title = rest.trim().trim_end_matches('#').trim();
    if title.is_empty() {
        return None;
    }
    Some((hashes as u8, title.to_string()))
}

fn is_fence(line: &str) -> bool {
    let t = line.trim_start();
    t.starts_with("```") || t.starts_with("~~~")
}

fn split_sections(text: &str, max_level: u8, strip_headers: bool) -> Vec<Section> {
    let mut sections = Vec::new();
    let mut stack: Vec<Heading> = Vec::new();
    let mut current_start = 0usize;
    let mut in_fence = false;
    let mut offset = 0usize;

    for line in text.split_inclusive('\n') {
        let line_start = offset;
        offset += line.len();

        if is_fence(line) {
            in_fence = !in_fence;
            continue;
        }
        if in_fence {
            continue;
        }

        if let Some((level, title)) = parse_header(line, max_level) {
            sections.push(Section {
                start: current_start,
                end: line_start,
                headings: stack.clone(),
            });
            stack.retain(|h| h.level < level);
            stack.push(Heading { level, title });
            current_start = if strip_headers { offset } else { line_start };
        }
    }

    sections.push(Section {
        start: current_start,
        end: text.len(),
        headings: stack,
    });

    sections.retain(|s| s.start < s.end && !text[s.start..s.end].trim().is_empty());
    sections
}

/// Window a section into `(start, end)` byte ranges relative to `body`.
fn windows(body: &str, size: usize, overlap: usize) -> Vec<(usize, usize)> {
    let offsets: Vec<(usize, char)> = body.char_indices().collect();
    let n = offsets.len();
    if n == 0 {
        return Vec::new();
    }
    if n <= size {
        return vec![(0, body.len())];
    }

    let byte_at = |c: usize| if c == n { body.len() } else { offsets[c].0 };
    let chars: Vec<char> = offsets.iter().map(|(_, c)| *c).collect();

    let mut out = Vec::new();
    let mut start = 0usize;
    loop {
        let hard_end = (start + size).min(n);
        let end = if hard_end == n {
            n
        } else {
            find_break(&chars, start, hard_end)
        };
        out.push((byte_at(start), byte_at(end)));
        if end == n {
            break;
        }
        // Advance by at least half a window so heavy overlap stays linear.
        let min_step = ((end - start) / 2).max(1);
        start = end.saturating_sub(overlap).max(start + min_step);
    }
    out
}

/// Pick a window end in `(start + len/2, hard_end]`, preferring natural breaks.
fn find_break(chars: &[char], start: usize, hard_end: usize) -> usize {
    let floor = start + (hard_end - start) / 2;
    let candidates = || (floor + 1..=hard_end).rev();

    if let Some(i) = candidates().find(|&i| i >= 2 && chars[i - 1] == '\n' && chars[i - 2] == '\n') {
        return i;
    }
    if let Some(i) = candidates().find(|&i| chars[i - 1] == '\n') {
        return i;
    }
    if let Some(i) = candidates().find(|&i| SENTENCE_END.contains(&chars[i - 1])) {
        return i;
    }
    if let Some(i) = candidates().find(|&i| chars[i - 1].is_whitespace()) {
        return i;
    }
    hard_end
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(size: usize, overlap: usize) -> ChunkingConfig {
        ChunkingConfig {
            chunk_size: size,
            chunk_overlap: overlap,
            ..ChunkingConfig::default()
        }
    }

    /// Rebuild the text covered by `chunks`, skipping overlapped bytes.
    fn stitch(chunks: &[Chunk]) -> String {
        let mut out = String::new();
        let mut covered = 0usize;
        for c in chunks {
            let skip = covered.saturating_sub(c.start);
            out.push_str(&c.content[skip.min(c.content.len())..]);
            covered = c.end;
        }
        out
    }

    #[test]
    fn test_headers_tag_chunks_with_path() {
        let text = "# A\nIntro text about the topic of A.\n## B\nDetails about B that go on for a while.\n";
        let chunks = chunk_markdown(text, &cfg(50, 5));
        assert!(chunks.len() >= 2);
        assert_eq!(chunks[0].heading_path(), vec!["A"]);
        assert_eq!(chunks.last().unwrap().heading_path(), vec!["A", "B"]);
    }

    #[test]
    fn test_sibling_header_pops_stack() {
        let text = "# Paper\n## Method\nm\n### Detail\nd\n## Results\nr\n";
        let chunks = chunk_markdown(text, &cfg(200, 10));
        let paths: Vec<Vec<&str>> = chunks.iter().map(|c| c.heading_path()).collect();
        assert_eq!(
            paths,
            vec![
                vec!["Paper"],
                vec!["Paper", "Method"],
                vec!["Paper", "Method", "Detail"],
                vec!["Paper", "Results"],
            ]
        );
    }

    #[test]
    fn test_no_headers_single_segment() {
        let chunks = chunk_markdown("just some text\nwith two lines", &cfg(200, 10));
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].headings.is_empty());
        assert_eq!(chunks[0].content, "just some text\nwith two lines");
    }

    #[test]
    fn test_empty_and_blank_documents() {
        assert!(chunk_markdown("", &cfg(200, 10)).is_empty());
        assert!(chunk_markdown("\n\n   \n", &cfg(200, 10)).is_empty());
    }

    #[test]
    fn test_headers_kept_in_body_by_default() {
        let chunks = chunk_markdown("## Data\nImageNet", &cfg(200, 10));
        assert_eq!(chunks[0].content, "## Data\nImageNet");
    }

    #[test]
    fn test_strip_headers_drops_header_only_sections() {
        let config = ChunkingConfig {
            strip_headers: true,
            ..cfg(200, 10)
        };
        let chunks = chunk_markdown("# A\n## B\nbody of b\n", &config);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "body of b\n");
        assert_eq!(chunks[0].heading_path(), vec!["A", "B"]);
    }

    #[test]
    fn test_hash_in_code_fence_is_not_header() {
        let text = "# Code\n```\n# not a header\n```\nafter\n";
        let chunks = chunk_markdown(text, &cfg(200, 10));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].heading_path(), vec!["Code"]);
    }

    #[test]
    fn test_deeper_than_max_level_stays_in_body() {
        let text = "# A\n##### Tiny\nbody\n";
        let chunks = chunk_markdown(text, &cfg(200, 10));
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].content.contains("##### Tiny"));
    }

    #[test]
    fn test_hashtag_without_space_is_not_header() {
        let chunks = chunk_markdown("#hashtag line\nmore", &cfg(200, 10));
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].headings.is_empty());
    }

    #[test]
    fn test_windows_respect_size_and_overlap() {
        let text = (0..40)
            .map(|i| format!("Sentence number {} is here.", i))
            .collect::<Vec<_>>()
            .join(" ");
        let chunks = chunk_markdown(&text, &cfg(100, 20));
        assert!(chunks.len() > 5);
        for c in &chunks {
            assert!(c.content.chars().count() <= 100, "oversized: {:?}", c.content);
        }
        for pair in chunks.windows(2) {
            assert!(pair[1].start < pair[0].end, "consecutive windows must overlap");
            assert!(pair[1].start > pair[0].start);
        }
    }

    #[test]
    fn test_near_total_overlap_stays_linear() {
        let text = "lorem ipsum dolor sit amet ".repeat(80);
        let n = text.chars().count();
        let chunks = chunk_markdown(&text, &cfg(100, 99));
        // Every window advances by at least a quarter of the size.
        assert!(chunks.len() <= n / 25 + 1, "{} chunks for {} chars", chunks.len(), n);
        for pair in chunks.windows(2) {
            assert!(pair[1].start < pair[0].end);
        }
        assert_eq!(stitch(&chunks), text);
    }

    #[test]
    fn test_stitching_reconstructs_document() {
        let text = "# Title\nFirst paragraph with several words in it.\n\nSecond paragraph, also long enough to be split.\n## Part\nA closing section of text that wraps across windows.\n";
        for (size, overlap) in [(30, 0), (30, 8), (64, 10), (500, 10)] {
            let chunks = chunk_markdown(text, &cfg(size, overlap));
            assert_eq!(stitch(&chunks), text, "size={} overlap={}", size, overlap);
        }
    }

    #[test]
    fn test_cjk_windows_split_on_char_boundaries() {
        let text = "本文提出了一种新的图神经网络方法。实验在三个公开数据集上完成。结果表明该方法优于基线。".repeat(4);
        let chunks = chunk_markdown(&text, &cfg(20, 4));
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert_eq!(&text[c.start..c.end], c.content);
            assert!(c.content.chars().count() <= 20);
        }
        assert_eq!(stitch(&chunks), text);
    }

    #[test]
    fn test_indices_contiguous_and_spans_ordered() {
        let text = "# A\n".to_string() + &"word ".repeat(200);
        let chunks = chunk_markdown(&text, &cfg(50, 10));
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.index, i);
            assert_eq!(&text[c.start..c.end], c.content);
        }
    }

    #[test]
    fn test_deterministic() {
        let text = "# A\nalpha beta gamma delta\n## B\nepsilon zeta eta theta iota kappa";
        let a = chunk_markdown(text, &cfg(16, 4));
        let b = chunk_markdown(text, &cfg(16, 4));
        assert_eq!(a, b);
    }

    #[test]
    fn test_parse_header_variants() {
        assert_eq!(parse_header("## Results ##\n", 4), Some((2, "Results".into())));
        assert_eq!(parse_header("#\n", 4), None);
        assert_eq!(parse_header("#### Deep", 3), None);
        assert_eq!(parse_header("#\tTabbed\r\n", 4), Some((1, "Tabbed".into())));
    }
}
