//! Keyword derivation for the keyword-scan retrieval fallback.
//!
//! A question yields keywords from three places:
//!
//! 1. **Categories.** Each category has a fixed bilingual vocabulary. If
//!    any word of a category occurs in the lowercased question, every word
//!    of that category becomes a keyword.
//! 2. **Figure numbers.** `第N张` adds `图片N`, `figure` and `image`.
//! 3. **Free tokens.** Runs of CJK characters and Latin words, minus a
//!    small stop-word set.
//!
//! The result is deduplicated and sorted so the fallback is deterministic.

use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::Regex;

/// Static vocabulary per question category.
pub const CATEGORIES: &[(&str, &[&str])] = &[
    (
        "dataset",
        &["数据集", "dataset", "data", "训练", "测试", "验证", "benchmark"],
    ),
    (
        "experiment",
        &["实验", "experiment", "方法", "method", "算法", "algorithm"],
    ),
    (
        "result",
        &["结果", "result", "性能", "performance", "准确率", "accuracy"],
    ),
    (
        "contribution",
        &["创新", "contribution", "贡献", "novel", "新方法", "改进"],
    ),
    ("image", &["图片", "图", "figure", "image", "图表", "chart"]),
];

const STOP_WORDS: &[&str] = &[
    "的", "是", "在", "有", "和", "与", "或", "什么", "哪些", "如何", "为什么",
];

static FIGURE_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"第(\d+)张").expect("static regex"));
static FREE_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\x{4e00}-\x{9fff}]+|[a-zA-Z]+").expect("static regex"));

/// Names of the categories whose vocabulary occurs in `question`.
pub fn categories(question: &str) -> Vec<&'static str> {
    let lower = question.to_lowercase();
    CATEGORIES
        .iter()
        .filter(|(_, words)| words.iter().any(|w| lower.contains(w)))
        .map(|(name, _)| *name)
        .collect()
}

/// Derive the keyword set used by the keyword-scan fallback.
pub fn extract_keywords(question: &str) -> Vec<String> {
    let lower = question.to_lowercase();
    let mut keywords = BTreeSet::new();

    for (_, words) in CATEGORIES {
        if words.iter().any(|w| lower.contains(w)) {
            keywords.extend(words.iter().map(|w| w.to_string()));
        }
    }

    if let Some(caps) = FIGURE_NUMBER.captures(question) {
        keywords.insert(format!("图片{}", &caps[1]));
        keywords.insert("figure".to_string());
        keywords.insert("image".to_string());
    }

    for m in FREE_TOKEN.find_iter(question) {
        let token = m.as_str();
        if !STOP_WORDS.contains(&token) {
            keywords.insert(token.to_string());
        }
    }

    keywords.into_iter().collect()
}
