//! TF-IDF vectorizer for the sparse retrieval backend.
//!
//! Fits a vocabulary over the chunk texts and turns each text into an
//! L2-normalised sparse vector, so cosine similarity is a plain dot product.
//!
//! # Tokenisation
//!
//! - Latin letters and digits form words, lowercased; words shorter than
//!   two characters and English stop words are dropped.
//! - Every CJK ideograph is a token of its own. With the default
//!   `(1, 2)` n-gram range this indexes both single characters and
//!   character pairs, which is what makes Chinese questions match
//!   Chinese text without a word segmenter.
//!
//! # Weighting
//!
//! ```text
//! idf(t)   = ln((1 + n) / (1 + df(t))) + 1
//! w(t, d)  = count(t, d) × idf(t)          then L2-normalised per text
//! ```
//!
//! When `max_features` is smaller than the vocabulary, the terms with the
//! highest corpus frequency are kept (ties broken alphabetically).

use std::collections::{BTreeMap, HashMap, HashSet};

use once_cell::sync::Lazy;

/// Sparse vector as `(term index, weight)` pairs sorted by term index.
pub type SparseVector = Vec<(usize, f64)>;

#[derive(Debug, Clone, Copy)]
pub struct TfidfParams {
    pub max_features: usize,
    pub ngram_min: usize,
    pub ngram_max: usize,
}

impl Default for TfidfParams {
    fn default() -> Self {
        Self {
            max_features: 1000,
            ngram_min: 1,
            ngram_max: 2,
        }
    }
}

static ENGLISH_STOP_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "a", "about", "above", "after", "again", "against", "all", "also", "am", "an", "and",
        "any", "are", "as", "at", "be", "because", "been", "before", "being", "below",
        "between", "both", "but", "by", "can", "could", "did", "do", "does", "doing", "down",
        "during", "each", "either", "else", "etc", "ever", "every", "few", "for", "from",
        "further", "had", "has", "have", "having", "he", "her", "here", "hers", "herself",
        "him", "himself", "his", "how", "however", "i", "ie", "if", "in", "into", "is", "it",
        "its", "itself", "just", "may", "me", "might", "more", "most", "must", "my", "myself",
        "no", "nor", "not", "now", "of", "off", "on", "once", "one", "only", "or", "other",
        "our", "ours", "ourselves", "out", "over", "own", "per", "same", "she", "should",
        "since", "so", "some", "such", "than", "that", "the", "their", "theirs", "them",
        "themselves", "then", "there", "these", "they", "this", "those", "through", "thus",
        "to", "too", "under", "until", "up", "upon", "us", "very", "via", "was", "we", "were",
        "what", "when", "where", "whether", "which", "while", "who", "whom", "why", "will",
        "with", "within", "without", "would", "yet", "you", "your", "yours", "yourself",
    ]
    .into_iter()
    .collect()
});

/// True for CJK unified ideographs (basic block, extension A, compatibility).
pub fn is_cjk(c: char) -> bool {
    matches!(c, '\u{4e00}'..='\u{9fff}' | '\u{3400}'..='\u{4dbf}' | '\u{f900}'..='\u{faff}')
}

/// Split text into lowercase word tokens and single CJK characters.
pub fn tokenize(text: &str) -> Vec<String> {
    fn flush(word: &mut String, out: &mut Vec<String>) {
        if word.chars().count() >= 2 && !ENGLISH_STOP_WORDS.contains(word.as_str()) {
            out.push(std::mem::take(word));
        } else {
            word.clear();
        }
    }

    let mut out = Vec::new();
    let mut word = String::new();
    for c in text.chars() {
        if is_cjk(c) {
            flush(&mut word, &mut out);
            out.push(c.to_string());
        } else if c.is_alphanumeric() {
            word.extend(c.to_lowercase());
        } else {
            flush(&mut word, &mut out);
        }
    }
    flush(&mut word, &mut out);
    out
}

fn ngrams(tokens: &[String], min: usize, max: usize) -> Vec<String> {
    let mut out = Vec::new();
    for n in min..=max {
        if n == 0 || n > tokens.len() {
            continue;
        }
        for w in tokens.windows(n) {
            out.push(w.join(" "));
        }
    }
    out
}

fn term_counts(text: &str, params: &TfidfParams) -> HashMap<String, usize> {
    let mut counts = HashMap::new();
    for term in ngrams(&tokenize(text), params.ngram_min, params.ngram_max) {
        *counts.entry(term).or_insert(0) += 1;
    }
    counts
}

/// A fitted TF-IDF vocabulary.
#[derive(Debug, Clone)]
pub struct TfidfModel {
    params: TfidfParams,
    vocabulary: HashMap<String, usize>,
    idf: Vec<f64>,
}

impl TfidfModel {
    /// Fit on `texts` and return the model plus one vector per text.
    pub fn fit_transform(texts: &[&str], params: TfidfParams) -> (Self, Vec<SparseVector>) {
        let per_text: Vec<HashMap<String, usize>> =
            texts.iter().map(|t| term_counts(t, &params)).collect();

        let mut corpus_tf: HashMap<&str, usize> = HashMap::new();
        let mut df: HashMap<&str, usize> = HashMap::new();
        for counts in &per_text {
            for (term, n) in counts {
                *corpus_tf.entry(term.as_str()).or_insert(0) += n;
                *df.entry(term.as_str()).or_insert(0) += 1;
            }
        }

        let mut ranked: Vec<(&str, usize)> = corpus_tf.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        ranked.truncate(params.max_features);

        // Vocabulary indices follow alphabetical order, independent of hashing.
        let kept: BTreeMap<&str, usize> = ranked.into_iter().collect();
        let n_docs = texts.len() as f64;
        let mut vocabulary = HashMap::with_capacity(kept.len());
        let mut idf = Vec::with_capacity(kept.len());
        for (i, term) in kept.keys().enumerate() {
            vocabulary.insert(term.to_string(), i);
            let d = df.get(term).copied().unwrap_or(0) as f64;
            idf.push(((1.0 + n_docs) / (1.0 + d)).ln() + 1.0);
        }

        let model = Self {
            params,
            vocabulary,
            idf,
        };
        let vectors = per_text.iter().map(|c| model.weigh(c)).collect();
        (model, vectors)
    }

    /// Vectorise a new text (e.g. a query) against the fitted vocabulary.
    pub fn transform(&self, text: &str) -> SparseVector {
        self.weigh(&term_counts(text, &self.params))
    }

    pub fn vocabulary_len(&self) -> usize {
        self.idf.len()
    }

    fn weigh(&self, counts: &HashMap<String, usize>) -> SparseVector {
        let mut v: SparseVector = counts
            .iter()
            .filter_map(|(term, n)| {
                self.vocabulary
                    .get(term)
                    .map(|&i| (i, *n as f64 * self.idf[i]))
            })
            .collect();
        v.sort_by_key(|(i, _)| *i);

        let norm = v.iter().map(|(_, w)| w * w).sum::<f64>().sqrt();
        if norm > f64::EPSILON {
            for (_, w) in v.iter_mut() {
                *w /= norm;
            }
        }
        v
    }
}

/// Dot product of two index-sorted sparse vectors (cosine when both are normalised).
pub fn sparse_dot(a: &SparseVector, b: &SparseVector) -> f64 {
    let (mut i, mut j) = (0, 0);
    let mut dot = 0.0;
    while i < a.len() && j < b.len() {
        match a[i].0.cmp(&b[j].0) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                dot += a[i].1 * b[j].1;
                i += 1;
                j += 1;
            }
        }
    }
    dot
}
