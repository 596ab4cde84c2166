//! Image-vs-text triage of a question.
//!
//! The LLM is asked to classify the question and must reply with exactly
//! `p,n` (`0,n` for the document-wide n-th image, `p,n` for image n on page
//! p, `0,0` otherwise) or the JSON object `{"page": p, "image": n}`. Any
//! other reply means "not an image question"; nothing is salvaged from a
//! reply that does not match.
//!
//! A fallback completion carries no classification, so when the gateway is
//! offline or failing the question goes through [`classify_by_rules`].

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use tracing::debug;

use crate::error::{QaError, QaResult};
use crate::gateway::Gateway;
use crate::images::{ImageCatalog, DESCRIPTION_NOT_FOUND};
use crate::models::{ImageRecord, RoutingDecision};

static PAIR_REPLY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+)\s*[,，]\s*(\d+)$").expect("static regex"));

const NUM: &str = r"([0-9]+|[一二两三四五六七八九十]+)";

static RULE_PAGE_IMAGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"第\s*{NUM}\s*页.*?第\s*{NUM}\s*[张个幅]")).expect("static regex")
});
static RULE_GLOBAL_IMAGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"第\s*{NUM}\s*[张个幅]\s*(?:图|插图|照片)")).expect("static regex")
});
static RULE_EN_PAGE_IMAGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bpage\s+(\d+)\b.*?\b(?:figure|fig\.?|image|picture)\s*(\d+)")
        .expect("static regex")
});
static RULE_EN_GLOBAL_IMAGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:figure|fig\.?|image|picture)\s*(\d+)").expect("static regex")
});

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct JsonReply {
    page: u32,
    image: u32,
}

pub fn routing_prompt(question: &str) -> String {
    format!(
        "判断下面的问题是否在询问文档中的某一张图片。\n\
         - 如果询问全文的第n张图片，只输出：0,n\n\
         - 如果询问第m页的第n张图片，只输出：m,n\n\
         - 如果与图片无关，只输出：0,0\n\
         不要输出任何其他内容。\n\
         问题：{}",
        question
    )
}

/// Validate a classification reply against the `p,n` / JSON schema.
pub fn parse_routing_reply(reply: &str) -> QaResult<RoutingDecision> {
    let body = reply
        .trim()
        .trim_matches(|c: char| c == '`' || c == '"' || c == '\'')
        .trim();
    let schema_err = || QaError::RoutingParse {
        reply: reply.to_string(),
    };

    if body.starts_with('{') {
        let parsed: JsonReply = serde_json::from_str(body).map_err(|_| schema_err())?;
        return Ok(RoutingDecision::from_pair(parsed.page, parsed.image));
    }

    let caps = PAIR_REPLY.captures(body).ok_or_else(schema_err)?;
    let page = caps[1].parse().map_err(|_| schema_err())?;
    let ordinal = caps[2].parse().map_err(|_| schema_err())?;
    Ok(RoutingDecision::from_pair(page, ordinal))
}

/// Local classifier for when no LLM classification is available.
///
/// Recognises `第p页…第n张`, `第n张图`, `page p … figure n` and `figure n`
/// (Arabic or simple Chinese numerals).
pub fn classify_by_rules(question: &str) -> RoutingDecision {
    let pair = |re: &Regex| -> Option<(u32, u32)> {
        let caps = re.captures(question)?;
        Some((parse_number(&caps[1])?, parse_number(&caps[2])?))
    };
    let single = |re: &Regex| -> Option<u32> { parse_number(&re.captures(question)?[1]) };

    if let Some((page, n)) = pair(&*RULE_PAGE_IMAGE).or_else(|| pair(&*RULE_EN_PAGE_IMAGE)) {
        return RoutingDecision::from_pair(page, n);
    }
    if let Some(n) = single(&*RULE_GLOBAL_IMAGE).or_else(|| single(&*RULE_EN_GLOBAL_IMAGE)) {
        return RoutingDecision::from_pair(0, n);
    }
    RoutingDecision::text()
}

/// Arabic digits, or Chinese numerals up to 99.
fn parse_number(s: &str) -> Option<u32> {
    if let Ok(n) = s.parse() {
        return Some(n);
    }
    let digit = |c: char| -> Option<u32> {
        Some(match c {
            '一' => 1,
            '二' | '两' => 2,
            '三' => 3,
            '四' => 4,
            '五' => 5,
            '六' => 6,
            '七' => 7,
            '八' => 8,
            '九' => 9,
            _ => return None,
        })
    };
    let chars: Vec<char> = s.chars().collect();
    match chars.as_slice() {
        [c] if *c == '十' => Some(10),
        [c] => digit(*c),
        ['十', ones] => Some(10 + digit(*ones)?),
        [tens, '十'] => Some(digit(*tens)? * 10),
        [tens, '十', ones] => Some(digit(*tens)? * 10 + digit(*ones)?),
        _ => None,
    }
}

/// Classify `question`; never fails.
pub async fn route(gateway: &Gateway, question: &str) -> RoutingDecision {
    let completion = gateway.complete(&routing_prompt(question)).await;
    if completion.is_fallback() {
        let decision = classify_by_rules(question);
        debug!(?decision, "routed by local rules");
        return decision;
    }

    match parse_routing_reply(&completion.text) {
        Ok(decision) => {
            debug!(?decision, "routed by LLM");
            decision
        }
        Err(e) => {
            debug!(error = %e, "treating question as text question");
            RoutingDecision::text()
        }
    }
}

/// A figure resolved from a routing decision.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageHit {
    pub record: ImageRecord,
    /// The stored description, or [`DESCRIPTION_NOT_FOUND`].
    pub description: String,
}

/// Look the decision up in the catalog; `None` sends the question down the
/// text path.
pub fn resolve(catalog: &ImageCatalog, decision: &RoutingDecision) -> Option<ImageHit> {
    if !decision.is_image_question {
        return None;
    }
    let Some(record) = catalog.resolve(decision) else {
        let e = QaError::ImageNotFound {
            page: decision.page,
            ordinal: decision.ordinal,
        };
        debug!(error = %e, "answering from text instead");
        return None;
    };
    Some(ImageHit {
        description: record
            .description
            .clone()
            .unwrap_or_else(|| DESCRIPTION_NOT_FOUND.to_string()),
        record: record.clone(),
    })
}
