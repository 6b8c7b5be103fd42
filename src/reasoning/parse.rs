//! Strict parsing of reasoning replies.
//!
//! Replies are JSON, possibly wrapped in a fenced code block or surrounded
//! by prose. The parsed object must be either a search request or a final
//! verdict; anything else is an error.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReplyParseError {
    #[error("Reply contains no JSON object")]
    NoJson,

    #[error("Reply JSON is malformed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Reply is missing `{0}`")]
    MissingField(&'static str),

    #[error("Reply has an invalid `{field}`: {value}")]
    InvalidValue { field: &'static str, value: String },
}

/// Real / Mixed / Fake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Real,
    Mixed,
    Fake,
}

impl Verdict {
    /// Accepts English and Chinese labels, case-insensitively.
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "real" | "true" | "真实" | "属实" => Some(Self::Real),
            "mixed" | "partly" | "partial" | "uncertain" | "部分真实" | "存疑" | "待定" => {
                Some(Self::Mixed)
            }
            "fake" | "false" | "虚假" | "谣言" => Some(Self::Fake),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointStatus {
    Supported,
    Refuted,
    Unverified,
}

impl PointStatus {
    /// Unknown labels become `Unverified`.
    fn parse(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "supported" | "true" | "verified" | "confirmed" | "pass" | "属实" | "证实" => {
                Self::Supported
            }
            "refuted" | "false" | "fail" | "contradicted" | "不实" | "错误" => Self::Refuted,
            _ => Self::Unverified,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisPoint {
    pub description: String,
    pub status: PointStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlaggedSegment {
    pub text: String,
    pub risk_type: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlaggedImage {
    pub url: String,
    pub reason: String,
}

/// Verdict fields of one reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerdictDraft {
    /// Likelihood the content is true, 0 to 100.
    pub probability: f64,
    pub verdict: Verdict,
    pub explanation: String,
    pub analysis_points: Vec<AnalysisPoint>,
    pub flagged_segments: Vec<FlaggedSegment>,
    pub flagged_images: Vec<FlaggedImage>,
}

/// What the reasoning service asked for.
#[derive(Debug, Clone, PartialEq)]
pub enum ReasoningReply {
    /// Search for `query` and call again. `fallback` holds any verdict
    /// fields the reply already carried.
    NeedsSearch {
        query: String,
        fallback: Option<VerdictDraft>,
    },
    Final(VerdictDraft),
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawPoint {
    #[serde(alias = "point", alias = "content")]
    description: String,
    status: serde_json::Value,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawSegment {
    #[serde(alias = "segment", alias = "quote")]
    text: String,
    #[serde(alias = "riskType", alias = "type")]
    risk_type: String,
    reason: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawImage {
    #[serde(alias = "image", alias = "image_url")]
    url: String,
    reason: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawReply {
    #[serde(alias = "needsSearch")]
    needs_search: Option<bool>,
    #[serde(alias = "searchQuery")]
    search_query: Option<String>,
    probability: Option<serde_json::Value>,
    verdict: Option<String>,
    explanation: Option<String>,
    #[serde(alias = "analysisPoints")]
    analysis_points: Vec<RawPoint>,
    #[serde(alias = "flaggedSegments")]
    flagged_segments: Vec<RawSegment>,
    #[serde(alias = "flaggedImages")]
    flagged_images: Vec<RawImage>,
}

/// Drop a surrounding ```json fence if present.
fn strip_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Skip the info string (`json`, `JSON`, ...) up to the first newline
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

/// First balanced `{...}` in `text`, honouring JSON string escapes.
pub fn first_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}

fn parse_probability(value: &serde_json::Value) -> Result<f64, ReplyParseError> {
    let invalid = || ReplyParseError::InvalidValue {
        field: "probability",
        value: value.to_string(),
    };
    let number = match value {
        serde_json::Value::Number(n) => n.as_f64().ok_or_else(invalid)?,
        serde_json::Value::String(s) => s
            .trim()
            .trim_end_matches('%')
            .trim()
            .parse::<f64>()
            .map_err(|_| invalid())?,
        _ => return Err(invalid()),
    };
    if !number.is_finite() {
        return Err(invalid());
    }
    Ok(number.clamp(0.0, 100.0))
}

fn status_label(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Bool(b) => b.to_string(),
        _ => String::new(),
    }
}

fn draft_from(raw: &RawReply) -> Result<VerdictDraft, ReplyParseError> {
    let label = raw
        .verdict
        .as_deref()
        .ok_or(ReplyParseError::MissingField("verdict"))?;
    let verdict = Verdict::parse(label).ok_or_else(|| ReplyParseError::InvalidValue {
        field: "verdict",
        value: label.to_string(),
    })?;
    let probability = parse_probability(
        raw.probability
            .as_ref()
            .ok_or(ReplyParseError::MissingField("probability"))?,
    )?;

    Ok(VerdictDraft {
        probability,
        verdict,
        explanation: raw.explanation.clone().unwrap_or_default(),
        analysis_points: raw
            .analysis_points
            .iter()
            .filter(|p| !p.description.trim().is_empty())
            .map(|p| AnalysisPoint {
                description: p.description.clone(),
                status: PointStatus::parse(&status_label(&p.status)),
            })
            .collect(),
        flagged_segments: raw
            .flagged_segments
            .iter()
            .filter(|s| !s.text.trim().is_empty())
            .map(|s| FlaggedSegment {
                text: s.text.clone(),
                risk_type: s.risk_type.clone(),
                reason: s.reason.clone(),
            })
            .collect(),
        flagged_images: raw
            .flagged_images
            .iter()
            .filter(|i| !i.url.trim().is_empty())
            .map(|i| FlaggedImage {
                url: i.url.clone(),
                reason: i.reason.clone(),
            })
            .collect(),
    })
}

fn decode(text: &str) -> Result<RawReply, ReplyParseError> {
    let candidate = strip_fence(text);
    match serde_json::from_str::<RawReply>(candidate) {
        Ok(raw) => Ok(raw),
        Err(direct) => {
            let Some(object) = first_json_object(candidate) else {
                return Err(if candidate.contains('{') {
                    ReplyParseError::Json(direct)
                } else {
                    ReplyParseError::NoJson
                });
            };
            Ok(serde_json::from_str::<RawReply>(object)?)
        }
    }
}

/// Parse one reply into a search request or a final verdict.
pub fn parse_reply(text: &str) -> Result<ReasoningReply, ReplyParseError> {
    let raw = decode(text)?;

    let query = raw
        .search_query
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty());

    match (raw.needs_search.unwrap_or(false), query) {
        (true, Some(query)) => Ok(ReasoningReply::NeedsSearch {
            query: query.to_string(),
            fallback: draft_from(&raw).ok(),
        }),
        (true, None) if raw.verdict.is_none() => Err(ReplyParseError::MissingField("search_query")),
        _ => Ok(ReasoningReply::Final(draft_from(&raw)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fenced_final_verdict() {
        let text = "```json\n{\"needs_search\": false, \"probability\": 85, \"verdict\": \"Real\",\
                    \"explanation\": \"可信\", \"analysis_points\": [{\"description\": \"来源可靠\", \"status\": \"supported\"}]}\n```";
        let ReasoningReply::Final(draft) = parse_reply(text).expect("parses") else {
            panic!("expected final");
        };
        assert_eq!(draft.verdict, Verdict::Real);
        assert_eq!(draft.probability, 85.0);
        assert_eq!(draft.analysis_points[0].status, PointStatus::Supported);
    }

    #[test]
    fn object_inside_prose() {
        let text = "好的，结论如下：{\"needsSearch\": true, \"searchQuery\": \"某地 {暴雨} 新闻\"} 以上。";
        assert_eq!(
            parse_reply(text).expect("parses"),
            ReasoningReply::NeedsSearch {
                query: "某地 {暴雨} 新闻".to_string(),
                fallback: None,
            }
        );
    }

    #[test]
    fn search_request_keeps_partial_verdict() {
        let text = r#"{"needs_search": true, "search_query": "X", "probability": "40%", "verdict": "存疑"}"#;
        let ReasoningReply::NeedsSearch { fallback, .. } = parse_reply(text).expect("parses") else {
            panic!("expected search");
        };
        let fallback = fallback.expect("fallback");
        assert_eq!(fallback.verdict, Verdict::Mixed);
        assert_eq!(fallback.probability, 40.0);
    }

    #[test]
    fn shape_mismatch_fails_loudly() {
        assert!(matches!(parse_reply("没有 JSON"), Err(ReplyParseError::NoJson)));
        assert!(matches!(
            parse_reply(r#"{"probability": 10}"#),
            Err(ReplyParseError::MissingField("verdict"))
        ));
        assert!(matches!(
            parse_reply(r#"{"verdict": "maybe", "probability": 10}"#),
            Err(ReplyParseError::InvalidValue { field: "verdict", .. })
        ));
        assert!(matches!(
            parse_reply(r#"{"needs_search": true}"#),
            Err(ReplyParseError::MissingField("search_query"))
        ));
    }

    #[test]
    fn balanced_object_skips_braces_in_strings() {
        assert_eq!(
            first_json_object(r#"x {"a": "}", "b": {"c": 1}} y"#),
            Some(r#"{"a": "}", "b": {"c": 1}}"#)
        );
    }

    #[test]
    fn unknown_point_status_is_unverified() {
        assert_eq!(PointStatus::parse("whatever"), PointStatus::Unverified);
    }
}
