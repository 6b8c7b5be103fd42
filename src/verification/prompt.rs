//! Prompt text and image preparation for the verification loop.

use std::collections::HashSet;

use crate::classifier::is_format_blocked;
use crate::search::{SearchHit, format_results_compact};
use crate::utils::{MAX_RESULT_IMAGES, from_proxy_url, is_valid_url, truncate_plain_text};

/// URL fragments of verification images and tracking probes.
const PROBE_PATTERNS: &[&str] = &[
    "captcha",
    "geetest",
    "verifycode",
    "verify_code",
    "checkcode",
    "/probe",
];

pub const SYSTEM_PROMPT: &str = r#"你是一名严谨的事实核查编辑。你的任务是判断用户提供的内容（文字及图片）是否属实。

工作方式：
1. 先仔细阅读内容，找出其中可核查的关键事实（时间、地点、人物、数据、引语、图片所示场景）。
2. 如果凭现有信息无法可靠判断，可以请求一次网络检索。每次只能给出一个检索关键词，关键词应简短、具体。
3. 收到检索结果后继续分析；如有必要可以再次检索，直到可以给出结论。
4. 检索失败时不要反复使用同一关键词，应换用其他关键词或基于现有信息作出判断。

你的每一次回复都必须是且仅是一个 JSON 对象，不要输出任何其他文字。

需要检索时：
{"needs_search": true, "search_query": "检索关键词"}

给出结论时：
{
  "needs_search": false,
  "probability": 0 到 100 之间的数字，表示内容属实的可能性,
  "verdict": "Real" | "Mixed" | "Fake",
  "explanation": "简要说明判断依据",
  "analysis_points": [{"description": "核查要点", "status": "supported" | "refuted" | "unverified"}],
  "flagged_segments": [{"text": "原文中有问题的片段", "riskType": "风险类型", "reason": "原因"}],
  "flagged_images": [{"url": "有问题的图片链接", "reason": "原因"}]
}"#;

/// Original URLs of the images worth showing to the model.
///
/// Proxied URLs are unwrapped; animated/vector formats, non-HTTP URLs and
/// CAPTCHA/probe images are dropped. Order is kept, duplicates removed.
pub fn prepare_images(images: &[String], proxy_base: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    images
        .iter()
        .map(|url| from_proxy_url(proxy_base, url.trim()))
        .filter(|url| is_valid_url(url) && !is_format_blocked(url) && !is_probe_image(url))
        .filter(|url| seen.insert(url.clone()))
        .take(MAX_RESULT_IMAGES)
        .collect()
}

fn is_probe_image(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    PROBE_PATTERNS.iter().any(|p| lower.contains(p))
}

/// First user turn: the content under review.
pub fn initial_request(content: &str, source_url: Option<&str>, image_count: usize) -> String {
    let mut text = String::from("请核查以下内容的真实性。\n");
    if let Some(url) = source_url.filter(|u| !u.trim().is_empty()) {
        text.push_str(&format!("来源链接: {url}\n"));
    }
    if image_count > 0 {
        text.push_str(&format!("附带图片: {image_count} 张（见下方）\n"));
    }

    let body = content.trim();
    if body.is_empty() {
        text.push_str("\n该内容没有文字部分，请根据图片进行判断。");
    } else {
        text.push_str("\n---- 内容开始 ----\n");
        text.push_str(&truncate_plain_text(body));
        text.push_str("\n---- 内容结束 ----");
    }
    text
}

fn next_step(next_round: u32, max_rounds: u32) -> &'static str {
    if next_round >= max_rounds {
        "这是最后一轮，请不要再请求检索，直接给出最终结论。"
    } else {
        "请结合以上信息继续分析；如仍需检索，请给出新的关键词，否则给出最终结论。"
    }
}

/// User turn carrying search hits back to the model.
pub fn search_results_message(
    query: &str,
    hits: &[SearchHit],
    next_round: u32,
    max_rounds: u32,
) -> String {
    format!(
        "检索结果如下：\n{}\n\n{}",
        format_results_compact(query, hits),
        next_step(next_round, max_rounds)
    )
}

/// User turn reporting a failed search.
pub fn search_failed_message(query: &str, error: &str, next_round: u32, max_rounds: u32) -> String {
    format!(
        "检索失败（关键词: {query}）：{error}\n本次检索没有获得任何结果，请不要依赖它。\n\n{}",
        next_step(next_round, max_rounds)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn images_are_unproxied_and_filtered() {
        let images = vec![
            "/api/image-proxy?url=https%3A%2F%2Fa.example%2Fx.jpg".to_string(),
            "https://a.example/x.jpg".to_string(),
            "https://a.example/anim.gif".to_string(),
            "https://a.example/captcha/1.png".to_string(),
            "data:image/png;base64,AAAA".to_string(),
            "https://b.example/y.png".to_string(),
        ];
        assert_eq!(
            prepare_images(&images, "/api/image-proxy"),
            vec![
                "https://a.example/x.jpg".to_string(),
                "https://b.example/y.png".to_string()
            ]
        );
    }

    #[test]
    fn image_only_request_says_so() {
        let text = initial_request("", Some("https://a.example/x.jpg"), 1);
        assert!(text.contains("来源链接: https://a.example/x.jpg"));
        assert!(text.contains("根据图片"));
    }

    #[test]
    fn last_round_asks_for_verdict() {
        let text = search_results_message("q", &[], 4, 4);
        assert!(text.contains("最后一轮"));
        assert!(text.contains("未找到相关结果"));
    }
}
