//! Main-content extraction backed by the `readability` crate, with the
//! in-tree heuristic as fallback.

use scraper::Html;
use std::io::Cursor;
use tracing::debug;
use url::Url;

use super::readability::{HeuristicExtractor, MIN_ARTICLE_CHARS, document_title};
use super::{Article, ArticleExtractor};
use crate::utils::normalize_whitespace;

/// The default [`ArticleExtractor`].
///
/// Uses `readability` first; when it fails or yields too little text the
/// heuristic extractor gets a turn over the same markup.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReadabilityExtractor {
    fallback: HeuristicExtractor,
}

impl ReadabilityExtractor {
    fn extract_with_crate(html: &str, base_url: &str) -> Option<Article> {
        let url = Url::parse(base_url).ok()?;
        let product = match ::readability::extractor::extract(&mut Cursor::new(html), &url) {
            Ok(product) => product,
            Err(e) => {
                debug!("Readability extraction failed for {base_url}: {e}");
                return None;
            }
        };

        let plain_text = normalize_whitespace(&product.text);
        if plain_text.chars().count() < MIN_ARTICLE_CHARS {
            debug!(
                chars = plain_text.chars().count(),
                "Readability output too short"
            );
            return None;
        }

        let title = Some(document_title(&Html::parse_document(html)))
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| normalize_whitespace(&product.title));

        Some(Article {
            title,
            content_html: product.content,
            plain_text,
        })
    }
}

impl ArticleExtractor for ReadabilityExtractor {
    fn extract(&self, html: &str, base_url: &str) -> Option<Article> {
        Self::extract_with_crate(html, base_url).or_else(|| self.fallback.extract(html, base_url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn news_page() -> String {
        let paragraphs = "<p>市政府今日发布关于城市交通管理的新规定，自下月起施行，涉及停车、限行和公共交通三个方面，中心城区的路边停车位将实行分时段收费。</p>"
            .repeat(6);
        format!(
            r#"<html><head><title>站点标题</title>
            <meta property="og:title" content="市政府发布新规"></head>
            <body><div class="nav"><a href="/">首页</a></div>
            <div class="article-body">{paragraphs}</div></body></html>"#
        )
    }

    #[test]
    fn extracts_article_text_and_og_title() {
        let article = ReadabilityExtractor::default()
            .extract(&news_page(), "https://news.example.com/a.html")
            .expect("article");
        assert_eq!(article.title, "市政府发布新规");
        assert!(article.plain_text.contains("分时段收费"));
        assert!(!article.content_html.is_empty());
    }

    #[test]
    fn unparsable_base_url_uses_fallback() {
        let html = news_page();
        let article = ReadabilityExtractor::default()
            .extract(&html, "not a url")
            .expect("heuristic article");
        assert_eq!(
            Some(article),
            HeuristicExtractor.extract(&html, "not a url")
        );
    }

    #[test]
    fn short_page_is_none() {
        let html = "<html><body><p>一句话。</p></body></html>";
        assert!(
            ReadabilityExtractor::default()
                .extract(html, "https://example.com/")
                .is_none()
        );
    }
}
