//! Last-resort extraction: the document body minus junk tags.

use scraper::{Html, Selector};
use std::collections::HashSet;
use std::sync::LazyLock;

use super::Article;
use super::readability::document_title;
use super::serialize::{RewritePlan, serialize_inner, text_content};

static BODY_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("body").expect("BUG: hardcoded body selector"));

static JUNK_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(
        "script, style, noscript, nav, header, footer, iframe, video, audio, svg, canvas, \
         object, embed, template",
    )
    .expect("BUG: hardcoded junk selector")
});

/// Title shown when a block page left nothing to extract.
pub const UNAVAILABLE_TITLE: &str = "内容无法获取";

/// Body shown when a block page left nothing to extract.
pub const UNAVAILABLE_TEXT: &str =
    "该页面触发了访问验证或反爬虫拦截，无法获取正文内容。请尝试直接粘贴文章文本进行核查。";

/// Body text and markup with junk tags removed, or `None` if no text remains.
pub fn strip_to_body(html: &str) -> Option<Article> {
    let document = Html::parse_document(html);
    let body = document.select(&BODY_SELECTOR).next()?;

    let remove: HashSet<_> = body.select(&JUNK_SELECTOR).map(|el| el.id()).collect();
    let plain_text = text_content(&body, &remove);
    if plain_text.is_empty() {
        return None;
    }

    let plan = RewritePlan::removing(remove);
    Some(Article {
        title: document_title(&document),
        content_html: serialize_inner(&body, &plan),
        plain_text,
    })
}

/// Placeholder article for a page that was blocked rather than empty.
pub fn unavailable_article() -> Article {
    Article {
        title: UNAVAILABLE_TITLE.to_string(),
        content_html: format!("<p>{UNAVAILABLE_TEXT}</p>"),
        plain_text: UNAVAILABLE_TEXT.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_body_text_without_chrome() {
        let html = "<html><head><title>T</title></head><body><header>站点导航</header>\
                    <div>正文一</div><script>x()</script><footer>版权</footer></body></html>";
        let article = strip_to_body(html).expect("body text");
        assert_eq!(article.plain_text, "正文一");
        assert_eq!(article.title, "T");
        assert_eq!(article.content_html, "<div>正文一</div>");
    }

    #[test]
    fn empty_body_is_none() {
        let html = "<html><body><nav>菜单</nav><script>x()</script></body></html>";
        assert!(strip_to_body(html).is_none());
    }
}
