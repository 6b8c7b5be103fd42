//! DOM serialization with node removal and image rewriting.
//!
//! scraper has no mutable DOM, so edits are expressed as a plan keyed by
//! `NodeId` and applied while serializing.

use ego_tree::NodeId;
use scraper::ElementRef;
use scraper::node::Node;
use std::collections::{HashMap, HashSet};

use crate::utils::normalize_whitespace;

/// Maximum nesting depth serialized. Deeper content is dropped with a warning.
const MAX_NESTING_DEPTH: usize = 100;

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

/// Elements whose text never belongs in plain text.
const NON_TEXT_ELEMENTS: &[&str] = &["script", "style", "noscript", "template", "head"];

/// Elements that start a new line in plain text.
const BLOCK_ELEMENTS: &[&str] = &[
    "address", "article", "aside", "blockquote", "dd", "div", "dl", "dt", "figcaption", "figure",
    "footer", "h1", "h2", "h3", "h4", "h5", "h6", "header", "hr", "li", "main", "nav", "ol", "p",
    "pre", "section", "table", "tr", "ul",
];

/// Attributes kept on rewritten `<img>` elements.
const KEPT_IMG_ATTRS: &[&str] = &["alt", "title", "width", "height"];

/// Edits applied during serialization.
#[derive(Debug, Default)]
pub struct RewritePlan {
    /// Elements skipped together with their subtree.
    pub remove: HashSet<NodeId>,
    /// `<img>` elements whose `src` is replaced; lazy-load attributes and
    /// `srcset` are dropped so the browser only sees the new source.
    pub image_src: HashMap<NodeId, String>,
}

impl RewritePlan {
    pub fn removing(remove: HashSet<NodeId>) -> Self {
        Self {
            remove,
            image_src: HashMap::new(),
        }
    }
}

/// Serialize the children of `element` applying `plan`.
pub fn serialize_inner(element: &ElementRef, plan: &RewritePlan) -> String {
    let mut out = String::new();
    serialize_children(element, plan, &mut out, 0);
    out
}

fn push_escaped(out: &mut String, text: &str) {
    out.push_str(&html_escape::encode_text(text));
}

fn push_attr(out: &mut String, name: &str, value: &str) {
    out.push(' ');
    out.push_str(name);
    out.push_str("=\"");
    out.push_str(&html_escape::encode_double_quoted_attribute(value));
    out.push('"');
}

/// Serialize `element` itself (tag included) applying `plan`.
pub fn serialize_outer(element: &ElementRef, plan: &RewritePlan) -> String {
    let mut out = String::new();
    if !plan.remove.contains(&element.id()) {
        serialize_element(element, plan, &mut out, 0);
    }
    out
}

fn serialize_element(element: &ElementRef, plan: &RewritePlan, out: &mut String, depth: usize) {
    let name = element.value().name();
    out.push('<');
    out.push_str(name);

    if let Some(src) = plan.image_src.get(&element.id()) {
        push_attr(out, "src", src);
        for (attr, value) in element.value().attrs() {
            if KEPT_IMG_ATTRS.contains(&attr) {
                push_attr(out, attr, value);
            }
        }
    } else {
        for (attr, value) in element.value().attrs() {
            push_attr(out, attr, value);
        }
    }
    out.push('>');

    if VOID_ELEMENTS.contains(&name) {
        return;
    }

    serialize_children(element, plan, out, depth + 1);

    out.push_str("</");
    out.push_str(name);
    out.push('>');
}

fn serialize_children(element: &ElementRef, plan: &RewritePlan, out: &mut String, depth: usize) {
    if depth > MAX_NESTING_DEPTH {
        tracing::warn!(
            element = element.value().name(),
            depth,
            "Maximum HTML nesting depth exceeded, truncating"
        );
        return;
    }

    for child in element.children() {
        match child.value() {
            Node::Text(text) => push_escaped(out, text),
            Node::Element(_) => {
                let Some(child_elem) = ElementRef::wrap(child) else {
                    continue;
                };
                if plan.remove.contains(&child_elem.id()) {
                    continue;
                }
                serialize_element(&child_elem, plan, out, depth);
            }
            _ => {}
        }
    }
}

/// Block-aware text of `element`, skipping removed subtrees, scripts and
/// styles. Whitespace is normalized per line and empty lines dropped.
pub fn text_content(element: &ElementRef, skip: &HashSet<NodeId>) -> String {
    let mut raw = String::new();
    collect_text(element, skip, &mut raw, 0);
    normalize_whitespace(&raw)
}

fn collect_text(element: &ElementRef, skip: &HashSet<NodeId>, out: &mut String, depth: usize) {
    if depth > MAX_NESTING_DEPTH {
        return;
    }

    for child in element.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(el) => {
                let Some(child_elem) = ElementRef::wrap(child) else {
                    continue;
                };
                let name = el.name();
                if skip.contains(&child_elem.id()) || NON_TEXT_ELEMENTS.contains(&name) {
                    continue;
                }
                if name == "br" {
                    out.push('\n');
                    continue;
                }
                let block = BLOCK_ELEMENTS.contains(&name);
                if block {
                    out.push('\n');
                }
                collect_text(&child_elem, skip, out, depth + 1);
                if block {
                    out.push('\n');
                }
            }
            _ => {}
        }
    }
}

/// Plain text of an HTML fragment.
pub fn fragment_text(html: &str) -> String {
    let fragment = scraper::Html::parse_fragment(html);
    text_content(&fragment.root_element(), &HashSet::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::{Html, Selector};

    fn body(doc: &Html) -> ElementRef<'_> {
        let sel = Selector::parse("body").expect("selector");
        doc.select(&sel).next().expect("body")
    }

    #[test]
    fn removes_planned_nodes() {
        let doc = Html::parse_document(
            "<html><body><nav>menu</nav><p>keep &amp; <b>this</b></p></body></html>",
        );
        let nav = Selector::parse("nav").expect("selector");
        let remove = doc.select(&nav).map(|e| e.id()).collect();
        let out = serialize_inner(&body(&doc), &RewritePlan::removing(remove));
        assert_eq!(out, "<p>keep &amp; <b>this</b></p>");
    }

    #[test]
    fn rewrites_image_sources() {
        let doc = Html::parse_document(
            r#"<html><body><img data-src="a.jpg" src="p.gif" alt="x" srcset="a 1x"></body></html>"#,
        );
        let img = Selector::parse("img").expect("selector");
        let id = doc.select(&img).next().expect("img").id();
        let mut plan = RewritePlan::default();
        plan.image_src.insert(id, "/proxy?url=a".to_string());
        let out = serialize_inner(&body(&doc), &plan);
        assert_eq!(out, r#"<img src="/proxy?url=a" alt="x">"#);
    }

    #[test]
    fn outer_keeps_own_tag() {
        let doc = Html::parse_document(r#"<html><body><div id="a"><p>x</p></div></body></html>"#);
        let div = Selector::parse("div").expect("selector");
        let el = doc.select(&div).next().expect("div");
        assert_eq!(
            serialize_outer(&el, &RewritePlan::default()),
            r#"<div id="a"><p>x</p></div>"#
        );
    }

    #[test]
    fn text_is_block_aware() {
        let doc = Html::parse_document(
            "<html><body><h1>Title</h1><p>one<br>two</p><script>var x;</script><div>three</div></body></html>",
        );
        assert_eq!(
            text_content(&body(&doc), &HashSet::new()),
            "Title\none\ntwo\nthree"
        );
    }

    #[test]
    fn fragment_text_strips_tags() {
        assert_eq!(
            fragment_text(r#"转发<a href="/n/x">@某人</a>：内容<br />第二行"#),
            "转发@某人：内容\n第二行"
        );
    }
}
