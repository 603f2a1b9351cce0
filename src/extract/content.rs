use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Node, Selector};
use url::Url;

use crate::document::{Block, Inline};

static BOILERPLATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(nav|navbar|navigation|menu|footer|sidebar|side-bar|widget|breadcrumbs?|share|sharing|social|cookies?|consent|gdpr|banner|advert|advertisement|ads?|promo|sponsored|newsletter|subscribe|related|recommended|popup|modal|pagination|pager|skip-link)\b",
    )
    .unwrap()
});
static COMMENTS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(comments?|comment-list|commentlist|respond|disqus_thread)\b").unwrap());

/// Subtrees that never carry article text.
const SKIPPED_TAGS: &[&str] = &[
    "script", "style", "noscript", "template", "svg", "canvas", "iframe", "object", "embed",
    "nav", "footer", "aside", "form", "button", "select", "input", "textarea", "menu", "head",
    "dialog",
];

const BLOCK_TAGS: &[&str] = &[
    "p", "h1", "h2", "h3", "h4", "h5", "h6", "ul", "ol", "dl", "li", "dd", "dt", "blockquote",
    "pre", "div", "section", "article", "main", "header", "table", "thead", "tbody", "tfoot",
    "tr", "td", "th", "figure", "figcaption", "address", "details", "summary", "center", "hr",
];

/// Content-root candidates, most specific first.
pub(super) const ROOT_SELECTORS: &[&str] = &[
    "article",
    "main",
    "[role='main']",
    "#content",
    ".content",
    ".post-content",
    ".entry-content",
];

pub(super) const COMMENT_SELECTORS: &[&str] = &[
    "#comments",
    ".comments",
    ".comment-list",
    ".commentlist",
    "#disqus_thread",
    ".comments-area",
];

/// Depth-first walk over a content root that turns block elements into
/// `Block`s and everything inline into `Inline` runs.
pub(super) struct Walker<'a> {
    base: &'a Url,
    include_links: bool,
    skip_headers: bool,
    in_comments: bool,
    blocks: Vec<Block>,
}

impl<'a> Walker<'a> {
    pub fn new(base: &'a Url, include_links: bool) -> Self {
        Self {
            base,
            include_links,
            skip_headers: false,
            in_comments: false,
            blocks: Vec::new(),
        }
    }

    /// Page-level `<header>` elements hold branding, not content. Only
    /// relevant when walking from `<body>`.
    pub fn skipping_headers(mut self) -> Self {
        self.skip_headers = true;
        self
    }

    pub fn for_comments(mut self) -> Self {
        self.in_comments = true;
        self
    }

    pub fn walk(mut self, root: ElementRef<'_>) -> Vec<Block> {
        self.container(root);
        self.blocks
    }

    pub fn is_skipped(&self, el: ElementRef<'_>) -> bool {
        let v = el.value();
        let name = v.name();
        if SKIPPED_TAGS.contains(&name) || (name == "header" && self.skip_headers) {
            return true;
        }
        if v.attr("hidden").is_some() || v.attr("aria-hidden") == Some("true") {
            return true;
        }
        if let Some(style) = v.attr("style") {
            let style = style.replace(' ', "").to_ascii_lowercase();
            if style.contains("display:none") || style.contains("visibility:hidden") {
                return true;
            }
        }
        if let Some(role) = v.attr("role") {
            if matches!(
                role,
                "navigation" | "banner" | "contentinfo" | "complementary" | "search" | "dialog"
            ) {
                return true;
            }
        }

        let marker = format!(
            "{} {}",
            v.classes().collect::<Vec<_>>().join(" "),
            v.id().unwrap_or_default()
        );
        if marker.trim().is_empty() {
            return false;
        }
        BOILERPLATE_RE.is_match(&marker) || (!self.in_comments && COMMENTS_RE.is_match(&marker))
    }

    fn container(&mut self, el: ElementRef<'_>) {
        let mut pending: Vec<Inline> = Vec::new();
        for child in el.children() {
            match child.value() {
                Node::Text(text) => push_text(&mut pending, text),
                Node::Element(_) => {
                    let Some(child_el) = ElementRef::wrap(child) else {
                        continue;
                    };
                    if self.is_skipped(child_el) {
                        continue;
                    }
                    let name = child_el.value().name();
                    if name == "br" {
                        push_text(&mut pending, " ");
                    } else if BLOCK_TAGS.contains(&name) {
                        self.flush(&mut pending);
                        self.block(child_el);
                    } else {
                        self.inline(child_el, &mut pending);
                    }
                }
                _ => {}
            }
        }
        self.flush(&mut pending);
    }

    fn block(&mut self, el: ElementRef<'_>) {
        let name = el.value().name();
        match name {
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                let level = name[1..].parse().unwrap_or(1);
                if let Some(content) = finish(self.inline_content(el)) {
                    self.blocks.push(Block::Head { level, content });
                }
            }
            "ul" | "ol" => {
                let items: Vec<Vec<Inline>> = el
                    .children()
                    .filter_map(ElementRef::wrap)
                    .filter(|li| li.value().name() == "li" && !self.is_skipped(*li))
                    .filter_map(|li| finish(self.inline_content(li)))
                    .collect();
                if !items.is_empty() {
                    self.blocks.push(Block::List { items });
                }
            }
            "blockquote" => {
                if let Some(content) = finish(self.inline_content(el)) {
                    self.blocks.push(Block::Quote { content });
                }
            }
            "hr" => {}
            "p" | "pre" => self.paragraph(el),
            _ if has_block_children(el) => self.container(el),
            _ => self.paragraph(el),
        }
    }

    fn paragraph(&mut self, el: ElementRef<'_>) {
        if let Some(content) = finish(self.inline_content(el)) {
            self.blocks.push(Block::Paragraph { content });
        }
    }

    fn flush(&mut self, pending: &mut Vec<Inline>) {
        if let Some(content) = finish(std::mem::take(pending)) {
            self.blocks.push(Block::Paragraph { content });
        }
    }

    fn inline_content(&self, el: ElementRef<'_>) -> Vec<Inline> {
        let mut out = Vec::new();
        self.inline_children(el, &mut out);
        out
    }

    fn inline(&self, el: ElementRef<'_>, out: &mut Vec<Inline>) {
        if self.include_links && el.value().name() == "a" {
            if let Some(target) = el.value().attr("href").and_then(|h| resolve(self.base, h)) {
                let text = collapse_ws(&crate::document::inline_text(&self.inline_content(el)));
                if !text.trim().is_empty() {
                    out.push(Inline::Link { target, text });
                }
                return;
            }
        }
        self.inline_children(el, out);
    }

    fn inline_children(&self, el: ElementRef<'_>, out: &mut Vec<Inline>) {
        for child in el.children() {
            match child.value() {
                Node::Text(text) => push_text(out, text),
                Node::Element(_) => {
                    let Some(child_el) = ElementRef::wrap(child) else {
                        continue;
                    };
                    if self.is_skipped(child_el) {
                        continue;
                    }
                    let name = child_el.value().name();
                    if name == "br" {
                        push_text(out, " ");
                    } else if BLOCK_TAGS.contains(&name) {
                        // flattened block inside an inline context keeps word boundaries
                        push_text(out, " ");
                        self.inline(child_el, out);
                        push_text(out, " ");
                    } else {
                        self.inline(child_el, out);
                    }
                }
                _ => {}
            }
        }
    }
}

fn has_block_children(el: ElementRef<'_>) -> bool {
    el.children()
        .filter_map(ElementRef::wrap)
        .any(|c| BLOCK_TAGS.contains(&c.value().name()))
}

fn resolve(base: &Url, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') || href.starts_with("javascript:") {
        return None;
    }
    base.join(href).ok().map(|u| u.to_string())
}

fn push_text(out: &mut Vec<Inline>, text: &str) {
    if let Some(Inline::Text { text: last }) = out.last_mut() {
        last.push_str(text);
    } else {
        out.push(Inline::Text {
            text: text.to_string(),
        });
    }
}

fn text_mut(inline: &mut Inline) -> &mut String {
    match inline {
        Inline::Text { text } | Inline::Link { text, .. } => text,
    }
}

/// Collapse every whitespace run to one space and drop control characters.
pub(super) fn collapse_ws(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_ws = false;
    for c in s.chars() {
        if c.is_whitespace() {
            if !in_ws {
                out.push(' ');
                in_ws = true;
            }
        } else if !c.is_control() {
            out.push(c);
            in_ws = false;
        }
    }
    out
}

/// Normalise inline runs into block content: merged text runs, single spaces
/// at run boundaries, trimmed ends. `None` when nothing readable remains.
fn finish(content: Vec<Inline>) -> Option<Vec<Inline>> {
    let mut out: Vec<Inline> = Vec::with_capacity(content.len());
    for inline in content {
        match inline {
            Inline::Text { text } => push_text(&mut out, &text),
            link => out.push(link),
        }
    }

    let mut prev_space = true;
    for inline in out.iter_mut() {
        let text = text_mut(inline);
        *text = collapse_ws(text);
        if prev_space {
            *text = text.trim_start().to_string();
        }
        if !text.is_empty() {
            prev_space = text.ends_with(' ');
        }
    }
    if let Some(last) = out.iter_mut().rev().find(|i| !i.text().is_empty()) {
        let text = text_mut(last);
        *text = text.trim_end().to_string();
    }
    out.retain(|i| !i.text().is_empty());

    if out.is_empty() {
        None
    } else {
        Some(out)
    }
}

pub(super) fn text_len(blocks: &[Block]) -> usize {
    blocks.iter().map(|b| b.text().chars().count()).sum()
}

pub(super) fn select_first<'h>(html: &'h Html, selector: &str) -> Option<ElementRef<'h>> {
    let selector = Selector::parse(selector).ok()?;
    html.select(&selector).next()
}

/// Whether any ancestor of `el` would be skipped by the walker.
pub(super) fn inside_boilerplate(walker: &Walker<'_>, el: ElementRef<'_>) -> bool {
    el.ancestors()
        .filter_map(ElementRef::wrap)
        .any(|a| walker.is_skipped(a))
}

#[derive(Debug, Default)]
pub(super) struct PageMeta {
    pub title: Option<String>,
    pub sitename: Option<String>,
    pub description: Option<String>,
    pub language: Option<String>,
}

pub(super) fn page_meta(html: &Html) -> PageMeta {
    PageMeta {
        title: meta_content(html, r#"meta[property="og:title"]"#)
            .or_else(|| element_text(html, "title"))
            .or_else(|| element_text(html, "h1")),
        sitename: meta_content(html, r#"meta[property="og:site_name"]"#),
        description: meta_content(html, r#"meta[name="description"]"#)
            .or_else(|| meta_content(html, r#"meta[property="og:description"]"#)),
        language: html
            .root_element()
            .value()
            .attr("lang")
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string),
    }
}

fn meta_content(html: &Html, selector: &str) -> Option<String> {
    select_first(html, selector)
        .and_then(|el| el.value().attr("content"))
        .map(|c| collapse_ws(c).trim().to_string())
        .filter(|c| !c.is_empty())
}

fn element_text(html: &Html, selector: &str) -> Option<String> {
    select_first(html, selector)
        .map(|el| collapse_ws(&el.text().collect::<String>()).trim().to_string())
        .filter(|t| !t.is_empty())
}
