//! Content fetching: download an article and reduce it to link-preserving text.
//!
//! The HTML handling is a small tag scanner, not a full parser. It is enough to
//! locate the main content container and flatten it into Markdown-ish text with
//! inline `[text](href)` links, headings and list bullets.

use regex::Regex;
use std::future::Future;
use std::pin::Pin;
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";
const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid URL '{0}': only http and https are supported")]
    InvalidUrl(String),
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("no article content found at {0}")]
    NoContent(String),
}

pub type FetchFuture<'a> = Pin<Box<dyn Future<Output = Result<String, FetchError>> + Send + 'a>>;

/// Source of article text.
pub trait ContentFetcher: Send + Sync {
    /// Fetch `url` and return whitespace-normalized text with links kept inline.
    fn fetch<'a>(&'a self, url: &'a str) -> FetchFuture<'a>;
}

/// Plain HTTP fetcher.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self { client })
    }

    async fn fetch_text(&self, url: &str) -> Result<String, FetchError> {
        let parsed = validate_url(url)?;

        tracing::info!(url = %parsed, "Fetching article");
        let response = self.client.get(parsed.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        let html = response.text().await?;

        let text = extract_article_text(&html, Some(&parsed));
        if text.is_empty() {
            tracing::warn!(url, "Located no article text");
            return Err(FetchError::NoContent(url.to_string()));
        }
        tracing::info!(url, chars = text.chars().count(), "Extracted article text");
        Ok(text)
    }
}

impl ContentFetcher for HttpFetcher {
    fn fetch<'a>(&'a self, url: &'a str) -> FetchFuture<'a> {
        Box::pin(self.fetch_text(url))
    }
}

/// Accept only absolute http(s) URLs.
pub fn validate_url(raw: &str) -> Result<url::Url, FetchError> {
    match url::Url::parse(raw.trim()) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => Ok(parsed),
        _ => Err(FetchError::InvalidUrl(raw.to_string())),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// WHITESPACE
// ═══════════════════════════════════════════════════════════════════════════════

/// Collapse space/tab runs, trim every line, keep at most one blank line
/// between paragraphs and none at either end.
pub fn normalize_whitespace(text: &str) -> String {
    let mut lines: Vec<String> = Vec::new();
    for line in text.lines() {
        let collapsed = line
            .split([' ', '\t', '\u{a0}'])
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        if collapsed.is_empty() {
            if lines.last().is_some_and(|last| !last.is_empty()) {
                lines.push(String::new());
            }
        } else {
            lines.push(collapsed);
        }
    }
    while lines.last().is_some_and(String::is_empty) {
        lines.pop();
    }
    lines.join("\n")
}

// ═══════════════════════════════════════════════════════════════════════════════
// HTML SCANNING
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq)]
enum Token<'a> {
    Open { name: String, attrs: &'a str },
    Close { name: String },
    Text(&'a str),
}

/// Containers tried in order; the first match wins.
const CONTENT_SELECTORS: &[Selector] = &[
    Selector::TagClass("div", "article-body"),
    Selector::Tag("article"),
    Selector::Tag("main"),
    Selector::Attr("role", "main"),
    Selector::Class("content"),
    Selector::Class("post-content"),
    Selector::Class("entry-content"),
    Selector::Id("content"),
    Selector::Class("article-content"),
    Selector::Class("documentation-content"),
    Selector::Tag("body"),
];

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source",
    "track", "wbr",
];

const SKIPPED_ELEMENTS: &[&str] = &["script", "style", "noscript", "template", "svg", "head"];

const BLOCK_ELEMENTS: &[&str] = &[
    "p", "div", "section", "article", "main", "header", "footer", "nav", "aside", "ul", "ol",
    "table", "tr", "blockquote", "pre", "figure", "figcaption", "dl", "dt", "dd", "form",
];

#[derive(Debug, Clone, Copy)]
enum Selector {
    Tag(&'static str),
    Class(&'static str),
    Id(&'static str),
    TagClass(&'static str, &'static str),
    Attr(&'static str, &'static str),
}

impl Selector {
    fn matches(&self, name: &str, attrs: &str) -> bool {
        match self {
            Selector::Tag(tag) => name == *tag,
            Selector::Class(class) => has_class(attrs, class),
            Selector::Id(id) => attribute(attrs, "id").is_some_and(|value| value.trim() == *id),
            Selector::TagClass(tag, class) => name == *tag && has_class(attrs, class),
            Selector::Attr(key, expected) => {
                attribute(attrs, key).is_some_and(|value| value.trim() == *expected)
            }
        }
    }
}

fn token_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(r"(?s)<!--.*?-->|<!\w[^>]*>|<(/?)([a-zA-Z][a-zA-Z0-9-]*)((?:[^>\x22']|\x22[^\x22]*\x22|'[^']*')*)>|[^<]+|<").ok()
        })
        .as_ref()
}

fn attribute_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(r#"([a-zA-Z_:][-a-zA-Z0-9_:.]*)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#)
                .ok()
        })
        .as_ref()
}

fn tokenize(html: &str) -> Vec<Token<'_>> {
    let Some(pattern) = token_pattern() else {
        return vec![Token::Text(html)];
    };
    let mut tokens = Vec::new();
    for caps in pattern.captures_iter(html) {
        let Some(whole) = caps.get(0) else { continue };
        match caps.get(2) {
            Some(name) => {
                let name = name.as_str().to_ascii_lowercase();
                let closing = caps.get(1).is_some_and(|m| !m.as_str().is_empty());
                if closing {
                    tokens.push(Token::Close { name });
                } else {
                    let attrs = caps.get(3).map_or("", |m| m.as_str());
                    tokens.push(Token::Open { name, attrs });
                }
            }
            None => {
                let text = whole.as_str();
                if text.starts_with("<!") {
                    continue;
                }
                tokens.push(Token::Text(text));
            }
        }
    }
    tokens
}

/// Value of attribute `key` inside a tag's attribute text.
fn attribute<'a>(attrs: &'a str, key: &str) -> Option<&'a str> {
    let pattern = attribute_pattern()?;
    pattern.captures_iter(attrs).find_map(|caps| {
        let name = caps.get(1)?;
        if !name.as_str().eq_ignore_ascii_case(key) {
            return None;
        }
        caps.get(2)
            .or_else(|| caps.get(3))
            .or_else(|| caps.get(4))
            .map(|m| m.as_str())
    })
}

fn has_class(attrs: &str, class: &str) -> bool {
    attribute(attrs, "class").is_some_and(|value| value.split_whitespace().any(|c| c == class))
}

fn is_void(name: &str, attrs: &str) -> bool {
    VOID_ELEMENTS.contains(&name) || attrs.trim_end().ends_with('/')
}

/// Index one past the token closing the element opened at `start`.
fn element_end(tokens: &[Token<'_>], start: usize) -> usize {
    let Some(Token::Open { name, .. }) = tokens.get(start) else {
        return start + 1;
    };
    let mut depth = 0usize;
    for (index, token) in tokens.iter().enumerate().skip(start) {
        match token {
            Token::Open { name: open, attrs } if open == name && !is_void(open, attrs) => {
                depth += 1;
            }
            Token::Close { name: close } if close == name => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return index + 1;
                }
            }
            _ => {}
        }
    }
    tokens.len()
}

/// First content container by selector priority, as a token range.
fn select_content(tokens: &[Token<'_>]) -> Option<(usize, usize)> {
    for selector in CONTENT_SELECTORS {
        let found = tokens.iter().position(|token| match token {
            Token::Open { name, attrs } => selector.matches(name, attrs),
            _ => false,
        });
        if let Some(start) = found {
            tracing::debug!(selector = ?selector, "Matched content container");
            return Some((start, element_end(tokens, start)));
        }
    }
    None
}

fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let decoded = tail.find(';').filter(|end| *end <= 10).and_then(|end| {
            let entity = &tail[1..end];
            let ch = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" | "#39" => Some('\''),
                "nbsp" => Some(' '),
                "ndash" => Some('–'),
                "mdash" => Some('—'),
                "hellip" => Some('…'),
                "rsquo" => Some('’'),
                "lsquo" => Some('‘'),
                "rdquo" => Some('”'),
                "ldquo" => Some('“'),
                _ => entity
                    .strip_prefix("#x")
                    .or_else(|| entity.strip_prefix("#X"))
                    .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                    .or_else(|| entity.strip_prefix('#').and_then(|dec| dec.parse().ok()))
                    .and_then(char::from_u32),
            }?;
            Some((ch, end))
        });
        match decoded {
            Some((ch, end)) => {
                out.push(ch);
                rest = &tail[end + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn resolve_href(href: &str, base: Option<&url::Url>) -> String {
    let href = decode_entities(href.trim());
    if href.starts_with('#') {
        return href;
    }
    match base.and_then(|base| base.join(&href).ok()) {
        Some(resolved) => resolved.to_string(),
        None => href,
    }
}

fn heading_level(name: &str) -> Option<usize> {
    match name {
        "h1" => Some(1),
        "h2" => Some(2),
        "h3" => Some(3),
        "h4" | "h5" | "h6" => Some(4),
        _ => None,
    }
}

/// Flatten a token range into text. Links become `[text](href)`.
fn render_tokens(tokens: &[Token<'_>], base: Option<&url::Url>) -> String {
    let mut out = String::new();
    let mut skip_depth = 0usize;
    let mut skipping: Option<String> = None;
    let mut pre_depth = 0usize;
    // (href, start offset of link text in `out`)
    let mut links: Vec<Option<(String, usize)>> = Vec::new();

    for token in tokens {
        if let Some(skipped) = &skipping {
            match token {
                Token::Open { name, .. } if name == skipped => skip_depth += 1,
                Token::Close { name } if name == skipped => {
                    skip_depth = skip_depth.saturating_sub(1);
                    if skip_depth == 0 {
                        skipping = None;
                    }
                }
                _ => {}
            }
            continue;
        }

        match token {
            Token::Text(text) => {
                let decoded = decode_entities(text);
                if pre_depth > 0 {
                    out.push_str(&decoded);
                } else {
                    // Source line breaks are plain whitespace outside <pre>.
                    out.push_str(&decoded.replace(['\r', '\n'], " "));
                }
            }
            Token::Open { name, attrs } => {
                let name = name.as_str();
                if name == "pre" {
                    pre_depth += 1;
                }
                if SKIPPED_ELEMENTS.contains(&name) {
                    skipping = Some(name.to_string());
                    skip_depth = 1;
                } else if name == "a" {
                    let link = attribute(attrs, "href")
                        .filter(|href| !href.trim().is_empty())
                        .map(|href| (resolve_href(href, base), out.len()));
                    if link.is_some() {
                        out.push('[');
                    }
                    links.push(link);
                } else if name == "br" {
                    out.push('\n');
                } else if name == "li" {
                    out.push_str("\n- ");
                } else if let Some(level) = heading_level(name) {
                    out.push_str("\n\n");
                    out.push_str(&"#".repeat(level));
                    out.push(' ');
                } else if BLOCK_ELEMENTS.contains(&name) || name == "td" || name == "th" {
                    out.push_str(if name == "td" || name == "th" { " " } else { "\n\n" });
                }
            }
            Token::Close { name } => {
                let name = name.as_str();
                if name == "pre" {
                    pre_depth = pre_depth.saturating_sub(1);
                }
                if name == "a" {
                    if let Some(Some((href, start))) = links.pop() {
                        let label = out[start + 1..].trim().to_string();
                        out.truncate(start);
                        if label.is_empty() {
                            out.push_str(&href);
                        } else {
                            out.push_str(&format!("[{}]({})", label.replace('\n', " "), href));
                        }
                    }
                } else if heading_level(name).is_some() || BLOCK_ELEMENTS.contains(&name) {
                    out.push_str("\n\n");
                }
            }
        }
    }
    out
}

/// Locate the main content container in `html` and flatten it to normalized,
/// link-preserving text. Relative links resolve against `base`.
pub fn extract_article_text(html: &str, base: Option<&url::Url>) -> String {
    let tokens = tokenize(html);
    let range = match select_content(&tokens) {
        Some(range) => range,
        None => {
            tracing::debug!("No content container matched; using the whole document");
            (0, tokens.len())
        }
    };
    normalize_whitespace(&render_tokens(&tokens[range.0..range.1], base))
}
