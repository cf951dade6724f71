// src/sanitize.rs
//! Restrict LLM markup to the small HTML subset Telegram renders:
//! `<b> <i> <u> <s> <code>` and `<a href>`.
//!
//! Input is tokenized into text and tags, filtered/rewritten tag by tag, then
//! checked for balance. Any allowed tag type whose open/close counts differ or
//! which takes part in a nesting mismatch is removed entirely (every open and
//! close of that type), and the check repeats until stable.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeSet, HashMap};

const ALLOWED: &[&str] = &["b", "i", "u", "s", "code", "a"];

static RE_HREF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)\bhref\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#).expect("href regex")
});
static RE_WS_AROUND_NL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[ \t]*\n[ \t]*").expect("newline ws regex"));
static RE_MANY_NL: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").expect("newline regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TagKind {
    Open,
    Close,
    SelfClosing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Tag {
    name: String,
    kind: TagKind,
    href: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token<'a> {
    Text(&'a str),
    Tag(Tag),
}

/// Output pieces of the filter pass, before balance repair.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Piece {
    Text(String),
    Open { name: &'static str, href: Option<String> },
    Close(&'static str),
}

fn allowed_name(name: &str) -> Option<&'static str> {
    ALLOWED.iter().copied().find(|a| *a == name)
}

fn parse_tag(inner: &str) -> Option<Tag> {
    let inner = inner.trim();
    let (kind, body) = if let Some(rest) = inner.strip_prefix('/') {
        (TagKind::Close, rest.trim_start())
    } else if let Some(rest) = inner.strip_suffix('/') {
        (TagKind::SelfClosing, rest)
    } else {
        (TagKind::Open, inner)
    };
    let name: String = body
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_lowercase();
    if name.is_empty() {
        return None;
    }
    let href = if kind == TagKind::Open && name == "a" {
        RE_HREF.captures(&body[name.len()..]).and_then(|c| {
            c.get(1)
                .or_else(|| c.get(2))
                .or_else(|| c.get(3))
                .map(|m| html_escape::decode_html_entities(m.as_str().trim()).into_owned())
        })
    } else {
        None
    };
    Some(Tag { name, kind, href })
}

/// Split into text runs and tags. A `<` that does not start a tag (or has no
/// closing `>`) stays as text; comments and `<!...>` declarations vanish.
fn tokenize(input: &str) -> Vec<Token<'_>> {
    let mut out = Vec::new();
    let bytes = input.as_bytes();
    let mut text_start = 0;
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'<' {
            i += 1;
            continue;
        }
        let rest = &input[i..];
        let next = bytes.get(i + 1).copied();
        let after_slash = bytes.get(i + 2).copied();

        let skip_to = if rest.starts_with("<!--") {
            Some(rest.find("-->").map(|p| i + p + 3).unwrap_or(bytes.len()))
        } else if next == Some(b'!') || next == Some(b'?') {
            rest.find('>').map(|p| i + p + 1)
        } else {
            None
        };
        if let Some(end) = skip_to {
            if text_start < i {
                out.push(Token::Text(&input[text_start..i]));
            }
            i = end;
            text_start = end;
            continue;
        }

        let starts_tag = match next {
            Some(c) if c.is_ascii_alphabetic() => true,
            Some(b'/') => after_slash.is_some_and(|c| c.is_ascii_alphabetic()),
            _ => false,
        };
        if !starts_tag {
            i += 1;
            continue;
        }
        let Some(close_rel) = rest.find('>') else {
            i += 1;
            continue;
        };
        let end = i + close_rel + 1;
        match parse_tag(&input[i + 1..end - 1]) {
            Some(tag) => {
                if text_start < i {
                    out.push(Token::Text(&input[text_start..i]));
                }
                out.push(Token::Tag(tag));
                text_start = end;
                i = end;
            }
            None => i += 1,
        }
    }
    if text_start < bytes.len() {
        out.push(Token::Text(&input[text_start..]));
    }
    out
}

/// Decode whatever entities the model produced, then escape `& < >` so the
/// renderer sees well-formed text.
fn escape_text(raw: &str) -> String {
    let decoded = html_escape::decode_html_entities(raw);
    html_escape::encode_text(&decoded).into_owned()
}

/// Telegram only resolves these schemes; anything else would be rejected.
fn is_safe_href(href: &str) -> bool {
    let lower = href.to_ascii_lowercase();
    ["http://", "https://", "tg://", "mailto:"]
        .iter()
        .any(|scheme| lower.starts_with(scheme))
}

fn is_heading(name: &str) -> bool {
    matches!(name, "h1" | "h2" | "h3" | "h4" | "h5" | "h6")
}

/// Structural rewrites, aliasing and removal of disallowed tags.
fn filter(tokens: Vec<Token<'_>>) -> Vec<Piece> {
    let mut out = Vec::with_capacity(tokens.len());
    let mut skipping: Option<String> = None;
    // Tracks whether each open `<a>` was kept, so its `</a>` follows suit.
    let mut anchors: Vec<bool> = Vec::new();
    let nl = |out: &mut Vec<Piece>, s: &str| out.push(Piece::Text(s.to_string()));

    for tok in tokens {
        if let Some(skip) = &skipping {
            if let Token::Tag(t) = &tok {
                if t.kind == TagKind::Close && &t.name == skip {
                    skipping = None;
                }
            }
            continue;
        }
        let tag = match tok {
            Token::Text(t) => {
                out.push(Piece::Text(escape_text(t)));
                continue;
            }
            Token::Tag(tag) => tag,
        };

        let name = tag.name.as_str();
        match (name, tag.kind) {
            ("script" | "style", TagKind::Open) => skipping = Some(tag.name.clone()),
            ("li", TagKind::Open) => nl(&mut out, "\n• "),
            ("li", _) => {}
            (h, TagKind::Open) if is_heading(h) => {
                nl(&mut out, "\n");
                out.push(Piece::Open { name: "b", href: None });
            }
            (h, TagKind::Close) if is_heading(h) => {
                out.push(Piece::Close("b"));
                nl(&mut out, "\n");
            }
            ("br", _) => nl(&mut out, "\n"),
            ("p" | "div", TagKind::Close) => nl(&mut out, "\n\n"),
            ("p" | "div" | "ul" | "ol", _) => nl(&mut out, "\n"),
            ("a", TagKind::Open) => {
                let href = tag.href.filter(|h| is_safe_href(h));
                anchors.push(href.is_some());
                if href.is_some() {
                    out.push(Piece::Open { name: "a", href });
                }
            }
            ("a", TagKind::Close) => {
                if anchors.pop().unwrap_or(true) {
                    out.push(Piece::Close("a"));
                }
            }
            _ => {
                let aliased = match name {
                    "strong" => "b",
                    "em" => "i",
                    other => other,
                };
                let Some(allowed) = allowed_name(aliased) else {
                    continue;
                };
                match tag.kind {
                    TagKind::Open => out.push(Piece::Open { name: allowed, href: None }),
                    TagKind::Close => out.push(Piece::Close(allowed)),
                    TagKind::SelfClosing => {}
                }
            }
        }
    }
    out
}

/// Tag types that are unbalanced by count or interleaved with another type.
fn unbalanced(pieces: &[Piece]) -> BTreeSet<&'static str> {
    let mut counts: HashMap<&'static str, i64> = HashMap::new();
    for p in pieces {
        match p {
            Piece::Open { name, .. } => *counts.entry(*name).or_default() += 1,
            Piece::Close(name) => *counts.entry(*name).or_default() -= 1,
            Piece::Text(_) => {}
        }
    }
    let mut bad: BTreeSet<&'static str> = counts
        .into_iter()
        .filter(|(_, c)| *c != 0)
        .map(|(n, _)| n)
        .collect();
    if !bad.is_empty() {
        return bad;
    }

    let mut stack: Vec<&'static str> = Vec::new();
    for p in pieces {
        match p {
            Piece::Open { name, .. } => stack.push(*name),
            Piece::Close(name) => match stack.last() {
                Some(top) if top == name => {
                    stack.pop();
                }
                Some(top) => {
                    bad.insert(*name);
                    bad.insert(*top);
                }
                None => {
                    bad.insert(*name);
                }
            },
            Piece::Text(_) => {}
        }
    }
    bad
}

fn repair_balance(mut pieces: Vec<Piece>) -> Vec<Piece> {
    loop {
        let bad = unbalanced(&pieces);
        if bad.is_empty() {
            return pieces;
        }
        tracing::debug!(target: "sanitize", tags = ?bad, "stripping unbalanced tag types");
        pieces.retain(|p| match p {
            Piece::Open { name, .. } | Piece::Close(name) => !bad.contains(name),
            Piece::Text(_) => true,
        });
    }
}

fn render(pieces: &[Piece]) -> String {
    let mut out = String::new();
    for p in pieces {
        match p {
            Piece::Text(t) => out.push_str(t),
            Piece::Open { name, href: Some(href) } => {
                out.push('<');
                out.push_str(name);
                out.push_str(" href=\"");
                out.push_str(&html_escape::encode_double_quoted_attribute(href));
                out.push_str("\">");
            }
            Piece::Open { name, href: None } => {
                out.push('<');
                out.push_str(name);
                out.push('>');
            }
            Piece::Close(name) => {
                out.push_str("</");
                out.push_str(name);
                out.push('>');
            }
        }
    }
    out
}

fn normalize_whitespace(s: &str) -> String {
    let s = s.replace("\r\n", "\n").replace('\r', "\n");
    let s = RE_WS_AROUND_NL.replace_all(&s, "\n");
    let s = RE_MANY_NL.replace_all(&s, "\n\n");
    s.trim().to_string()
}

/// Sanitize model output into Telegram-safe HTML.
pub fn sanitize(input: &str) -> String {
    let pieces = repair_balance(filter(tokenize(input)));
    normalize_whitespace(&render(&pieces))
}

/// Drop every tag and decode entities. Used for the plain-text fallback.
pub fn strip_all_tags(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut skipping: Option<String> = None;
    for tok in tokenize(input) {
        match tok {
            Token::Text(t) if skipping.is_none() => {
                out.push_str(&html_escape::decode_html_entities(t))
            }
            Token::Tag(t) if t.kind == TagKind::Open && matches!(t.name.as_str(), "script" | "style") => {
                skipping = Some(t.name)
            }
            Token::Tag(t) if t.kind == TagKind::Close && skipping.as_deref() == Some(t.name.as_str()) => {
                skipping = None
            }
            Token::Tag(t) if skipping.is_none() && matches!(t.name.as_str(), "br" | "p" | "li") => {
                out.push('\n')
            }
            _ => {}
        }
    }
    normalize_whitespace(&out)
}

/// Cut sanitized markup to at most `max_chars` characters without leaving a
/// partial tag or entity behind, then re-run the balance repair.
pub fn truncate_markup(html: &str, max_chars: usize) -> String {
    let cut = match html.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &html[..byte_idx],
        None => return html.to_string(),
    };
    let mut end = cut.len();
    if let Some(lt) = cut.rfind('<') {
        if cut[lt..].find('>').is_none() {
            end = lt;
        }
    }
    if let Some(amp) = cut[..end].rfind('&') {
        if cut[amp..end].find(';').is_none() {
            end = amp;
        }
    }
    sanitize(&cut[..end])
}
