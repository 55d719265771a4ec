//! Link formatting for finished bot replies.
//!
//! [`format_links`] turns YouTube URLs, bare URLs and `[label](url)` spans
//! into anchor markup. [`parse_markup`] reads that markup back into
//! segments the terminal view can style and open.

use std::sync::OnceLock;

use regex::Regex;

/// Caption shown in place of a YouTube URL
pub const VIDEO_CAPTION: &str = "Click here to watch the video";

fn markdown_link_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"\[([^\]\n]+)\]\(([^)\s<>"]+)\)"#).unwrap())
}

fn youtube_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r#"\b(?:https?://)?(?:[a-zA-Z0-9-]+\.)?(?:youtube\.com|youtu\.be)/(?:watch\?v=)?[a-zA-Z0-9_-]+[^\s<>"]*"#,
        )
        .unwrap()
    })
}

fn url_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"https?://[^\s<>"]+"#).unwrap())
}

fn anchor_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(?s)<a href="([^"]*)"[^>]*>(.*?)</a>"#).unwrap())
}

/// A region of the input that becomes an anchor
struct Claim {
    start: usize,
    end: usize,
    href: String,
    label: String,
}

impl Claim {
    fn overlaps(&self, start: usize, end: usize) -> bool {
        start < self.end && self.start < end
    }
}

/// Drop sentence punctuation that ends up glued to a URL.
fn trim_url(raw: &str) -> &str {
    raw.trim_end_matches(['.', ',', ';', ':', '!', '?', '\'', '"'])
}

fn with_scheme(url: &str) -> String {
    if url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else {
        format!("https://{}", url)
    }
}

fn anchor(href: &str, label: &str) -> String {
    format!(
        r#"<a href="{}" target="_blank" rel="noopener noreferrer">{}</a>"#,
        href, label
    )
}

/// Convert links in a finished reply into anchor markup.
///
/// Markdown spans are claimed first, then YouTube URLs, then any other
/// `http(s)` URL. Text already claimed is never wrapped twice. Not
/// idempotent: feed it raw reply text exactly once.
pub fn format_links(text: &str) -> String {
    let mut claims: Vec<Claim> = Vec::new();

    for caps in markdown_link_re().captures_iter(text) {
        let (Some(whole), Some(label), Some(url)) = (caps.get(0), caps.get(1), caps.get(2)) else {
            continue;
        };
        claims.push(Claim {
            start: whole.start(),
            end: whole.end(),
            href: url.as_str().to_string(),
            label: label.as_str().to_string(),
        });
    }

    for m in youtube_re().find_iter(text) {
        let url = trim_url(m.as_str());
        let end = m.start() + url.len();
        if claims.iter().any(|c| c.overlaps(m.start(), end)) {
            continue;
        }
        claims.push(Claim {
            start: m.start(),
            end,
            href: with_scheme(url),
            label: VIDEO_CAPTION.to_string(),
        });
    }

    for m in url_re().find_iter(text) {
        let url = trim_url(m.as_str());
        let end = m.start() + url.len();
        if claims.iter().any(|c| c.overlaps(m.start(), end)) {
            continue;
        }
        claims.push(Claim {
            start: m.start(),
            end,
            href: url.to_string(),
            label: url.to_string(),
        });
    }

    claims.sort_by_key(|c| c.start);

    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    for claim in &claims {
        out.push_str(&text[cursor..claim.start]);
        out.push_str(&anchor(&claim.href, &claim.label));
        cursor = claim.end;
    }
    out.push_str(&text[cursor..]);
    out
}

/// Piece of rendered markup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Text(String),
    Link { href: String, label: String },
}

/// Split anchor markup into text and link segments. Anything that is not
/// an anchor is kept verbatim as text.
pub fn parse_markup(markup: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut cursor = 0;

    for caps in anchor_re().captures_iter(markup) {
        let (Some(whole), Some(href), Some(label)) = (caps.get(0), caps.get(1), caps.get(2)) else {
            continue;
        };
        if whole.start() > cursor {
            segments.push(Segment::Text(markup[cursor..whole.start()].to_string()));
        }
        segments.push(Segment::Link {
            href: href.as_str().to_string(),
            label: label.as_str().to_string(),
        });
        cursor = whole.end();
    }

    if cursor < markup.len() {
        segments.push(Segment::Text(markup[cursor..].to_string()));
    }
    segments
}

/// Hrefs of every anchor in the markup, in order
pub fn extract_links(markup: &str) -> Vec<String> {
    parse_markup(markup)
        .into_iter()
        .filter_map(|s| match s {
            Segment::Link { href, .. } => Some(href),
            Segment::Text(_) => None,
        })
        .collect()
}
