//! Rendering for streamed assistant messages.
//!
//! Two tiers:
//! - [`incremental_html`]: cheap per-delta view of the growing buffer.
//!   HTML-escaped text with newlines as `<br>`, no Markdown parsing.
//! - [`final_render`]: the terminal render. Heading normalization, Markdown
//!   to HTML, then sanitization (`<script>`/`<style>` elements and inline
//!   `style` attributes are removed; other markup passes through, links keep
//!   their `target` attribute, odd URL protocols are tolerated).

use once_cell::sync::Lazy;
use pulldown_cmark::{Options, Parser, html};
use pulldown_cmark_escape::escape_html;
use regex::Regex;

/// Cheap render of the in-flight buffer.
pub fn incremental_html(buffer: &str) -> String {
    let mut escaped = String::with_capacity(buffer.len() + 16);
    // Writing into a String cannot fail.
    let _ = escape_html(&mut escaped, buffer);
    escaped.replace('\n', "<br>")
}

/// Full render of a finalized buffer.
pub fn final_render(buffer: &str) -> String {
    let normalized = normalize_headings(buffer);
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    let parser = Parser::new_ext(&normalized, options);
    let mut out = String::with_capacity(normalized.len() * 2);
    html::push_html(&mut out, parser);
    sanitize(&out)
}

/// Streamed fragments can glue a heading onto the tail of earlier text
/// (`...previous text#Heading`). Break such a run onto its own line, and add
/// the separating space after the `#`s when the source omits it, so the
/// heading still parses as one. Fenced code blocks are left alone.
fn normalize_headings(src: &str) -> String {
    let mut out = String::with_capacity(src.len() + 16);
    let mut in_fence = false;
    for line in src.split_inclusive('\n') {
        let body = line.strip_suffix('\n').map_or(line, |b| b.strip_suffix('\r').unwrap_or(b));
        let trimmed = body.trim_start();
        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            in_fence = !in_fence;
            out.push_str(line);
            continue;
        }
        if in_fence {
            out.push_str(line);
            continue;
        }
        rewrite_line(line, body, &mut out);
    }
    out
}

fn rewrite_line(line: &str, body: &str, out: &mut String) {
    // A heading marker embedded mid-line, glued onto non-blank content.
    if let Some((idx, run_len)) = find_embedded_heading(body) {
        out.push_str(&body[..idx]);
        out.push('\n');
        out.push_str(&body[idx..idx + run_len]);
        out.push(' ');
        out.push_str(&body[idx + run_len..]);
        out.push_str(&line[body.len()..]); // original line ending, if any
        return;
    }
    // A line-leading marker with the space missing (`#Heading`).
    let indent = body.len() - body.trim_start().len();
    let trimmed = &body[indent..];
    let run_len = trimmed.bytes().take_while(|&b| b == b'#').count();
    if (1..=6).contains(&run_len)
        && trimmed.len() > run_len
        && !trimmed.as_bytes()[run_len].is_ascii_whitespace()
    {
        out.push_str(&body[..indent + run_len]);
        out.push(' ');
        out.push_str(&trimmed[run_len..]);
        out.push_str(&line[body.len()..]);
        return;
    }
    out.push_str(line);
}

/// Find a `#`-run of 1..=6 glued directly between non-whitespace content and
/// heading text (`...text#Heading`). A space on either side disqualifies the
/// run, so prose like "C# is" or "issue #42" is left alone. Returns
/// (byte index, run length).
fn find_embedded_heading(body: &str) -> Option<(usize, usize)> {
    let bytes = body.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'#' {
            i += 1;
            continue;
        }
        let start = i;
        while i < bytes.len() && bytes[i] == b'#' {
            i += 1;
        }
        let run_len = i - start;
        let preceded = start > 0 && !bytes[start - 1].is_ascii_whitespace();
        let glued_text = i < bytes.len() && !bytes[i].is_ascii_whitespace();
        if preceded && glued_text && (1..=6).contains(&run_len) {
            return Some((start, run_len));
        }
    }
    None
}

static SCRIPT_BLOCK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<script\b[^>]*>.*?</script\s*>").expect("static pattern"));
static SCRIPT_TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)</?script\b[^>]*>").expect("static pattern"));
static STYLE_BLOCK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<style\b[^>]*>.*?</style\s*>").expect("static pattern"));
static STYLE_TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)</?style\b[^>]*>").expect("static pattern"));
static TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<[a-zA-Z][^>]*>").expect("static pattern"));
static STYLE_ATTR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)\s+style\s*=\s*("[^"]*"|'[^']*'|[^\s>]+)"#).expect("static pattern"));

/// Strip `<script>`/`<style>` elements (content included) and inline `style`
/// attributes. Everything else passes through; escaped text outside of tags
/// is never touched.
fn sanitize(html: &str) -> String {
    let html = SCRIPT_BLOCK_RE.replace_all(html, "");
    let html = SCRIPT_TAG_RE.replace_all(&html, "");
    let html = STYLE_BLOCK_RE.replace_all(&html, "");
    let html = STYLE_TAG_RE.replace_all(&html, "");
    TAG_RE
        .replace_all(&html, |caps: &regex::Captures<'_>| {
            STYLE_ATTR_RE.replace_all(&caps[0], "").into_owned()
        })
        .into_owned()
}
