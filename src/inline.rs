//! Inline span resolution: one line of text in, styled spans out.
//!
//! Only two inline constructs are recognised: links (`[text](http...)`) and
//! bold (`**text**` or `<b>text</b>`). Links are collected first and always
//! win; a bold match that intersects an accepted link is dropped, unless the
//! bold wraps exactly one link, in which case the two merge into one span.

use std::sync::LazyLock;

use regex::Regex;

use crate::block::{Span, Style};

static LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\]]+)\]\((http[^)]+)\)").expect("valid link pattern"));

static LINK_ONLY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\[([^\]]+)\]\((http[^)]+)\)$").expect("valid link pattern"));

static BOLD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\*\*([^*]+)\*\*|<b>([^<]+)</b>").expect("valid bold pattern")
});

static HTML_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]+>").expect("valid tag pattern"));

/// A resolved match over byte offsets of the source line
struct Match {
    start: usize,
    end: usize,
    span: Span,
}

impl Match {
    fn intersects(&self, start: usize, end: usize) -> bool {
        self.start < end && start < self.end
    }
}

/// Resolve a line into an ordered run of spans.
pub fn resolve(line: &str) -> Vec<Span> {
    let mut matches: Vec<Match> = LINK
        .captures_iter(line)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            Some(Match {
                start: whole.start(),
                end: whole.end(),
                span: link_span(&caps[1], &caps[2]),
            })
        })
        .collect();

    for caps in BOLD.captures_iter(line) {
        let Some(whole) = caps.get(0) else { continue };
        let (start, end) = (whole.start(), whole.end());
        let inner = caps.get(1).or_else(|| caps.get(2)).map_or("", |m| m.as_str());

        if let Some(link) = LINK_ONLY.captures(inner) {
            matches.retain(|m| !(m.start >= start && m.end <= end));
            if matches.iter().any(|m| m.intersects(start, end)) {
                continue;
            }
            let mut span = link_span(&link[1], &link[2]);
            span.style.bold = true;
            matches.push(Match { start, end, span });
            continue;
        }

        if matches.iter().any(|m| m.intersects(start, end)) {
            continue;
        }
        matches.push(Match {
            start,
            end,
            span: Span::bold(inner),
        });
    }

    matches.sort_by_key(|m| m.start);

    let mut spans = Vec::with_capacity(matches.len() * 2 + 1);
    let mut last_end = 0;
    for m in matches {
        if m.start > last_end {
            spans.push(Span::text(&line[last_end..m.start]));
        }
        spans.push(m.span);
        last_end = m.end;
    }
    if last_end < line.len() {
        spans.push(Span::text(&line[last_end..]));
    }

    spans.retain(|s| !s.text.is_empty());
    spans
}

/// Build a link span, folding any bold markup in the text into the style.
fn link_span(text: &str, url: &str) -> Span {
    let bold = BOLD.is_match(text);
    let unbolded = BOLD.replace_all(text, "${1}${2}");
    let cleaned = HTML_TAG.replace_all(&unbolded, "").into_owned();
    let style = Style { bold, ..Style::PLAIN };
    Span::link(cleaned, url).with_style(style)
}
