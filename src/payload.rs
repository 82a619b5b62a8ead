//! Encode blocks as remote block-creation objects.

use serde_json::{Map, Value, json};

use crate::block::{Block, Span};

/// Longest text the remote API accepts in a single rich text object.
pub const MAX_TEXT_LEN: usize = 2000;

/// Convert blocks to remote block objects, one object per block
pub fn blocks_to_payload(blocks: &[Block]) -> Vec<Value> {
    blocks.iter().map(block_to_payload).collect()
}

pub fn block_to_payload(block: &Block) -> Value {
    match block {
        Block::Heading { content, .. }
        | Block::Paragraph { content }
        | Block::BulletItem { content }
        | Block::NumberedItem { content }
        | Block::Quote { content } => text_block(block.kind(), content),
        Block::Image { url } => json!({
            "object": "block",
            "type": "image",
            "image": {
                "type": "external",
                "external": { "url": url },
            },
        }),
        Block::Table { headers, rows } => table_block(headers, rows),
    }
}

fn text_block(kind: &str, content: &[Span]) -> Value {
    json!({
        "object": "block",
        "type": kind,
        kind: { "rich_text": rich_text(content) },
    })
}

fn table_block(headers: &[Vec<Span>], rows: &[Vec<Vec<Span>>]) -> Value {
    let children: Vec<Value> = std::iter::once(headers)
        .chain(rows.iter().map(Vec::as_slice))
        .map(table_row)
        .collect();

    json!({
        "object": "block",
        "type": "table",
        "table": {
            "table_width": headers.len(),
            "has_column_header": true,
            "has_row_header": false,
            "children": children,
        },
    })
}

fn table_row(cells: &[Vec<Span>]) -> Value {
    let cells: Vec<Value> = cells.iter().map(|cell| rich_text(cell)).collect();
    json!({
        "type": "table_row",
        "table_row": { "cells": cells },
    })
}

/// Encode spans as a rich text array, splitting over-long runs.
pub fn rich_text(spans: &[Span]) -> Value {
    let mut out = Vec::with_capacity(spans.len());
    for span in spans {
        for piece in chunk_chars(&span.text, MAX_TEXT_LEN) {
            out.push(span_object(span, piece));
        }
    }
    Value::Array(out)
}

fn span_object(span: &Span, text: &str) -> Value {
    let mut body = Map::new();
    body.insert("content".into(), json!(text));
    if let Some(url) = &span.link {
        body.insert("link".into(), json!({ "url": url }));
    }

    let mut object = Map::new();
    object.insert("type".into(), json!("text"));
    object.insert("text".into(), Value::Object(body));

    if !span.style.is_plain() {
        let mut annotations = Map::new();
        let flags = [
            ("bold", span.style.bold),
            ("italic", span.style.italic),
            ("strikethrough", span.style.strikethrough),
            ("underline", span.style.underline),
            ("code", span.style.code),
        ];
        for (name, set) in flags {
            if set {
                annotations.insert(name.into(), Value::Bool(true));
            }
        }
        object.insert("annotations".into(), Value::Object(annotations));
    }

    Value::Object(object)
}

/// Split on char boundaries into pieces of at most `max` chars.
fn chunk_chars(text: &str, max: usize) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut start = 0;
    let mut count = 0;
    for (idx, _) in text.char_indices() {
        if count == max {
            pieces.push(&text[start..idx]);
            start = idx;
            count = 0;
        }
        count += 1;
    }
    if start < text.len() {
        pieces.push(&text[start..]);
    }
    pieces
}
