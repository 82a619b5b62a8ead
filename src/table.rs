use crate::block::{Block, Span};
use crate::inline;

/// True for `|---|:--:|` style rows that only carry alignment markup.
pub fn is_separator(line: &str) -> bool {
    line.chars()
        .all(|c| matches!(c, '-' | ':' | '|') || c.is_whitespace())
}

/// Split a pipe-delimited line into trimmed cell texts.
///
/// A leading or trailing pipe produces an empty outer cell, which is dropped.
pub fn split_row(line: &str) -> Vec<String> {
    let mut cells: Vec<&str> = line.split('|').collect();
    if cells.first().is_some_and(|c| c.trim().is_empty()) {
        cells.remove(0);
    }
    if cells.last().is_some_and(|c| c.trim().is_empty()) {
        cells.pop();
    }
    cells.into_iter().map(|c| c.trim().to_string()).collect()
}

/// Turn collected raw rows into a rectangular Table block.
///
/// The first row is the header and fixes the width. Short rows are padded
/// with empty cells, long rows truncated. A header with no data rows gets one
/// blank row so the table always has a body.
pub fn assemble(raw_rows: Vec<Vec<String>>) -> Block {
    let mut rows = raw_rows.into_iter();
    let header = rows.next().unwrap_or_default();
    let width = header.len();

    let headers: Vec<Vec<Span>> = header.iter().map(|c| inline::resolve(c)).collect();
    let mut body: Vec<Vec<Vec<Span>>> = rows
        .map(|row| {
            let mut cells: Vec<Vec<Span>> = row.iter().map(|c| inline::resolve(c)).collect();
            cells.resize_with(width, Vec::new);
            cells
        })
        .collect();

    if body.is_empty() {
        body.push(vec![Vec::new(); width]);
    }

    Block::Table {
        headers,
        rows: body,
    }
}
