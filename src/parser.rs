use std::sync::LazyLock;

use regex::Regex;

use crate::block::Block;
use crate::{inline, table};

static IMAGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^!\[([^\]]*)\]\(([^)]+)\)").expect("valid image pattern"));

fn heading(level: u8, rest: &str) -> Block {
    Block::Heading {
        level,
        content: inline::resolve(rest),
    }
}

/// Parse Markdown text into a list of blocks.
///
/// Never fails: anything that is not recognised structure becomes paragraph
/// text.
pub fn parse(markdown: &str) -> Vec<Block> {
    let mut builder = Builder::default();
    for line in preprocess(markdown) {
        builder.push_line(line);
    }
    builder.finish()
}

/// Trim every line and keep at most one blank line between content lines.
///
/// Leading blank lines are dropped as well.
fn preprocess(markdown: &str) -> Vec<&str> {
    let mut lines = Vec::new();
    let mut prev_blank = true;
    for line in markdown.lines().map(str::trim) {
        if !line.is_empty() {
            lines.push(line);
            prev_blank = false;
        } else if !prev_blank {
            lines.push(line);
            prev_blank = true;
        }
    }
    lines
}

/// What the builder is currently accumulating
#[derive(Debug, Default)]
enum State {
    #[default]
    Idle,
    InParagraph(Vec<String>),
    InTable(Vec<Vec<String>>),
}

#[derive(Default)]
struct Builder {
    state: State,
    blocks: Vec<Block>,
}

impl Builder {
    fn push_line(&mut self, line: &str) {
        if line.contains('|') {
            if table::is_separator(line) {
                return;
            }
            let row = table::split_row(line);
            match &mut self.state {
                State::InTable(rows) => rows.push(row),
                _ => {
                    self.flush();
                    self.state = State::InTable(vec![row]);
                }
            }
            return;
        }

        // Any non-table line closes an open table, then is handled normally.
        if matches!(self.state, State::InTable(_)) {
            self.flush();
        }

        if let Some(caps) = IMAGE.captures(line) {
            self.flush();
            self.blocks.push(Block::Image {
                url: caps[2].to_string(),
            });
            return;
        }

        if line.is_empty() {
            self.flush();
            return;
        }

        if let Some(block) = classify(line) {
            self.flush();
            self.blocks.push(block);
            return;
        }

        match &mut self.state {
            State::InParagraph(lines) => lines.push(line.to_string()),
            _ => self.state = State::InParagraph(vec![line.to_string()]),
        }
    }

    /// Emit whatever is buffered and return to `Idle`.
    fn flush(&mut self) {
        match std::mem::take(&mut self.state) {
            State::Idle => {}
            State::InParagraph(lines) => {
                let content = inline::resolve(&lines.join("\n"));
                if !content.is_empty() {
                    self.blocks.push(Block::Paragraph { content });
                }
            }
            State::InTable(rows) => self.blocks.push(table::assemble(rows)),
        }
    }

    fn finish(mut self) -> Vec<Block> {
        self.flush();
        self.blocks
    }
}

/// Match a single-line block prefix.
fn classify(line: &str) -> Option<Block> {
    let block = if let Some(rest) = line.strip_prefix("# ") {
        heading(1, rest)
    } else if let Some(rest) = line.strip_prefix("## ") {
        heading(2, rest)
    } else if let Some(rest) = line.strip_prefix("### ") {
        heading(3, rest)
    } else if let Some(rest) = line.strip_prefix("- ") {
        Block::BulletItem {
            content: inline::resolve(rest),
        }
    } else if let Some(rest) = line.strip_prefix("1. ") {
        Block::NumberedItem {
            content: inline::resolve(rest),
        }
    } else if let Some(rest) = line.strip_prefix("> ") {
        Block::Quote {
            content: inline::resolve(rest),
        }
    } else {
        return None;
    };
    // Nothing left after the prefix: the line stays paragraph text.
    if block.content().is_some_and(|content| content.is_empty()) {
        return None;
    }
    Some(block)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{Span, plain_text};

    fn kinds(blocks: &[Block]) -> Vec<&'static str> {
        blocks.iter().map(Block::kind).collect()
    }

    #[test]
    fn empty_input() {
        assert!(parse("").is_empty());
        assert!(parse("\n\n   \n\t\n").is_empty());
    }

    #[test]
    fn heading_and_paragraph() {
        let blocks = parse("# Title\n\nSome **bold** text with a [link](http://x.test).\n");
        assert_eq!(
            blocks,
            vec![
                Block::Heading {
                    level: 1,
                    content: vec![Span::text("Title")],
                },
                Block::Paragraph {
                    content: vec![
                        Span::text("Some "),
                        Span::bold("bold"),
                        Span::text(" text with a "),
                        Span::link("link", "http://x.test"),
                        Span::text("."),
                    ],
                },
            ]
        );
    }

    #[test]
    fn each_prefix_yields_one_block() {
        let cases = [
            ("# h", "heading_1"),
            ("## h", "heading_2"),
            ("### h", "heading_3"),
            ("- item", "bulleted_list_item"),
            ("1. item", "numbered_list_item"),
            ("> quoted", "quote"),
        ];
        for (line, kind) in cases {
            let mut builder = Builder::default();
            builder.push_line("pending paragraph");
            builder.push_line(line);
            assert!(matches!(builder.state, State::Idle), "{line}");
            assert_eq!(kinds(&builder.blocks), vec!["paragraph", kind], "{line}");
        }
    }

    #[test]
    fn prefix_remainder_is_resolved() {
        let blocks = parse("## A **bold** heading");
        assert_eq!(
            blocks,
            vec![Block::Heading {
                level: 2,
                content: vec![Span::text("A "), Span::bold("bold"), Span::text(" heading")],
            }]
        );
    }

    #[test]
    fn prefix_with_empty_remainder_is_text() {
        for line in [
            "# [<i></i>](http://x.test)",
            "- [<b></b>](https://a.test)",
            "> [<br/>](http://x.test)",
        ] {
            let blocks = parse(line);
            assert!(
                blocks.iter().all(|b| b.kind() == "paragraph"),
                "{line}: {:?}",
                kinds(&blocks)
            );
            assert!(classify(line).is_none(), "{line}");
        }
    }

    #[test]
    fn only_literal_one_dot_is_numbered() {
        assert_eq!(kinds(&parse("2. second")), vec!["paragraph"]);
        assert_eq!(kinds(&parse("#nospace")), vec!["paragraph"]);
        assert_eq!(kinds(&parse("#### deep")), vec!["paragraph"]);
    }

    #[test]
    fn consecutive_lines_join_into_one_paragraph() {
        let blocks = parse("first line\n  second line  \n\nnext");
        assert_eq!(kinds(&blocks), vec!["paragraph", "paragraph"]);
        assert_eq!(
            plain_text(blocks[0].content().unwrap_or_default()),
            "first line\nsecond line"
        );
    }

    #[test]
    fn image_flushes_paragraph() {
        let blocks = parse("intro\n![thumbnail](https://img.test/a.png)\noutro");
        assert_eq!(kinds(&blocks), vec!["paragraph", "image", "paragraph"]);
        assert_eq!(
            blocks[1],
            Block::Image {
                url: "https://img.test/a.png".to_string()
            }
        );
    }

    #[test]
    fn table_with_separator() {
        let md = "| Lang | Year |\n|---|---|\n| Rust | 2015 |\n| Go | 2009 |\n| C | 1972 |\n";
        let blocks = parse(md);
        assert_eq!(blocks.len(), 1);
        let Block::Table { headers, rows } = &blocks[0] else {
            panic!("expected table, got {blocks:?}");
        };
        assert_eq!(headers.len(), 2);
        assert_eq!(rows.len(), 3);
        assert!(rows.iter().all(|r| r.len() == 2));
        assert_eq!(rows[0][0], vec![Span::text("Rust")]);
    }

    #[test]
    fn single_row_table_gets_body() {
        let blocks = parse("| only | header |");
        let Block::Table { headers, rows } = &blocks[0] else {
            panic!("expected table");
        };
        assert_eq!(headers.len(), 2);
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn table_exit_falls_through() {
        let blocks = parse("text before\n| a | b |\n| 1 | 2 |\n# After\nmore");
        assert_eq!(
            kinds(&blocks),
            vec!["paragraph", "table", "heading_1", "paragraph"]
        );
    }

    #[test]
    fn blank_line_closes_table() {
        let blocks = parse("| a |\n| 1 |\n\n| b |\n| 2 |");
        assert_eq!(kinds(&blocks), vec!["table", "table"]);
    }

    #[test]
    fn table_at_end_of_input() {
        assert_eq!(kinds(&parse("para\n| a | b |")), vec!["paragraph", "table"]);
    }

    #[test]
    fn blank_runs_collapse() {
        let blocks = parse("\n\n\none\n\n\n\n\ntwo\n\n\n");
        assert_eq!(kinds(&blocks), vec!["paragraph", "paragraph"]);
        assert_eq!(
            preprocess("\n\n a \n\n\n\n b\n"),
            vec!["a", "", "b"]
        );
    }

    #[test]
    fn adversarial_input_does_not_panic() {
        let junk = "**[[](http\n|\n||\n> \n#\n![](\n1.\n- \n<b><b></b>\n|---|\n日本語 | テキスト\n";
        let blocks = parse(junk);
        assert!(!blocks.is_empty());
        for block in &blocks {
            if let Some(content) = block.content() {
                assert!(content.iter().all(|s| !s.text.is_empty()));
            }
        }
    }
}
