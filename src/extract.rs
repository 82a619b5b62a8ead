//! Read a remote page back into Markdown-ish text.
//!
//! This is the reverse of parsing + submission: block types map back to the
//! line prefixes the parser understands, and rich text annotations become
//! inline markup again. Combined or nested styles are not guaranteed to come
//! back exactly as they were written.

use std::future::Future;
use std::pin::Pin;

use tracing::debug;

use crate::notion::{DocumentStore, RemoteBlock, RichText};
use crate::Result;

/// Render every block under `page_id`, depth first, in remote order.
pub async fn extract(store: &dyn DocumentStore, page_id: &str) -> Result<String> {
    let mut out = String::new();
    render_children(store, page_id, &mut out).await?;
    debug!(page_id, chars = out.len(), "extracted page content");
    Ok(out)
}

fn render_children<'a>(
    store: &'a dyn DocumentStore,
    block_id: &'a str,
    out: &'a mut String,
) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
    Box::pin(async move {
        for block in store.list_children(block_id).await? {
            render_block(store, &block, out).await?;
        }
        Ok(())
    })
}

async fn render_block(
    store: &dyn DocumentStore,
    block: &RemoteBlock,
    out: &mut String,
) -> Result<()> {
    let text = || format_rich_text(&block.rich_text());

    match block.kind.as_str() {
        "paragraph" => push_line(out, "", &text(), "\n\n"),
        "heading_1" => push_line(out, "# ", &text(), "\n\n"),
        "heading_2" => push_line(out, "## ", &text(), "\n\n"),
        "heading_3" => push_line(out, "### ", &text(), "\n\n"),
        "bulleted_list_item" => push_line(out, "- ", &text(), "\n"),
        "numbered_list_item" => push_line(out, "1. ", &text(), "\n"),
        "quote" => push_line(out, "> ", &text(), "\n\n"),
        "image" => {
            if let Some(url) = block.image_url() {
                out.push_str(&format!("![]({url})\n\n"));
            }
        }
        "toggle" => {
            push_line(out, "<details>\n<summary>", &text(), "</summary>\n");
            if block.has_children {
                render_children(store, &block.id, out).await?;
            }
            out.push_str("\n</details>\n");
            return Ok(());
        }
        "table" => {
            let rows = store.list_children(&block.id).await?;
            render_table(&rows, out);
            return Ok(());
        }
        other => debug!(kind = other, id = %block.id, "no text form for block type"),
    }

    if block.has_children {
        render_children(store, &block.id, out).await?;
    }
    Ok(())
}

fn push_line(out: &mut String, prefix: &str, text: &str, suffix: &str) {
    out.push_str(prefix);
    out.push_str(text);
    out.push_str(suffix);
}

/// Pipe table with a separator under the first row, then a blank line.
fn render_table(rows: &[RemoteBlock], out: &mut String) {
    for (index, row) in rows.iter().enumerate() {
        let cells: Vec<String> = row
            .table_cells()
            .iter()
            .map(|cell| format_rich_text(cell))
            .collect();
        out.push_str("| ");
        out.push_str(&cells.join(" | "));
        out.push_str(" |\n");
        if index == 0 {
            out.push('|');
            out.push_str(&" --- |".repeat(cells.len().max(1)));
            out.push('\n');
        }
    }
    out.push('\n');
}

/// Reapply annotations and links to each run as inline markup.
pub fn format_rich_text(runs: &[RichText]) -> String {
    let mut out = String::new();
    for run in runs {
        let mut text = run.plain_text.clone();
        if text.is_empty() {
            continue;
        }
        if let Some(href) = &run.href {
            text = format!("[{text}]({href})");
        }
        let a = run.annotations;
        if a.bold {
            text = format!("**{text}**");
        }
        if a.italic {
            text = format!("*{text}*");
        }
        if a.strikethrough {
            text = format!("~~{text}~~");
        }
        if a.underline {
            text = format!("<u>{text}</u>");
        }
        if a.code {
            text = format!("`{text}`");
        }
        out.push_str(&text);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{Block, Document};
    use crate::notion::{Annotations, MemoryStore};
    use crate::parser::parse;
    use crate::submit::Submitter;
    use serde_json::json;
    use std::sync::Arc;

    fn kinds(blocks: &[Block]) -> Vec<&'static str> {
        blocks.iter().map(Block::kind).collect()
    }

    const ARTICLE: &str = "\
![thumbnail](https://img.test/cover.png)

# Rust in Production

Teams adopt **Rust** for [safety](https://rust-lang.org) and speed.
Second line of the same paragraph.

## Adoption

- memory safety
- fearless concurrency
1. measure
1. rewrite hot paths

> Rewrite it in Rust.

| Company | Use |
|---|---|
| A | CLI |
| B | **storage** |

### Closing

That is all.
";

    #[tokio::test]
    async fn block_types_survive_round_trip() {
        let expected = parse(ARTICLE);
        let store = MemoryStore::new();
        let page_id = Submitter::new(Arc::new(store.clone()))
            .submit(&Document::from_markdown(ARTICLE))
            .await
            .unwrap();

        let text = extract(&store, &page_id).await.unwrap();
        let reparsed = parse(&text);
        assert_eq!(kinds(&reparsed), kinds(&expected));
    }

    #[tokio::test]
    async fn simple_styles_survive_round_trip() {
        let md = "Teams adopt **Rust** for [safety](https://rust-lang.org).";
        let store = MemoryStore::new();
        let page_id = Submitter::new(Arc::new(store.clone()))
            .submit(&Document::from_markdown(md))
            .await
            .unwrap();

        let text = extract(&store, &page_id).await.unwrap();
        assert_eq!(text, format!("{md}\n\n"));
        assert_eq!(parse(&text), parse(md));
    }

    #[tokio::test]
    async fn empty_heading_text_round_trips_as_paragraph() {
        let md = "# [<i></i>](http://x.test)\n\nafter";
        let store = MemoryStore::new();
        let page_id = Submitter::new(Arc::new(store.clone()))
            .submit(&Document::from_markdown(md))
            .await
            .unwrap();

        let text = extract(&store, &page_id).await.unwrap();
        assert_eq!(kinds(&parse(&text)), kinds(&parse(md)));
    }

    #[tokio::test]
    async fn table_renders_with_separator() {
        let store = MemoryStore::new();
        let page_id = Submitter::new(Arc::new(store.clone()))
            .submit(&Document::from_markdown("| a | b |\n|---|---|\n| 1 | 2 |"))
            .await
            .unwrap();
        assert_eq!(
            extract(&store, &page_id).await.unwrap(),
            "| a | b |\n| --- | --- |\n| 1 | 2 |\n\n"
        );
    }

    #[tokio::test]
    async fn toggle_wraps_children() {
        let store = MemoryStore::new();
        let page_id = store
            .insert_page(
                "prompt",
                "Prompt",
                &[],
                vec![json!({
                    "type": "toggle",
                    "toggle": {
                        "rich_text": [{ "type": "text", "text": { "content": "More" } }],
                        "children": [
                            { "type": "bulleted_list_item",
                              "bulleted_list_item": { "rich_text": [{ "type": "text", "text": { "content": "hidden" } }] } }
                        ]
                    }
                })],
            )
            .await;

        assert_eq!(
            extract(&store, &page_id).await.unwrap(),
            "<details>\n<summary>More</summary>\n- hidden\n\n</details>\n"
        );
    }

    #[tokio::test]
    async fn unknown_blocks_recurse_into_children() {
        let store = MemoryStore::new();
        let page_id = store
            .insert_page(
                "prompt",
                "Prompt",
                &[],
                vec![json!({
                    "type": "column",
                    "column": {
                        "children": [
                            { "type": "paragraph",
                              "paragraph": { "rich_text": [{ "type": "text", "text": { "content": "inside" } }] } }
                        ]
                    }
                })],
            )
            .await;

        assert_eq!(extract(&store, &page_id).await.unwrap(), "inside\n\n");
    }

    #[test]
    fn annotations_reapplied_in_order() {
        let run = |text: &str, annotations: Annotations| RichText {
            plain_text: text.to_string(),
            href: None,
            annotations,
        };
        let runs = vec![
            run("plain ", Annotations::default()),
            run("both", Annotations {
                bold: true,
                italic: true,
                ..Annotations::default()
            }),
            run(" ", Annotations::default()),
            run("gone", Annotations {
                strikethrough: true,
                underline: true,
                ..Annotations::default()
            }),
            run(" ", Annotations::default()),
            run("x", Annotations {
                code: true,
                ..Annotations::default()
            }),
        ];
        assert_eq!(
            format_rich_text(&runs),
            "plain ***both*** <u>~~gone~~</u> `x`"
        );
    }

    #[test]
    fn links_inside_bold() {
        let runs = vec![RichText {
            plain_text: "docs".into(),
            href: Some("https://docs.rs".into()),
            annotations: Annotations {
                bold: true,
                ..Annotations::default()
            },
        }];
        let text = format_rich_text(&runs);
        assert_eq!(text, "**[docs](https://docs.rs)**");
        assert_eq!(
            crate::inline::resolve(&text),
            vec![crate::block::Span::link("docs", "https://docs.rs")
                .with_style(crate::block::Style::BOLD)]
        );
    }
}
