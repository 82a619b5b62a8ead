//! Submit documents to the remote database in API-sized batches.

use std::sync::Arc;

use pulldown_cmark::{Event, Options, Parser, Tag, TagEnd};
use tracing::{debug, info, warn};

use crate::block::{Block, Document, plain_text};
use crate::notion::{DocumentStore, NewPage};
use crate::payload::blocks_to_payload;
use crate::Result;

/// Most blocks the remote API accepts in one append call.
pub const MAX_BLOCKS_PER_APPEND: usize = 100;

/// Longest title taken from body text when no heading is available.
const FALLBACK_TITLE_CHARS: usize = 60;

const PLACEHOLDER_TITLE: &str = "Untitled";

/// Writes documents into the database as new or replaced pages
pub struct Submitter {
    store: Arc<dyn DocumentStore>,
    status: Option<String>,
}

impl Submitter {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            status: None,
        }
    }

    /// Status set on every page this submitter creates or replaces.
    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    /// Create a page shell, then append the document's blocks in batches.
    ///
    /// The shell id is returned once every batch is in. If a batch fails the
    /// error is returned and the partially filled page is left in place.
    pub async fn submit(&self, document: &Document) -> Result<String> {
        let page = NewPage {
            title: derive_title(document),
            cover_url: document.cover_url.clone(),
            status: self.status.clone(),
        };
        let page_id = self.store.create_page(&page).await?;
        info!(page_id = %page_id, title = %page.title, blocks = document.blocks.len(), "created page shell");

        self.append_batches(&page_id, &document.blocks).await?;
        Ok(page_id)
    }

    /// Retitle an existing page and swap its body for the document's blocks.
    pub async fn replace(&self, page_id: &str, document: &Document) -> Result<()> {
        let page = NewPage {
            title: derive_title(document),
            cover_url: None,
            status: self.status.clone(),
        };
        self.store.update_page(page_id, &page).await?;

        let existing = self.store.list_children(page_id).await?;
        debug!(page_id, count = existing.len(), "clearing page body");
        for block in existing {
            self.store.delete_block(&block.id).await?;
        }

        self.append_batches(page_id, &document.blocks).await
    }

    async fn append_batches(&self, page_id: &str, blocks: &[Block]) -> Result<()> {
        let payload = blocks_to_payload(blocks);
        let total = payload.len().div_ceil(MAX_BLOCKS_PER_APPEND);

        for (index, chunk) in payload.chunks(MAX_BLOCKS_PER_APPEND).enumerate() {
            debug!(page_id, batch = index + 1, total, size = chunk.len(), "appending blocks");
            if let Err(e) = self.store.append_children(page_id, chunk.to_vec()).await {
                warn!(page_id, batch = index + 1, total, error = %e, "append failed; page is incomplete");
                return Err(e);
            }
        }
        Ok(())
    }
}

/// Pick a title: explicit, then the first level-1 heading, then the first
/// line of body text with markup removed, then a placeholder.
pub fn derive_title(document: &Document) -> String {
    if let Some(title) = document
        .title
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
    {
        return title.to_string();
    }

    let heading = document.blocks.iter().find_map(|block| match block {
        Block::Heading { level: 1, content } => {
            Some(plain_text(content).trim().to_string()).filter(|t| !t.is_empty())
        }
        _ => None,
    });

    heading.unwrap_or_else(|| fallback_title(&document.source))
}

fn fallback_title(source: &str) -> String {
    strip_markup(source)
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(|line| line.chars().take(FALLBACK_TITLE_CHARS).collect())
        .unwrap_or_else(|| PLACEHOLDER_TITLE.to_string())
}

/// Reduce Markdown to its visible text, one line per block, without images.
fn strip_markup(source: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);

    let mut text = String::new();
    let mut image_depth = 0usize;
    for event in Parser::new_ext(source, options) {
        match event {
            Event::Start(Tag::Image { .. }) => image_depth += 1,
            Event::End(TagEnd::Image) => image_depth = image_depth.saturating_sub(1),
            Event::Text(t) | Event::Code(t) if image_depth == 0 => text.push_str(&t),
            Event::SoftBreak | Event::HardBreak => text.push('\n'),
            Event::End(TagEnd::TableCell) => text.push(' '),
            Event::End(
                TagEnd::Paragraph
                | TagEnd::Heading(_)
                | TagEnd::Item
                | TagEnd::TableHead
                | TagEnd::TableRow
                | TagEnd::CodeBlock,
            ) => text.push('\n'),
            _ => {}
        }
    }
    text
}
