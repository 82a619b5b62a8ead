//! Remote document database access.
//!
//! [`DocumentStore`] is the seam between the pipeline and the workspace
//! database. [`NotionClient`] talks to the real API; [`MemoryStore`] keeps
//! everything in process and records the calls made against it.

mod client;
mod memory;

pub use client::NotionClient;
pub use memory::{MemoryStore, StoreCall};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::Result;

/// Operations the drafter needs from the document database.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// List database pages whose status property equals `status`.
    async fn query_by_status(&self, status: &str) -> Result<Vec<PageSummary>>;

    /// Read a text-like page property as plain text.
    async fn page_property_text(&self, page_id: &str, name: &str) -> Result<Option<String>>;

    /// List all direct children of a page or block, in order.
    async fn list_children(&self, block_id: &str) -> Result<Vec<RemoteBlock>>;

    /// Create an empty page in the database and return its id.
    async fn create_page(&self, page: &NewPage) -> Result<String>;

    /// Overwrite the title and status of an existing page.
    async fn update_page(&self, page_id: &str, page: &NewPage) -> Result<()>;

    /// Append block objects under a page or block.
    async fn append_children(&self, block_id: &str, children: Vec<Value>) -> Result<()>;

    async fn delete_block(&self, block_id: &str) -> Result<()>;
}

/// A database page as returned by a status query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageSummary {
    pub id: String,
    pub title: String,
    pub status: Option<String>,
}

/// Document-level metadata for page creation and updates
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewPage {
    pub title: String,
    pub cover_url: Option<String>,
    pub status: Option<String>,
}

/// A block read back from the remote tree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteBlock {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub has_children: bool,
    /// Remaining fields, including the type-specific body keyed by `kind`
    #[serde(flatten)]
    pub body: Map<String, Value>,
}

impl RemoteBlock {
    fn type_body(&self) -> Option<&Value> {
        self.body.get(&self.kind)
    }

    /// Rich text of text-bearing blocks; empty for everything else.
    pub fn rich_text(&self) -> Vec<RichText> {
        self.type_body()
            .and_then(|body| body.get("rich_text"))
            .map(parse_rich_text)
            .unwrap_or_default()
    }

    /// URL of an image block, whether externally hosted or uploaded.
    pub fn image_url(&self) -> Option<&str> {
        let image = self.type_body()?;
        let source = image.get("type").and_then(Value::as_str).unwrap_or("external");
        image.get(source)?.get("url")?.as_str()
    }

    /// Cells of a `table_row` block.
    pub fn table_cells(&self) -> Vec<Vec<RichText>> {
        self.type_body()
            .and_then(|body| body.get("cells"))
            .and_then(Value::as_array)
            .map(|cells| cells.iter().map(parse_rich_text).collect())
            .unwrap_or_default()
    }
}

/// Decode each run on its own so one odd run does not blank the block.
fn parse_rich_text(value: &Value) -> Vec<RichText> {
    let Some(runs) = value.as_array() else {
        return Vec::new();
    };
    runs.iter()
        .filter_map(|run| match RichText::deserialize(run) {
            Ok(text) => Some(text),
            Err(e) => {
                warn!(error = %e, "skipping undecodable rich text run");
                None
            }
        })
        .collect()
}

/// One rich text run as returned by the API
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RichText {
    #[serde(default)]
    pub plain_text: String,
    #[serde(default)]
    pub href: Option<String>,
    #[serde(default)]
    pub annotations: Annotations,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Annotations {
    pub bold: bool,
    pub italic: bool,
    pub strikethrough: bool,
    pub underline: bool,
    pub code: bool,
}
