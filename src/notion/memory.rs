//! In-process [`DocumentStore`] for tests and dry runs.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::Mutex;

use super::{DocumentStore, NewPage, PageSummary, RemoteBlock};
use crate::{Error, Result};

/// A call recorded by [`MemoryStore`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    Create { title: String },
    Update { page_id: String },
    Append { block_id: String, count: usize },
    Delete { block_id: String },
}

#[derive(Debug, Clone)]
struct StoredPage {
    page: NewPage,
    properties: HashMap<String, String>,
}

#[derive(Default)]
struct Inner {
    pages: Vec<(String, StoredPage)>,
    children: HashMap<String, Vec<RemoteBlock>>,
    calls: Vec<StoreCall>,
    next_id: usize,
    /// Number of append calls allowed to succeed before appends start failing
    append_budget: Option<usize>,
}

impl Inner {
    fn fresh_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{}", self.next_id)
    }

    /// Store a block-creation object the way the API would return it.
    fn materialize(&mut self, parent: &str, object: Value) -> RemoteBlock {
        let id = self.fresh_id("block");
        let kind = object["type"].as_str().unwrap_or_default().to_string();
        let mut body = object.get(&kind).cloned().unwrap_or_else(|| json!({}));

        if let Some(runs) = body.get_mut("rich_text") {
            *runs = returned_rich_text(runs);
        }
        if let Some(cells) = body.get_mut("cells").and_then(Value::as_array_mut) {
            for cell in cells {
                *cell = returned_rich_text(cell);
            }
        }

        let nested = body
            .as_object_mut()
            .and_then(|b| b.remove("children"))
            .and_then(|c| match c {
                Value::Array(items) => Some(items),
                _ => None,
            })
            .unwrap_or_default();
        let has_children = !nested.is_empty();
        for child in nested {
            let child = self.materialize(&id, child);
            self.children.entry(id.clone()).or_default().push(child);
        }

        RemoteBlock {
            id,
            kind: kind.clone(),
            has_children,
            body: [("parent".to_string(), json!({ "block_id": parent })), (kind, body)]
                .into_iter()
                .collect(),
        }
    }
}

/// Rewrite request-side rich text (`text.content`, `text.link`) into the
/// response shape (`plain_text`, `href`, full annotations).
fn returned_rich_text(runs: &Value) -> Value {
    let Some(runs) = runs.as_array() else {
        return json!([]);
    };
    let converted: Vec<Value> = runs
        .iter()
        .map(|run| {
            let flag = |name: &str| run["annotations"][name].as_bool().unwrap_or(false);
            json!({
                "type": "text",
                "plain_text": run["text"]["content"].as_str().unwrap_or_default(),
                "href": run["text"]["link"]["url"],
                "annotations": {
                    "bold": flag("bold"),
                    "italic": flag("italic"),
                    "strikethrough": flag("strikethrough"),
                    "underline": flag("underline"),
                    "code": flag("code"),
                    "color": "default",
                },
            })
        })
        .collect();
    Value::Array(converted)
}

/// Document store held entirely in memory.
///
/// Clones share state, so a test can keep a handle while the pipeline owns
/// another.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a database page with text properties and a body of block
    /// objects. Returns the page id.
    pub async fn insert_page(
        &self,
        title: &str,
        status: &str,
        properties: &[(&str, &str)],
        children: Vec<Value>,
    ) -> String {
        let mut inner = self.inner.lock().await;
        let id = inner.fresh_id("page");
        inner.pages.push((
            id.clone(),
            StoredPage {
                page: NewPage {
                    title: title.to_string(),
                    cover_url: None,
                    status: Some(status.to_string()),
                },
                properties: properties
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            },
        ));
        let blocks: Vec<RemoteBlock> = children
            .into_iter()
            .map(|child| inner.materialize(&id, child))
            .collect();
        inner.children.insert(id.clone(), blocks);
        id
    }

    /// Make every append after the first `successes` fail.
    pub async fn fail_appends_after(&self, successes: usize) {
        self.inner.lock().await.append_budget = Some(successes);
    }

    pub async fn calls(&self) -> Vec<StoreCall> {
        self.inner.lock().await.calls.clone()
    }

    /// Sizes of every append call, in order.
    pub async fn append_sizes(&self) -> Vec<usize> {
        self.calls()
            .await
            .into_iter()
            .filter_map(|call| match call {
                StoreCall::Append { count, .. } => Some(count),
                _ => None,
            })
            .collect()
    }

    pub async fn page(&self, page_id: &str) -> Option<NewPage> {
        let inner = self.inner.lock().await;
        inner
            .pages
            .iter()
            .find(|(id, _)| id == page_id)
            .map(|(_, stored)| stored.page.clone())
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn query_by_status(&self, status: &str) -> Result<Vec<PageSummary>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .pages
            .iter()
            .filter(|(_, stored)| stored.page.status.as_deref() == Some(status))
            .map(|(id, stored)| PageSummary {
                id: id.clone(),
                title: stored.page.title.clone(),
                status: stored.page.status.clone(),
            })
            .collect())
    }

    async fn page_property_text(&self, page_id: &str, name: &str) -> Result<Option<String>> {
        let inner = self.inner.lock().await;
        let (_, stored) = inner
            .pages
            .iter()
            .find(|(id, _)| id == page_id)
            .ok_or_else(|| Error::Api {
                status: 404,
                body: format!("page {page_id} not found"),
            })?;
        Ok(stored.properties.get(name).cloned())
    }

    async fn list_children(&self, block_id: &str) -> Result<Vec<RemoteBlock>> {
        let inner = self.inner.lock().await;
        Ok(inner.children.get(block_id).cloned().unwrap_or_default())
    }

    async fn create_page(&self, page: &NewPage) -> Result<String> {
        let mut inner = self.inner.lock().await;
        inner.calls.push(StoreCall::Create {
            title: page.title.clone(),
        });
        let id = inner.fresh_id("page");
        inner.pages.push((
            id.clone(),
            StoredPage {
                page: page.clone(),
                properties: HashMap::new(),
            },
        ));
        inner.children.insert(id.clone(), Vec::new());
        Ok(id)
    }

    async fn update_page(&self, page_id: &str, page: &NewPage) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.calls.push(StoreCall::Update {
            page_id: page_id.to_string(),
        });
        match inner.pages.iter_mut().find(|(id, _)| id == page_id) {
            Some((_, stored)) => {
                stored.page.title = page.title.clone();
                stored.page.status = page.status.clone();
                Ok(())
            }
            None => Err(Error::Api {
                status: 404,
                body: format!("page {page_id} not found"),
            }),
        }
    }

    async fn append_children(&self, block_id: &str, children: Vec<Value>) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.calls.push(StoreCall::Append {
            block_id: block_id.to_string(),
            count: children.len(),
        });
        if let Some(budget) = inner.append_budget.as_mut() {
            if *budget == 0 {
                return Err(Error::Api {
                    status: 500,
                    body: "append rejected".to_string(),
                });
            }
            *budget -= 1;
        }
        let blocks: Vec<RemoteBlock> = children
            .into_iter()
            .map(|child| inner.materialize(block_id, child))
            .collect();
        inner
            .children
            .entry(block_id.to_string())
            .or_default()
            .extend(blocks);
        Ok(())
    }

    async fn delete_block(&self, block_id: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.calls.push(StoreCall::Delete {
            block_id: block_id.to_string(),
        });
        for blocks in inner.children.values_mut() {
            blocks.retain(|b| b.id != block_id);
        }
        inner.children.remove(block_id);
        Ok(())
    }
}
