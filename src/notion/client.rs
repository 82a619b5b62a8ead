//! HTTP implementation of [`DocumentStore`] against the Notion API.

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use super::{DocumentStore, NewPage, PageSummary, RemoteBlock};
use crate::config::NotionConfig;
use crate::{Error, Result};

/// Page size used for paginated listing calls.
const PAGE_SIZE: u32 = 100;

pub struct NotionClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    version: String,
    database_id: String,
    title_property: String,
    status_property: String,
}

impl NotionClient {
    pub fn new(config: &NotionConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            version: config.version.clone(),
            database_id: config.database_id.clone(),
            title_property: config.title_property.clone(),
            status_property: config.status_property.clone(),
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}/{}", self.base_url, path))
            .bearer_auth(&self.api_key)
            .header("Notion-Version", &self.version)
    }

    /// Send a request and decode the JSON body, mapping failures to errors.
    async fn send(&self, request: RequestBuilder, context: &str) -> Result<Value> {
        let response = request
            .send()
            .await
            .map_err(|e| Error::http(context, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(Error::Api {
                status: status.as_u16(),
                body,
            });
        }

        response.json().await.map_err(|e| Error::http(context, e))
    }

    fn page_properties(&self, page: &NewPage) -> Value {
        let mut properties = json!({
            &self.title_property: { "title": [{ "text": { "content": page.title } }] },
        });
        if let Some(status) = &page.status {
            properties[&self.status_property] = json!({ "status": { "name": status } });
        }
        properties
    }

    fn summarize(&self, page: &Value) -> PageSummary {
        let properties = &page["properties"];
        let title = properties[&self.title_property]["title"]
            .as_array()
            .map(|runs| concat_plain_text(runs))
            .unwrap_or_default();
        PageSummary {
            id: page["id"].as_str().unwrap_or_default().to_string(),
            title,
            status: properties[&self.status_property]["status"]["name"]
                .as_str()
                .map(str::to_string),
        }
    }
}

fn concat_plain_text(runs: &[Value]) -> String {
    runs.iter()
        .filter_map(|run| run["plain_text"].as_str())
        .collect()
}

/// Cursor for the next page of a paginated response, if any.
fn next_cursor(response: &Value) -> Option<String> {
    if response["has_more"].as_bool() == Some(true) {
        response["next_cursor"].as_str().map(str::to_string)
    } else {
        None
    }
}

#[async_trait]
impl DocumentStore for NotionClient {
    async fn query_by_status(&self, status: &str) -> Result<Vec<PageSummary>> {
        let path = format!("databases/{}/query", self.database_id);
        let mut pages = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut body = json!({
                "filter": {
                    "property": self.status_property,
                    "status": { "equals": status },
                },
                "page_size": PAGE_SIZE,
            });
            if let Some(cursor) = &cursor {
                body["start_cursor"] = json!(cursor);
            }

            let response = self
                .send(self.request(Method::POST, &path).json(&body), "database query")
                .await?;
            if let Some(results) = response["results"].as_array() {
                pages.extend(results.iter().map(|page| self.summarize(page)));
            }

            cursor = next_cursor(&response);
            if cursor.is_none() {
                break;
            }
        }

        debug!(status, count = pages.len(), "queried database");
        Ok(pages)
    }

    async fn page_property_text(&self, page_id: &str, name: &str) -> Result<Option<String>> {
        let page = self
            .send(
                self.request(Method::GET, &format!("pages/{page_id}")),
                "page retrieval",
            )
            .await?;

        let property = &page["properties"][name];
        let kind = property["type"].as_str().unwrap_or_default();
        match property[kind].as_array() {
            Some(runs) if kind == "rich_text" || kind == "title" => {
                Ok(Some(concat_plain_text(runs)))
            }
            _ => {
                debug!(page_id, name, kind, "property is not text");
                Ok(None)
            }
        }
    }

    async fn list_children(&self, block_id: &str) -> Result<Vec<RemoteBlock>> {
        let path = format!("blocks/{block_id}/children");
        let mut blocks = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut query = vec![("page_size", PAGE_SIZE.to_string())];
            if let Some(cursor) = &cursor {
                query.push(("start_cursor", cursor.clone()));
            }

            let response = self
                .send(
                    self.request(Method::GET, &path).query(&query),
                    "block children listing",
                )
                .await?;
            blocks.extend(Vec::<RemoteBlock>::deserialize(&response["results"])?);

            cursor = next_cursor(&response);
            if cursor.is_none() {
                break;
            }
        }

        Ok(blocks)
    }

    async fn create_page(&self, page: &NewPage) -> Result<String> {
        let mut body = json!({
            "parent": { "database_id": self.database_id },
            "properties": self.page_properties(page),
            "children": [],
        });
        if let Some(url) = &page.cover_url {
            body["cover"] = json!({ "type": "external", "external": { "url": url } });
        }

        let response = self
            .send(self.request(Method::POST, "pages").json(&body), "page creation")
            .await?;
        match response["id"].as_str() {
            Some(id) if !id.is_empty() => Ok(id.to_string()),
            _ => Err(Error::upstream_empty("page creation")),
        }
    }

    async fn update_page(&self, page_id: &str, page: &NewPage) -> Result<()> {
        let body = json!({ "properties": self.page_properties(page) });
        self.send(
            self.request(Method::PATCH, &format!("pages/{page_id}")).json(&body),
            "page update",
        )
        .await?;
        Ok(())
    }

    async fn append_children(&self, block_id: &str, children: Vec<Value>) -> Result<()> {
        let expected = children.len();
        let body = json!({ "children": children });
        let response = self
            .send(
                self.request(Method::PATCH, &format!("blocks/{block_id}/children"))
                    .json(&body),
                "block append",
            )
            .await?;

        let appended = response["results"].as_array().map_or(0, Vec::len);
        if expected > 0 && appended == 0 {
            return Err(Error::upstream_empty("block append"));
        }
        Ok(())
    }

    async fn delete_block(&self, block_id: &str) -> Result<()> {
        self.send(
            self.request(Method::DELETE, &format!("blocks/{block_id}")),
            "block deletion",
        )
        .await?;
        Ok(())
    }
}
