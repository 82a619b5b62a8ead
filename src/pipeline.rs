//! Batch drafting: prompts in the database become drafted articles.
//!
//! Items are processed one at a time. A failing item is logged and recorded
//! in the [`RunReport`]; it never stops the items after it.

use std::fmt::Write as _;
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::block::Document;
use crate::config::{Config, PipelineConfig};
use crate::extract::extract;
use crate::image::{CoverArtist, DreaminaClient};
use crate::llm::{
    CompletionRequest, LlmProvider, OpenAiCompatProvider, StopReason, StructuredExtractor,
};
use crate::notify::{self, Notifier, NullNotifier};
use crate::notion::{DocumentStore, NotionClient, PageSummary};
use crate::submit::Submitter;
use crate::{Error, Result};

/// Outcome of one run, keyed by source page id
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub succeeded: Vec<String>,
    /// Source page id and the error that stopped it
    pub failed: Vec<(String, String)>,
}

impl RunReport {
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn summary(&self) -> String {
        let mut text = format!("Drafted {} of {} pages.", self.succeeded.len(), self.total());
        for (id, message) in &self.failed {
            let _ = write!(text, "\n- {id}: {message}");
        }
        text
    }
}

pub struct Pipeline {
    store: Arc<dyn DocumentStore>,
    writer: Arc<dyn LlmProvider>,
    covers: Option<CoverArtist>,
    notifier: Arc<dyn Notifier>,
    settings: PipelineConfig,
    max_tokens: u32,
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        writer: Arc<dyn LlmProvider>,
        settings: PipelineConfig,
    ) -> Self {
        Self {
            store,
            writer,
            covers: None,
            notifier: Arc::new(NullNotifier),
            settings,
            max_tokens: 8192,
        }
    }

    /// Wire up the remote clients described by `config`.
    pub fn from_config(config: &Config) -> Self {
        let store = Arc::new(NotionClient::new(&config.notion));
        let writer = Arc::new(OpenAiCompatProvider::new(
            &config.llm.api_key,
            &config.llm.base_url,
            &config.llm.draft_model,
        ));
        let mut pipeline = Self::new(store, writer, config.pipeline.clone())
            .with_max_tokens(config.llm.max_tokens)
            .with_notifier(notify::from_webhook_url(&config.notify.discord_webhook_url));

        if config.pipeline.cover {
            let scene_writer = Arc::new(OpenAiCompatProvider::new(
                &config.llm.api_key,
                &config.llm.base_url,
                &config.llm.extract_model,
            ));
            pipeline = pipeline.with_covers(CoverArtist::new(
                StructuredExtractor::new(scene_writer, CoverArtist::scene_shape()),
                Arc::new(DreaminaClient::new(&config.image)),
            ));
        }
        pipeline
    }

    pub fn with_covers(mut self, covers: CoverArtist) -> Self {
        self.covers = Some(covers);
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Draft every page waiting in the source status.
    ///
    /// Only a failed listing aborts the run. Per-item failures end up in the
    /// report, which is also sent through the notifier.
    pub async fn run(&self) -> Result<RunReport> {
        let pages = self
            .store
            .query_by_status(&self.settings.source_status)
            .await?;
        info!(status = %self.settings.source_status, count = pages.len(), "found prompt pages");

        let mut report = RunReport::default();
        for (index, page) in pages.iter().enumerate() {
            info!(item = index + 1, page_id = %page.id, title = %page.title, "drafting");
            match self.process(page).await {
                Ok(draft_id) => {
                    info!(page_id = %page.id, draft_id = %draft_id, "draft created");
                    report.succeeded.push(page.id.clone());
                }
                Err(e) => {
                    error!(page_id = %page.id, error = %e, "drafting failed");
                    report.failed.push((page.id.clone(), e.to_string()));
                }
            }
        }

        let summary = report.summary();
        info!(succeeded = report.succeeded.len(), failed = report.failed.len(), "run finished");
        if report.is_clean() {
            self.notifier.success("Drafting finished", &summary).await;
        } else {
            self.notifier.failure("Drafting finished with errors", &summary).await;
        }
        Ok(report)
    }

    async fn process(&self, page: &PageSummary) -> Result<String> {
        let prompt = extract(self.store.as_ref(), &page.id).await?;
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(Error::upstream_empty("prompt extraction"));
        }

        let title = self
            .store
            .page_property_text(&page.id, &self.settings.title_property)
            .await?
            .map(|t| t.replace('\n', " ").trim().to_string())
            .filter(|t| !t.is_empty());

        let response = self
            .writer
            .complete(CompletionRequest::user(prompt).with_max_tokens(self.max_tokens))
            .await?;
        if response.stop_reason == StopReason::MaxTokens {
            warn!(page_id = %page.id, max_tokens = self.max_tokens, "draft hit the token limit");
        }
        let draft = response.content;
        if draft.trim().is_empty() {
            return Err(Error::upstream_empty("article draft"));
        }

        let (markdown, cover) = match &self.covers {
            Some(artist) => {
                let url = artist.cover_for(&draft).await?;
                (format!("![thumbnail]({url})\n\n{draft}"), Some(url))
            }
            None => (draft, None),
        };

        let mut document = Document::from_markdown(&markdown);
        if let Some(title) = title {
            document = document.with_title(title);
        }
        if let Some(url) = cover {
            document = document.with_cover(url);
        }

        Submitter::new(self.store.clone())
            .with_status(&self.settings.draft_status)
            .submit(&document)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::Block;
    use crate::image::StubImageGenerator;
    use crate::llm::MockLlmProvider;
    use crate::notify::RecordingNotifier;
    use crate::notion::{MemoryStore, NewPage, RemoteBlock};
    use async_trait::async_trait;
    use serde_json::{Value, json};

    const DRAFT: &str = "# Rust at Work\n\nTeams ship **faster**.\n\n- one\n- two";

    fn paragraph(text: &str) -> Value {
        json!({
            "type": "paragraph",
            "paragraph": { "rich_text": [{ "type": "text", "text": { "content": text } }] }
        })
    }

    fn settings() -> PipelineConfig {
        Config::compiled_default().pipeline
    }

    async fn prompt_page(store: &MemoryStore, name: &str, intro: Option<&str>) -> String {
        let properties: Vec<(&str, &str)> = intro.map(|i| ("intro_en", i)).into_iter().collect();
        store
            .insert_page(name, "Prompt", &properties, vec![paragraph(&format!("Research {name}"))])
            .await
    }

    async fn draft_pages(store: &MemoryStore) -> Vec<PageSummary> {
        store.query_by_status("Draft").await.unwrap()
    }

    #[tokio::test]
    async fn drafts_with_cover_and_intro_title() {
        let store = MemoryStore::new();
        let source = prompt_page(&store, "rust", Some("Why Rust\nmatters")).await;
        let writer = MockLlmProvider::with_response(DRAFT);
        let scenes = MockLlmProvider::with_response(r#"{"description":"engineers at work"}"#);
        let notifier = Arc::new(RecordingNotifier::default());

        let report = Pipeline::new(Arc::new(store.clone()), Arc::new(writer.clone()), settings())
            .with_covers(CoverArtist::new(
                StructuredExtractor::new(Arc::new(scenes), CoverArtist::scene_shape()),
                Arc::new(StubImageGenerator::with_urls(&["https://img.test/cover.png"])),
            ))
            .with_notifier(notifier.clone())
            .run()
            .await
            .unwrap();

        assert_eq!(report.succeeded, vec![source]);
        assert!(report.is_clean());
        assert_eq!(writer.requests().await[0].messages[0].content, "Research rust");

        let drafts = draft_pages(&store).await;
        assert_eq!(drafts.len(), 1);
        assert_eq!(
            store.page(&drafts[0].id).await,
            Some(NewPage {
                title: "Why Rust matters".into(),
                cover_url: Some("https://img.test/cover.png".into()),
                status: Some("Draft".into()),
            })
        );

        let body: Vec<RemoteBlock> = store.list_children(&drafts[0].id).await.unwrap();
        let kinds: Vec<&str> = body.iter().map(|b| b.kind.as_str()).collect();
        assert_eq!(
            kinds,
            ["image", "heading_1", "paragraph", "bulleted_list_item", "bulleted_list_item"]
        );
        assert_eq!(body[0].image_url(), Some("https://img.test/cover.png"));

        let sent = notifier.sent.lock().await;
        assert_eq!(sent.len(), 1);
        assert!(sent[0].0);
        assert_eq!(sent[0].2, "Drafted 1 of 1 pages.");
    }

    #[tokio::test]
    async fn failing_item_does_not_stop_the_next() {
        let store = MemoryStore::new();
        let first = prompt_page(&store, "first", None).await;
        let second = prompt_page(&store, "second", None).await;
        let writer = MockLlmProvider::with_response(DRAFT);
        writer.fail_next(400, "context too long").await;
        let notifier = Arc::new(RecordingNotifier::default());

        let report = Pipeline::new(Arc::new(store.clone()), Arc::new(writer), settings())
            .with_notifier(notifier.clone())
            .run()
            .await
            .unwrap();

        assert_eq!(report.succeeded, vec![second]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, first);
        assert!(report.failed[0].1.contains("context too long"));

        // Without an intro property the title comes from the draft heading.
        let drafts = draft_pages(&store).await;
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].title, "Rust at Work");

        let sent = notifier.sent.lock().await;
        assert!(!sent[0].0);
        assert!(sent[0].2.starts_with("Drafted 1 of 2 pages."));
    }

    #[tokio::test]
    async fn empty_prompt_page_is_reported() {
        let store = MemoryStore::new();
        let empty = store.insert_page("empty", "Prompt", &[], vec![]).await;
        let writer = MockLlmProvider::with_response(DRAFT);

        let report = Pipeline::new(Arc::new(store.clone()), Arc::new(writer.clone()), settings())
            .run()
            .await
            .unwrap();

        assert_eq!(report.failed, vec![(empty, "Empty result from prompt extraction".to_string())]);
        assert!(writer.requests().await.is_empty());
    }

    #[tokio::test]
    async fn cover_failure_skips_submission() {
        let store = MemoryStore::new();
        prompt_page(&store, "a", None).await;
        let scenes = MockLlmProvider::with_response(r#"{"description":"x"}"#);

        let report = Pipeline::new(
            Arc::new(store.clone()),
            Arc::new(MockLlmProvider::with_response(DRAFT)),
            settings(),
        )
        .with_covers(CoverArtist::new(
            StructuredExtractor::new(Arc::new(scenes), CoverArtist::scene_shape()),
            Arc::new(StubImageGenerator::default()),
        ))
        .run()
        .await
        .unwrap();

        assert_eq!(report.failed.len(), 1);
        assert!(draft_pages(&store).await.is_empty());
    }

    struct UnreachableStore;

    #[async_trait]
    impl DocumentStore for UnreachableStore {
        async fn query_by_status(&self, _status: &str) -> Result<Vec<PageSummary>> {
            Err(Error::Api { status: 503, body: "down".into() })
        }
        async fn page_property_text(&self, _page_id: &str, _name: &str) -> Result<Option<String>> {
            unreachable!()
        }
        async fn list_children(&self, _block_id: &str) -> Result<Vec<RemoteBlock>> {
            unreachable!()
        }
        async fn create_page(&self, _page: &NewPage) -> Result<String> {
            unreachable!()
        }
        async fn update_page(&self, _page_id: &str, _page: &NewPage) -> Result<()> {
            unreachable!()
        }
        async fn append_children(&self, _block_id: &str, _children: Vec<Value>) -> Result<()> {
            unreachable!()
        }
        async fn delete_block(&self, _block_id: &str) -> Result<()> {
            unreachable!()
        }
    }

    #[tokio::test]
    async fn listing_failure_aborts_the_run() {
        let notifier = Arc::new(RecordingNotifier::default());
        let err = Pipeline::new(
            Arc::new(UnreachableStore),
            Arc::new(MockLlmProvider::with_response(DRAFT)),
            settings(),
        )
        .with_notifier(notifier.clone())
        .run()
        .await
        .unwrap_err();

        assert!(matches!(err, Error::Api { status: 503, .. }));
        assert!(notifier.sent.lock().await.is_empty());
    }

    #[tokio::test]
    async fn truncated_draft_is_still_submitted() {
        let store = MemoryStore::new();
        let source = prompt_page(&store, "long", None).await;
        let writer = MockLlmProvider::with_response(DRAFT);
        writer.stop_with(StopReason::MaxTokens).await;

        let report = Pipeline::new(Arc::new(store.clone()), Arc::new(writer.clone()), settings())
            .with_max_tokens(256)
            .run()
            .await
            .unwrap();

        assert_eq!(report.succeeded, vec![source]);
        assert_eq!(writer.requests().await[0].max_tokens, 256);
        assert_eq!(draft_pages(&store).await.len(), 1);
    }

    #[test]
    fn summary_lists_failures() {
        let report = RunReport {
            succeeded: vec!["a".into()],
            failed: vec![("b".into(), "boom".into())],
        };
        assert_eq!(report.summary(), "Drafted 1 of 2 pages.\n- b: boom");
    }

    #[test]
    fn draft_markdown_keeps_thumbnail_first() {
        let doc = Document::from_markdown(&format!("![thumbnail](https://c)\n\n{DRAFT}"));
        assert!(matches!(doc.blocks[0], Block::Image { ref url } if url == "https://c"));
    }
}
