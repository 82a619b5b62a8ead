mod block;
pub mod config;
mod error;
pub mod extract;
pub mod image;
mod inline;
pub mod llm;
pub mod notify;
pub mod notion;
mod parser;
pub mod payload;
pub mod pipeline;
pub mod submit;
mod table;

pub use block::{Block, Document, Span, Style, plain_text};
pub use config::Config;
pub use error::{Error, Result};
pub use extract::extract;
pub use pipeline::{Pipeline, RunReport};
pub use submit::Submitter;

/// Parse markdown text into a vector of blocks.
pub fn parse(markdown: &str) -> Vec<Block> {
    parser::parse(markdown)
}

/// Resolve one line of text into styled inline spans.
pub fn resolve_inline(line: &str) -> Vec<Span> {
    inline::resolve(line)
}
