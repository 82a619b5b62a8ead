/// Inline style flags carried by a span
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Style {
    pub bold: bool,
    pub italic: bool,
    pub strikethrough: bool,
    pub underline: bool,
    pub code: bool,
}

impl Style {
    pub const PLAIN: Style = Style {
        bold: false,
        italic: false,
        strikethrough: false,
        underline: false,
        code: false,
    };

    pub const BOLD: Style = Style {
        bold: true,
        ..Style::PLAIN
    };

    pub fn is_plain(&self) -> bool {
        *self == Style::PLAIN
    }
}

/// An inline run of text with a uniform style and optional link
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    pub text: String,
    pub style: Style,
    pub link: Option<String>,
}

impl Span {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            style: Style::PLAIN,
            link: None,
        }
    }

    pub fn bold(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            style: Style::BOLD,
            link: None,
        }
    }

    pub fn link(text: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            style: Style::PLAIN,
            link: Some(url.into()),
        }
    }

    pub fn with_style(mut self, style: Style) -> Self {
        self.style = style;
        self
    }
}

/// Concatenate the text of a span run, dropping all styling
pub fn plain_text(spans: &[Span]) -> String {
    spans.iter().map(|s| s.text.as_str()).collect()
}

/// Block-level elements produced from Markdown
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    Heading {
        level: u8,
        content: Vec<Span>,
    },
    Paragraph {
        content: Vec<Span>,
    },
    BulletItem {
        content: Vec<Span>,
    },
    NumberedItem {
        content: Vec<Span>,
    },
    Quote {
        content: Vec<Span>,
    },
    Image {
        url: String,
    },
    /// Header row plus data rows; every data row is exactly `headers.len()` wide
    Table {
        headers: Vec<Vec<Span>>,
        rows: Vec<Vec<Vec<Span>>>,
    },
}

impl Block {
    /// Remote block type name, used for logging and type-sequence comparisons.
    pub fn kind(&self) -> &'static str {
        match self {
            Block::Heading { level: 1, .. } => "heading_1",
            Block::Heading { level: 2, .. } => "heading_2",
            Block::Heading { .. } => "heading_3",
            Block::Paragraph { .. } => "paragraph",
            Block::BulletItem { .. } => "bulleted_list_item",
            Block::NumberedItem { .. } => "numbered_list_item",
            Block::Quote { .. } => "quote",
            Block::Image { .. } => "image",
            Block::Table { .. } => "table",
        }
    }

    /// Column count of a table block.
    pub fn width(&self) -> Option<usize> {
        match self {
            Block::Table { headers, .. } => Some(headers.len()),
            _ => None,
        }
    }

    /// Inline content of text-bearing blocks.
    pub fn content(&self) -> Option<&[Span]> {
        match self {
            Block::Heading { content, .. }
            | Block::Paragraph { content }
            | Block::BulletItem { content }
            | Block::NumberedItem { content }
            | Block::Quote { content } => Some(content),
            Block::Image { .. } | Block::Table { .. } => None,
        }
    }
}

/// A drafted article ready for submission
#[derive(Debug, Clone, Default)]
pub struct Document {
    pub title: Option<String>,
    pub cover_url: Option<String>,
    pub blocks: Vec<Block>,
    /// Raw Markdown the blocks were built from; used for title fallback
    pub source: String,
}

impl Document {
    /// Parse Markdown into a document with no explicit title or cover.
    pub fn from_markdown(markdown: &str) -> Self {
        Self {
            title: None,
            cover_url: None,
            blocks: crate::parser::parse(markdown),
            source: markdown.to_string(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_cover(mut self, url: impl Into<String>) -> Self {
        self.cover_url = Some(url.into());
        self
    }
}
