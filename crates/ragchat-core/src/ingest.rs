//! Ingestion pipeline: validate → extract → truncate → embed → persist.
//!
//! Validation failures are returned before any collaborator is called.
//! Embedding failures abort the upload, so no document is ever stored
//! without its vector.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::embedding::Embedder;
use crate::error::{RagError, Result};
use crate::models::NewDocument;
use crate::store::DocumentStore;

/// Maximum number of characters kept from an uploaded document.
pub const MAX_CONTENT_CHARS: usize = 50_000;

/// Source format, detected from the filename extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    PlainText,
    Pdf,
    Docx,
    Unknown,
}

const TEXT_EXTENSIONS: &[&str] = &[
    "txt", "text", "md", "markdown", "csv", "tsv", "json", "log", "rst", "html", "htm", "xml",
    "yaml", "yml", "toml",
];

impl SourceFormat {
    pub fn from_filename(filename: &str) -> Self {
        let ext = match filename.trim().rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => ext.to_ascii_lowercase(),
            _ => return SourceFormat::Unknown,
        };
        match ext.as_str() {
            "pdf" => SourceFormat::Pdf,
            "docx" => SourceFormat::Docx,
            e if TEXT_EXTENSIONS.contains(&e) => SourceFormat::PlainText,
            _ => SourceFormat::Unknown,
        }
    }

    /// Whether bytes in this format must go through a [`TextExtractor`].
    pub fn is_binary(self) -> bool {
        matches!(self, SourceFormat::Pdf | SourceFormat::Docx)
    }
}

/// Converts a binary document into one normalized text stream.
///
/// Implementations must be deterministic and collapse internal whitespace.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract(&self, bytes: Vec<u8>, format: SourceFormat) -> Result<String>;
}

/// What to do with uploads whose extension is not recognized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnknownFormatPolicy {
    /// Decode the bytes as (lossy) UTF-8 text.
    #[default]
    PassThrough,
    /// Reject the upload with a validation error.
    Reject,
}

#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub max_content_chars: usize,
    pub unknown_format: UnknownFormatPolicy,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            max_content_chars: MAX_CONTENT_CHARS,
            unknown_format: UnknownFormatPolicy::default(),
        }
    }
}

/// Payload of an upload.
#[derive(Debug, Clone)]
pub enum UploadBody {
    /// Already-decoded text; never sent to the extractor.
    Text(String),
    /// Raw file bytes; interpreted according to the filename extension.
    Bytes(Vec<u8>),
}

#[derive(Debug, Clone)]
pub struct Upload {
    pub filename: String,
    pub body: UploadBody,
}

impl Upload {
    pub fn text(filename: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            body: UploadBody::Text(text.into()),
        }
    }

    pub fn bytes(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            body: UploadBody::Bytes(bytes),
        }
    }
}

/// Result of a successful ingestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestReceipt {
    pub id: String,
    pub filename: String,
    /// Characters actually stored.
    pub chars: usize,
    /// Whether the text was cut at the content cap.
    pub truncated: bool,
}

/// Keep at most `max_chars` characters (not bytes) of `text`.
pub fn truncate_chars(text: &str, max_chars: usize) -> (&str, bool) {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => (&text[..byte_idx], true),
        None => (text, false),
    }
}

/// Drives the extractor, embedder and store for one upload at a time.
#[derive(Clone)]
pub struct Ingestor {
    store: Arc<dyn DocumentStore>,
    embedder: Arc<dyn Embedder>,
    extractor: Arc<dyn TextExtractor>,
    options: IngestOptions,
}

impl Ingestor {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        embedder: Arc<dyn Embedder>,
        extractor: Arc<dyn TextExtractor>,
        options: IngestOptions,
    ) -> Self {
        Self {
            store,
            embedder,
            extractor,
            options,
        }
    }

    pub async fn ingest(&self, upload: Upload) -> Result<IngestReceipt> {
        let has_content = match &upload.body {
            UploadBody::Text(text) => !text.is_empty(),
            UploadBody::Bytes(bytes) => !bytes.is_empty(),
        };
        if !has_content {
            return Err(RagError::validation("no content supplied"));
        }

        let filename = upload.filename.trim().to_string();
        if filename.is_empty() {
            return Err(RagError::validation("filename must not be empty"));
        }

        let format = SourceFormat::from_filename(&filename);
        let text = match upload.body {
            UploadBody::Text(text) => text,
            UploadBody::Bytes(bytes) => self.decode(&filename, bytes, format).await?,
        };

        let (content, truncated) = truncate_chars(&text, self.options.max_content_chars);
        if content.trim().is_empty() {
            return Err(RagError::validation(format!(
                "{} contains no text",
                filename
            )));
        }
        let chars = content.chars().count();

        let embedding = self.embedder.embed(content).await?;

        let id = self
            .store
            .insert(&NewDocument {
                filename: filename.clone(),
                content: content.to_string(),
                embedding,
            })
            .await?;

        tracing::info!(%id, %filename, chars, truncated, "document indexed");

        Ok(IngestReceipt {
            id,
            filename,
            chars,
            truncated,
        })
    }

    async fn decode(&self, filename: &str, bytes: Vec<u8>, format: SourceFormat) -> Result<String> {
        match format {
            SourceFormat::Pdf | SourceFormat::Docx => {
                let text = self.extractor.extract(bytes, format).await?;
                tracing::debug!(%filename, ?format, chars = text.len(), "text extracted");
                Ok(text)
            }
            SourceFormat::PlainText => Ok(String::from_utf8_lossy(&bytes).into_owned()),
            SourceFormat::Unknown => match self.options.unknown_format {
                UnknownFormatPolicy::PassThrough => {
                    tracing::warn!(%filename, "unrecognized extension, reading as text");
                    Ok(String::from_utf8_lossy(&bytes).into_owned())
                }
                UnknownFormatPolicy::Reject => Err(RagError::validation(format!(
                    "unsupported file type: {}",
                    filename
                ))),
            },
        }
    }
}
