//! Text extraction for binary uploads (PDF, DOCX).
//!
//! [`DocumentExtractor`] is the production [`TextExtractor`]: it runs the
//! synchronous parsers on the blocking thread pool and returns one
//! whitespace-normalized UTF-8 string per document. Parser errors and
//! parser panics both surface as extraction errors.

use std::io::Read;

use async_trait::async_trait;
use quick_xml::events::Event;

use ragchat_core::ingest::{SourceFormat, TextExtractor};
use ragchat_core::{RagError, Result};

/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("not a binary document format: {0:?}")]
    UnsupportedFormat(SourceFormat),
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("DOCX extraction failed: {0}")]
    Docx(String),
}

impl From<ExtractError> for RagError {
    fn from(err: ExtractError) -> Self {
        RagError::extraction(err.to_string())
    }
}

/// Extract raw text from `bytes` in the given format.
pub fn extract_text(bytes: &[u8], format: SourceFormat) -> std::result::Result<String, ExtractError> {
    match format {
        SourceFormat::Pdf => extract_pdf(bytes),
        SourceFormat::Docx => extract_docx(bytes),
        other => Err(ExtractError::UnsupportedFormat(other)),
    }
}

/// Collapse every run of whitespace to a single space and trim the ends.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn extract_pdf(bytes: &[u8]) -> std::result::Result<String, ExtractError> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
}

fn read_zip_entry_bounded(
    archive: &mut zip::ZipArchive<std::io::Cursor<&[u8]>>,
    name: &str,
    max_bytes: u64,
) -> std::result::Result<Vec<u8>, ExtractError> {
    let entry = archive
        .by_name(name)
        .map_err(|e| ExtractError::Docx(format!("{}: {}", name, e)))?;
    let mut out = Vec::new();
    entry
        .take(max_bytes)
        .read_to_end(&mut out)
        .map_err(|e| ExtractError::Docx(e.to_string()))?;
    if out.len() as u64 >= max_bytes {
        return Err(ExtractError::Docx(format!(
            "ZIP entry {} exceeds size limit ({} bytes)",
            name, max_bytes
        )));
    }
    Ok(out)
}

fn extract_docx(bytes: &[u8]) -> std::result::Result<String, ExtractError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ExtractError::Docx(e.to_string()))?;
    let xml = read_zip_entry_bounded(&mut archive, "word/document.xml", MAX_XML_ENTRY_BYTES)?;
    extract_w_t_elements(&xml)
}

/// Concatenate `<w:t>` runs; paragraphs, tabs and breaks become whitespace.
fn extract_w_t_elements(xml: &[u8]) -> std::result::Result<String, ExtractError> {
    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut in_text = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_text = true,
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => out.push('\n'),
                _ => {}
            },
            Ok(Event::Empty(e)) => {
                if matches!(e.local_name().as_ref(), b"tab" | b"br" | b"cr") {
                    out.push(' ');
                }
            }
            Ok(Event::Text(te)) if in_text => {
                let text = te
                    .unescape()
                    .map_err(|e| ExtractError::Docx(e.to_string()))?;
                out.push_str(&text);
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Docx(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(out)
}

/// Production extractor for PDF and DOCX uploads.
#[derive(Debug, Clone, Copy, Default)]
pub struct DocumentExtractor;

#[async_trait]
impl TextExtractor for DocumentExtractor {
    async fn extract(&self, bytes: Vec<u8>, format: SourceFormat) -> Result<String> {
        let joined = tokio::task::spawn_blocking(move || extract_text(&bytes, format)).await;
        match joined {
            Ok(Ok(text)) => Ok(normalize_whitespace(&text)),
            Ok(Err(e)) => Err(e.into()),
            Err(e) if e.is_panic() => Err(RagError::extraction(format!(
                "{:?} parser panicked on malformed input",
                format
            ))),
            Err(e) => Err(RagError::extraction(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn docx_with_body(body: &str) -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
            zip.start_file("word/document.xml", zip::write::SimpleFileOptions::default())
                .unwrap();
            let xml = format!(
                "<?xml version=\"1.0\"?><w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\"><w:body>{}</w:body></w:document>",
                body
            );
            zip.write_all(xml.as_bytes()).unwrap();
            zip.finish().unwrap();
        }
        buf
    }

    #[test]
    fn plain_formats_are_not_extracted() {
        let err = extract_text(b"foo", SourceFormat::PlainText).unwrap_err();
        assert!(matches!(err, ExtractError::UnsupportedFormat(_)));
    }

    #[test]
    fn invalid_pdf_returns_error() {
        let err = extract_text(b"not a pdf", SourceFormat::Pdf).unwrap_err();
        assert!(matches!(err, ExtractError::Pdf(_)));
    }

    #[test]
    fn invalid_zip_returns_error_for_docx() {
        let err = extract_text(b"not a zip", SourceFormat::Docx).unwrap_err();
        assert!(matches!(err, ExtractError::Docx(_)));
    }

    #[test]
    fn docx_without_document_xml_is_an_error() {
        let mut buf = Vec::new();
        {
            let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
            zip.start_file("other.xml", zip::write::SimpleFileOptions::default())
                .unwrap();
            zip.write_all(b"<x/>").unwrap();
            zip.finish().unwrap();
        }
        assert!(matches!(
            extract_text(&buf, SourceFormat::Docx),
            Err(ExtractError::Docx(_))
        ));
    }

    #[test]
    fn docx_runs_and_paragraphs() {
        let bytes = docx_with_body(
            "<w:p><w:r><w:t>Quar</w:t></w:r><w:r><w:t>terly</w:t></w:r><w:r><w:t xml:space=\"preserve\"> report</w:t></w:r></w:p>\
             <w:p><w:r><w:t>Fish &amp; chips</w:t><w:tab/><w:t>end</w:t></w:r></w:p>",
        );
        let text = extract_text(&bytes, SourceFormat::Docx).unwrap();
        assert_eq!(
            normalize_whitespace(&text),
            "Quarterly report Fish & chips end"
        );
    }

    #[test]
    fn normalizes_whitespace() {
        assert_eq!(normalize_whitespace("  a\n\n b\t\tc  "), "a b c");
        assert_eq!(normalize_whitespace(" \n\t "), "");
    }

    #[tokio::test]
    async fn extractor_maps_failures_to_extraction_errors() {
        let err = DocumentExtractor
            .extract(b"%PDF-garbage".to_vec(), SourceFormat::Pdf)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "extraction_error");
    }

    #[tokio::test]
    async fn extractor_normalizes_docx_output() {
        let bytes = docx_with_body("<w:p><w:r><w:t>one</w:t></w:r></w:p><w:p><w:r><w:t>two</w:t></w:r></w:p>");
        let text = DocumentExtractor
            .extract(bytes, SourceFormat::Docx)
            .await
            .unwrap();
        assert_eq!(text, "one two");
    }
}
