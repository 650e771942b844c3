//! Context assembly: turns a retrieval result into the text block injected
//! into the system message, plus the list of contributing filenames.

use serde::Serialize;

use crate::models::RetrievedDocument;

/// Separator placed between formatted documents.
pub const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

/// Assembled context and its sources, in similarity-descending order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AssembledContext {
    pub context: String,
    /// Filenames in input order; duplicates are kept.
    pub sources: Vec<String>,
}

impl AssembledContext {
    pub fn is_empty(&self) -> bool {
        self.context.is_empty()
    }
}

/// Format each result as `[filename]\n{content}` and join them with
/// [`CONTEXT_SEPARATOR`]. Empty input yields an empty context.
pub fn assemble(results: &[RetrievedDocument]) -> AssembledContext {
    let context = results
        .iter()
        .map(|doc| format!("[{}]\n{}", doc.filename, doc.content))
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR);
    let sources = results.iter().map(|doc| doc.filename.clone()).collect();

    AssembledContext { context, sources }
}
