use crate::types::{Citation, RankedResult};

/// Maps ranked passages to citation records, one per passage, in order.
#[derive(Debug, Clone, Copy)]
pub struct CitationBuilder {
    preview_chars: usize,
}

impl Default for CitationBuilder {
    fn default() -> Self { Self { preview_chars: 200 } }
}

impl CitationBuilder {
    pub fn new(preview_chars: usize) -> Self { Self { preview_chars: preview_chars.max(1) } }

    pub fn build(&self, ranked: &[RankedResult]) -> Vec<Citation> {
        ranked
            .iter()
            .map(|r| {
                let chunk = &r.chunk;
                let (text_preview, preview_truncated) = preview(&chunk.text, self.preview_chars);
                Citation {
                    chunk_id: chunk.id.clone(),
                    document_name: chunk.document_name.clone(),
                    chapter: chunk.chapter.clone(),
                    article: chunk.article.clone(),
                    clause: chunk.clause.clone(),
                    page_number: chunk.page_number,
                    text_preview,
                    preview_truncated,
                    locator: chunk.locator(),
                }
            })
            .collect()
    }
}

/// First `max_chars` characters of `text`, and whether anything was cut.
fn preview(text: &str, max_chars: usize) -> (String, bool) {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => (text[..idx].to_string(), true),
        None => (text.to_string(), false),
    }
}
