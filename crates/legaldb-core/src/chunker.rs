//! Structure-aware chunking of regulatory text.
//!
//! Lines are scanned for chapter / article / clause markers. Every clause
//! becomes one chunk; text before the first clause of an article becomes its
//! own chunk. Heading lines with no body yet are carried into the next chunk
//! of the same scope. A clause longer than the token budget is split at
//! sentence boundaries into parts that share its locators.
use regex::Regex;
use std::sync::{Arc, LazyLock};
use tracing::{debug, info, warn};

use crate::config::ChunkingConfig;
use crate::metadata::DocumentMetadata;
use crate::traits::TokenCounter;
use crate::types::{chapter_label, Chunk, StructuredText};

static CHAPTER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:chương|chapter)\s+([IVXLCDM]+|\d+)\b[\s:.\-–]*(.*)$").expect("chapter pattern")
});
static APPENDIX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:phụ\s+lục|appendix)\s+(\d+|[A-Z])\b[\s:.\-–]*(.*)$").expect("appendix pattern")
});
static ARTICLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:điều|article)\s+(\d+[a-z]?)\b[\s:.\-–]*(.*)$").expect("article pattern")
});
static NAMED_CLAUSE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:khoản|clause)\s+(\d+)\b[\s:.\-–)]*(.*)$").expect("named clause pattern")
});
static NUMBERED_CLAUSE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:(\d{1,3}(?:\.\d{1,3})+)\.?\s+\S|(\d{1,3})[.)](?:\s+\S|\s*$))").expect("numbered clause pattern")
});
static MALFORMED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:chương|chapter|điều|article|khoản|clause|phụ\s+lục|appendix)\s*(?:[.:\-–)]|$)")
        .expect("malformed marker pattern")
});
static NUMBERING_ONLY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{1,3}(?:\.\d{1,3})*\.$").expect("numbering pattern"));

#[derive(Debug, Clone, PartialEq, Eq)]
enum Marker {
    Chapter { number: String, title: Option<String> },
    Article { number: String, title: Option<String> },
    Clause { number: String },
    Malformed,
    Text,
}

fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    if s.is_empty() { None } else { Some(s.to_string()) }
}

fn classify(line: &str) -> Marker {
    if let Some(c) = CHAPTER_RE.captures(line) {
        return Marker::Chapter { number: c[1].to_uppercase(), title: non_empty(&c[2]) };
    }
    if let Some(c) = APPENDIX_RE.captures(line) {
        return Marker::Chapter { number: format!("Phụ lục {}", c[1].to_uppercase()), title: non_empty(&c[2]) };
    }
    if let Some(c) = ARTICLE_RE.captures(line) {
        return Marker::Article { number: c[1].to_string(), title: non_empty(&c[2]) };
    }
    if let Some(c) = NAMED_CLAUSE_RE.captures(line) {
        return Marker::Clause { number: c[1].to_string() };
    }
    if let Some(c) = NUMBERED_CLAUSE_RE.captures(line) {
        if let Some(m) = c.get(1).or_else(|| c.get(2)) {
            return Marker::Clause { number: m.as_str().to_string() };
        }
    }
    if MALFORMED_RE.is_match(line) {
        return Marker::Malformed;
    }
    Marker::Text
}

#[derive(Debug, Clone, Default, PartialEq)]
struct Scope {
    chapter: Option<String>,
    chapter_title: Option<String>,
    article: Option<String>,
    article_title: Option<String>,
    clause: Option<String>,
}

impl Scope {
    fn path(&self, document_name: &str) -> String {
        let mut parts = Vec::new();
        if !document_name.trim().is_empty() { parts.push(document_name.trim().to_string()); }
        if let Some(chapter) = &self.chapter {
            let label = chapter_label(chapter);
            parts.push(match &self.chapter_title { Some(t) => format!("{label}: {t}"), None => label });
        }
        if let Some(article) = &self.article {
            let label = format!("Điều {article}");
            parts.push(match &self.article_title { Some(t) => format!("{label}: {t}"), None => label });
        }
        parts.join(" > ")
    }
}

#[derive(Debug, Default)]
struct Block {
    scope: Scope,
    lines: Vec<String>,
    start: usize,
    has_body: bool,
}

impl Block {
    fn with_scope(scope: Scope) -> Self { Self { scope, ..Self::default() } }

    fn push(&mut self, line: &str, offset: usize, body: bool) {
        if self.lines.is_empty() { self.start = offset; }
        self.lines.push(line.to_string());
        self.has_body |= body;
    }
}

/// A scope-homogeneous run of lines, before token budgeting.
#[derive(Debug)]
struct Section {
    scope: Scope,
    body: String,
    start: usize,
}

pub struct StructuralChunker {
    config: ChunkingConfig,
    counter: Arc<dyn TokenCounter>,
}

impl StructuralChunker {
    pub fn new(config: ChunkingConfig, counter: Arc<dyn TokenCounter>) -> Self { Self { config, counter } }

    /// Split one document into ordered chunks. Never fails: text without
    /// markers, or with malformed markers, is emitted with null locators.
    pub fn chunk(&self, document_id: &str, text: &StructuredText) -> Vec<Chunk> {
        if text.body.trim().is_empty() {
            warn!(document_id, "document is empty; no chunks produced");
            return Vec::new();
        }
        let document_code = DocumentMetadata::extract(&text.body).document_code;
        let sections = self.sections(document_id, &text.body);

        let mut chunks = Vec::new();
        for section in sections {
            let context_path = section.scope.path(&text.title);
            let header = if self.config.include_parent_path { context_path.as_str() } else { "" };
            let page_number = text.page_at(section.start);
            let parts = self.fit_to_budget(header, &section.body);
            let split = parts.len() > 1;
            for (part, (chunk_text, token_count)) in parts.into_iter().enumerate() {
                chunks.push(Chunk {
                    id: String::new(),
                    document_id: document_id.to_string(),
                    document_name: text.title.clone(),
                    document_code: document_code.clone(),
                    chapter: section.scope.chapter.clone(),
                    chapter_title: section.scope.chapter_title.clone(),
                    article: section.scope.article.clone(),
                    article_title: section.scope.article_title.clone(),
                    clause: section.scope.clause.clone(),
                    part_index: if split { u32::try_from(part).ok() } else { None },
                    context_path: context_path.clone(),
                    text: chunk_text,
                    token_count,
                    page_number,
                    chunk_index: 0,
                    total_chunks: 0,
                });
            }
        }

        let total_chunks = chunks.len();
        for (i, chunk) in chunks.iter_mut().enumerate() {
            chunk.id = format!("{document_id}:{i}");
            chunk.chunk_index = i;
            chunk.total_chunks = total_chunks;
        }
        let chunk_chars: usize = chunks.iter().map(|c| c.text.chars().count()).sum();
        let source_chars = text.body.chars().count().max(1);
        #[allow(clippy::cast_precision_loss)]
        let coverage = chunk_chars as f64 / source_chars as f64 * 100.0;
        info!(document_id, chunks = total_chunks, coverage_pct = coverage, "document chunked");
        chunks
    }

    fn sections(&self, document_id: &str, body: &str) -> Vec<Section> {
        let mut sections = Vec::new();
        let mut scope = Scope::default();
        let mut block = Block::default();
        let mut in_malformed = false;
        let mut awaiting_chapter_title = false;
        let mut offset = 0usize;

        let flush = |block: &mut Block, next: Scope, sections: &mut Vec<Section>| {
            let done = std::mem::replace(block, Block::with_scope(next));
            if !done.lines.is_empty() {
                sections.push(Section { scope: done.scope, body: done.lines.join("\n"), start: done.start });
            }
        };

        for raw in body.split_inclusive('\n') {
            let line_offset = offset;
            offset += raw.len();
            let line = raw.trim();
            if line.is_empty() {
                if in_malformed {
                    flush(&mut block, scope.clone(), &mut sections);
                    in_malformed = false;
                }
                continue;
            }

            let marker = classify(line);
            if std::mem::take(&mut awaiting_chapter_title) && marker == Marker::Text && is_heading_text(line) {
                scope.chapter_title = Some(line.to_string());
                block.scope = scope.clone();
                block.push(line, line_offset, false);
                continue;
            }
            if in_malformed && marker != Marker::Text && marker != Marker::Malformed {
                flush(&mut block, scope.clone(), &mut sections);
                in_malformed = false;
            }
            match marker {
                Marker::Chapter { number, title } => {
                    // Headings of the previous chapter never carry into the next one.
                    flush(&mut block, scope.clone(), &mut sections);
                    awaiting_chapter_title = title.is_none();
                    scope = Scope { chapter: Some(number), chapter_title: title, ..Scope::default() };
                    block.scope = scope.clone();
                    block.push(line, line_offset, false);
                }
                Marker::Article { number, title } => {
                    // A heading-only article (e.g. a repealed one) keeps its own section.
                    if block.has_body || block.scope.article.as_ref().is_some_and(|a| *a != number) {
                        flush(&mut block, scope.clone(), &mut sections);
                    }
                    scope.article = Some(number);
                    scope.article_title = title;
                    scope.clause = None;
                    block.scope = scope.clone();
                    block.push(line, line_offset, false);
                }
                Marker::Clause { number } => {
                    if block.has_body { flush(&mut block, scope.clone(), &mut sections); }
                    scope.clause = Some(number);
                    block.scope = scope.clone();
                    block.push(line, line_offset, true);
                }
                Marker::Malformed if !in_malformed => {
                    warn!(document_id, line, "structure marker without a number; treating paragraph as unstructured");
                    flush(&mut block, Scope::default(), &mut sections);
                    in_malformed = true;
                    block.push(line, line_offset, true);
                }
                Marker::Malformed | Marker::Text => {
                    block.push(line, line_offset, true);
                }
            }
        }
        flush(&mut block, Scope::default(), &mut sections);
        debug!(document_id, sections = sections.len(), "structural scan complete");
        sections
    }

    fn compose(header: &str, body: &str) -> String {
        if header.is_empty() { body.to_string() } else { format!("{header}\n{body}") }
    }

    fn count(&self, header: &str, body: &str) -> usize { self.counter.count_tokens(&Self::compose(header, body)) }

    /// Returns `(text, token_count)` per part. One part when the section fits.
    fn fit_to_budget(&self, header: &str, body: &str) -> Vec<(String, usize)> {
        let max = self.config.max_tokens;
        let tokens = self.count(header, body);
        if tokens <= max {
            return vec![(Self::compose(header, body), tokens)];
        }

        let header = if !header.is_empty() && self.count(header, "") >= max {
            warn!(header, "context header alone exceeds the token budget; dropping it");
            ""
        } else {
            header
        };

        let fits = |s: &str| self.count(header, s) <= max;
        let mut units = Vec::new();
        for sentence in split_sentences(body) {
            if fits(sentence.trim()) {
                units.push(sentence);
            } else {
                units.extend(hard_split(sentence, &fits));
            }
        }

        let mut parts: Vec<String> = Vec::new();
        let mut current: Vec<&str> = Vec::new();
        for unit in &units {
            let mut candidate = current.clone();
            candidate.push(unit);
            if current.is_empty() || fits(candidate.concat().trim()) {
                current = candidate;
                continue;
            }
            parts.push(current.concat().trim().to_string());
            let keep = self.config.overlap_sentences.min(current.len().saturating_sub(1));
            let mut next: Vec<&str> = current[current.len() - keep..].to_vec();
            next.push(unit);
            if keep > 0 && !fits(next.concat().trim()) {
                next = vec![unit];
            }
            current = next;
        }
        if !current.is_empty() {
            parts.push(current.concat().trim().to_string());
        }

        parts
            .into_iter()
            .filter(|p| !p.is_empty())
            .map(|p| {
                let text = Self::compose(header, &p);
                let tokens = self.counter.count_tokens(&text);
                (text, tokens)
            })
            .collect()
    }
}

/// Chapter titles on their own line are written in capitals.
fn is_heading_text(line: &str) -> bool {
    line.chars().any(char::is_alphabetic) && !line.chars().any(char::is_lowercase)
}

/// Splits after sentence punctuation followed by whitespace, and after line
/// breaks. Each piece keeps its trailing whitespace so pieces concatenate
/// back to the input. A leading clause number such as `1.` is not a sentence.
fn split_sentences(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0usize;
    let mut chars = text.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        let end = i + c.len_utf8();
        let boundary = match c {
            '\n' => true,
            '.' | '!' | '?' | ';' | '…' => {
                chars.peek().is_some_and(|(_, next)| next.is_whitespace())
                    && !NUMBERING_ONLY_RE.is_match(text[start..end].trim())
            }
            _ => false,
        };
        if boundary {
            let mut stop = end;
            while let Some(&(j, w)) = chars.peek() {
                if !w.is_whitespace() { break; }
                stop = j + w.len_utf8();
                chars.next();
            }
            out.push(&text[start..stop]);
            start = stop;
        }
    }
    if start < text.len() {
        out.push(&text[start..]);
    }
    out
}

/// Breaks a unit that is too long on its own: first by words, then by
/// characters for a single oversized word.
fn hard_split<'a>(unit: &'a str, fits: &dyn Fn(&str) -> bool) -> Vec<&'a str> {
    let words: Vec<&str> = unit.split_inclusive(char::is_whitespace).collect();
    let pieces = pack(unit, &words, fits);
    let mut out = Vec::new();
    for piece in pieces {
        if fits(piece.trim()) || piece.chars().count() <= 1 {
            out.push(piece);
            continue;
        }
        let mut chars = Vec::new();
        let mut idx = 0;
        for c in piece.chars() {
            let len = c.len_utf8();
            chars.push(&piece[idx..idx + len]);
            idx += len;
        }
        out.extend(pack(piece, &chars, fits));
    }
    out
}

/// Greedily joins adjacent slices of `source` while the result still fits.
fn pack<'a>(source: &'a str, slices: &[&'a str], fits: &dyn Fn(&str) -> bool) -> Vec<&'a str> {
    let mut out = Vec::new();
    let mut start = 0usize;
    let mut end = 0usize;
    for slice in slices {
        let next_end = end + slice.len();
        if end > start && !fits(source[start..next_end].trim()) {
            out.push(&source[start..end]);
            start = end;
        }
        end = next_end;
    }
    if end > start {
        out.push(&source[start..end]);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_vietnamese_and_english_markers() {
        assert_eq!(
            classify("CHƯƠNG II: QUY ĐỊNH KỸ THUẬT"),
            Marker::Chapter { number: "II".into(), title: Some("QUY ĐỊNH KỸ THUẬT".into()) }
        );
        assert_eq!(classify("Điều 5. Chiều cao tầng"), Marker::Article { number: "5".into(), title: Some("Chiều cao tầng".into()) });
        assert_eq!(classify("Article 12 - Scope"), Marker::Article { number: "12".into(), title: Some("Scope".into()) });
        assert_eq!(classify("1. Chiều cao tối thiểu"), Marker::Clause { number: "1".into() });
        assert_eq!(classify("2.1.3 Nhiệt độ"), Marker::Clause { number: "2.1.3".into() });
        assert_eq!(classify("Khoản 3: nội dung"), Marker::Clause { number: "3".into() });
        assert_eq!(classify("Phụ lục A Bảng tra"), Marker::Chapter { number: "Phụ lục A".into(), title: Some("Bảng tra".into()) });
    }

    #[test]
    fn ordinary_sentences_are_text() {
        assert_eq!(classify("Điều này quy định về chiều cao."), Marker::Text);
        assert_eq!(classify("điều kiện áp dụng"), Marker::Text);
        assert_eq!(classify("3,6 m đối với nhà ở"), Marker::Text);
        assert_eq!(classify("Chương trình đào tạo"), Marker::Text);
    }

    #[test]
    fn markers_without_numbers_are_malformed() {
        assert_eq!(classify("Điều ."), Marker::Malformed);
        assert_eq!(classify("Khoản:"), Marker::Malformed);
        assert_eq!(classify("CHƯƠNG"), Marker::Malformed);
    }

    #[test]
    fn sentence_split_round_trips_and_skips_numbering() {
        let text = "1. Câu một dài. Câu hai?\nDòng ba";
        let parts = split_sentences(text);
        assert_eq!(parts.concat(), text);
        assert_eq!(parts, vec!["1. Câu một dài. ", "Câu hai?\n", "Dòng ba"]);
    }

    #[test]
    fn decimals_are_not_sentence_ends() {
        let parts = split_sentences("Cao 3.6 m. Rộng 2.4 m.");
        assert_eq!(parts, vec!["Cao 3.6 m. ", "Rộng 2.4 m."]);
    }
}
