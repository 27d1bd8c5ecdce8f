//! Document-level metadata found in the header of a regulation.
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::LazyLock;
use tracing::debug;

/// Only the head of a document is scanned; codes and dates live on the cover page.
const HEADER_CHARS: usize = 3000;

static CODE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(QCVN|TCVN)\s*(\d+)\s*[:\-]\s*(\d{4})(?:/([\p{L}\d]+))?").expect("document code pattern")
});
static AMENDMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)sửa\s+đổi\s+(\d+)\s*[:\-]\s*(\d{4})").expect("amendment pattern"));
static AMENDS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:của|cho)\s+(QCVN|TCVN)\s*(\d+)\s*[:\-]\s*(\d{4})(?:/([\p{L}\d]+))?").expect("amends pattern")
});
static REPLACES_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)thay\s+thế\s+(QCVN|TCVN)\s*(\d+)\s*[:\-]\s*(\d{4})").expect("replaces pattern")
});
static EFFECTIVE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)hiệu\s+lực\s+(?:từ\s+ngày|kể\s+từ(?:\s+ngày)?)\s*(\d{1,2}[/\-]\d{1,2}[/\-]\d{4})")
        .expect("effective date pattern")
});
static REFERENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:theo|căn\s+cứ|tham\s+chiếu)\s+((?:QCVN|TCVN)\s*\d+\s*[:\-]\s*\d{4})").expect("reference pattern")
});
static ID_SEPARATORS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[:\-/\\\s_]+").expect("separator pattern"));

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentType {
    #[default]
    Original,
    Amendment,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    /// e.g. `QCVN 06:2022/BXD`
    pub document_code: Option<String>,
    pub document_type: DocumentType,
    /// e.g. `1:2023` for "Sửa đổi 1:2023"
    pub amendment_number: Option<String>,
    pub amends_document: Option<String>,
    pub replaces_document: Option<String>,
    pub effective_date: Option<String>,
    /// Issuing body suffix of the code, e.g. `BXD`.
    pub issuing_body: Option<String>,
    pub references: Vec<String>,
}

fn format_code(c: &Captures<'_>) -> String {
    let base = format!("{} {}:{}", c[1].to_uppercase(), &c[2], &c[3]);
    match c.get(4) {
        Some(body) => format!("{base}/{}", body.as_str().to_uppercase()),
        None => base,
    }
}

fn header(text: &str) -> &str {
    match text.char_indices().nth(HEADER_CHARS) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

impl DocumentMetadata {
    pub fn extract(text: &str) -> Self {
        let head = header(text);
        let mut meta = Self::default();

        if let Some(c) = CODE_RE.captures(head) {
            meta.document_code = Some(format_code(&c));
            meta.issuing_body = c.get(4).map(|b| b.as_str().to_uppercase());
        }
        if let Some(c) = AMENDMENT_RE.captures(head) {
            meta.document_type = DocumentType::Amendment;
            meta.amendment_number = Some(format!("{}:{}", &c[1], &c[2]));
            meta.amends_document = AMENDS_RE.captures(head).map(|c| format_code(&c));
        }
        meta.replaces_document = REPLACES_RE
            .captures(head)
            .map(|c| format!("{} {}:{}", c[1].to_uppercase(), &c[2], &c[3]));
        meta.effective_date = EFFECTIVE_RE.captures(head).map(|c| c[1].to_string());

        let refs: BTreeSet<String> = REFERENCE_RE
            .captures_iter(head)
            .map(|c| c[1].split_whitespace().collect::<Vec<_>>().join(" "))
            .collect();
        meta.references = refs.into_iter().collect();

        debug!(code = ?meta.document_code, kind = ?meta.document_type, "document metadata extracted");
        meta
    }
}

/// `"QCVN 06:2022/BXD"` becomes `qcvn_06_2022_bxd`.
pub fn normalize_document_code(code: &str) -> String {
    let lowered = code.trim().to_lowercase();
    ID_SEPARATORS_RE.replace_all(&lowered, "_").trim_matches('_').to_string()
}

/// Stable document id: the normalized code when known, otherwise a short
/// hash of the source path.
pub fn generate_document_id(source_path: &str, document_code: Option<&str>) -> String {
    if let Some(normalized) = document_code.map(normalize_document_code).filter(|n| !n.is_empty()) {
        return normalized;
    }
    let hash = blake3::hash(source_path.as_bytes()).to_hex();
    hash[..16].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_code_and_issuer() {
        let meta = DocumentMetadata::extract("QUY CHUẨN KỸ THUẬT QUỐC GIA\nQCVN 06:2022/BXD\nVề an toàn cháy");
        assert_eq!(meta.document_code.as_deref(), Some("QCVN 06:2022/BXD"));
        assert_eq!(meta.issuing_body.as_deref(), Some("BXD"));
        assert_eq!(meta.document_type, DocumentType::Original);
    }

    #[test]
    fn detects_amendments_and_replacements() {
        let text = "SỬA ĐỔI 1:2023 của QCVN 06:2022/BXD\nThay thế QCVN 06:2021\n\
                    Có hiệu lực từ ngày 16/01/2024. Căn cứ TCVN 2622:1995 và theo TCVN 2622 : 1995.";
        let meta = DocumentMetadata::extract(text);
        assert_eq!(meta.document_type, DocumentType::Amendment);
        assert_eq!(meta.amendment_number.as_deref(), Some("1:2023"));
        assert_eq!(meta.amends_document.as_deref(), Some("QCVN 06:2022/BXD"));
        assert_eq!(meta.replaces_document.as_deref(), Some("QCVN 06:2021"));
        assert_eq!(meta.effective_date.as_deref(), Some("16/01/2024"));
        assert_eq!(meta.references.len(), 2, "distinct spellings are kept: {:?}", meta.references);
    }

    #[test]
    fn plain_text_has_no_metadata() {
        assert_eq!(DocumentMetadata::extract("Không có mã văn bản."), DocumentMetadata::default());
    }

    #[test]
    fn normalizes_codes_into_ids() {
        assert_eq!(normalize_document_code("QCVN 06:2022/BXD"), "qcvn_06_2022_bxd");
        assert_eq!(normalize_document_code("TCVN 4451:2012"), "tcvn_4451_2012");
        assert_eq!(generate_document_id("a/b.txt", Some("TCVN 4451:2012")), "tcvn_4451_2012");
        let hashed = generate_document_id("a/b.txt", None);
        assert_eq!(hashed.len(), 16);
        assert_eq!(hashed, generate_document_id("a/b.txt", Some("  ")));
    }
}
