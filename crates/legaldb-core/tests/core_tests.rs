use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

use legaldb_core::citation::CitationBuilder;
use legaldb_core::loader::DocumentLoader;
use legaldb_core::types::{Chunk, RankedResult};
use legaldb_core::Error;

fn chunk(id: &str, text: &str) -> Chunk {
    Chunk {
        id: id.to_string(),
        document_id: "qcvn_06_2022_bxd".into(),
        document_name: "QCVN 06".into(),
        document_code: Some("QCVN 06:2022/BXD".into()),
        chapter: Some("I".into()),
        chapter_title: None,
        article: Some("5".into()),
        article_title: None,
        clause: Some("1".into()),
        part_index: None,
        context_path: "QCVN 06 > Chương I > Điều 5".into(),
        text: text.to_string(),
        token_count: text.split_whitespace().count(),
        page_number: 3,
        chunk_index: 0,
        total_chunks: 1,
    }
}

#[test]
fn load_directory_reads_txt_files_in_order() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path();
    fs::create_dir(dir.join("nested")).unwrap();
    fs::write(dir.join("b.txt"), "QCVN 06:2022/BXD\nĐiều 1. A\n1. x.").unwrap();
    fs::write(dir.join("nested").join("a.txt"), "Không mã.\u{000C}Trang hai.").unwrap();
    fs::write(dir.join("ignored.md"), "# not loaded").unwrap();

    let docs = DocumentLoader::new().load_directory(dir).expect("load");
    assert_eq!(docs.len(), 2);

    let coded = docs.iter().find(|d| d.text.title == "b").expect("b.txt");
    assert_eq!(coded.document_id, "qcvn_06_2022_bxd");
    assert_eq!(coded.metadata.document_code.as_deref(), Some("QCVN 06:2022/BXD"));

    let paged = docs.iter().find(|d| d.text.title == "a").expect("a.txt");
    assert_eq!(paged.document_id.len(), 16, "hash fallback id");
    assert_eq!(paged.text.body, "Không mã.\nTrang hai.");
    assert_eq!(paged.text.page_breaks, vec!["Không mã.\n".len()]);
}

#[test]
fn load_directory_honours_limit() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("a.txt"), "alpha").unwrap();
    fs::write(tmp.path().join("b.txt"), "bravo").unwrap();
    let docs = DocumentLoader::with_limit(1).load_directory(tmp.path()).expect("load");
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].text.title, "a");
}

#[test]
fn missing_directory_is_not_found() {
    let tmp = TempDir::new().unwrap();
    let err = DocumentLoader::new().load_directory(&tmp.path().join("absent")).unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[test]
fn loader_normalizes_to_nfc() {
    let tmp = TempDir::new().unwrap();
    // "Điều" with the grave accent as a combining mark
    fs::write(tmp.path().join("d.txt"), "Đi\u{00EA}\u{0300}u 1. A").unwrap();
    let docs = DocumentLoader::new().load_directory(tmp.path()).expect("load");
    assert_eq!(docs[0].text.body, "Điều 1. A");
}

#[test]
fn citations_preserve_order_and_bound_previews() {
    let long = "Chiều cao tối thiểu của tầng 1 là 3,6 m ".repeat(20);
    let ranked = vec![
        RankedResult { chunk: Arc::new(chunk("b:0", &long)), rerank_score: 0.9, fused_rank: 1 },
        RankedResult { chunk: Arc::new(chunk("a:0", "Ngắn.")), rerank_score: 0.4, fused_rank: 0 },
    ];
    let citations = CitationBuilder::new(200).build(&ranked);

    assert_eq!(citations.len(), 2);
    assert_eq!(citations[0].chunk_id, "b:0");
    assert_eq!(citations[1].chunk_id, "a:0");

    assert_eq!(citations[0].text_preview.chars().count(), 200);
    assert!(citations[0].preview_truncated);
    assert!(long.starts_with(&citations[0].text_preview));
    assert_eq!(citations[1].text_preview, "Ngắn.");
    assert!(!citations[1].preview_truncated);

    let c = &citations[0];
    assert_eq!(c.article.as_deref(), Some("5"));
    assert_eq!(c.clause.as_deref(), Some("1"));
    assert_eq!(c.page_number, 3);
    assert_eq!(c.locator, "[QCVN 06 - Chương I - Điều 5 - Khoản 1]");
}

#[test]
fn citations_of_nothing_are_empty() {
    assert!(CitationBuilder::default().build(&[]).is_empty());
}
