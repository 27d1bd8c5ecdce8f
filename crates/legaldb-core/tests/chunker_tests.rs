use std::sync::Arc;

use legaldb_core::chunker::StructuralChunker;
use legaldb_core::config::ChunkingConfig;
use legaldb_core::loader::parse_pages;
use legaldb_core::traits::{TokenCounter, WordTokenCounter};
use legaldb_core::types::StructuredText;

const QCVN: &str = "QCVN 06:2022/BXD\n\
QUY CHUẨN KỸ THUẬT QUỐC GIA VỀ NHÀ Ở\n\
\n\
Chương I\n\
QUY ĐỊNH CHUNG\n\
Điều 1. Phạm vi điều chỉnh\n\
Quy chuẩn này áp dụng cho nhà ở riêng lẻ.\n\
Điều 5. Chiều cao tầng\n\
1. Chiều cao tối thiểu của tầng 1 là 3,6 m.\n\
2. Chiều cao tầng điển hình không nhỏ hơn 3,0 m.\n";

fn chunker(max_tokens: usize, overlap_sentences: usize, include_parent_path: bool) -> StructuralChunker {
    StructuralChunker::new(
        ChunkingConfig { max_tokens, overlap_sentences, include_parent_path },
        Arc::new(WordTokenCounter),
    )
}

#[test]
fn clauses_become_chunks_with_locators() {
    let chunks = chunker(1024, 0, true).chunk("qcvn_06", &StructuredText::new("QCVN 06", QCVN));
    assert_eq!(chunks.len(), 4, "preamble, article 1, two clauses of article 5");

    let preamble = &chunks[0];
    assert!(!preamble.is_structured());
    assert!(preamble.text.contains("QUY CHUẨN KỸ THUẬT"));

    let art1 = &chunks[1];
    assert_eq!(art1.chapter.as_deref(), Some("I"));
    assert_eq!(art1.chapter_title.as_deref(), Some("QUY ĐỊNH CHUNG"));
    assert_eq!(art1.article.as_deref(), Some("1"));
    assert_eq!(art1.clause, None);

    let clause1 = &chunks[2];
    assert_eq!(clause1.article.as_deref(), Some("5"));
    assert_eq!(clause1.clause.as_deref(), Some("1"));
    assert_eq!(clause1.context_path, "QCVN 06 > Chương I: QUY ĐỊNH CHUNG > Điều 5: Chiều cao tầng");
    assert!(clause1.text.starts_with("QCVN 06 > Chương I"));
    assert!(clause1.text.contains("tầng 1 là 3,6 m"));
    assert!(!clause1.text.contains("3,0 m"), "sibling clause stays out");
    assert_eq!(clause1.part_index, None);
    assert_eq!(clause1.document_code.as_deref(), Some("QCVN 06:2022/BXD"));
    assert_eq!(clause1.locator(), "[QCVN 06 - Chương I - Điều 5 - Khoản 1]");

    for (i, c) in chunks.iter().enumerate() {
        assert_eq!(c.id, format!("qcvn_06:{i}"));
        assert_eq!(c.chunk_index, i);
        assert_eq!(c.total_chunks, 4);
        assert_eq!(c.token_count, WordTokenCounter.count_tokens(&c.text));
    }
}

#[test]
fn text_without_markers_is_kept() {
    let text = StructuredText::new("Ghi chú", "Một đoạn văn không có cấu trúc.\nDòng thứ hai.");
    let chunks = chunker(1024, 0, false).chunk("note", &text);
    assert_eq!(chunks.len(), 1);
    assert!(!chunks[0].is_structured());
    assert_eq!(chunks[0].text, "Một đoạn văn không có cấu trúc.\nDòng thứ hai.");
}

#[test]
fn empty_document_yields_nothing() {
    assert!(chunker(1024, 0, true).chunk("empty", &StructuredText::new("x", "  \n\n")).is_empty());
}

#[test]
fn malformed_marker_degrades_to_unstructured_paragraph() {
    let body = "Điều 3. Yêu cầu\n1. Nội dung một.\nKhoản:\nđoạn lạc\n\n2. Nội dung hai.";
    let chunks = chunker(1024, 0, false).chunk("d", &StructuredText::new("D", body));
    assert_eq!(chunks.len(), 3);
    assert_eq!(chunks[0].clause.as_deref(), Some("1"));
    assert!(!chunks[1].is_structured());
    assert_eq!(chunks[1].text, "Khoản:\nđoạn lạc");
    assert_eq!(chunks[2].article.as_deref(), Some("3"));
    assert_eq!(chunks[2].clause.as_deref(), Some("2"));
}

const SPLIT_BODY: &str = "Điều 5. Chiều cao\n1. Một hai ba. Bốn năm sáu. Bảy tám chín.";

#[test]
fn clause_exactly_at_budget_is_not_split() {
    let words = WordTokenCounter.count_tokens(SPLIT_BODY);
    assert_eq!(words, 14);
    let chunks = chunker(words, 0, false).chunk("d", &StructuredText::new("D", SPLIT_BODY));
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].part_index, None);
    assert_eq!(chunks[0].token_count, 14);
}

#[test]
fn clause_one_token_over_budget_splits_at_sentence() {
    let chunks = chunker(13, 0, false).chunk("d", &StructuredText::new("D", SPLIT_BODY));
    assert_eq!(chunks.len(), 2);
    for (i, c) in chunks.iter().enumerate() {
        assert_eq!(c.article.as_deref(), Some("5"));
        assert_eq!(c.clause.as_deref(), Some("1"));
        assert_eq!(c.part_index, Some(i as u32));
        assert!(c.token_count <= 13);
    }
    assert!(chunks[0].text.ends_with("Bốn năm sáu."));
    assert_eq!(chunks[1].text, "Bảy tám chín.");
}

#[test]
fn configured_overlap_repeats_one_sentence() {
    let chunks = chunker(13, 1, false).chunk("d", &StructuredText::new("D", SPLIT_BODY));
    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[1].text, "Bốn năm sáu. Bảy tám chín.");
}

#[test]
fn long_unpunctuated_clause_still_fits_budget() {
    let words = vec!["từ"; 50].join(" ");
    let body = format!("Điều 2. Dài\n1. {words}");
    let chunks = chunker(16, 0, true).chunk("d", &StructuredText::new("Doc", body));
    assert!(chunks.len() > 1);
    let total: usize = chunks.iter().map(|c| c.text.matches("từ").count()).sum();
    assert_eq!(total, 50, "no words lost or duplicated");
    assert!(chunks.iter().all(|c| c.token_count <= 16));
}

#[test]
fn articles_never_share_a_chunk() {
    let body = (1..=30)
        .map(|n| format!("Điều {n}. Tiêu đề {n}\n1. Câu đầu của điều {n}. Câu thứ hai.\n2. Khoản hai."))
        .collect::<Vec<_>>()
        .join("\n");
    let chunks = chunker(12, 0, true).chunk("d", &StructuredText::new("Doc", body));
    for c in &chunks {
        assert!(c.token_count <= 12, "{} exceeds budget", c.id);
        let article = c.article.clone().expect("every chunk has an article");
        let mentions = c.text.matches("Điều ").count();
        assert!(mentions <= 2, "header plus heading at most: {}", c.text);
        assert!(c.context_path.contains(&format!("Điều {article}")));
    }
}

#[test]
fn heading_only_article_is_not_merged_into_the_next() {
    let body = "Điều 5. Chiều cao tầng\nĐiều 6. Lối thoát nạn\n1. Mỗi tầng có hai lối thoát.";
    let chunks = chunker(1024, 0, false).chunk("d", &StructuredText::new("D", body));
    assert_eq!(chunks.len(), 2);

    assert_eq!(chunks[0].article.as_deref(), Some("5"));
    assert_eq!(chunks[0].clause, None);
    assert_eq!(chunks[0].text, "Điều 5. Chiều cao tầng");

    assert_eq!(chunks[1].article.as_deref(), Some("6"));
    assert_eq!(chunks[1].article_title.as_deref(), Some("Lối thoát nạn"));
    assert_eq!(chunks[1].clause.as_deref(), Some("1"));
    assert!(chunks[1].text.contains("Mỗi tầng có hai lối thoát."));
    assert!(!chunks[1].text.contains("Chiều cao"), "{}", chunks[1].text);
}

#[test]
fn chapter_heading_does_not_carry_into_the_next_chapter() {
    let body = "Chương I\nQUY ĐỊNH CHUNG\nChương II\nYÊU CẦU KỸ THUẬT\nĐiều 3. Vật liệu\n1. Vật liệu không cháy.";
    let chunks = chunker(1024, 0, false).chunk("d", &StructuredText::new("D", body));
    let last = chunks.last().expect("chunks");
    assert_eq!(last.chapter.as_deref(), Some("II"));
    assert_eq!(last.clause.as_deref(), Some("1"));
    assert!(!last.text.contains("QUY ĐỊNH CHUNG"), "{}", last.text);
}

#[test]
fn appendix_resets_article_scope() {
    let body = "Chương II\nĐiều 7. Lối thoát\n1. Nội dung.\nPhụ lục A Bảng tra\nGiá trị 1,2 m.";
    let chunks = chunker(1024, 0, false).chunk("d", &StructuredText::new("D", body));
    let last = chunks.last().expect("chunks");
    assert_eq!(last.chapter.as_deref(), Some("Phụ lục A"));
    assert_eq!(last.article, None);
    assert_eq!(last.chapter_title.as_deref(), Some("Bảng tra"));
}

#[test]
fn page_numbers_follow_form_feeds() {
    let text = parse_pages("D", "Điều 1. A\n1. Trang một.\u{000C}2. Trang hai.");
    let chunks = chunker(1024, 0, false).chunk("d", &text);
    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0].page_number, 1);
    assert_eq!(chunks[1].page_number, 2);
}

#[test]
fn rechunking_is_deterministic() {
    let c = chunker(10, 1, true);
    let text = StructuredText::new("QCVN 06", QCVN);
    assert_eq!(c.chunk("x", &text), c.chunk("x", &text));
}
