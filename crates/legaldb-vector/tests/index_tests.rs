use tempfile::TempDir;

use legaldb_core::traits::{Embedder, IndexClient};
use legaldb_core::types::{Chunk, IndexRecord, SourceKind, TextKind};
use legaldb_embed::FakeEmbedder;
use legaldb_vector::{LanceIndex, MemoryIndex};

const DIM: usize = 64;

fn chunk(document_id: &str, index: usize, text: &str) -> Chunk {
    Chunk {
        id: format!("{document_id}:{index}"),
        document_id: document_id.to_string(),
        document_name: document_id.to_uppercase(),
        document_code: None,
        chapter: None,
        chapter_title: None,
        article: Some((index + 1).to_string()),
        article_title: None,
        clause: Some("1".into()),
        part_index: None,
        context_path: String::new(),
        text: text.to_string(),
        token_count: text.split_whitespace().count(),
        page_number: 1,
        chunk_index: index,
        total_chunks: 3,
    }
}

fn records(document_id: &str, texts: &[&str]) -> Vec<IndexRecord> {
    let model = FakeEmbedder::new(DIM, 512);
    let owned: Vec<String> = texts.iter().map(|t| t.to_string()).collect();
    let encoded = model.embed_batch(&owned, TextKind::Document).expect("embed");
    texts
        .iter()
        .zip(encoded)
        .enumerate()
        .map(|(i, (text, e))| IndexRecord { chunk: chunk(document_id, i, text), representation: e.representation })
        .collect()
}

fn query(text: &str) -> legaldb_core::types::DualRepresentation {
    FakeEmbedder::new(DIM, 512)
        .embed_batch(&[text.to_string()], TextKind::Query)
        .expect("embed")
        .remove(0)
        .representation
}

const TEXTS: [&str; 3] = [
    "Chiều cao tối thiểu của tầng 1 là 3,6 m.",
    "Lối thoát nạn phải được chiếu sáng sự cố.",
    "Bể chứa nước chữa cháy phải có dung tích đủ.",
];

/// The behaviour both index clients must share.
fn exercise(index: &dyn IndexClient) {
    let ids = index.insert_many(records("qcvn", &TEXTS)).expect("insert");
    assert_eq!(ids, vec!["qcvn:0", "qcvn:1", "qcvn:2"]);

    let exact = query(TEXTS[0]);
    let dense = index.search_dense(&exact.dense, 2).expect("dense");
    assert_eq!(dense.len(), 2);
    assert_eq!(dense[0].id, "qcvn:0");
    assert_eq!(dense[0].source, SourceKind::Dense);
    assert!((dense[0].score - 1.0).abs() < 1e-4, "self similarity is 1, got {}", dense[0].score);
    assert!(dense[0].score >= dense[1].score);

    let sparse = index.search_sparse(&query("lối thoát nạn").sparse, 10).expect("sparse");
    assert_eq!(sparse.len(), 1, "only chunks sharing terms: {sparse:?}");
    assert_eq!(sparse[0].id, "qcvn:1");

    let fetched = index.fetch(&["qcvn:2".into(), "missing".into(), "qcvn:0".into()]).expect("fetch");
    let fetched_ids: Vec<_> = fetched.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(fetched_ids, vec!["qcvn:2", "qcvn:0"], "request order kept, unknown ids skipped");
    assert_eq!(fetched[1].text, TEXTS[0]);
    assert_eq!(fetched[1].article.as_deref(), Some("1"));

    // Re-inserting an id replaces the row.
    let mut replacement = records("qcvn", &["Chiều cao tầng 1 đã sửa đổi."]).remove(0);
    replacement.chunk.id = "qcvn:0".into();
    index.insert(replacement).expect("upsert");
    assert_eq!(index.fetch(&["qcvn:0".into()]).expect("fetch")[0].text, "Chiều cao tầng 1 đã sửa đổi.");

    index.insert_many(records("other", &["Tài liệu khác."])).expect("insert other");
    assert_eq!(index.delete_document("qcvn").expect("delete"), 3);
    assert_eq!(index.delete_document("qcvn").expect("delete again"), 0);
    let remaining = index.search_dense(&exact.dense, 10).expect("dense after delete");
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, "other:0");
}

#[test]
fn memory_index_contract() {
    let index = MemoryIndex::with_dim(DIM);
    exercise(&index);
    assert_eq!(index.len(), 1);
}

#[test]
fn memory_index_rejects_wrong_dimension() {
    let index = MemoryIndex::with_dim(DIM + 1);
    assert!(index.insert_many(records("qcvn", &TEXTS)).is_err());
    assert!(index.is_empty());
}

#[test]
fn empty_indexes_return_no_hits() {
    let index = MemoryIndex::new();
    assert!(index.search_dense(&query("bất kỳ").dense, 5).expect("dense").is_empty());
    assert!(index.search_sparse(&query("bất kỳ").sparse, 5).expect("sparse").is_empty());
}

#[test]
fn lance_index_contract() {
    let tmp = TempDir::new().expect("tmp");
    let uri = tmp.path().to_string_lossy().to_string();
    let index = LanceIndex::open(&uri, "chunks_test", DIM).expect("open");
    assert!(index.search_dense(&query("bất kỳ").dense, 5).expect("empty dense").is_empty());
    exercise(&index);
    assert_eq!(index.count().expect("count"), 1);
}

#[test]
fn lance_index_persists_across_reopen() {
    let tmp = TempDir::new().expect("tmp");
    let uri = tmp.path().to_string_lossy().to_string();
    {
        let index = LanceIndex::open(&uri, "chunks", DIM).expect("open");
        index.insert_many(records("qcvn", &TEXTS)).expect("insert");
    }
    let reopened = LanceIndex::open(&uri, "chunks", DIM).expect("reopen");
    assert_eq!(reopened.count().expect("count"), 3);
    let hits = reopened.search_sparse(&query("bể chứa nước").sparse, 3).expect("sparse");
    assert_eq!(hits[0].id, "qcvn:2");
}
