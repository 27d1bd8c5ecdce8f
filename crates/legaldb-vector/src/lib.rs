//! Index clients: an exact in-memory index and a LanceDB table.
use legaldb_core::types::SearchHit;

pub mod memory;
pub mod schema;
pub mod table;

pub use memory::MemoryIndex;
pub use table::LanceIndex;

/// Score descending, id ascending, at most `top_k`. Non-finite scores sort last.
pub(crate) fn rank_hits(mut hits: Vec<SearchHit>, top_k: usize) -> Vec<SearchHit> {
    let key = |s: f32| if s.is_finite() { s } else { f32::NEG_INFINITY };
    hits.sort_by(|a, b| key(b.score).total_cmp(&key(a.score)).then_with(|| a.id.cmp(&b.id)));
    hits.truncate(top_k);
    hits
}
