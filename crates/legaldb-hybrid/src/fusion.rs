//! Fusion strategies: pure functions from two per-modality hit lists to one
//! ranked candidate list.
use std::collections::{BTreeMap, HashSet};
use tracing::warn;

use legaldb_core::config::{FusionConfig, FusionMode};
use legaldb_core::types::{Candidate, ChunkId, SearchHit};
use legaldb_core::Result;

pub trait FusionStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    /// At most `top_k` candidates, `fused_score` descending, ties by chunk id ascending.
    fn fuse(&self, dense: &[SearchHit], sparse: &[SearchHit], top_k: usize) -> Vec<Candidate>;
}

/// Validated strategy for the configured mode.
pub fn strategy_from_config(config: &FusionConfig) -> Result<Box<dyn FusionStrategy>> {
    config.validate()?;
    Ok(match config.mode {
        FusionMode::Weighted => Box::new(WeightedMinMax { dense_weight: config.dense_weight, sparse_weight: config.sparse_weight }),
        FusionMode::Rrf => Box::new(ReciprocalRank { k: config.rrf_k }),
    })
}

/// Finite scores only, first occurrence per id, score descending then id.
fn clean<'a>(hits: &'a [SearchHit], modality: &str) -> Vec<&'a SearchHit> {
    let mut seen = HashSet::new();
    let mut out: Vec<&SearchHit> = Vec::with_capacity(hits.len());
    for hit in hits {
        if !hit.score.is_finite() {
            warn!(id = %hit.id, modality, "dropping hit with non-finite score");
            continue;
        }
        if seen.insert(hit.id.as_str()) {
            out.push(hit);
        }
    }
    out.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
    out
}

fn finish(mut candidates: Vec<Candidate>, top_k: usize) -> Vec<Candidate> {
    candidates.sort_by(|a, b| b.fused_score.total_cmp(&a.fused_score).then_with(|| a.chunk_id.cmp(&b.chunk_id)));
    candidates.truncate(top_k);
    candidates
}

#[derive(Default)]
struct Entry {
    dense: f32,
    sparse: f32,
    fused: f32,
}

/// Min-max normalises each modality over the union of both hit lists, with
/// 0 standing in for a chunk the modality did not return, then takes the
/// weighted sum.
#[derive(Debug, Clone, Copy)]
pub struct WeightedMinMax {
    pub dense_weight: f32,
    pub sparse_weight: f32,
}

impl Default for WeightedMinMax {
    fn default() -> Self { Self { dense_weight: 0.5, sparse_weight: 0.5 } }
}

/// Normalised scores over the candidate union. When every value is equal the
/// returned hits get 1 and absent chunks 0.
fn min_max(raw: &[Option<f32>]) -> Vec<f32> {
    let (min, max) = raw
        .iter()
        .map(|s| s.unwrap_or(0.0))
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), s| (lo.min(s), hi.max(s)));
    let span = max - min;
    raw.iter()
        .map(|s| match (s, span > 0.0) {
            (Some(s), true) => ((s - min) / span).clamp(0.0, 1.0),
            (None, true) => ((0.0 - min) / span).clamp(0.0, 1.0),
            (Some(_), false) => 1.0,
            (None, false) => 0.0,
        })
        .collect()
}

impl FusionStrategy for WeightedMinMax {
    fn name(&self) -> &'static str { "weighted" }

    fn fuse(&self, dense: &[SearchHit], sparse: &[SearchHit], top_k: usize) -> Vec<Candidate> {
        let mut by_id: BTreeMap<&ChunkId, (Option<f32>, Option<f32>)> = BTreeMap::new();
        for hit in clean(dense, "dense") {
            by_id.entry(&hit.id).or_default().0 = Some(hit.score);
        }
        for hit in clean(sparse, "sparse") {
            by_id.entry(&hit.id).or_default().1 = Some(hit.score);
        }
        let dense_raw: Vec<Option<f32>> = by_id.values().map(|(d, _)| *d).collect();
        let sparse_raw: Vec<Option<f32>> = by_id.values().map(|(_, s)| *s).collect();
        let candidates = by_id
            .keys()
            .zip(min_max(&dense_raw).into_iter().zip(min_max(&sparse_raw)))
            .zip(dense_raw.iter().zip(&sparse_raw))
            .map(|((id, (nd, ns)), (d, s))| Candidate {
                chunk_id: (*id).clone(),
                dense_score: d.unwrap_or(0.0),
                sparse_score: s.unwrap_or(0.0),
                fused_score: (self.dense_weight * nd + self.sparse_weight * ns).clamp(0.0, 1.0),
            })
            .collect();
        finish(candidates, top_k)
    }
}

/// `Σ 1 / (k + rank)` over the modalities a chunk appears in, rank 1-based.
#[derive(Debug, Clone, Copy)]
pub struct ReciprocalRank {
    pub k: u32,
}

impl Default for ReciprocalRank {
    fn default() -> Self { Self { k: 60 } }
}

impl FusionStrategy for ReciprocalRank {
    fn name(&self) -> &'static str { "rrf" }

    fn fuse(&self, dense: &[SearchHit], sparse: &[SearchHit], top_k: usize) -> Vec<Candidate> {
        let k = self.k.max(1) as f32;
        let dense = clean(dense, "dense");
        let sparse = clean(sparse, "sparse");
        let mut by_id: BTreeMap<&ChunkId, Entry> = BTreeMap::new();
        for (rank, hit) in dense.iter().enumerate() {
            let e = by_id.entry(&hit.id).or_default();
            e.dense = hit.score;
            e.fused += 1.0 / (k + (rank + 1) as f32);
        }
        for (rank, hit) in sparse.iter().enumerate() {
            let e = by_id.entry(&hit.id).or_default();
            e.sparse = hit.score;
            e.fused += 1.0 / (k + (rank + 1) as f32);
        }
        let candidates = by_id
            .into_iter()
            .map(|(id, e)| Candidate { chunk_id: id.clone(), dense_score: e.dense, sparse_score: e.sparse, fused_score: e.fused })
            .collect();
        finish(candidates, top_k)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use legaldb_core::types::SourceKind;

    fn d(id: &str, score: f32) -> SearchHit { SearchHit { id: id.into(), score, source: SourceKind::Dense } }
    fn s(id: &str, score: f32) -> SearchHit { SearchHit { id: id.into(), score, source: SourceKind::Sparse } }

    #[test]
    fn weighted_normalises_over_the_union() {
        let fused = WeightedMinMax::default().fuse(&[d("a", 0.9), d("b", 0.5)], &[s("b", 12.0), s("c", 2.0)], 10);
        let ids: Vec<_> = fused.iter().map(|c| c.chunk_id.as_str()).collect();
        // dense over {a: .9, b: .5, c: 0}, sparse over {a: 0, b: 12, c: 2}
        assert_eq!(ids, vec!["b", "a", "c"]);
        assert!((fused[0].fused_score - (0.5 * 0.5 / 0.9 + 0.5)).abs() < 1e-6);
        assert!((fused[1].fused_score - 0.5).abs() < 1e-6);
        assert!((fused[2].fused_score - 0.5 * 2.0 / 12.0).abs() < 1e-6);
        assert_eq!(fused[0].dense_score, 0.5);
        assert_eq!(fused[0].sparse_score, 12.0);
        assert_eq!(fused[2].dense_score, 0.0, "absent modality scores 0");
    }

    #[test]
    fn lowest_returned_hit_outranks_an_absent_one() {
        let fused = WeightedMinMax { dense_weight: 1.0, sparse_weight: 0.0 }.fuse(&[d("b", 0.3), d("c", 0.1)], &[s("a", 4.0)], 3);
        let ids: Vec<_> = fused.iter().map(|c| c.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c", "a"]);
        assert!(fused[1].fused_score > 0.0);
        assert_eq!(fused[2].fused_score, 0.0);
    }

    #[test]
    fn single_hit_normalises_to_one() {
        let fused = WeightedMinMax::default().fuse(&[d("a", 0.2)], &[], 5);
        assert_eq!(fused.len(), 1);
        assert!((fused[0].fused_score - 0.5).abs() < 1e-6);
    }

    #[test]
    fn rrf_sums_reciprocal_ranks() {
        let fused = ReciprocalRank::default().fuse(&[d("a", 0.9), d("b", 0.8)], &[s("b", 3.0), s("c", 1.0)], 10);
        assert_eq!(fused[0].chunk_id, "b");
        assert!((fused[0].fused_score - (1.0 / 62.0 + 1.0 / 61.0)).abs() < 1e-6);
        // a and c both rank first in one list only
        assert_eq!(fused[1].chunk_id, "a");
        assert_eq!(fused[2].chunk_id, "c");
        assert!((fused[1].fused_score - fused[2].fused_score).abs() < 1e-9);
    }

    #[test]
    fn non_finite_and_duplicate_hits_are_ignored() {
        let fused = WeightedMinMax::default().fuse(&[d("a", f32::NAN), d("b", 0.4), d("b", 0.1), d("c", 0.2)], &[], 10);
        let ids: Vec<_> = fused.iter().map(|c| c.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);
        assert_eq!(fused[0].dense_score, 0.4);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = FusionConfig { dense_weight: 0.8, sparse_weight: 0.8, ..FusionConfig::default() };
        assert!(strategy_from_config(&config).is_err());
        let rrf = FusionConfig { mode: FusionMode::Rrf, ..FusionConfig::default() };
        assert_eq!(strategy_from_config(&rrf).expect("rrf").name(), "rrf");
    }
}
