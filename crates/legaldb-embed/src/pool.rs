use anyhow::Result;
use candle_core::{DType, Tensor};
use legaldb_core::types::SparseVector;

/// `[CLS]` hidden state of every row, L2 normalised. `[B,T,H] -> [B,H]`.
pub fn cls_l2(hidden: &Tensor) -> Result<Tensor> {
    let dims = hidden.dims();
    anyhow::ensure!(dims.len() == 3, "hidden shape must be [B,T,H], got {:?}", dims);
    let cls = hidden.narrow(1, 0, 1)?.squeeze(1)?;
    let eps_val = match hidden.dtype() { DType::F16 => 1e-6f32, _ => 1e-12f32 };
    let eps = Tensor::new(&[eps_val], hidden.device())?.to_dtype(hidden.dtype())?.unsqueeze(0)?;
    let norm = cls.sqr()?.sum_keepdim(1)?.sqrt()?.broadcast_add(&eps)?;
    Ok(cls.broadcast_div(&norm)?)
}

/// Lexical weights from per-token activations.
///
/// `activations[b][t]` is the (already ReLU'd) weight of token `t` in row
/// `b`; only the first `ids[b].len()` positions are real tokens. Repeated
/// tokens keep their highest weight; `skip` ids (special tokens) and zero
/// weights are dropped.
pub fn sparse_from_activations(activations: &[Vec<f32>], ids: &[Vec<u32>], skip: &[u32]) -> Vec<SparseVector> {
    activations
        .iter()
        .zip(ids)
        .map(|(row, row_ids)| {
            let mut out = SparseVector::new();
            for (&id, &w) in row_ids.iter().zip(row) {
                if skip.contains(&id) || !w.is_finite() || w <= 0.0 {
                    continue;
                }
                let slot = out.entry(id).or_insert(0.0);
                if w > *slot { *slot = w; }
            }
            out
        })
        .collect()
}
