use anyhow::{anyhow, Result};
use candle_core::{DType, Device, Tensor};
use tokenizers::{EncodeInput, Tokenizer};

/// XLM-RoBERTa `<pad>`.
pub const PAD_ID: u32 = 1;

/// A padded batch ready for the encoder.
///
/// `ids` holds the unpadded (possibly truncated) ids per row; `input_tokens`
/// the length of each row before truncation.
pub struct TokenBatch {
    pub input_ids: Tensor,
    pub attention_mask: Tensor,
    pub token_type_ids: Tensor,
    pub ids: Vec<Vec<u32>>,
    pub input_tokens: Vec<usize>,
}

/// Cuts `ids` to `max_len`, keeping the closing special token in place.
pub fn truncate_keep_last(ids: &mut Vec<u32>, max_len: usize) {
    if max_len == 0 || ids.len() <= max_len {
        return;
    }
    let last = ids[ids.len() - 1];
    ids.truncate(max_len - 1);
    ids.push(last);
}

pub fn token_len(tokenizer: &Tokenizer, text: &str) -> Result<usize> {
    let enc = tokenizer.encode(text, true).map_err(|e| anyhow!("Tokenization failed: {}", e))?;
    Ok(enc.get_ids().len())
}

/// Encodes texts (or text pairs) and pads them to the longest row, capped at `max_len`.
pub fn encode_batch<'s, E>(tokenizer: &Tokenizer, inputs: Vec<E>, max_len: usize, device: &Device) -> Result<TokenBatch>
where
    E: Into<EncodeInput<'s>>,
{
    if inputs.is_empty() {
        return Err(anyhow!("cannot encode an empty batch"));
    }
    let mut ids = Vec::with_capacity(inputs.len());
    let mut input_tokens = Vec::with_capacity(inputs.len());
    for input in inputs {
        let enc = tokenizer.encode(input, true).map_err(|e| anyhow!("Tokenization failed: {}", e))?;
        let mut row = enc.get_ids().to_vec();
        input_tokens.push(row.len());
        truncate_keep_last(&mut row, max_len);
        ids.push(row);
    }

    let width = ids.iter().map(Vec::len).max().unwrap_or(1).max(1);
    let batch = ids.len();
    let mut flat_ids = Vec::with_capacity(batch * width);
    let mut flat_mask = Vec::with_capacity(batch * width);
    for row in &ids {
        let pad = width - row.len();
        flat_ids.extend(row.iter().copied().chain(std::iter::repeat(PAD_ID).take(pad)));
        flat_mask.extend(std::iter::repeat(1u32).take(row.len()).chain(std::iter::repeat(0u32).take(pad)));
    }
    let input_ids = Tensor::from_vec(flat_ids, (batch, width), device)?;
    let attention_mask = Tensor::from_vec(flat_mask, (batch, width), device)?;
    let token_type_ids = Tensor::zeros((batch, width), DType::I64, device)?;
    Ok(TokenBatch { input_ids, attention_mask, token_type_ids, ids, input_tokens })
}
