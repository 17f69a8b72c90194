//! Embedder (C4): native BERT-based text embedding with L2 normalization,
//! the query/document prefix convention, and Matryoshka truncation.
//!
//! The encoder math (`bert.rs`) and the mean-pool/normalize pipeline run
//! natively here: no WebGPU, no IndexedDB, just an ndarray backend and a
//! filesystem/HTTP model cache (`loader.rs`).

pub mod bert;
pub mod loader;

use crate::error::{CoreError, CoreResult};
use bert::{Model, MAX_POSITION_EMBEDDINGS};
use burn::tensor::{Int, Tensor, TensorData};
use burn_ndarray::{NdArray, NdArrayDevice};
use std::sync::Mutex;
use tokenizers::Tokenizer;

pub const NATIVE_DIM: usize = bert::HIDDEN_SIZE;

const DOCUMENT_PREFIX: &str = "search_document: ";
const QUERY_PREFIX: &str = "search_query: ";

type Backend = NdArray;

/// Handle owning the initialized model, tokenizer and device. `initialize`
/// must run before any `embed_*` call; calling before init fails fast with
/// `CoreError::Embedding` rather than returning zero vectors.
pub struct Embedder {
    dimensions: usize,
    state: Mutex<Option<EmbedderState>>,
}

struct EmbedderState {
    model: Model<Backend>,
    tokenizer: Tokenizer,
    device: NdArrayDevice,
}

impl Embedder {
    /// Construct an uninitialized handle for the requested output
    /// dimensionality. `dimensions` must be `<= NATIVE_DIM`; larger values
    /// are a config error.
    pub fn new(dimensions: usize) -> CoreResult<Self> {
        if dimensions == 0 || dimensions > NATIVE_DIM {
            return Err(CoreError::Config(format!(
                "embeddingDimensions must be in 1..={NATIVE_DIM}, got {dimensions}"
            )));
        }
        Ok(Self {
            dimensions,
            state: Mutex::new(None),
        })
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn is_initialized(&self) -> bool {
        self.state.lock().unwrap().is_some()
    }

    /// Load model weights + tokenizer from `artifacts`. Guarded so a
    /// concurrent double-initialize is a no-op rather than a race.
    pub fn initialize(&self, artifacts: &loader::ModelArtifacts) -> CoreResult<()> {
        let mut guard = self.state.lock().unwrap();
        if guard.is_some() {
            return Ok(());
        }
        let device = NdArrayDevice::default();
        let model = loader::model_from_bytes::<Backend>(&artifacts.weight_bytes, &device)?;
        let tokenizer = Tokenizer::from_bytes(&artifacts.tokenizer_json)
            .map_err(|err| CoreError::Embedding(format!("failed to load tokenizer: {err}")))?;
        *guard = Some(EmbedderState {
            model,
            tokenizer,
            device,
        });
        Ok(())
    }

    pub fn embed_document(&self, text: &str) -> CoreResult<Vec<f32>> {
        self.embed_prefixed(DOCUMENT_PREFIX, text)
    }

    pub fn embed_query(&self, text: &str) -> CoreResult<Vec<f32>> {
        self.embed_prefixed(QUERY_PREFIX, text)
    }

    pub fn embed_batch(&self, texts: &[String], batch_size: usize) -> CoreResult<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(batch_size.max(1)) {
            for text in chunk {
                out.push(self.embed_document(text)?);
            }
        }
        Ok(out)
    }

    fn embed_prefixed(&self, prefix: &str, text: &str) -> CoreResult<Vec<f32>> {
        let guard = self.state.lock().unwrap();
        let state = guard
            .as_ref()
            .ok_or_else(|| CoreError::Embedding("embedder used before initialize()".to_string()))?;

        let prefixed = format!("{prefix}{text}");
        let encoding = state
            .tokenizer
            .encode(prefixed.as_str(), true)
            .map_err(|err| CoreError::Embedding(format!("tokenization failed: {err}")))?;

        let input_ids: Vec<i64> = encoding
            .get_ids()
            .iter()
            .take(MAX_POSITION_EMBEDDINGS)
            .map(|&id| id as i64)
            .collect();
        let attention_mask: Vec<i64> = encoding
            .get_attention_mask()
            .iter()
            .take(MAX_POSITION_EMBEDDINGS)
            .map(|&mask| mask as i64)
            .collect();

        if input_ids.is_empty() {
            return Err(CoreError::Embedding("tokenization produced no input ids".to_string()));
        }

        let seq_len = input_ids.len();
        let input_ids_tensor =
            Tensor::<Backend, 2, Int>::from_ints(TensorData::new(input_ids, [1, seq_len]), &state.device);
        let attention_mask_tensor = Tensor::<Backend, 2, Int>::from_ints(
            TensorData::new(attention_mask.clone(), [1, seq_len]),
            &state.device,
        );

        let hidden = state.model.forward(input_ids_tensor, attention_mask_tensor.clone());
        let pooled = mean_pool(hidden, attention_mask_tensor);
        let normalized = l2_normalize(pooled);

        let data = normalized
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .map_err(|err| CoreError::Embedding(format!("failed to read embedding tensor: {err:?}")))?;

        Ok(truncate_and_renormalize(data, self.dimensions))
    }
}

fn mean_pool(hidden: Tensor<Backend, 3>, attention_mask: Tensor<Backend, 2, Int>) -> Tensor<Backend, 2> {
    let mask = attention_mask.float().unsqueeze_dim::<3>(2);
    let masked = hidden * mask.clone();
    let sum = masked.sum_dim(1);
    let denom = mask.sum_dim(1).clamp_min(1e-6);
    (sum / denom).squeeze_dim::<2>(1)
}

fn l2_normalize(embeddings: Tensor<Backend, 2>) -> Tensor<Backend, 2> {
    let norm = embeddings
        .clone()
        .powf_scalar(2.0)
        .sum_dim(1)
        .sqrt()
        .clamp_min(1e-12);
    embeddings / norm
}

/// Matryoshka truncation: keep the first `dimensions` components then
/// re-normalize so `||v||_2 == 1` still holds for the truncated vector.
fn truncate_and_renormalize(full: Vec<f32>, dimensions: usize) -> Vec<f32> {
    let mut truncated: Vec<f32> = full.into_iter().take(dimensions).collect();
    let norm: f32 = truncated.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 1e-12 {
        for v in truncated.iter_mut() {
            *v /= norm;
        }
    }
    truncated
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncation_renormalizes_to_unit_length() {
        let full = vec![3.0_f32, 4.0, 0.0, 0.0];
        let truncated = truncate_and_renormalize(full, 2);
        let norm: f32 = truncated.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-3);
    }

    #[test]
    fn rejects_dimension_above_native_width() {
        assert!(Embedder::new(NATIVE_DIM + 1).is_err());
    }

    #[test]
    fn uninitialized_embedder_fails_fast() {
        let embedder = Embedder::new(384).unwrap();
        assert!(!embedder.is_initialized());
        assert!(embedder.embed_query("hello").is_err());
    }
}
