//! Model weight sourcing: a bundled local model directory, or a remote model
//! id downloaded to a persistent on-disk cache on first use. Loads weights
//! via `BinBytesRecorder<FullPrecisionSettings>` deserialization, with the
//! same fetch-verify-cache shape a browser IndexedDB cache would use, but
//! backed by the filesystem and `reqwest::blocking` instead.

use super::bert::Model;
use crate::error::{CoreError, CoreResult};
use burn::module::Module;
use burn::record::{BinBytesRecorder, FullPrecisionSettings, Recorder};
use burn::tensor::backend::Backend;
use std::path::{Path, PathBuf};

const MODEL_WEIGHTS_FILE: &str = "model.bin";
const MODEL_CONFIG_FILE: &str = "config.json";
const MODEL_TOKENIZER_FILE: &str = "tokenizer.json";
const MAX_MODEL_BYTES: usize = 80 * 1024 * 1024;

/// Where usable model artifacts were found.
pub enum ModelSource {
    /// `models_dir` already contains `config.json` + `tokenizer.json` (+
    /// weights), bundled alongside the crate's data directory.
    Bundled(PathBuf),
    /// Weights must be fetched by model id and cached under `cache_dir`.
    Remote { model_id: String, cache_dir: PathBuf },
}

fn bundled_dir_is_usable(dir: &Path) -> bool {
    dir.join(MODEL_CONFIG_FILE).is_file() && dir.join(MODEL_TOKENIZER_FILE).is_file()
}

/// Resolve which source to load from.
pub fn resolve_source(models_dir: &Path, model_id: &str) -> CoreResult<ModelSource> {
    if bundled_dir_is_usable(models_dir) {
        return Ok(ModelSource::Bundled(models_dir.to_path_buf()));
    }

    let cache_dir = models_dir.join(model_id);
    if bundled_dir_is_usable(&cache_dir) {
        return Ok(ModelSource::Bundled(cache_dir));
    }

    Ok(ModelSource::Remote {
        model_id: model_id.to_string(),
        cache_dir,
    })
}

/// Tokenizer + weight bytes resolved from whichever source applies.
pub struct ModelArtifacts {
    pub tokenizer_json: Vec<u8>,
    pub weight_bytes: Vec<u8>,
}

pub fn load_artifacts(source: &ModelSource, download_base_url: Option<&str>) -> CoreResult<ModelArtifacts> {
    match source {
        ModelSource::Bundled(dir) => load_from_dir(dir),
        ModelSource::Remote { model_id, cache_dir } => {
            std::fs::create_dir_all(cache_dir).map_err(CoreError::Io)?;
            if !bundled_dir_is_usable(cache_dir) || !cache_dir.join(MODEL_WEIGHTS_FILE).is_file() {
                download_to_cache(model_id, cache_dir, download_base_url)?;
            }
            load_from_dir(cache_dir)
        }
    }
}

fn load_from_dir(dir: &Path) -> CoreResult<ModelArtifacts> {
    let tokenizer_json = std::fs::read(dir.join(MODEL_TOKENIZER_FILE)).map_err(CoreError::Io)?;
    let weight_bytes = std::fs::read(dir.join(MODEL_WEIGHTS_FILE)).map_err(CoreError::Io)?;
    Ok(ModelArtifacts {
        tokenizer_json,
        weight_bytes,
    })
}

#[cfg(feature = "embeddings")]
fn download_to_cache(model_id: &str, cache_dir: &Path, download_base_url: Option<&str>) -> CoreResult<()> {
    let base = download_base_url.unwrap_or("https://huggingface.co");
    let client = reqwest::blocking::Client::new();

    for (remote_name, local_name) in [
        (MODEL_CONFIG_FILE, MODEL_CONFIG_FILE),
        (MODEL_TOKENIZER_FILE, MODEL_TOKENIZER_FILE),
        (MODEL_WEIGHTS_FILE, MODEL_WEIGHTS_FILE),
    ] {
        let url = format!("{base}/{model_id}/resolve/main/{remote_name}");
        let response = client
            .get(&url)
            .send()
            .map_err(|err| CoreError::Embedding(format!("failed to download {remote_name}: {err}")))?;
        if !response.status().is_success() {
            return Err(CoreError::Embedding(format!(
                "failed to download {remote_name}: HTTP {}",
                response.status()
            )));
        }
        let bytes = response
            .bytes()
            .map_err(|err| CoreError::Embedding(format!("failed reading {remote_name}: {err}")))?;
        if bytes.len() > MAX_MODEL_BYTES {
            return Err(CoreError::Embedding(format!("{remote_name} exceeds size limit")));
        }

        let tmp_path = cache_dir.join(format!("{local_name}.tmp"));
        std::fs::write(&tmp_path, &bytes).map_err(CoreError::Io)?;
        std::fs::rename(&tmp_path, cache_dir.join(local_name)).map_err(CoreError::Io)?;
    }

    Ok(())
}

#[cfg(not(feature = "embeddings"))]
fn download_to_cache(_model_id: &str, _cache_dir: &Path, _download_base_url: Option<&str>) -> CoreResult<()> {
    Err(CoreError::Embedding(
        "remote model download requires the `embeddings` feature".to_string(),
    ))
}

/// Deserialize model weights (same `BinBytesRecorder<FullPrecisionSettings>`
/// format the weights were serialized with) into an initialized `Model`.
pub fn model_from_bytes<B: Backend>(bytes: &[u8], device: &B::Device) -> CoreResult<Model<B>> {
    let recorder = BinBytesRecorder::<FullPrecisionSettings, Vec<u8>>::default();
    let record: <Model<B> as Module<B>>::Record = recorder
        .load(bytes.to_vec(), device)
        .map_err(|err| CoreError::Embedding(format!("failed to deserialize model weights: {err}")))?;
    Ok(Model::new(device).load_record(record))
}
