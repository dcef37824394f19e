use std::collections::HashSet;
use std::path::PathBuf;

use candle::{
    utils::{cuda_is_available, metal_is_available},
    Device,
};
use hf_hub::api::sync::ApiRepo;
use tracing::info;

use crate::ModelError;

pub mod llama;

/// Picks the device the model runs on: CUDA first, then Metal, then CPU.
///
/// # Errors
///
/// Returns a `candle::Error` if an accelerator is available but the device
/// with the given ordinal cannot be opened.
pub fn device(device_id: usize) -> Result<Device, candle::Error> {
    if cuda_is_available() {
        info!(target = "palaver-inference", "Using CUDA");
        Device::new_cuda(device_id)
    } else if metal_is_available() {
        info!(target = "palaver-inference", "Using Metal");
        Device::new_metal(device_id)
    } else {
        info!(target = "palaver-inference", "Using Cpu");
        Ok(Device::Cpu)
    }
}

/// Downloads every safetensors shard listed in the `weight_map` of `json_file`.
///
/// # Errors
///
/// Returns a `ModelError` if the index file or any shard cannot be fetched,
/// or if the index has no usable weight map.
pub fn hub_load_safetensors(repo: &ApiRepo, json_file: &str) -> Result<Vec<PathBuf>, ModelError> {
    let json_file = repo.get(json_file)?;
    let json_file = std::fs::File::open(json_file)?;
    let json: serde_json::Value = serde_json::from_reader(&json_file)?;
    let weight_map = match json.get("weight_map") {
        Some(serde_json::Value::Object(map)) => map,
        Some(_) => return Err(ModelError::Msg("weight map is not a map".to_string())),
        None => return Err(ModelError::Msg("no weight map in index file".to_string())),
    };
    let safetensors_files = weight_map
        .values()
        .filter_map(|value| value.as_str().map(ToString::to_string))
        .collect::<HashSet<_>>();
    safetensors_files
        .iter()
        .map(|file| repo.get(file).map_err(ModelError::from))
        .collect()
}

/// Fetches the model weights, sharded or single-file.
///
/// # Errors
///
/// Returns a `ModelError` if neither layout can be downloaded.
pub fn hub_load_weights(repo: &ApiRepo) -> Result<Vec<PathBuf>, ModelError> {
    match hub_load_safetensors(repo, "model.safetensors.index.json") {
        Ok(files) => Ok(files),
        Err(_) => Ok(vec![repo.get("model.safetensors")?]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_falls_back_to_available_backend() {
        let device = device(0).unwrap();
        if !cuda_is_available() && !metal_is_available() {
            assert!(device.is_cpu());
        }
    }
}
