use std::path::{Path, PathBuf};

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

/// Configuration of the text-generation backend.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct PalaverInferenceConfig {
    /// Hugging Face repository of a Llama-architecture causal LM
    #[serde(default = "default_model_id")]
    pub model_id: String,

    /// Repository revision (branch, tag or commit)
    #[serde(default = "default_revision")]
    pub revision: String,

    /// Local directory the model files are cached in, the hub default is used if unset
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,

    /// Hugging Face API token, only needed for gated repositories
    #[serde(default)]
    pub api_key: Option<String>,

    /// Ordinal of the CUDA or Metal device
    #[serde(default)]
    pub device_id: usize,

    /// Weights precision (`f32`, `f16` or `bf16`)
    #[serde(default = "default_dtype")]
    pub dtype: String,

    /// Seed of the sampler
    #[serde(default = "default_random_seed")]
    pub random_seed: u64,

    /// Penalty applied to recently generated tokens, `1.0` disables it
    #[serde(default = "default_repeat_penalty")]
    pub repeat_penalty: f32,

    /// Number of trailing tokens the repeat penalty looks at
    #[serde(default = "default_repeat_last_n")]
    pub repeat_last_n: usize,
}

fn default_model_id() -> String {
    "TinyLlama/TinyLlama-1.1B-Chat-v1.0".to_string()
}

fn default_revision() -> String {
    "main".to_string()
}

fn default_dtype() -> String {
    "f32".to_string()
}

const fn default_random_seed() -> u64 {
    42
}

const fn default_repeat_penalty() -> f32 {
    1.2
}

const fn default_repeat_last_n() -> usize {
    64
}

impl Default for PalaverInferenceConfig {
    fn default() -> Self {
        Self {
            model_id: default_model_id(),
            revision: default_revision(),
            cache_dir: None,
            api_key: None,
            device_id: 0,
            dtype: default_dtype(),
            random_seed: default_random_seed(),
            repeat_penalty: default_repeat_penalty(),
            repeat_last_n: default_repeat_last_n(),
        }
    }
}

impl PalaverInferenceConfig {
    /// Creates a new `PalaverInferenceConfig` from the `palaver_inference`
    /// section of a configuration file, with `PALAVER_INFERENCE__*` environment
    /// variables taking precedence.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the file cannot be read or parsed, or if the
    /// `palaver_inference` section is missing or malformed.
    pub fn from_file_path<P: AsRef<Path>>(config_file_path: P) -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(File::from(config_file_path.as_ref()))
            .add_source(
                Environment::with_prefix("PALAVER_INFERENCE")
                    .keep_prefix(true)
                    .separator("__"),
            );
        let config = builder.build()?;
        config.get::<Self>("palaver_inference")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_applied() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[palaver_inference]\ndevice_id = 1\n").unwrap();

        let config = PalaverInferenceConfig::from_file_path(file.path()).unwrap();
        assert_eq!(config.model_id, "TinyLlama/TinyLlama-1.1B-Chat-v1.0");
        assert_eq!(config.revision, "main");
        assert_eq!(config.device_id, 1);
        assert_eq!(config.dtype, "f32");
        assert_eq!(config.random_seed, 42);
        assert_eq!(config.repeat_last_n, 64);
        assert!((config.repeat_penalty - 1.2).abs() < f32::EPSILON);
        assert!(config.cache_dir.is_none());
        assert!(config.api_key.is_none());
    }

    #[test]
    fn test_explicit_values() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"[palaver_inference]
model_id = "meta-llama/Llama-3.2-1B"
revision = "v1"
cache_dir = "./models"
api_key = "hf_test"
dtype = "bf16"
random_seed = 7
repeat_penalty = 1.0
repeat_last_n = 16
"#
        )
        .unwrap();

        let config = PalaverInferenceConfig::from_file_path(file.path()).unwrap();
        assert_eq!(config.model_id, "meta-llama/Llama-3.2-1B");
        assert_eq!(config.revision, "v1");
        assert_eq!(config.cache_dir, Some(PathBuf::from("./models")));
        assert_eq!(config.api_key.as_deref(), Some("hf_test"));
        assert_eq!(config.dtype, "bf16");
        assert_eq!(config.random_seed, 7);
        assert_eq!(config.repeat_last_n, 16);
    }
}
