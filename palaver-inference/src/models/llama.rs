use std::{str::FromStr, time::Instant};

use candle::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::{
    generation::{LogitsProcessor, Sampling},
    models::llama::{self as model, Config, LlamaConfig, LlamaEosToks},
};
use hf_hub::{api::sync::ApiBuilder, Repo, RepoType};
use tokenizers::Tokenizer;
use tracing::info;

use crate::{
    config::PalaverInferenceConfig, types::GenerationParams, ModelError, TextGenerator,
};

use super::{device, hub_load_weights};

const EOS_TOKEN: &str = "</s>";

/// A Llama-architecture causal LM run with candle.
///
/// Weights are loaded once. Each call to [`TextGenerator::generate`] builds its
/// own KV cache and sampler, so concurrent calls do not share mutable state.
pub struct LlamaGenerator {
    device: Device,
    model: model::Llama,
    tokenizer: Tokenizer,
    config: Config,
    dtype: DType,
    eos_token_ids: Vec<u32>,
    random_seed: u64,
    repeat_penalty: f32,
    repeat_last_n: usize,
}

impl LlamaGenerator {
    /// Fetches the model files from the Hugging Face Hub and loads them on the
    /// selected device.
    ///
    /// # Errors
    ///
    /// Returns a `ModelError` if:
    /// - the dtype is not recognised
    /// - the device cannot be opened
    /// - any file cannot be downloaded or parsed
    /// - the weights do not match a Llama configuration
    pub fn from_config(config: &PalaverInferenceConfig) -> Result<Self, ModelError> {
        let device = device(config.device_id)?;
        let dtype = DType::from_str(&config.dtype)
            .map_err(|e| ModelError::Msg(format!("Invalid dtype `{}`: {e:?}", config.dtype)))?;

        let mut api = ApiBuilder::new()
            .with_progress(false)
            .with_token(config.api_key.clone());
        if let Some(cache_dir) = &config.cache_dir {
            api = api.with_cache_dir(cache_dir.clone());
        }
        let api = api.build()?;
        let repo = api.repo(Repo::with_revision(
            config.model_id.clone(),
            RepoType::Model,
            config.revision.clone(),
        ));

        info!(
            target = "palaver-inference",
            event = "model-fetch",
            model_id = %config.model_id,
            revision = %config.revision,
            "Fetching model files"
        );
        let config_file_path = repo.get("config.json")?;
        let tokenizer_file_path = repo.get("tokenizer.json")?;
        let weights_file_paths = hub_load_weights(&repo)?;

        let start = Instant::now();
        let llama_config: LlamaConfig =
            serde_json::from_slice(&std::fs::read(config_file_path)?)?;
        let llama_config = llama_config.into_config(false);
        // SAFETY: the weight files are owned by the hub cache and not modified while mapped.
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&weights_file_paths, dtype, &device)? };
        let model = model::Llama::load(vb, &llama_config)?;
        let tokenizer = Tokenizer::from_file(tokenizer_file_path)
            .map_err(|e| ModelError::Tokenizer(e.to_string()))?;

        let eos_token_ids = match &llama_config.eos_token_id {
            Some(LlamaEosToks::Single(id)) => vec![*id],
            Some(LlamaEosToks::Multiple(ids)) => ids.clone(),
            None => tokenizer.token_to_id(EOS_TOKEN).into_iter().collect(),
        };
        info!(
            target = "palaver-inference",
            event = "model-loaded",
            model_id = %config.model_id,
            "Loaded Llama model in {:?}",
            start.elapsed()
        );

        Ok(Self {
            device,
            model,
            tokenizer,
            config: llama_config,
            dtype,
            eos_token_ids,
            random_seed: config.random_seed,
            repeat_penalty: config.repeat_penalty,
            repeat_last_n: config.repeat_last_n,
        })
    }
}

impl TextGenerator for LlamaGenerator {
    fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<String, ModelError> {
        let mut tokens = self
            .tokenizer
            .encode(prompt, true)
            .map_err(|e| ModelError::Tokenizer(e.to_string()))?
            .get_ids()
            .to_vec();
        let max_new_tokens = max_new_tokens(params.max_length, tokens.len());

        let mut logits_processor = LogitsProcessor::from_sampling(self.random_seed, sampling(params));
        let mut cache = model::Cache::new(true, self.dtype, &self.config, &self.device)?;
        let mut index_pos = 0;
        let mut generated_tokens = 0u32;

        let start_gen = Instant::now();
        for index in 0..max_new_tokens {
            let (context_size, context_index) = if cache.use_kv_cache && index > 0 {
                (1, index_pos)
            } else {
                (tokens.len(), 0)
            };
            let ctxt = &tokens[tokens.len().saturating_sub(context_size)..];
            let input = Tensor::new(ctxt, &self.device)?.unsqueeze(0)?;
            let logits = self.model.forward(&input, context_index, &mut cache)?;
            let logits = logits.squeeze(0)?;
            let logits = if (self.repeat_penalty - 1.).abs() < f32::EPSILON {
                logits
            } else {
                let start_at = tokens.len().saturating_sub(self.repeat_last_n);
                candle_transformers::utils::apply_repeat_penalty(
                    &logits,
                    self.repeat_penalty,
                    &tokens[start_at..],
                )?
            };
            index_pos += ctxt.len();

            let next_token = logits_processor.sample(&logits)?;
            tokens.push(next_token);
            generated_tokens += 1;
            if self.eos_token_ids.contains(&next_token) {
                break;
            }
        }

        let dt = start_gen.elapsed();
        info!(
            target = "palaver-inference",
            event = "generation-finished",
            generated_tokens,
            "{generated_tokens} tokens generated ({:.2} token/s)",
            f64::from(generated_tokens) / dt.as_secs_f64().max(f64::EPSILON),
        );

        self.tokenizer
            .decode(&tokens, true)
            .map_err(|e| ModelError::Tokenizer(e.to_string()))
    }
}

/// Maps client decoding parameters onto a candle sampling strategy.
///
/// A non-positive temperature selects greedy decoding, a non-positive `top_k`
/// disables top-k filtering and a `top_p` outside `(0, 1)` disables nucleus
/// filtering.
pub(crate) fn sampling(params: &GenerationParams) -> Sampling {
    let temperature = params.temperature;
    if temperature.is_nan() || temperature <= 0.0 {
        return Sampling::ArgMax;
    }
    let top_k = usize::try_from(params.top_k).ok().filter(|k| *k > 0);
    let top_p = Some(params.top_p).filter(|p| *p > 0.0 && *p < 1.0);
    match (top_k, top_p) {
        (None, None) => Sampling::All { temperature },
        (Some(k), None) => Sampling::TopK { k, temperature },
        (None, Some(p)) => Sampling::TopP { p, temperature },
        (Some(k), Some(p)) => Sampling::TopKThenTopP { k, p, temperature },
    }
}

/// Number of tokens left for the continuation once the prompt is accounted for.
pub(crate) fn max_new_tokens(max_length: i64, prompt_tokens: usize) -> usize {
    usize::try_from(max_length)
        .unwrap_or(0)
        .saturating_sub(prompt_tokens)
}
