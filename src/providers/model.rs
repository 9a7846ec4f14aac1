use anyhow::Result;
use serde_json::{json, Map, Value};
use std::fmt;

use crate::config::DeviceType;
use crate::providers::local::LocalModelProvider;
use crate::providers::utils::device_options;

const MAX_CTX_SIZE: usize = 2048;
const GPU_LAYERS: u64 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelFormat {
    /// llama.cpp GGML/GGUF weights.
    Ggml,
    /// GPTQ quantized weights, pinned to the first CUDA device.
    Gptq,
    /// Unquantized weights spread over the available GPUs.
    Full,
    /// Llama weights on CPU.
    Llama,
}

impl fmt::Display for ModelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ModelFormat::Ggml => "ggml",
            ModelFormat::Gptq => "gptq",
            ModelFormat::Full => "full",
            ModelFormat::Llama => "llama",
        };
        f.write_str(name)
    }
}

/// What to load and how: the format picked from the basename and device,
/// plus the inference-server options that go with it.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSpec {
    pub format: ModelFormat,
    pub model_id: String,
    pub basename: Option<String>,
    pub device: DeviceType,
    pub max_length: usize,
    pub options: Map<String, Value>,
}

impl ModelSpec {
    pub fn select(
        device: DeviceType,
        model_id: &str,
        max_length: usize,
        model_basename: Option<&str>,
    ) -> Self {
        let mut basename = model_basename.map(str::to_string);
        let mut options = Map::new();

        let format = match model_basename {
            Some(name) if name.contains(".ggml") => {
                log::info!("Using Llamacpp for GGML quantized models");
                options.insert("num_ctx".to_string(), json!(MAX_CTX_SIZE));
                options.insert("num_predict".to_string(), json!(MAX_CTX_SIZE));
                if device.is_gpu() {
                    options.insert("num_gpu".to_string(), json!(GPU_LAYERS));
                }
                if device == DeviceType::Cuda {
                    options.insert("num_batch".to_string(), json!(MAX_CTX_SIZE));
                }
                ModelFormat::Ggml
            }
            Some(name) => {
                log::info!("Using AutoGPTQForCausalLM for quantized models");
                basename = Some(name.replace(".safetensors", ""));
                options.insert("num_gpu".to_string(), json!(GPU_LAYERS));
                options.insert("main_gpu".to_string(), json!(0));
                ModelFormat::Gptq
            }
            None if device == DeviceType::Cuda => {
                log::info!("Using AutoModelForCausalLM for full models");
                options.extend(device_options(device));
                ModelFormat::Full
            }
            None => {
                log::info!("Using LlamaTokenizer");
                options.extend(device_options(DeviceType::Cpu));
                ModelFormat::Llama
            }
        };

        options.insert("temperature".to_string(), json!(1e-36));
        options.insert("top_p".to_string(), json!(0.95));
        options.insert("repeat_penalty".to_string(), json!(1.15));
        options.entry("num_predict".to_string()).or_insert(json!(max_length));

        Self {
            format,
            model_id: model_id.to_string(),
            basename,
            device,
            max_length,
            options,
        }
    }
}

/// Picks the model format for `model_basename` on `device_type` and
/// connects to the inference server at `base_url` with matching options.
pub fn load_model(
    base_url: &str,
    device_type: DeviceType,
    model_id: &str,
    max_length: usize,
    model_basename: Option<&str>,
) -> Result<LocalModelProvider> {
    log::info!("Loading Model: {}, on: {}", model_id, device_type);
    log::info!("This action can take a few minutes!");

    let spec = ModelSpec::select(device_type, model_id, max_length, model_basename);
    log::debug!("Model format {} with options {:?}", spec.format, spec.options);

    let provider = LocalModelProvider::new(base_url, &spec.model_id, spec.options)?;
    log::info!("Local LLM Loaded");
    Ok(provider)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ggml_on_cuda() {
        let spec = ModelSpec::select(DeviceType::Cuda, "TheBloke/Llama-2-7B-GGML", 4096, Some("llama-2-7b.ggmlv3.q4_0.bin"));
        assert_eq!(spec.format, ModelFormat::Ggml);
        assert_eq!(spec.options["num_ctx"], json!(2048));
        assert_eq!(spec.options["num_predict"], json!(2048));
        assert_eq!(spec.options["num_gpu"], json!(1000));
        assert_eq!(spec.options["num_batch"], json!(2048));
    }

    #[test]
    fn test_ggml_on_mps_has_no_batch() {
        let spec = ModelSpec::select(DeviceType::Mps, "m", 2048, Some("m.ggml.bin"));
        assert_eq!(spec.options["num_gpu"], json!(1000));
        assert!(!spec.options.contains_key("num_batch"));

        let cpu = ModelSpec::select(DeviceType::Cpu, "m", 2048, Some("m.ggml.bin"));
        assert!(!cpu.options.contains_key("num_gpu"));
    }

    #[test]
    fn test_gptq_strips_safetensors() {
        let spec = ModelSpec::select(DeviceType::Cpu, "TheBloke/orca_mini_v3_13B-GPTQ", 2048, Some("model.safetensors"));
        assert_eq!(spec.format, ModelFormat::Gptq);
        assert_eq!(spec.basename.as_deref(), Some("model"));
        assert_eq!(spec.options["main_gpu"], json!(0));
    }

    #[test]
    fn test_without_basename() {
        let full = ModelSpec::select(DeviceType::Cuda, "TheBloke/vicuna-7B-1.1-HF", 2048, None);
        assert_eq!(full.format, ModelFormat::Full);

        let llama = ModelSpec::select(DeviceType::Mps, "TheBloke/vicuna-7B-1.1-HF", 1024, None);
        assert_eq!(llama.format, ModelFormat::Llama);
        assert_eq!(llama.options["num_gpu"], json!(0));
        assert_eq!(llama.options["num_predict"], json!(1024));
    }

    #[test]
    fn test_generation_defaults() {
        let spec = ModelSpec::select(DeviceType::Cpu, "m", 512, None);
        assert_eq!(spec.options["temperature"], json!(1e-36));
        assert_eq!(spec.options["top_p"], json!(0.95));
        assert_eq!(spec.options["repeat_penalty"], json!(1.15));
    }

    #[test]
    fn test_load_model_rejects_bad_url() {
        assert!(load_model("localhost", DeviceType::Cpu, "m", 2048, None).is_err());
    }
}
