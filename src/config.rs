use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};

pub const EMBEDDING_MODEL_NAME: &str = "hkunlp/instructor-large";
pub const MODEL_ID: &str = "TheBloke/orca_mini_v3_13B-GPTQ";
pub const MODEL_BASENAME: &str = "model.safetensors";
pub const CHUNK_SIZE: usize = 1000;
pub const CHUNK_OVERLAP: usize = 200;
pub const RETRIEVER_K: usize = 4;
pub const DEFAULT_MAX_LENGTH: usize = 2048;

/// Prompt template used when no other system prompt is configured.
pub const TEMPLATE: &str = r#"
    You are a helpful systems engineer with 20 years of experience who answers questions
    about systems engineering. You will be provided with relevant information in the form
    of documents. Additional context for the question may be found in the chat history. Your
    task is to write a clear, helpful, detailed, and factually accurate answer to the question
    at the end using only the provided documents and chat history. If the documents do not
    contain the information needed to answer the question, generate an answer regardless, but
    include the string "This answer contains information not present in the source documents."
    at the end.

    Documents: ###
    {context}
    ###

    Chat History: ###
    {history}
    ###

    Question: ###
    {question}
    ###

    Helpful Answer:
    "#;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Cpu,
    Cuda,
    Ipu,
    Xpu,
    Mkldnn,
    Opengl,
    Opencl,
    Ideep,
    Hip,
    Ve,
    Fpga,
    Ort,
    Xla,
    Lazy,
    Vulkan,
    Mps,
    Meta,
    Hpu,
    Mtia,
}

impl DeviceType {
    /// `cuda` when an NVIDIA device is visible to this process, otherwise `cpu`.
    pub fn detect() -> Self {
        let hidden = env::var("CUDA_VISIBLE_DEVICES")
            .map(|v| v.trim().is_empty() || v.trim() == "-1")
            .unwrap_or(false);
        if !hidden && Path::new("/dev/nvidiactl").exists() {
            DeviceType::Cuda
        } else {
            DeviceType::Cpu
        }
    }

    pub fn is_gpu(&self) -> bool {
        matches!(self, DeviceType::Cuda | DeviceType::Mps)
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self
            .to_possible_value()
            .map(|v| v.get_name().to_string())
            .unwrap_or_else(|| format!("{:?}", self).to_lowercase());
        f.write_str(&name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorBackend {
    Local,
    Qdrant,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub root_directory: PathBuf,
    pub source_directory: PathBuf,
    pub persist_directory: PathBuf,
    pub ingest_threads: usize,
    pub embedding_model_name: String,
    pub model_id: String,
    pub model_basename: Option<String>,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub retriever_k: usize,
    pub collection_name: String,
    pub vector_backend: VectorBackend,
    pub qdrant_url: String,
    pub local_llm_url: String,
    pub embedding_url: String,
}

fn env_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .filter(|v| *v > 0)
        .unwrap_or(default)
}

impl Settings {
    pub fn from_env() -> Self {
        let root_directory = env::var("DOCQA_ROOT")
            .map(PathBuf::from)
            .or_else(|_| env::current_dir())
            .unwrap_or_else(|_| PathBuf::from("."));

        let source_directory = env::var("SOURCE_DIRECTORY")
            .map(PathBuf::from)
            .unwrap_or_else(|_| root_directory.join("SOURCE_DOCUMENTS"));

        let persist_directory = env::var("PERSIST_DIRECTORY")
            .map(PathBuf::from)
            .unwrap_or_else(|_| root_directory.join("DB"));

        let default_threads = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(8);

        // "None" keeps the prompt-level convention for "no basename".
        let model_basename = match env::var("MODEL_BASENAME") {
            Ok(name) if name == "None" || name.trim().is_empty() => None,
            Ok(name) => Some(name),
            Err(_) => Some(MODEL_BASENAME.to_string()),
        };

        let vector_backend = match env::var("VECTOR_BACKEND").map(|v| v.to_lowercase()) {
            Ok(v) if v == "qdrant" => VectorBackend::Qdrant,
            Ok(v) if v != "local" => {
                log::warn!("Unknown VECTOR_BACKEND {}, using the local store", v);
                VectorBackend::Local
            }
            _ => VectorBackend::Local,
        };

        Self {
            root_directory,
            source_directory,
            persist_directory,
            ingest_threads: env_usize("INGEST_THREADS", default_threads),
            embedding_model_name: env::var("EMBEDDING_MODEL_NAME")
                .unwrap_or_else(|_| EMBEDDING_MODEL_NAME.to_string()),
            model_id: env::var("MODEL_ID").unwrap_or_else(|_| MODEL_ID.to_string()),
            model_basename,
            chunk_size: env_usize("CHUNK_SIZE", CHUNK_SIZE),
            chunk_overlap: env::var("CHUNK_OVERLAP")
                .ok()
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(CHUNK_OVERLAP),
            retriever_k: env_usize("RETRIEVER_K", RETRIEVER_K),
            collection_name: env::var("COLLECTION_NAME").unwrap_or_else(|_| "documents".to_string()),
            vector_backend,
            qdrant_url: env::var("QDRANT_URL").unwrap_or_else(|_| "http://localhost:6333".to_string()),
            local_llm_url: env::var("LOCAL_LLM_URL").unwrap_or_else(|_| "http://localhost:11434".to_string()),
            embedding_url: env::var("EMBEDDING_URL").unwrap_or_else(|_| "http://localhost:11434".to_string()),
        }
    }

    /// Settings rooted at `root`, ignoring the environment.
    pub fn with_root<P: AsRef<Path>>(root: P) -> Self {
        let root = root.as_ref().to_path_buf();
        Self {
            source_directory: root.join("SOURCE_DOCUMENTS"),
            persist_directory: root.join("DB"),
            root_directory: root,
            ingest_threads: 8,
            embedding_model_name: EMBEDDING_MODEL_NAME.to_string(),
            model_id: MODEL_ID.to_string(),
            model_basename: Some(MODEL_BASENAME.to_string()),
            chunk_size: CHUNK_SIZE,
            chunk_overlap: CHUNK_OVERLAP,
            retriever_k: RETRIEVER_K,
            collection_name: "documents".to_string(),
            vector_backend: VectorBackend::Local,
            qdrant_url: "http://localhost:6333".to_string(),
            local_llm_url: "http://localhost:11434".to_string(),
            embedding_url: "http://localhost:11434".to_string(),
        }
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.persist_directory.join("docqa.db")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_root_layout() {
        let settings = Settings::with_root("/tmp/docqa");
        assert_eq!(settings.source_directory, PathBuf::from("/tmp/docqa/SOURCE_DOCUMENTS"));
        assert_eq!(settings.persist_directory, PathBuf::from("/tmp/docqa/DB"));
        assert_eq!(settings.ledger_path(), PathBuf::from("/tmp/docqa/DB/docqa.db"));
        assert_eq!(settings.chunk_size, 1000);
        assert_eq!(settings.chunk_overlap, 200);
    }

    #[test]
    fn test_device_type_names() {
        assert_eq!(DeviceType::Cuda.to_string(), "cuda");
        assert_eq!(DeviceType::Mkldnn.to_string(), "mkldnn");
        assert_eq!(DeviceType::from_str("mps", true).unwrap(), DeviceType::Mps);
        assert!(DeviceType::from_str("tpu", true).is_err());
        assert_eq!(DeviceType::value_variants().len(), 19);
    }
}
