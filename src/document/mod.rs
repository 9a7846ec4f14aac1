pub mod docx;
pub mod loader;
pub mod splitter;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub use loader::{load_documents, load_single_document, split_documents};
pub use splitter::{Language, RecursiveCharacterTextSplitter};

#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("Document type is undefined: {0}")]
    UndefinedType(PathBuf),
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to extract text from {path}: {reason}")]
    Extraction { path: PathBuf, reason: String },
    #[error("Loader worker failed: {0}")]
    Worker(String),
}

/// A unit of text with its provenance; `metadata["source"]` is always set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub page_content: String,
    pub metadata: HashMap<String, String>,
}

impl Document {
    pub fn new(page_content: impl Into<String>, source: impl Into<String>) -> Self {
        let mut metadata = HashMap::new();
        metadata.insert("source".to_string(), source.into());
        Self {
            page_content: page_content.into(),
            metadata,
        }
    }

    pub fn source(&self) -> &str {
        self.metadata.get("source").map(String::as_str).unwrap_or("")
    }
}

/// Text extraction strategy, keyed by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoaderKind {
    Text,
    Pdf,
    Csv,
    Excel,
    Word,
}

pub fn loader_for(path: &Path) -> Option<LoaderKind> {
    let extension = path.extension()?.to_str()?;
    match extension {
        "txt" | "md" | "py" => Some(LoaderKind::Text),
        "pdf" => Some(LoaderKind::Pdf),
        "csv" => Some(LoaderKind::Csv),
        "xls" | "xlsx" => Some(LoaderKind::Excel),
        "docx" | "doc" => Some(LoaderKind::Word),
        _ => None,
    }
}
