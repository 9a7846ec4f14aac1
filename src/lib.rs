pub mod api;
pub mod commands;
pub mod config;
pub mod database;
pub mod document;
pub mod llm;
pub mod manifest;
pub mod providers;

// Re-export commonly used items
pub use config::Settings;
pub use document::Document;
pub use llm::RetrievalQa;
pub use manifest::Manifest;
