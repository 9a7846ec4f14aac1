use colored::Colorize;

use crate::config::{Settings, VectorBackend};

pub fn print_banner(mode: &str, settings: &Settings) {
    println!("\n🤖 {} {}", "Document QA".bold(), mode.cyan());
    println!("  Source documents: {}", settings.source_directory.display());
    let store = match settings.vector_backend {
        VectorBackend::Local => format!("local ({})", settings.persist_directory.display()),
        VectorBackend::Qdrant => format!("qdrant ({})", settings.qdrant_url),
    };
    println!("  Vector store:     {}", store);
    println!("  Embeddings:       {}", settings.embedding_model_name);
    println!();
}

/// Shown before the interactive query loop.
pub fn print_query_help() {
    println!("💬 Type a question about your documents and press enter.");
    println!("  exit  - Leave the session");
    println!();
}
