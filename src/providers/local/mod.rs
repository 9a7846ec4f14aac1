#[allow(clippy::module_inception)]
mod local;

pub use local::{InstructEmbeddings, LocalModelProvider, DOCUMENT_INSTRUCTION, QUERY_INSTRUCTION};
