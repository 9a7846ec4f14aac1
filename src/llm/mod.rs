pub mod embeddings;
pub mod memory;
pub mod prompt;
pub mod qa;

pub use embeddings::CachedEmbedder;
pub use memory::ConversationBufferMemory;
pub use prompt::{get_prompt_template, PromptTemplate, PromptType};
pub use qa::{QaResult, RetrievalQa};
