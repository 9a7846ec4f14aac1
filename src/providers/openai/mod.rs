#[allow(clippy::module_inception)]
mod openai;

pub use openai::{OpenAIEmbeddings, OpenAIProvider};
