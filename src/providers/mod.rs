pub mod local;
pub mod model;
pub mod openai;
pub mod traits;
pub mod utils;

pub use model::{load_model, ModelFormat, ModelSpec};
pub use traits::{CompletionProvider, EmbeddingProvider};
