mod deterministic;
mod openai;
mod provider;
pub mod retry;

pub use deterministic::DeterministicProvider;
pub use openai::{OpenAIConfig, OpenAIProvider};
pub use provider::{EmbeddingProvider, check_dimensions, realign_by_index, validate_texts};
pub use retry::EmbeddingRetryPolicy;
