pub mod openai_compat;
pub mod provider;
pub mod service;
pub mod types;

pub use openai_compat::OpenAiCompatibleProvider;
pub use provider::{Embedder, LlmProvider};
pub use service::LlmService;
pub use types::{ChatMessage, ChatRequest};
