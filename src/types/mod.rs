//! Public types for the Huginn API.

mod message;
mod model;
mod request;
mod response;

pub use message::{Message, Role};
pub use model::{ModelCapability, ModelDescriptor};
pub use request::{CompletionRequest, EmbeddingRequest};
pub use response::{CompletionResponse, Embedding, EmbeddingResponse, FinishReason, Usage};
