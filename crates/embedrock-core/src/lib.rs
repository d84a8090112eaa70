//! Amazon Bedrock embedding functions for vector search.
//!
//! Two model families are provided, Cohere Embed v3 and Titan Multimodal
//! Embeddings, behind one [`embedding::EmbeddingFunction`] interface. Hosts
//! normally obtain them by name from [`registry::EmbeddingRegistry`].

pub mod client;
pub mod config;
pub mod embedding;
pub mod error;
pub mod images;
pub mod input;
pub mod registry;

pub use embedding::{
    BedrockCohereEmbeddings, BedrockEmbedding, BedrockTitanEmbeddings, EmbeddingFunction,
    NoopEmbedding,
};
pub use error::{Error, Result};
pub use images::ImageSource;
pub use input::{Query, SourceInput};
pub use registry::EmbeddingRegistry;
