//! Cohere Embed v3 on Bedrock.
//!
//! Text goes to the English model as a `search_document`; images go to the
//! multilingual model as PNG data URIs. Both answer with a list of
//! embeddings, of which only the first is used.

use serde::{Deserialize, Serialize};

use crate::config::BedrockConfig;
use crate::embedding::ModelFamily;
use crate::error::Result;

pub struct Cohere;

#[derive(Serialize)]
struct TextRequest<'a> {
    texts: [&'a str; 1],
    input_type: &'static str,
}

#[derive(Serialize)]
struct ImageRequest {
    images: [String; 1],
    input_type: &'static str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    embeddings: Option<Vec<Vec<f32>>>,
}

fn first_embedding(body: &[u8]) -> Result<Option<Vec<f32>>> {
    let resp: EmbeddingResponse = serde_json::from_slice(body)?;
    Ok(resp.embeddings.and_then(|all| all.into_iter().next()))
}

impl ModelFamily for Cohere {
    const NAME: &'static str = "bedrock-cohere-embed-multilingual";

    fn default_config() -> BedrockConfig {
        BedrockConfig::cohere()
    }

    fn text_request(text: &str) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&TextRequest {
            texts: [text],
            input_type: "search_document",
        })?)
    }

    fn image_request(image_base64: &str) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&ImageRequest {
            images: [format!("data:image/png;base64,{image_base64}")],
            input_type: "image",
        })?)
    }

    fn parse_text_response(body: &[u8]) -> Result<Option<Vec<f32>>> {
        first_embedding(body)
    }

    fn parse_image_response(body: &[u8]) -> Result<Option<Vec<f32>>> {
        first_embedding(body)
    }
}
