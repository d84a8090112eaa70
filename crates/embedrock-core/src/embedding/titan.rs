//! Amazon Titan Multimodal Embeddings G1 on Bedrock.
//!
//! One model serves both text and images; each request carries a single
//! input and each response a single `embedding`.

use serde::{Deserialize, Serialize};

use crate::config::BedrockConfig;
use crate::embedding::ModelFamily;
use crate::error::Result;

pub struct Titan;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TextRequest<'a> {
    input_text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ImageRequest<'a> {
    input_image: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    embedding: Option<Vec<f32>>,
}

fn embedding(body: &[u8]) -> Result<Option<Vec<f32>>> {
    let resp: EmbeddingResponse = serde_json::from_slice(body)?;
    Ok(resp.embedding)
}

impl ModelFamily for Titan {
    const NAME: &'static str = "bedrock-titan-embed-multilingual";

    fn default_config() -> BedrockConfig {
        BedrockConfig::titan()
    }

    fn text_request(text: &str) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&TextRequest { input_text: text })?)
    }

    fn image_request(image_base64: &str) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&ImageRequest {
            input_image: image_base64,
        })?)
    }

    fn parse_text_response(body: &[u8]) -> Result<Option<Vec<f32>>> {
        embedding(body)
    }

    fn parse_image_response(body: &[u8]) -> Result<Option<Vec<f32>>> {
        embedding(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_shapes() {
        let text: serde_json::Value =
            serde_json::from_slice(&Titan::text_request("harbor at dusk").unwrap()).unwrap();
        assert_eq!(text, serde_json::json!({"inputText": "harbor at dusk"}));

        let image: serde_json::Value =
            serde_json::from_slice(&Titan::image_request("QUJD").unwrap()).unwrap();
        assert_eq!(image, serde_json::json!({"inputImage": "QUJD"}));
    }

    #[test]
    fn test_parse_embedding() {
        let body = br#"{"embedding":[1.0,-1.0],"inputTextTokenCount":4}"#;
        assert_eq!(Titan::parse_text_response(body).unwrap(), Some(vec![1.0, -1.0]));
        assert_eq!(Titan::parse_image_response(b"{}").unwrap(), None);
    }
}
