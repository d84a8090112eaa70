use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const DEFAULT_REGION: &str = "us-west-2";
pub const DEFAULT_BATCH_SIZE: usize = 64;
pub const DEFAULT_DIMENSIONS: usize = 1024;

/// Settings shared by every Bedrock-backed embedding function.
///
/// Deserializes from a partial JSON object; missing keys take the values
/// from [`BedrockConfig::default`], so a registry caller can pass only the
/// fields it cares about.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BedrockConfig {
    pub region: String,
    pub profile_name: Option<String>,
    /// Role ARN to exchange for temporary credentials before the runtime
    /// client is built.
    pub assumed_role: Option<String>,
    pub role_session_name: String,
    /// Overrides the AWS endpoint, e.g. a VPC interface endpoint.
    pub endpoint_url: Option<String>,
    pub batch_size: usize,
    /// Upper bound on in-flight requests per chunk.
    pub max_concurrency: usize,
    pub text_model_id: String,
    pub image_model_id: String,
    pub dimensions: usize,
    /// Fail on responses that lack the embedding field instead of
    /// returning an empty vector.
    pub strict_responses: bool,
}

impl Default for BedrockConfig {
    fn default() -> Self {
        Self {
            region: DEFAULT_REGION.to_string(),
            profile_name: None,
            assumed_role: None,
            role_session_name: "bedrock-session".to_string(),
            endpoint_url: None,
            batch_size: DEFAULT_BATCH_SIZE,
            max_concurrency: default_max_concurrency(),
            text_model_id: String::new(),
            image_model_id: String::new(),
            dimensions: DEFAULT_DIMENSIONS,
            strict_responses: false,
        }
    }
}

impl BedrockConfig {
    pub fn cohere() -> Self {
        Self {
            role_session_name: "bedrock-cohere-session".to_string(),
            text_model_id: "cohere.embed-english-v3".to_string(),
            image_model_id: "cohere.embed-multilingual-v3".to_string(),
            ..Self::default()
        }
    }

    pub fn titan() -> Self {
        Self {
            role_session_name: "bedrock-titan-session".to_string(),
            text_model_id: "amazon.titan-embed-image-v1".to_string(),
            image_model_id: "amazon.titan-embed-image-v1".to_string(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::Validation("batch_size must be at least 1".to_string()));
        }
        if self.max_concurrency == 0 {
            return Err(Error::Validation(
                "max_concurrency must be at least 1".to_string(),
            ));
        }
        if self.region.trim().is_empty() {
            return Err(Error::Validation("region must not be empty".to_string()));
        }
        if self.text_model_id.is_empty() || self.image_model_id.is_empty() {
            return Err(Error::Validation(
                "text_model_id and image_model_id must be set".to_string(),
            ));
        }
        Ok(())
    }

    /// Overlay the keys present in `overrides` on top of `self`.
    pub fn merged_with(&self, overrides: &serde_json::Value) -> Result<Self> {
        let mut base = serde_json::to_value(self)?;
        match (base.as_object_mut(), overrides) {
            (Some(fields), serde_json::Value::Object(extra)) => {
                for (key, value) in extra {
                    fields.insert(key.clone(), value.clone());
                }
            }
            (_, serde_json::Value::Null) => {}
            _ => {
                return Err(Error::Validation(
                    "embedding config must be a JSON object".to_string(),
                ));
            }
        }
        Ok(serde_json::from_value(base)?)
    }
}

/// Same sizing rule as a default thread pool: one worker per core plus
/// four for I/O wait, capped at 32.
pub fn default_max_concurrency() -> usize {
    let cpus = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    (cpus + 4).min(32)
}
