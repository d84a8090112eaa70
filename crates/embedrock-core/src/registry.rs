//! Name-keyed registry of embedding functions.
//!
//! A host looks an embedding function up by the name stored in its table
//! schema and builds it from a JSON object of settings. Keys missing from
//! that object fall back to the family's defaults.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::client::{BedrockInvoker, ModelInvoker};
use crate::config::BedrockConfig;
use crate::embedding::{BedrockEmbedding, Cohere, EmbeddingFunction, ModelFamily, Titan};
use crate::error::{Error, Result};

/// Builds one kind of embedding function.
pub trait EmbeddingFactory: Send + Sync {
    fn default_config(&self) -> BedrockConfig;

    fn build(
        &self,
        config: BedrockConfig,
        invoker: Arc<dyn ModelInvoker>,
    ) -> Result<Arc<dyn EmbeddingFunction>>;
}

/// Factory for a [`BedrockEmbedding`] of family `F`.
pub struct FamilyFactory<F: ModelFamily>(PhantomData<fn() -> F>);

impl<F: ModelFamily> Default for FamilyFactory<F> {
    fn default() -> Self {
        Self(PhantomData)
    }
}

impl<F: ModelFamily> EmbeddingFactory for FamilyFactory<F> {
    fn default_config(&self) -> BedrockConfig {
        F::default_config()
    }

    fn build(
        &self,
        config: BedrockConfig,
        invoker: Arc<dyn ModelInvoker>,
    ) -> Result<Arc<dyn EmbeddingFunction>> {
        Ok(Arc::new(BedrockEmbedding::<F>::with_invoker(config, invoker)?))
    }
}

pub struct EmbeddingRegistry {
    factories: HashMap<String, Box<dyn EmbeddingFactory>>,
}

impl EmbeddingRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry holding the Cohere and Titan Bedrock families.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register_family::<Cohere>();
        registry.register_family::<Titan>();
        registry
    }

    pub fn register(&mut self, name: impl Into<String>, factory: Box<dyn EmbeddingFactory>) {
        self.factories.insert(name.into(), factory);
    }

    pub fn register_family<F: ModelFamily>(&mut self) {
        self.register(F::NAME, Box::new(FamilyFactory::<F>::default()));
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Resolve the full configuration `name` would be built with.
    pub fn config_for(&self, name: &str, overrides: &serde_json::Value) -> Result<BedrockConfig> {
        self.factory(name)?.default_config().merged_with(overrides)
    }

    /// Build `name` against the real Bedrock runtime.
    pub fn create(&self, name: &str, overrides: &serde_json::Value) -> Result<Arc<dyn EmbeddingFunction>> {
        let config = self.config_for(name, overrides)?;
        let invoker = Arc::new(BedrockInvoker::new(config.clone()));
        self.factory(name)?.build(config, invoker)
    }

    /// Build `name` against a caller-supplied transport.
    pub fn create_with_invoker(
        &self,
        name: &str,
        overrides: &serde_json::Value,
        invoker: Arc<dyn ModelInvoker>,
    ) -> Result<Arc<dyn EmbeddingFunction>> {
        let config = self.config_for(name, overrides)?;
        self.factory(name)?.build(config, invoker)
    }

    fn factory(&self, name: &str) -> Result<&dyn EmbeddingFactory> {
        self.factories
            .get(name)
            .map(|f| f.as_ref())
            .ok_or_else(|| Error::NotFound(format!("embedding function {name} is not registered")))
    }
}

impl Default for EmbeddingRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::InMemoryInvoker;

    #[test]
    fn test_builtin_names() {
        let registry = EmbeddingRegistry::default();
        assert_eq!(
            registry.names(),
            vec!["bedrock-cohere-embed-multilingual", "bedrock-titan-embed-multilingual"]
        );
    }

    #[test]
    fn test_create_applies_overrides() {
        let registry = EmbeddingRegistry::default();
        let config = registry
            .config_for(
                "bedrock-titan-embed-multilingual",
                &serde_json::json!({"region": "us-east-1", "batch_size": 16}),
            )
            .unwrap();
        assert_eq!(config.region, "us-east-1");
        assert_eq!(config.batch_size, 16);
        assert_eq!(config.role_session_name, "bedrock-titan-session");
    }

    #[test]
    fn test_create_does_not_touch_network() {
        let registry = EmbeddingRegistry::default();
        let function = registry
            .create("bedrock-cohere-embed-multilingual", &serde_json::Value::Null)
            .unwrap();
        assert_eq!(function.name(), "bedrock-cohere-embed-multilingual");
        assert_eq!(function.ndims(), 1024);
    }

    #[test]
    fn test_unknown_name() {
        let registry = EmbeddingRegistry::default();
        let result = registry.create("openai", &serde_json::json!({}));
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[test]
    fn test_invalid_override_is_rejected() {
        let registry = EmbeddingRegistry::default();
        let invoker = Arc::new(InMemoryInvoker::fixed(serde_json::json!({})));
        let result = registry.create_with_invoker(
            "bedrock-titan-embed-multilingual",
            &serde_json::json!({"batch_size": 0}),
            invoker,
        );
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[test]
    fn test_empty_registry() {
        let registry = EmbeddingRegistry::new();
        assert!(registry.names().is_empty());
    }
}
