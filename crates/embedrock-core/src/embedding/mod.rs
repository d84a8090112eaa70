pub mod batch;
pub mod cohere;
pub mod titan;

use std::marker::PhantomData;
use std::sync::Arc;

use crate::client::{BedrockInvoker, ModelInvoker};
use crate::config::BedrockConfig;
use crate::error::{Error, Result};
use crate::images::{ImageLoader, ImageSource};
use crate::input::{Query, SourceInput, sanitize_input};

pub use cohere::Cohere;
pub use titan::Titan;

/// The interface a host vector store calls to embed queries and rows.
#[async_trait::async_trait]
pub trait EmbeddingFunction: Send + Sync {
    /// Registry name.
    fn name(&self) -> &str;

    fn ndims(&self) -> usize;

    /// Embed one query. Always returns exactly one vector.
    async fn compute_query_embeddings(&self, query: Query) -> Result<Vec<Vec<f32>>>;

    /// Embed a corpus of images, one vector per input item, in input order.
    async fn compute_source_embeddings(&self, input: SourceInput) -> Result<Vec<Vec<f32>>> {
        self.compute_source_embeddings_with_progress(input, &|_: usize| {}).await
    }

    /// Like [`compute_source_embeddings`](Self::compute_source_embeddings),
    /// calling `progress` with the running count of embedded items.
    async fn compute_source_embeddings_with_progress(
        &self,
        input: SourceInput,
        progress: &(dyn Fn(usize) + Send + Sync),
    ) -> Result<Vec<Vec<f32>>>;
}

/// Request and response shapes of one Bedrock model line.
pub trait ModelFamily: Send + Sync + 'static {
    /// Name the family is registered under.
    const NAME: &'static str;

    fn default_config() -> BedrockConfig;

    fn text_request(text: &str) -> Result<Vec<u8>>;

    fn image_request(image_base64: &str) -> Result<Vec<u8>>;

    /// `None` when the response carries no embedding.
    fn parse_text_response(body: &[u8]) -> Result<Option<Vec<f32>>>;

    /// `None` when the response carries no embedding.
    fn parse_image_response(body: &[u8]) -> Result<Option<Vec<f32>>>;
}

/// Embedding function backed by a Bedrock model family.
pub struct BedrockEmbedding<F: ModelFamily> {
    config: BedrockConfig,
    invoker: Arc<dyn ModelInvoker>,
    loader: ImageLoader,
    _family: PhantomData<fn() -> F>,
}

pub type BedrockCohereEmbeddings = BedrockEmbedding<Cohere>;
pub type BedrockTitanEmbeddings = BedrockEmbedding<Titan>;

impl<F: ModelFamily> BedrockEmbedding<F> {
    /// Build against the real Bedrock runtime. The AWS client itself is
    /// created on the first request.
    pub fn new(config: BedrockConfig) -> Result<Self> {
        let invoker = Arc::new(BedrockInvoker::new(config.clone()));
        Self::with_invoker(config, invoker)
    }

    pub fn with_defaults() -> Result<Self> {
        Self::new(F::default_config())
    }

    pub fn with_invoker(config: BedrockConfig, invoker: Arc<dyn ModelInvoker>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            invoker,
            loader: ImageLoader::new(),
            _family: PhantomData,
        })
    }

    pub fn config(&self) -> &BedrockConfig {
        &self.config
    }

    pub async fn generate_text_embeddings(&self, text: &str) -> Result<Vec<f32>> {
        let model_id = &self.config.text_model_id;
        let body = F::text_request(text)?;
        let response = self.invoker.invoke(model_id, body).await?;
        self.finish(model_id, F::parse_text_response(&response)?)
    }

    pub async fn generate_image_embedding(&self, image: ImageSource) -> Result<Vec<f32>> {
        let model_id = &self.config.image_model_id;
        let encoded = self.loader.to_base64_png(image).await?;
        let body = F::image_request(&encoded)?;
        let response = self.invoker.invoke(model_id, body).await?;
        self.finish(model_id, F::parse_image_response(&response)?)
    }

    fn finish(&self, model_id: &str, embedding: Option<Vec<f32>>) -> Result<Vec<f32>> {
        match embedding {
            Some(vector) => {
                if vector.len() != self.config.dimensions {
                    tracing::warn!(
                        model_id,
                        expected = self.config.dimensions,
                        actual = vector.len(),
                        "embedding length differs from configured dimensions"
                    );
                }
                Ok(vector)
            }
            None if self.config.strict_responses => Err(Error::Embedding(format!(
                "response from {model_id} has no embedding"
            ))),
            None => {
                tracing::warn!(model_id, "response has no embedding, returning empty vector");
                Ok(Vec::new())
            }
        }
    }
}

#[async_trait::async_trait]
impl<F: ModelFamily> EmbeddingFunction for BedrockEmbedding<F> {
    fn name(&self) -> &str {
        F::NAME
    }

    fn ndims(&self) -> usize {
        self.config.dimensions
    }

    async fn compute_query_embeddings(&self, query: Query) -> Result<Vec<Vec<f32>>> {
        let vector = match query {
            Query::Text(text) => self.generate_text_embeddings(&text).await?,
            Query::Image(image) => {
                self.generate_image_embedding(ImageSource::Decoded(image))
                    .await?
            }
        };
        Ok(vec![vector])
    }

    async fn compute_source_embeddings_with_progress(
        &self,
        input: SourceInput,
        progress: &(dyn Fn(usize) + Send + Sync),
    ) -> Result<Vec<Vec<f32>>> {
        let sources = sanitize_input(input)?;
        batch::embed_in_chunks(
            sources,
            self.config.batch_size,
            self.config.max_concurrency,
            |source| self.generate_image_embedding(source),
            progress,
        )
        .await
    }
}

/// Returns zero vectors; useful when no Bedrock access is available.
pub struct NoopEmbedding {
    dimensions: usize,
}

impl NoopEmbedding {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }
}

#[async_trait::async_trait]
impl EmbeddingFunction for NoopEmbedding {
    fn name(&self) -> &str {
        "noop"
    }

    fn ndims(&self) -> usize {
        self.dimensions
    }

    async fn compute_query_embeddings(&self, _query: Query) -> Result<Vec<Vec<f32>>> {
        Ok(vec![vec![0.0; self.dimensions]])
    }

    async fn compute_source_embeddings_with_progress(
        &self,
        input: SourceInput,
        progress: &(dyn Fn(usize) + Send + Sync),
    ) -> Result<Vec<Vec<f32>>> {
        let sources = sanitize_input(input)?;
        Ok((1..=sources.len())
            .map(|done| {
                progress(done);
                vec![0.0; self.dimensions]
            })
            .collect())
    }
}
