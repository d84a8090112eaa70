//! Transport to the Bedrock runtime `InvokeModel` API.
//!
//! The [`ModelInvoker`] trait is the seam between the embedding functions
//! and the network. [`BedrockInvoker`] is the real backend; it builds its
//! AWS client lazily on first use and keeps it for the life of the
//! invoker. [`InMemoryInvoker`] records every call and answers from a
//! closure, so the embedding functions can be exercised without AWS
//! credentials or network access.
//!
//! Retries are disabled on the SDK client. Throttling and retry policy
//! belong to whoever drives the embedding function.

use std::sync::Mutex;

use aws_config::retry::RetryConfig;
use aws_config::sts::AssumeRoleProvider;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_credential_types::provider::ProvideCredentials;
use aws_sdk_bedrockruntime::error::DisplayErrorContext;
use aws_sdk_bedrockruntime::primitives::Blob;
use tokio::sync::OnceCell;

use crate::config::BedrockConfig;
use crate::error::{Error, Result};

const JSON_CONTENT_TYPE: &str = "application/json";

/// Sends one JSON request body to a model and returns the raw response body.
#[async_trait::async_trait]
pub trait ModelInvoker: Send + Sync {
    async fn invoke(&self, model_id: &str, body: Vec<u8>) -> Result<Vec<u8>>;
}

// ---------------------------------------------------------------------------
// BedrockInvoker -- real Bedrock runtime backend
// ---------------------------------------------------------------------------

/// Bedrock runtime backend with a memoized client.
pub struct BedrockInvoker {
    config: BedrockConfig,
    client: OnceCell<aws_sdk_bedrockruntime::Client>,
}

impl BedrockInvoker {
    pub fn new(config: BedrockConfig) -> Self {
        Self {
            config,
            client: OnceCell::new(),
        }
    }

    /// Return the runtime client, building it on first access.
    ///
    /// Concurrent first callers wait on a single construction. A failed
    /// construction is not cached, so the next call tries again.
    pub async fn client(&self) -> Result<&aws_sdk_bedrockruntime::Client> {
        self.client
            .get_or_try_init(|| build_client(&self.config))
            .await
    }
}

#[async_trait::async_trait]
impl ModelInvoker for BedrockInvoker {
    async fn invoke(&self, model_id: &str, body: Vec<u8>) -> Result<Vec<u8>> {
        let client = self.client().await?;
        tracing::debug!(model_id, bytes = body.len(), "invoking bedrock model");

        let output = client
            .invoke_model()
            .model_id(model_id)
            .content_type(JSON_CONTENT_TYPE)
            .accept(JSON_CONTENT_TYPE)
            .body(Blob::new(body))
            .send()
            .await
            .map_err(|e| {
                Error::Invoke(format!(
                    "InvokeModel {model_id} failed: {}",
                    DisplayErrorContext(&e)
                ))
            })?;

        Ok(output.body().as_ref().to_vec())
    }
}

/// Load the shared SDK configuration: region, optional profile and
/// endpoint, no retries.
async fn load_sdk_config(config: &BedrockConfig) -> SdkConfig {
    let mut loader = aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(config.region.clone()))
        .retry_config(RetryConfig::disabled());

    if let Some(ref profile) = config.profile_name {
        loader = loader.profile_name(profile);
    }
    if let Some(ref endpoint) = config.endpoint_url {
        loader = loader.endpoint_url(endpoint);
    }

    loader.load().await
}

/// Build the Bedrock runtime client, assuming `assumed_role` when one is
/// configured.
pub async fn build_client(config: &BedrockConfig) -> Result<aws_sdk_bedrockruntime::Client> {
    let sdk_config = load_sdk_config(config).await;
    client_from_sdk_config(&sdk_config, config).await
}

async fn client_from_sdk_config(
    sdk_config: &SdkConfig,
    config: &BedrockConfig,
) -> Result<aws_sdk_bedrockruntime::Client> {
    let mut builder = aws_sdk_bedrockruntime::config::Builder::from(sdk_config)
        .retry_config(RetryConfig::disabled());

    if let Some(ref role_arn) = config.assumed_role {
        let provider = assume_role(sdk_config, role_arn, &config.role_session_name).await?;
        builder = builder.credentials_provider(provider);
    }

    tracing::info!(
        region = %config.region,
        profile = config.profile_name.as_deref().unwrap_or("default"),
        assumed_role = config.assumed_role.is_some(),
        "bedrock runtime client ready"
    );

    Ok(aws_sdk_bedrockruntime::Client::from_conf(builder.build()))
}

/// A provider that re-assumes `role_arn` whenever the cached session nears
/// expiry. The first exchange runs here so a bad role fails construction
/// instead of the first request.
async fn assume_role(
    sdk_config: &SdkConfig,
    role_arn: &str,
    session_name: &str,
) -> Result<AssumeRoleProvider> {
    let provider = AssumeRoleProvider::builder(role_arn)
        .session_name(session_name)
        .configure(sdk_config)
        .build()
        .await;

    provider.provide_credentials().await.map_err(|e| {
        Error::Auth(format!(
            "sts assume_role {role_arn} failed: {}",
            DisplayErrorContext(&e)
        ))
    })?;

    tracing::info!(role_arn, session_name, "assumed role for bedrock access");
    Ok(provider)
}

// ---------------------------------------------------------------------------
// InMemoryInvoker -- recording backend for tests and dry runs
// ---------------------------------------------------------------------------

/// A request captured by [`InMemoryInvoker`].
#[derive(Debug, Clone)]
pub struct InvokeCall {
    pub model_id: String,
    pub body: serde_json::Value,
}

type Responder = dyn Fn(&str, &serde_json::Value) -> Result<serde_json::Value> + Send + Sync;

/// Invoker that answers from a closure and records every request.
pub struct InMemoryInvoker {
    responder: Box<Responder>,
    calls: Mutex<Vec<InvokeCall>>,
}

impl InMemoryInvoker {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&str, &serde_json::Value) -> Result<serde_json::Value> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Always answer with `response`.
    pub fn fixed(response: serde_json::Value) -> Self {
        Self::new(move |_, _| Ok(response.clone()))
    }

    pub fn calls(&self) -> Vec<InvokeCall> {
        self.calls
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|guard| guard.len()).unwrap_or(0)
    }
}

#[async_trait::async_trait]
impl ModelInvoker for InMemoryInvoker {
    async fn invoke(&self, model_id: &str, body: Vec<u8>) -> Result<Vec<u8>> {
        let request: serde_json::Value = serde_json::from_slice(&body)?;
        let response = (self.responder)(model_id, &request)?;

        self.calls
            .lock()
            .map_err(|e| Error::Internal(format!("lock poisoned: {e}")))?
            .push(InvokeCall {
                model_id: model_id.to_string(),
                body: request,
            });

        Ok(serde_json::to_vec(&response)?)
    }
}
