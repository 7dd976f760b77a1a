//! Azure OpenAI adapter.
//!
//! Azure speaks the OpenAI wire format with three differences:
//! - URL structure: `{endpoint}/openai/deployments/{deployment}/chat/completions`
//! - Authentication via API key in the `api-key` header
//! - API version required as query parameter
//!
//! The configured model name is used as the deployment name.

use crate::http::{self, require_api_key};
use crate::openai::{build_chat_request, send_chat, stream_chat, ModelEntry, ModelList};
use async_trait::async_trait;
use gateway_core::{
    ChunkStream, GatewayError, GatewayResult, GenerationRequest, GenerationResponse, ModelInfo,
    ProtocolFault, ProviderAdapter, ProviderAdapterConfig, ProviderKind,
};
use reqwest::{Client, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

/// Azure OpenAI API version
pub const DEFAULT_API_VERSION: &str = "2024-06-01";

/// Azure OpenAI adapter
pub struct AzureOpenAiAdapter {
    config: ProviderAdapterConfig,
    client: Client,
    endpoint: String,
    api_version: String,
}

impl AzureOpenAiAdapter {
    /// Create a new adapter. The endpoint override is mandatory.
    ///
    /// # Errors
    /// Returns a configuration error when no endpoint is configured
    pub fn new(config: ProviderAdapterConfig) -> GatewayResult<Self> {
        if config.provider != ProviderKind::AzureOpenAi {
            return Err(GatewayError::configuration(format!(
                "{} is not served by the Azure adapter",
                config.provider
            )));
        }
        let endpoint = http::base_url(&config)?;
        let client = http::build_client(&config)?;

        Ok(Self {
            config,
            client,
            endpoint,
            api_version: DEFAULT_API_VERSION.to_string(),
        })
    }

    /// Set the API version
    #[must_use]
    pub fn with_api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = version.into();
        self
    }

    /// Get the chat completions endpoint URL for the deployment
    fn completions_url(&self) -> String {
        format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            self.endpoint, self.config.model, self.api_version
        )
    }

    fn post(&self, request: &GenerationRequest, stream: bool) -> RequestBuilder {
        let body = build_chat_request(self.config.provider, &self.config.model, request, stream);
        self.client
            .post(self.completions_url())
            .header("api-key", self.config.api_key.expose_secret())
            .json(&body)
    }
}

#[async_trait]
impl ProviderAdapter for AzureOpenAiAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::AzureOpenAi
    }

    fn config(&self) -> &ProviderAdapterConfig {
        &self.config
    }

    async fn generate(&self, request: &GenerationRequest) -> GatewayResult<GenerationResponse> {
        require_api_key(&self.config)?;
        debug!(deployment = %self.config.model, "Sending request to Azure OpenAI");

        let builder = self.post(request, false).timeout(self.config.timeout);
        send_chat(ProviderKind::AzureOpenAi, self.config.timeout, builder).await
    }

    async fn generate_stream(&self, request: &GenerationRequest) -> GatewayResult<ChunkStream> {
        require_api_key(&self.config)?;
        debug!(deployment = %self.config.model, "Starting streaming request to Azure OpenAI");

        stream_chat(ProviderKind::AzureOpenAi, self.config.timeout, self.post(request, true))
    }

    async fn list_models_with_api_key(
        &self,
        api_key: &SecretString,
        endpoint: Option<&str>,
    ) -> GatewayResult<Vec<ModelInfo>> {
        if api_key.expose_secret().trim().is_empty() {
            return Err(GatewayError::configuration("API key is blank"));
        }
        let base = endpoint.map_or_else(|| self.endpoint.clone(), |e| e.trim_end_matches('/').to_string());
        let url = format!("{base}/openai/models?api-version={}", self.api_version);

        let response = self
            .client
            .get(&url)
            .header("api-key", api_key.expose_secret())
            .timeout(self.config.timeout)
            .send()
            .await
            .map_err(|e| http::map_transport_error(ProviderKind::AzureOpenAi, self.config.timeout, &e))?;
        let response = http::check_response(ProviderKind::AzureOpenAi, response).await?;

        let list: ModelList = response.json().await.map_err(|e| {
            GatewayError::protocol(
                ProviderKind::AzureOpenAi.as_str(),
                ProtocolFault::Malformed,
                format!("invalid model list: {e}"),
            )
        })?;

        Ok(list.data.into_iter().map(ModelEntry::into_model_info).collect())
    }
}
