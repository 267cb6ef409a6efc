//! Gemini REST client.

use crate::error::{parse_retry_after, sanitize_error_message, Result, StudioError};
use crate::gemini::backend::{ClientFactory, ModelBackend};
use crate::gemini::stream::ChunkStream;
use crate::gemini::types::{
    GenerateContentRequest, GenerateContentResponse, UploadResponse, UploadedFile,
};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

/// Public Gemini API endpoint.
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Model used for chat, generation and editing.
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash-exp-image-generation";

const API_VERSION: &str = "v1beta";

/// Environment variable read when no key is given to the builder.
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

/// Message shown when no credential has been entered.
pub const MISSING_KEY_MESSAGE: &str = "Please enter your Gemini API key in the sidebar.";

/// Builder for [`GeminiClient`].
#[derive(Debug, Clone)]
pub struct GeminiClientBuilder {
    api_key: Option<String>,
    model: String,
    base_url: String,
}

impl Default for GeminiClientBuilder {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }
}

impl GeminiClientBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the API key. Without it, `GEMINI_API_KEY` is used.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the model identifier.
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Overrides the API endpoint (proxies, tests).
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Builds the client. Fails on an empty key or HTTP client setup error.
    pub fn build(self) -> Result<GeminiClient> {
        let api_key = self
            .api_key
            .or_else(|| std::env::var(API_KEY_ENV).ok())
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .ok_or_else(|| StudioError::Auth(MISSING_KEY_MESSAGE.into()))?;

        let client = reqwest::Client::builder()
            .user_agent(concat!("gemini-studio/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(GeminiClient {
            client,
            api_key,
            model: self.model,
            base_url: self.base_url.trim_end_matches('/').to_string(),
        })
    }
}

/// Client for the Gemini Developer API.
pub struct GeminiClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl std::fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiClient")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl GeminiClient {
    /// Creates a new `GeminiClientBuilder`.
    pub fn builder() -> GeminiClientBuilder {
        GeminiClientBuilder::new()
    }

    fn model_url(&self, method: &str) -> String {
        format!(
            "{}/{}/models/{}:{}",
            self.base_url, API_VERSION, self.model, method
        )
    }

    fn upload_url(&self) -> String {
        format!("{}/upload/{}/files", self.base_url, API_VERSION)
    }

    async fn post_json(
        &self,
        url: &str,
        request: &GenerateContentRequest,
    ) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let headers = response.headers().clone();
            let text = response.text().await.unwrap_or_default();
            return Err(parse_error(status.as_u16(), &text, &headers));
        }
        Ok(response)
    }
}

/// Maps a non-success HTTP response to a typed error.
fn parse_error(status: u16, text: &str, headers: &reqwest::header::HeaderMap) -> StudioError {
    let text = sanitize_error_message(text);
    if status == 404 {
        return StudioError::InvalidRequest(
            "Model not found. Verify the model name is correct.".into(),
        );
    }
    if status == 429 {
        let retry_after = parse_retry_after(headers).map(std::time::Duration::from_secs);
        return StudioError::RateLimited { retry_after };
    }
    if status == 401 || status == 403 {
        return StudioError::Auth(format!("Gemini rejected the API key: {text}"));
    }
    let lower = text.to_lowercase();
    if lower.contains("safety") || lower.contains("blocked") || lower.contains("prohibited") {
        return StudioError::ContentBlocked(text);
    }
    if status == 400 && lower.contains("api key not valid") {
        return StudioError::Auth(format!("Gemini rejected the API key: {text}"));
    }
    StudioError::Api {
        status,
        message: text,
    }
}

#[async_trait]
impl ModelBackend for GeminiClient {
    async fn stream_generate_content(
        &self,
        request: &GenerateContentRequest,
    ) -> Result<ChunkStream> {
        let url = format!("{}?alt=sse", self.model_url("streamGenerateContent"));
        let response = self.post_json(&url, request).await?;
        tracing::debug!(model = %self.model, "opened generation stream");
        Ok(ChunkStream::from_sse(response.bytes_stream()))
    }

    async fn generate_content(
        &self,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse> {
        let start = Instant::now();
        let response = self
            .post_json(&self.model_url("generateContent"), request)
            .await?;
        let body: GenerateContentResponse = response.json().await?;
        tracing::debug!(
            model = %self.model,
            duration_ms = start.elapsed().as_millis() as u64,
            "generateContent complete"
        );
        Ok(body)
    }

    async fn upload_file(&self, path: &Path, mime_type: &str) -> Result<UploadedFile> {
        let data = tokio::fs::read(path).await?;
        let display_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("upload")
            .to_string();

        // Resumable protocol: `start` hands back a session URL, then a single
        // `upload, finalize` request carries the bytes.
        let start = self
            .client
            .post(self.upload_url())
            .header("x-goog-api-key", &self.api_key)
            .header("X-Goog-Upload-Protocol", "resumable")
            .header("X-Goog-Upload-Command", "start")
            .header("X-Goog-Upload-Header-Content-Length", data.len().to_string())
            .header("X-Goog-Upload-Header-Content-Type", mime_type)
            .json(&serde_json::json!({ "file": { "display_name": display_name } }))
            .send()
            .await?;

        let status = start.status();
        if !status.is_success() {
            let headers = start.headers().clone();
            let text = start.text().await.unwrap_or_default();
            return Err(parse_error(status.as_u16(), &text, &headers));
        }

        let session_url = start
            .headers()
            .get("x-goog-upload-url")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| StudioError::Upload("missing x-goog-upload-url header".into()))?;

        let size = data.len();
        let finished = self
            .client
            .post(&session_url)
            .header("X-Goog-Upload-Offset", "0")
            .header("X-Goog-Upload-Command", "upload, finalize")
            .body(data)
            .send()
            .await?;

        let status = finished.status();
        if !status.is_success() {
            let headers = finished.headers().clone();
            let text = finished.text().await.unwrap_or_default();
            return Err(parse_error(status.as_u16(), &text, &headers));
        }

        let uploaded: UploadResponse = finished.json().await?;
        tracing::debug!(name = %uploaded.file.name, size, "uploaded file");
        Ok(uploaded.file)
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// Builds [`GeminiClient`]s for a fixed model and endpoint.
#[derive(Debug, Clone)]
pub struct GeminiClientFactory {
    model: String,
    base_url: String,
}

impl GeminiClientFactory {
    /// Creates a factory for the given model and endpoint.
    pub fn new(model: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            base_url: base_url.into(),
        }
    }
}

impl Default for GeminiClientFactory {
    fn default() -> Self {
        Self::new(DEFAULT_MODEL, DEFAULT_BASE_URL)
    }
}

impl ClientFactory for GeminiClientFactory {
    fn connect(&self, api_key: &str) -> Result<Arc<dyn ModelBackend>> {
        let client = GeminiClient::builder()
            .api_key(api_key)
            .model(self.model.clone())
            .base_url(self.base_url.clone())
            .build()?;
        Ok(Arc::new(client))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_with_explicit_key() {
        let client = GeminiClientBuilder::new()
            .api_key("test-key")
            .model("gemini-test")
            .build();
        assert!(client.is_ok());
        assert_eq!(client.unwrap().model(), "gemini-test");
    }

    #[test]
    fn test_builder_rejects_empty_key() {
        let err = GeminiClientBuilder::new().api_key("").build().unwrap_err();
        assert!(matches!(err, StudioError::Auth(_)));
        assert_eq!(err.to_string(), MISSING_KEY_MESSAGE);
    }

    #[test]
    fn test_builder_rejects_blank_key() {
        let err = GeminiClientBuilder::new().api_key("   ").build().unwrap_err();
        assert!(matches!(err, StudioError::Auth(_)));
    }

    #[test]
    fn test_any_non_empty_key_builds() {
        for key in ["a", "AIzaSy-something", "key with spaces", "ключ"] {
            assert!(GeminiClient::builder().api_key(key).build().is_ok(), "{key}");
        }
    }

    #[test]
    fn test_urls() {
        let client = GeminiClient::builder()
            .api_key("k")
            .base_url("http://localhost:9000/")
            .build()
            .unwrap();
        assert_eq!(
            client.model_url("generateContent"),
            "http://localhost:9000/v1beta/models/gemini-2.0-flash-exp-image-generation:generateContent"
        );
        assert_eq!(client.upload_url(), "http://localhost:9000/upload/v1beta/files");
    }

    #[test]
    fn test_debug_hides_key() {
        let client = GeminiClient::builder().api_key("secret-key").build().unwrap();
        assert!(!format!("{client:?}").contains("secret-key"));
    }

    #[test]
    fn test_parse_error_mapping() {
        let headers = reqwest::header::HeaderMap::new();
        assert!(matches!(
            parse_error(403, "denied", &headers),
            StudioError::Auth(_)
        ));
        assert!(matches!(
            parse_error(404, "", &headers),
            StudioError::InvalidRequest(_)
        ));
        assert!(matches!(
            parse_error(429, "", &headers),
            StudioError::RateLimited { retry_after: None }
        ));
        assert!(matches!(
            parse_error(400, "API key not valid. Please pass a valid API key.", &headers),
            StudioError::Auth(_)
        ));
        assert!(matches!(
            parse_error(400, "Request blocked by safety", &headers),
            StudioError::ContentBlocked(_)
        ));
        assert!(matches!(
            parse_error(500, "oops", &headers),
            StudioError::Api { status: 500, .. }
        ));
    }

    #[test]
    fn test_factory_builds_backend() {
        let factory = GeminiClientFactory::default();
        let backend = factory.connect("test-key").unwrap();
        assert_eq!(backend.model(), DEFAULT_MODEL);
        assert!(factory.connect("").is_err());
    }
}
