//! Model backend trait used by the services.

use crate::error::Result;
use crate::gemini::stream::ChunkStream;
use crate::gemini::types::{GenerateContentRequest, GenerateContentResponse, UploadedFile};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

/// Operations the studio needs from a hosted multimodal model.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// Issues a streaming request; chunks are pulled lazily from the result.
    async fn stream_generate_content(
        &self,
        request: &GenerateContentRequest,
    ) -> Result<ChunkStream>;

    /// Issues a single non-streaming request.
    async fn generate_content(
        &self,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse>;

    /// Uploads a local file to the provider's file storage.
    async fn upload_file(&self, path: &Path, mime_type: &str) -> Result<UploadedFile>;

    /// Model identifier requests are sent to.
    fn model(&self) -> &str;
}

/// Builds a backend from a per-session credential.
pub trait ClientFactory: Send + Sync {
    /// Returns a ready backend, or the reason one could not be built.
    fn connect(&self, api_key: &str) -> Result<Arc<dyn ModelBackend>>;
}
