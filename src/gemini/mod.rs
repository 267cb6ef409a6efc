//! Gemini API client, wire types and stream decoding.

mod backend;
mod client;
pub mod stream;
mod types;

pub use backend::{ClientFactory, ModelBackend};
pub use client::{
    GeminiClient, GeminiClientBuilder, GeminiClientFactory, API_KEY_ENV, DEFAULT_BASE_URL,
    DEFAULT_MODEL, MISSING_KEY_MESSAGE,
};
pub use stream::{ChunkStream, ResponseChunk};
pub use types::{
    Blob, Candidate, Content, FileData, GenerateContentRequest, GenerateContentResponse,
    GenerationConfig, HarmBlockThreshold, HarmCategory, Modality, Part, PromptFeedback, Role,
    SafetySetting, UploadedFile,
};
