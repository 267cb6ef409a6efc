//! Generation, edit and chat services.

mod chat;
mod generate;

pub use chat::{chat, chat_request, extract_reply, NO_RESPONSE};
pub use generate::{edit_image, edit_request, generate_image, generation_request};

use std::path::PathBuf;

/// Severity of a message shown next to a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    /// Something was saved.
    Success,
    /// Text the model produced alongside its output.
    Info,
    /// Nothing went wrong, but nothing came out either.
    Warning,
    /// The operation failed.
    Error,
}

/// A user-visible message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    /// Severity.
    pub level: NoticeLevel,
    /// Message text.
    pub text: String,
}

impl Notice {
    /// Creates a notice.
    pub fn new(level: NoticeLevel, text: impl Into<String>) -> Self {
        Self {
            level,
            text: text.into(),
        }
    }
}

/// Result of a generation or edit call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerationOutcome {
    /// Path of the last usable image, if any.
    pub image: Option<PathBuf>,
    /// Messages collected while streaming.
    pub notices: Vec<Notice>,
}

impl GenerationOutcome {
    fn push(&mut self, level: NoticeLevel, text: impl Into<String>) {
        self.notices.push(Notice::new(level, text));
    }

    /// True if any error notice was recorded.
    pub fn has_errors(&self) -> bool {
        self.notices.iter().any(|n| n.level == NoticeLevel::Error)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted in-memory backend.

    use crate::error::{Result, StudioError};
    use crate::gemini::{
        Blob, Candidate, ChunkStream, ClientFactory, Content, GenerateContentRequest,
        GenerateContentResponse, ModelBackend, Part, Role, UploadedFile,
    };
    use async_trait::async_trait;
    use base64::Engine;
    use std::path::{Path, PathBuf};
    use std::sync::{Arc, Mutex};

    /// Responses a [`FakeBackend`] plays back.
    #[derive(Default)]
    pub struct Script {
        pub stream: Vec<Result<GenerateContentResponse>>,
        pub stream_error: Option<StudioError>,
        pub reply: Option<GenerateContentResponse>,
        pub upload_error: Option<StudioError>,
    }

    #[derive(Default)]
    pub struct FakeBackend {
        pub script: Mutex<Script>,
        pub requests: Mutex<Vec<GenerateContentRequest>>,
        /// Paths passed to `upload_file`, with whether they existed at the time.
        pub uploads: Mutex<Vec<(PathBuf, String, bool)>>,
    }

    impl FakeBackend {
        pub fn new(script: Script) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script),
                ..Self::default()
            })
        }

        pub fn requests(&self) -> Vec<GenerateContentRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ModelBackend for FakeBackend {
        async fn stream_generate_content(
            &self,
            request: &GenerateContentRequest,
        ) -> Result<ChunkStream> {
            self.requests.lock().unwrap().push(request.clone());
            let mut script = self.script.lock().unwrap();
            if let Some(err) = script.stream_error.take() {
                return Err(err);
            }
            let items = std::mem::take(&mut script.stream);
            Ok(ChunkStream::new(futures_util::stream::iter(items)))
        }

        async fn generate_content(
            &self,
            request: &GenerateContentRequest,
        ) -> Result<GenerateContentResponse> {
            self.requests.lock().unwrap().push(request.clone());
            let script = self.script.lock().unwrap();
            script
                .reply
                .clone()
                .ok_or_else(|| StudioError::Api {
                    status: 500,
                    message: "no scripted reply".into(),
                })
        }

        async fn upload_file(&self, path: &Path, mime_type: &str) -> Result<UploadedFile> {
            self.uploads
                .lock()
                .unwrap()
                .push((path.to_path_buf(), mime_type.to_string(), path.exists()));
            if let Some(err) = self.script.lock().unwrap().upload_error.take() {
                return Err(err);
            }
            Ok(UploadedFile {
                name: "files/fake-1".into(),
                uri: "https://example.test/v1beta/files/fake-1".into(),
                mime_type: mime_type.to_string(),
                display_name: None,
                size_bytes: None,
            })
        }

        fn model(&self) -> &str {
            "fake-model"
        }
    }

    /// Factory handing out one shared fake, or failing like a bad key would.
    pub struct FakeFactory {
        pub backend: Arc<FakeBackend>,
    }

    impl ClientFactory for FakeFactory {
        fn connect(&self, api_key: &str) -> Result<Arc<dyn ModelBackend>> {
            if api_key.trim().is_empty() {
                return Err(StudioError::Auth(crate::gemini::MISSING_KEY_MESSAGE.into()));
            }
            Ok(Arc::clone(&self.backend) as Arc<dyn ModelBackend>)
        }
    }

    pub fn text_response(text: &str) -> GenerateContentResponse {
        response_with(Part::text(text))
    }

    pub fn image_response(data: &[u8]) -> GenerateContentResponse {
        response_with(Part {
            inline_data: Some(Blob {
                mime_type: "image/jpeg".into(),
                data: base64::engine::general_purpose::STANDARD.encode(data),
            }),
            ..Part::default()
        })
    }

    fn response_with(part: Part) -> GenerateContentResponse {
        GenerateContentResponse {
            candidates: vec![Candidate {
                content: Some(Content::new(Role::Model, vec![part])),
                finish_reason: None,
            }],
            prompt_feedback: None,
        }
    }

    pub fn jpeg_bytes() -> Vec<u8> {
        let img = image::RgbImage::from_pixel(16, 16, image::Rgb([220, 30, 30]));
        let mut out = std::io::Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageFormat::Jpeg).unwrap();
        out.into_inner()
    }
}
