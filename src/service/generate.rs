//! Text-to-image generation and image editing.

use super::{GenerationOutcome, NoticeLevel};
use crate::error::{Result, StudioError};
use crate::gemini::{
    ChunkStream, Content, GenerateContentRequest, GenerationConfig, HarmBlockThreshold,
    HarmCategory, Modality, ModelBackend, Part, ResponseChunk, Role, SafetySetting, UploadedFile,
};
use crate::media::ImageFormat;
use crate::store::{is_valid_image, ImageCheck, ImageStore};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Prefix added to edit instructions when naming result files.
const EDIT_NAME_PREFIX: &str = "image_edit_";

/// Whether a freshly written image is decoded before being accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SaveMode {
    Verify,
    Trust,
}

fn mixed_output_config(max_output_tokens: Option<u32>) -> GenerationConfig {
    GenerationConfig {
        temperature: Some(1.0),
        top_p: Some(0.95),
        top_k: Some(40),
        max_output_tokens,
        response_modalities: vec![Modality::Image, Modality::Text],
        response_mime_type: Some("text/plain".to_string()),
    }
}

/// Builds the single-turn request used for text-to-image generation.
pub fn generation_request(prompt: &str) -> GenerateContentRequest {
    let safety_settings = [
        HarmCategory::Harassment,
        HarmCategory::HateSpeech,
        HarmCategory::SexuallyExplicit,
        HarmCategory::DangerousContent,
    ]
    .into_iter()
    .map(|category| SafetySetting {
        category,
        threshold: HarmBlockThreshold::BlockNone,
    })
    .collect();

    GenerateContentRequest {
        contents: vec![Content::user_text(prompt)],
        safety_settings,
        generation_config: mixed_output_config(None),
    }
}

/// Builds the request that edits an uploaded image.
pub fn edit_request(file: &UploadedFile, instruction: &str) -> GenerateContentRequest {
    GenerateContentRequest {
        contents: vec![Content::new(
            Role::User,
            vec![
                Part::file(file.uri.clone(), file.mime_type.clone()),
                Part::text(instruction),
            ],
        )],
        safety_settings: vec![SafetySetting {
            category: HarmCategory::CivicIntegrity,
            threshold: HarmBlockThreshold::Off,
        }],
        generation_config: mixed_output_config(Some(8192)),
    }
}

/// Generates an image from a prompt.
///
/// Every image chunk is written to the store and decoded back; the outcome
/// carries the last chunk's path only if that chunk verified. Text chunks and
/// failures become notices.
pub async fn generate_image(
    backend: &dyn ModelBackend,
    store: &ImageStore,
    prompt: &str,
) -> GenerationOutcome {
    let mut outcome = GenerationOutcome::default();
    tracing::info!(model = backend.model(), "generating image");

    match backend
        .stream_generate_content(&generation_request(prompt))
        .await
    {
        Ok(stream) => drain_stream(stream, store, prompt, SaveMode::Verify, &mut outcome).await,
        Err(e) => {
            tracing::warn!("image generation failed: {e}");
            outcome.push(NoticeLevel::Error, format!("Image generation failed: {e}"));
        }
    }

    finish(outcome)
}

/// Edits an uploaded image according to `instruction`.
///
/// The upload is staged in a temporary file under `scratch_dir` for the Files
/// API; that file is gone when this returns, whatever the result.
pub async fn edit_image(
    backend: &dyn ModelBackend,
    store: &ImageStore,
    scratch_dir: &Path,
    upload: &[u8],
    instruction: &str,
) -> GenerationOutcome {
    let mut outcome = GenerationOutcome::default();
    if upload.is_empty() {
        outcome.push(NoticeLevel::Error, "Please upload an image first.");
        return outcome;
    }

    let staged = match stage_upload(scratch_dir, upload) {
        Ok(file) => file,
        Err(e) => {
            outcome.push(NoticeLevel::Error, format!("Could not stage upload: {e}"));
            return outcome;
        }
    };

    tracing::info!(model = backend.model(), bytes = upload.len(), "editing image");
    if let Err(e) = run_edit(backend, store, staged.path(), upload, instruction, &mut outcome).await
    {
        tracing::warn!("image edit failed: {e}");
        outcome.push(NoticeLevel::Error, format!("Image editing failed: {e}"));
    }

    if let Err(e) = staged.close() {
        tracing::warn!("failed to remove staged upload: {e}");
    }

    finish(outcome)
}

fn stage_upload(scratch_dir: &Path, data: &[u8]) -> Result<NamedTempFile> {
    let mut file = tempfile::Builder::new()
        .prefix("gemini-studio-upload-")
        .suffix(".jpg")
        .tempfile_in(scratch_dir)?;
    file.write_all(data)?;
    file.as_file().sync_all()?;
    Ok(file)
}

async fn run_edit(
    backend: &dyn ModelBackend,
    store: &ImageStore,
    staged: &Path,
    upload: &[u8],
    instruction: &str,
    outcome: &mut GenerationOutcome,
) -> Result<()> {
    let uploaded = backend
        .upload_file(staged, ImageFormat::sniff_mime_type(upload))
        .await?;
    tracing::debug!(file = %uploaded.name, "upload ready");

    let stream = backend
        .stream_generate_content(&edit_request(&uploaded, instruction))
        .await?;
    let name_prompt = format!("{EDIT_NAME_PREFIX}{instruction}");
    drain_stream(stream, store, &name_prompt, SaveMode::Trust, outcome).await;
    Ok(())
}

async fn drain_stream(
    mut stream: ChunkStream,
    store: &ImageStore,
    name_prompt: &str,
    mode: SaveMode,
    outcome: &mut GenerationOutcome,
) {
    while let Some(chunk) = stream.next_chunk().await {
        match chunk {
            Ok(ResponseChunk::Image { mime_type, data }) => {
                tracing::debug!(%mime_type, bytes = data.len(), "received image chunk");
                let saved = save_chunk(store, name_prompt, data, mode, outcome).await;
                outcome.image = saved;
            }
            Ok(ResponseChunk::Text(text)) => outcome.push(NoticeLevel::Info, text),
            Err(e) => {
                tracing::warn!("stream ended with error: {e}");
                outcome.push(NoticeLevel::Error, e.to_string());
            }
        }
    }
}

/// Writes (and in `Verify` mode decodes) one image on the blocking pool.
async fn save_chunk(
    store: &ImageStore,
    name_prompt: &str,
    data: Vec<u8>,
    mode: SaveMode,
    outcome: &mut GenerationOutcome,
) -> Option<PathBuf> {
    let store = store.clone();
    let name_prompt = name_prompt.to_string();
    let written = tokio::task::spawn_blocking(move || {
        let path = store.save_image(&name_prompt, &data)?;
        let check = (mode == SaveMode::Verify).then(|| is_valid_image(&path));
        Ok::<_, StudioError>((path, check))
    })
    .await
    .map_err(|e| StudioError::Io(std::io::Error::other(e)))
    .and_then(|written| written);

    let (path, check) = match written {
        Ok(written) => written,
        Err(e) => {
            outcome.push(NoticeLevel::Error, format!("Could not write image: {e}"));
            return None;
        }
    };

    let Some(check) = check else {
        outcome.push(
            NoticeLevel::Success,
            format!("Edited image saved to: {}", path.display()),
        );
        return Some(path);
    };

    match check {
        ImageCheck::Valid => {
            outcome.push(
                NoticeLevel::Success,
                format!("Image saved to: {}", path.display()),
            );
            Some(path)
        }
        check => {
            tracing::warn!(path = %path.display(), ?check, "written image failed verification");
            outcome.push(
                NoticeLevel::Error,
                format!("Failed to save valid image at: {}", path.display()),
            );
            None
        }
    }
}

fn finish(mut outcome: GenerationOutcome) -> GenerationOutcome {
    if outcome.image.is_none() && outcome.notices.is_empty() {
        outcome.push(NoticeLevel::Warning, "The model returned no image.");
    }
    outcome
}
