//! Multi-turn chat.

use crate::error::Result;
use crate::gemini::{
    Content, GenerateContentRequest, GenerateContentResponse, GenerationConfig, ModelBackend,
};
use crate::session::ChatMessage;

/// Reply used when the response carries no text at all.
pub const NO_RESPONSE: &str = "No response generated.";

/// Replays `history` and appends `prompt` as the final user turn.
pub fn chat_request(history: &[ChatMessage], prompt: &str) -> GenerateContentRequest {
    let mut contents: Vec<Content> = history
        .iter()
        .map(|msg| {
            if msg.is_user {
                Content::user_text(msg.text.clone())
            } else {
                Content::model_text(msg.text.clone())
            }
        })
        .collect();
    contents.push(Content::user_text(prompt));

    GenerateContentRequest {
        contents,
        safety_settings: Vec::new(),
        generation_config: GenerationConfig {
            temperature: Some(0.7),
            top_p: Some(0.95),
            top_k: Some(40),
            max_output_tokens: Some(8192),
            ..GenerationConfig::default()
        },
    }
}

/// Pulls the reply text out of a chat response.
pub fn extract_reply(response: &GenerateContentResponse) -> String {
    if let Some(text) = response.text() {
        return text;
    }

    response
        .candidates
        .iter()
        .filter_map(|c| c.content.as_ref())
        .flat_map(|c| c.parts.iter())
        .filter_map(|p| p.text.as_deref())
        .find(|t| !t.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| NO_RESPONSE.to_string())
}

/// Sends the conversation so far plus `prompt` and returns the model's reply.
///
/// The transcript is left untouched; recording both turns is up to the caller.
pub async fn chat(
    backend: &dyn ModelBackend,
    history: &[ChatMessage],
    prompt: &str,
) -> Result<String> {
    tracing::debug!(turns = history.len() + 1, "sending chat");
    let response = backend
        .generate_content(&chat_request(history, prompt))
        .await?;
    Ok(extract_reply(&response))
}
