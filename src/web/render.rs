//! HTML rendering.
//!
//! Pages are plain strings assembled from small fragments. Anything that came
//! from a user or the model goes through [`escape`] first.

use crate::service::{Notice, NoticeLevel};
use crate::session::{ChatMessage, SessionState};
use crate::store::Gallery;
use std::fmt::Write;
use std::path::Path;

/// Prompt pre-filled on the generate tab.
pub const DEFAULT_PROMPT: &str = "create an image where tiger is dancing";

/// Instruction pre-filled on the edit tab.
pub const DEFAULT_EDIT_INSTRUCTION: &str = "Please color this beautifully using red, green, blue";

/// Warning shown instead of the tabs while no API key is set.
pub const NO_KEY_WARNING: &str = "Please enter your Gemini API key in the sidebar to use this app.";

const STYLE: &str = r#"
body { font-family: sans-serif; margin: 0; display: flex; min-height: 100vh; }
h1, h2, h3, h4 { color: #1E3A8A; }
aside { width: 280px; padding: 2rem 1rem; background: #F9FAFB; border-right: 1px solid #E5E7EB; }
main { flex: 1; padding: 2rem; max-width: 960px; }
nav.tabs { display: flex; gap: 8px; border-bottom: 1px solid #E5E7EB; margin-bottom: 1.5rem; }
nav.tabs a { padding: 10px 16px; text-decoration: none; color: #374151; }
nav.tabs a.active { border-bottom: 2px solid #3B82F6; font-weight: bold; }
button { background-color: #3B82F6; color: white; border-radius: 6px; padding: 0.5rem 1rem; font-weight: bold; border: none; width: 100%; cursor: pointer; }
button:hover { background-color: #2563EB; }
input[type=text], input[type=password], textarea { width: 100%; box-sizing: border-box; padding: 0.5rem; margin-bottom: 0.5rem; }
.image-card { border: 1px solid #E5E7EB; border-radius: 8px; padding: 1rem; box-shadow: 0 1px 3px rgba(0,0,0,0.1); margin-bottom: 1rem; }
.image-card img, .gallery img { max-width: 100%; }
.notice { padding: 0.75rem; margin: 1rem 0; border-radius: 0.25rem; }
.success-message { background-color: #ECFDF5; color: #047857; border-left: 4px solid #10B981; }
.info-message { background-color: #EFF6FF; color: #1E40AF; border-left: 4px solid #3B82F6; }
.warning-message { background-color: #FFFBEB; color: #92400E; border-left: 4px solid #F59E0B; }
.error-message { background-color: #FEF2F2; color: #B91C1C; border-left: 4px solid #EF4444; }
.chat-message { padding: 1.5rem; border-radius: 0.5rem; margin-bottom: 1rem; display: flex; flex-direction: column; white-space: pre-wrap; }
.user-message { background-color: #EFF6FF; border-left: 5px solid #3B82F6; }
.bot-message { background-color: #F3F4F6; border-left: 5px solid #6B7280; }
.gallery { display: grid; grid-template-columns: repeat(3, 1fr); gap: 1rem; }
.gallery figcaption { font-size: 0.8rem; color: #6B7280; }
.columns { display: grid; grid-template-columns: 1fr 1fr; gap: 1.5rem; }
"#;

/// Top-level views.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tab {
    /// Conversation with the model.
    Chat,
    /// Text-to-image.
    Generate,
    /// Image editing.
    Edit,
}

impl Tab {
    /// Every tab in display order.
    pub const ALL: [Tab; 3] = [Tab::Chat, Tab::Generate, Tab::Edit];

    /// URL path of the tab.
    pub fn path(self) -> &'static str {
        match self {
            Tab::Chat => "/chat",
            Tab::Generate => "/generate",
            Tab::Edit => "/edit",
        }
    }

    /// Tab label.
    pub fn label(self) -> &'static str {
        match self {
            Tab::Chat => "💬 Chat",
            Tab::Generate => "🖼️ Generate Image",
            Tab::Edit => "✏️ Edit Image",
        }
    }

    /// Finds the tab served at `path`.
    pub fn from_path(path: &str) -> Option<Tab> {
        Tab::ALL.into_iter().find(|t| t.path() == path)
    }
}

/// Escapes text for use in HTML content and quoted attributes.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// URL serving a stored image inline.
pub fn image_url(file_name: &str) -> String {
    format!("/images/{}", urlencoding::encode(file_name))
}

/// URL serving a stored image as an attachment.
pub fn download_url(file_name: &str) -> String {
    format!("/images/{}/download", urlencoding::encode(file_name))
}

/// Chat tab.
pub fn chat_page(state: &SessionState, notices: &[Notice]) -> String {
    let mut body = String::from("<h2>Chat with AI</h2>\n<div class=\"transcript\">\n");
    for message in &state.chat_history {
        body.push_str(&chat_message(message));
    }
    body.push_str(
        "</div>\n<form method=\"post\" action=\"/chat\">\
         <input type=\"text\" name=\"message\" placeholder=\"Type a message...\" autofocus required>\
         <button type=\"submit\">Send</button></form>\n",
    );
    layout(Tab::Chat, state, notices, &body)
}

fn chat_message(message: &ChatMessage) -> String {
    let (class, who) = if message.is_user {
        ("user-message", "You")
    } else {
        ("bot-message", "Assistant")
    };
    format!(
        "<div class=\"chat-message {class}\"><strong>{who}</strong>{}</div>\n",
        escape(&message.text)
    )
}

/// Generate tab, including the gallery.
pub fn generate_page(state: &SessionState, notices: &[Notice], gallery: &Gallery) -> String {
    let prompt = state.current_prompt.as_deref().unwrap_or(DEFAULT_PROMPT);
    let mut body = format!(
        "<h2>Generate Images from Text</h2>\n\
         <form method=\"post\" action=\"/generate\">\
         <h4>Enter your prompt below:</h4>\
         <textarea name=\"prompt\" rows=\"4\" placeholder=\"Describe the image you want to create...\">{}</textarea>\
         <button type=\"submit\">🚀 Generate Image</button></form>\n",
        escape(prompt)
    );
    if let Some(path) = &state.last_generated_image {
        body.push_str("<h3>Your Generated Image:</h3>\n");
        body.push_str(&image_card(path, "Generated Image", state.current_prompt.as_deref()));
    }
    body.push_str(&gallery_section(gallery));
    layout(Tab::Generate, state, notices, &body)
}

/// Edit tab.
pub fn edit_page(state: &SessionState, notices: &[Notice]) -> String {
    let instruction = state
        .last_edit_prompt
        .as_deref()
        .unwrap_or(DEFAULT_EDIT_INSTRUCTION);
    let mut body = format!(
        "<h2>Upload and Edit Images</h2>\n\
         <form method=\"post\" action=\"/edit\" enctype=\"multipart/form-data\" class=\"columns\">\
         <div><h4>Upload your image</h4>\
         <input type=\"file\" name=\"image\" accept=\".jpg,.jpeg,.png,image/jpeg,image/png\" required></div>\
         <div><h4>Enter edit instructions</h4>\
         <textarea name=\"instruction\" rows=\"4\" placeholder=\"Describe how you want to edit the image...\">{}</textarea>\
         <button type=\"submit\">✨ Edit Image</button></div></form>\n",
        escape(instruction)
    );
    if let Some(path) = &state.last_edited_image {
        body.push_str("<h3>Your Edited Image:</h3>\n");
        body.push_str(&image_card(path, "Edited Image", state.last_edit_prompt.as_deref()));
    }
    layout(Tab::Edit, state, notices, &body)
}

fn image_card(path: &Path, caption: &str, prompt: Option<&str>) -> String {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return notice(&Notice::new(
            NoticeLevel::Error,
            format!("Error displaying image: {}", path.display()),
        ));
    };
    let mut card = format!(
        "<div class=\"image-card\"><h4>{}</h4><img src=\"{}\" alt=\"{}\">",
        escape(caption),
        image_url(name),
        escape(caption)
    );
    if let Some(prompt) = prompt {
        let _ = write!(card, "<p><strong>Prompt:</strong> {}</p>", escape(prompt));
    }
    let _ = write!(
        card,
        "<p><a href=\"{}\" download=\"{}\">Download Image</a></p></div>\n",
        download_url(name),
        escape(name)
    );
    card
}

fn gallery_section(gallery: &Gallery) -> String {
    let mut out = String::from("<details><summary>🖼️ Image Gallery</summary>\n");
    if gallery.total == 0 {
        out.push_str(&notice(&Notice::new(
            NoticeLevel::Info,
            "No previously generated images found",
        )));
    } else {
        let _ = writeln!(
            out,
            "<h4>Found {} previously generated images</h4><div class=\"gallery\">",
            gallery.total
        );
        for entry in &gallery.entries {
            let _ = writeln!(
                out,
                "<figure><img src=\"{}\" alt=\"{}\" loading=\"lazy\"><figcaption>Created: {}</figcaption></figure>",
                image_url(&entry.file_name),
                escape(&entry.file_name),
                entry.created.format("%Y-%m-%d %H:%M")
            );
        }
        out.push_str("</div>\n");
    }
    out.push_str("</details>\n");
    out
}

fn notice(notice: &Notice) -> String {
    let class = match notice.level {
        NoticeLevel::Success => "success-message",
        NoticeLevel::Info => "info-message",
        NoticeLevel::Warning => "warning-message",
        NoticeLevel::Error => "error-message",
    };
    format!(
        "<div class=\"notice {class}\">{}</div>\n",
        escape(&notice.text)
    )
}

fn sidebar(active: Tab, state: &SessionState) -> String {
    let key_status = if state.has_api_key() {
        "An API key is set for this session."
    } else {
        "No API key set."
    };
    format!(
        "<aside><h2>⚙️ Settings</h2>\
         <form method=\"post\" action=\"/settings/api-key\">\
         <label for=\"api_key\">Enter your Gemini API Key</label>\
         <input type=\"password\" id=\"api_key\" name=\"api_key\" value=\"\" autocomplete=\"off\">\
         <input type=\"hidden\" name=\"return_to\" value=\"{}\">\
         <button type=\"submit\">Save API Key</button></form>\
         <p><small>{key_status}</small></p>\
         <p><small>Get your API key from \
         <a href=\"https://aistudio.google.com/app/apikey\" target=\"_blank\" rel=\"noopener\">Google AI Studio</a>.</small></p>\
         <hr><form method=\"post\" action=\"/settings/clear-chat\">\
         <button type=\"submit\">Clear Chat History</button></form>\
         <hr><p><small>Chat with Gemini, generate images from text and edit your own pictures. \
         Generated images are kept on the server and listed in the gallery.</small></p>\
         </aside>\n",
        active.path()
    )
}

fn layout(active: Tab, state: &SessionState, notices: &[Notice], body: &str) -> String {
    let mut main = String::from("<main><h1>🎨 AI Image Generator &amp; Assistant</h1>\n");
    if state.has_api_key() {
        main.push_str("<nav class=\"tabs\">");
        for tab in Tab::ALL {
            let class = if tab == active { " class=\"active\"" } else { "" };
            let _ = write!(main, "<a href=\"{}\"{class}>{}</a>", tab.path(), tab.label());
        }
        main.push_str("</nav>\n");
        for n in notices {
            main.push_str(&notice(n));
        }
        main.push_str(body);
    } else {
        main.push_str(&notice(&Notice::new(NoticeLevel::Warning, NO_KEY_WARNING)));
        main.push_str(
            "<p>Don't have an API key? Get one from \
             <a href=\"https://aistudio.google.com/app/apikey\" target=\"_blank\" rel=\"noopener\">Google AI Studio</a>.</p>\n",
        );
    }
    main.push_str("</main>\n");

    format!(
        "<!DOCTYPE html>\n<html lang=\"en\"><head><meta charset=\"utf-8\">\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\
         <title>Gemini Studio</title><style>{STYLE}</style></head>\n<body>\n{}{}</body></html>\n",
        sidebar(active, state),
        main
    )
}
