//! Server configuration.

use crate::gemini::{DEFAULT_BASE_URL, DEFAULT_MODEL};
use crate::store::DEFAULT_OUTPUT_DIR;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Default listen address.
pub const DEFAULT_BIND: &str = "127.0.0.1:8501";

/// Default idle lifetime of a browser session.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Default cap on request bodies (uploads included).
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

/// Everything the server needs to start.
#[derive(Debug, Clone)]
pub struct StudioConfig {
    /// Address the HTTP server listens on.
    pub bind: SocketAddr,
    /// Directory generated images are written to.
    pub output_dir: PathBuf,
    /// Directory uploads are staged in before going to the Files API.
    pub scratch_dir: PathBuf,
    /// Gemini model identifier.
    pub model: String,
    /// Gemini API endpoint.
    pub base_url: String,
    /// Credential new sessions start with (usually `GEMINI_API_KEY`).
    pub default_api_key: String,
    /// Idle time after which a session is discarded.
    pub session_ttl: Duration,
    /// Largest accepted request body.
    pub max_upload_bytes: usize,
}

impl Default for StudioConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 8501)),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            scratch_dir: std::env::temp_dir(),
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            default_api_key: String::new(),
            session_ttl: DEFAULT_SESSION_TTL,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = StudioConfig::default();
        assert_eq!(config.bind.to_string(), DEFAULT_BIND);
        assert_eq!(config.output_dir, PathBuf::from("generated_images"));
        assert_eq!(config.model, "gemini-2.0-flash-exp-image-generation");
        assert!(config.default_api_key.is_empty());
    }
}
