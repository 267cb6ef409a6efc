//! Gemini Studio web server.

use anyhow::Context;
use clap::Parser;
use gemini_studio::config::{DEFAULT_BIND, DEFAULT_MAX_UPLOAD_BYTES};
use gemini_studio::gemini::{DEFAULT_BASE_URL, DEFAULT_MODEL};
use gemini_studio::store::DEFAULT_OUTPUT_DIR;
use gemini_studio::StudioConfig;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "gemini-studio")]
#[command(about = "Web UI for chatting with Gemini and generating or editing images")]
#[command(version)]
struct Cli {
    /// Address to listen on
    #[arg(long, env = "GEMINI_STUDIO_BIND", default_value = DEFAULT_BIND)]
    bind: SocketAddr,

    /// Directory generated images are saved to
    #[arg(long, env = "GEMINI_STUDIO_OUTPUT_DIR", default_value = DEFAULT_OUTPUT_DIR)]
    output_dir: PathBuf,

    /// Gemini model used for chat, generation and editing
    #[arg(long, env = "GEMINI_STUDIO_MODEL", default_value = DEFAULT_MODEL)]
    model: String,

    /// Gemini API endpoint
    #[arg(long, env = "GEMINI_STUDIO_BASE_URL", default_value = DEFAULT_BASE_URL, hide = true)]
    base_url: String,

    /// API key new sessions start with
    #[arg(long, env = "GEMINI_API_KEY", default_value = "", hide_env_values = true, hide_default_value = true)]
    api_key: String,

    /// Directory uploads are staged in (defaults to the system temp dir)
    #[arg(long, env = "GEMINI_STUDIO_SCRATCH_DIR")]
    scratch_dir: Option<PathBuf>,

    /// Idle seconds before a browser session is discarded
    #[arg(long, env = "GEMINI_STUDIO_SESSION_TTL_SECS", default_value_t = 24 * 60 * 60)]
    session_ttl_secs: u64,

    /// Largest accepted request body in bytes
    #[arg(long, env = "GEMINI_STUDIO_MAX_UPLOAD_BYTES", default_value_t = DEFAULT_MAX_UPLOAD_BYTES)]
    max_upload_bytes: usize,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

impl From<Cli> for StudioConfig {
    fn from(cli: Cli) -> Self {
        let defaults = StudioConfig::default();
        Self {
            bind: cli.bind,
            output_dir: cli.output_dir,
            scratch_dir: cli.scratch_dir.unwrap_or(defaults.scratch_dir),
            model: cli.model,
            base_url: cli.base_url,
            default_api_key: cli.api_key.trim().to_string(),
            session_ttl: Duration::from_secs(cli.session_ttl_secs),
            max_upload_bytes: cli.max_upload_bytes,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .init();

    let config = StudioConfig::from(cli);
    if config.default_api_key.is_empty() {
        tracing::info!("GEMINI_API_KEY not set; sessions start without a key");
    }

    gemini_studio::web::serve(config)
        .await
        .context("server failed")?;
    Ok(())
}
