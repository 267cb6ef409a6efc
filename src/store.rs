//! Flat on-disk store of generated images.
//!
//! Files are named `{%Y%m%d_%H%M%S}_{prompt-prefix}.jpg`. The store never
//! deletes, indexes or deduplicates; the directory listing is the gallery.

use crate::error::{Result, StudioError};
use chrono::{DateTime, Local, NaiveDateTime};
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// Default storage directory, relative to the working directory.
pub const DEFAULT_OUTPUT_DIR: &str = "generated_images";

/// Number of images shown in the gallery.
pub const GALLERY_LIMIT: usize = 9;

/// Prompt characters that contribute to a file name.
const PROMPT_PREFIX_CHARS: usize = 30;

/// Upper bound on `_N` suffixes tried before giving up.
const MAX_NAME_SUFFIX: u32 = 10_000;

/// Derives a file name from a timestamp and the start of a prompt.
///
/// Each of the first 30 characters of `prompt` is kept if alphanumeric and
/// replaced with `_` otherwise. Same second and same prefix give the same name.
pub fn generate_unique_filename(prompt: &str, now: NaiveDateTime) -> String {
    let timestamp = now.format("%Y%m%d_%H%M%S");
    let safe_prompt: String = prompt
        .chars()
        .take(PROMPT_PREFIX_CHARS)
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect();
    format!("{timestamp}_{safe_prompt}.jpg")
}

/// Outcome of checking a stored file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageCheck {
    /// The file exists and decodes as an image.
    Valid,
    /// No file at the path.
    Missing,
    /// The file exists but could not be read or decoded.
    DecodeFailed(String),
}

impl ImageCheck {
    /// Returns true for [`ImageCheck::Valid`].
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }
}

/// Checks that `path` exists and holds a fully decodable image.
pub fn is_valid_image(path: &Path) -> ImageCheck {
    if !path.is_file() {
        return ImageCheck::Missing;
    }

    let reader = match image::ImageReader::open(path).and_then(|r| r.with_guessed_format()) {
        Ok(reader) => reader,
        Err(e) => return ImageCheck::DecodeFailed(e.to_string()),
    };

    match reader.decode() {
        Ok(_) => ImageCheck::Valid,
        Err(e) => ImageCheck::DecodeFailed(e.to_string()),
    }
}

/// One image in the gallery listing.
#[derive(Debug, Clone, PartialEq)]
pub struct GalleryEntry {
    /// Full path on disk.
    pub path: PathBuf,
    /// File name inside the store directory.
    pub file_name: String,
    /// Creation time (modification time where the filesystem lacks it).
    pub created: DateTime<Local>,
}

/// Most recent images plus the total number stored.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Gallery {
    /// Total `*.jpg` files in the store.
    pub total: usize,
    /// Newest first, at most the requested limit.
    pub entries: Vec<GalleryEntry>,
}

/// Directory of generated images.
#[derive(Debug, Clone)]
pub struct ImageStore {
    dir: PathBuf,
}

impl Default for ImageStore {
    fn default() -> Self {
        Self::new(DEFAULT_OUTPUT_DIR)
    }
}

impl ImageStore {
    /// Creates a store rooted at `dir`. Nothing is created on disk yet.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Storage directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Creates the storage directory if needed.
    pub fn ensure_output_dir(&self) -> Result<&Path> {
        std::fs::create_dir_all(&self.dir)?;
        Ok(&self.dir)
    }

    /// Reserves a fresh file for `prompt`, adding `_N` when the derived name is taken.
    pub fn allocate_path(&self, prompt: &str) -> Result<(PathBuf, File)> {
        self.ensure_output_dir()?;
        let base = generate_unique_filename(prompt, Local::now().naive_local());
        let stem = base.trim_end_matches(".jpg");

        for n in 0..MAX_NAME_SUFFIX {
            let name = if n == 0 {
                base.clone()
            } else {
                format!("{stem}_{n}.jpg")
            };
            let path = self.dir.join(name);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => return Ok((path, file)),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e.into()),
            }
        }

        Err(StudioError::Io(std::io::Error::new(
            ErrorKind::AlreadyExists,
            format!("no free file name for {base}"),
        )))
    }

    /// Writes image bytes to a new file and flushes them to disk.
    pub fn save_image(&self, prompt: &str, data: &[u8]) -> Result<PathBuf> {
        let (path, mut file) = self.allocate_path(prompt)?;
        file.write_all(data)?;
        file.sync_all()?;
        tracing::debug!(path = %path.display(), bytes = data.len(), "saved image");
        Ok(path)
    }

    /// Lists `*.jpg` files newest first, keeping at most `limit`.
    pub fn gallery(&self, limit: usize) -> Result<Gallery> {
        self.ensure_output_dir()?;

        let mut entries = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("jpg") {
                continue;
            }
            let metadata = entry.metadata()?;
            if !metadata.is_file() {
                continue;
            }
            let created = metadata.created().or_else(|_| metadata.modified())?;
            entries.push(GalleryEntry {
                file_name: entry.file_name().to_string_lossy().into_owned(),
                path,
                created: DateTime::<Local>::from(created),
            });
        }

        newest_first(&mut entries);
        let total = entries.len();
        entries.truncate(limit);

        Ok(Gallery { total, entries })
    }

    /// Resolves a bare file name inside the store, rejecting anything else.
    pub fn resolve(&self, file_name: &str) -> Result<PathBuf> {
        let is_plain = !file_name.is_empty()
            && !file_name.starts_with('.')
            && !file_name.contains(['/', '\\'])
            && Path::new(file_name).file_name().and_then(|n| n.to_str()) == Some(file_name);
        if !is_plain {
            return Err(StudioError::InvalidRequest(format!(
                "invalid image name: {file_name}"
            )));
        }
        Ok(self.dir.join(file_name))
    }

    /// Reads a stored image by file name.
    pub fn read_image(&self, file_name: &str) -> Result<Vec<u8>> {
        let path = self.resolve(file_name)?;
        Ok(std::fs::read(path)?)
    }
}

/// Orders by creation time, newest first. Equal times fall back to the file
/// name so the listing is stable across calls.
fn newest_first(entries: &mut [GalleryEntry]) {
    entries.sort_by(|a, b| {
        b.created
            .cmp(&a.created)
            .then_with(|| b.file_name.cmp(&a.file_name))
    });
}
