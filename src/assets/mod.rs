pub mod http;

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::app::Result;
use crate::domain::AccountId;

pub use http::HttpAssetFetcher;

/// Extension used when the URL does not reveal one.
pub const DEFAULT_EXTENSION: &str = "jpg";

/// Downloads a remote resource to a local path, replacing any existing file.
#[async_trait]
pub trait AssetFetcher {
    async fn fetch(&self, url: &str, destination: &Path) -> Result<()>;
}

/// On-disk layout of downloaded avatars: `<root>/profile_images/<account id>.<ext>`.
#[derive(Debug, Clone)]
pub struct ProfileImages {
    dir: PathBuf,
}

impl ProfileImages {
    pub fn new(storage_root: impl AsRef<Path>) -> Self {
        Self {
            dir: storage_root.as_ref().join("profile_images"),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Destination for an avatar of `account` downloaded from `url`.
    pub fn path_for(&self, account: AccountId, url: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", account, extension_of(url)))
    }

    /// The stored avatar of `account`, whatever its extension.
    pub fn find(&self, account: AccountId) -> Option<PathBuf> {
        let stem = account.to_string();
        let entries = std::fs::read_dir(&self.dir).ok()?;
        entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .find(|path| {
                path.is_file() && path.file_stem().and_then(|s| s.to_str()) == Some(stem.as_str())
            })
    }

    /// Remove avatars of `account` other than `keep`.
    pub fn prune(&self, account: AccountId, keep: &Path) -> Result<usize> {
        let stem = account.to_string();
        let mut removed = 0;
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(_) => return Ok(0),
        };
        for entry in entries {
            let path = entry?.path();
            if path != keep && path.file_stem().and_then(|s| s.to_str()) == Some(stem.as_str()) {
                std::fs::remove_file(&path)?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

/// File extension of the URL's path, lowercased, without the dot.
pub fn extension_of(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| {
            Path::new(u.path())
                .extension()
                .and_then(|e| e.to_str())
                .filter(|e| !e.is_empty() && e.chars().all(|c| c.is_ascii_alphanumeric()))
                .map(|e| e.to_ascii_lowercase())
        })
        .unwrap_or_else(|| DEFAULT_EXTENSION.to_string())
}

/// Content type for a stored image, by extension.
pub fn media_type(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        _ => "application/octet-stream",
    }
}
