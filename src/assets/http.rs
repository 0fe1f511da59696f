use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::app::{MirrorError, Result};
use crate::assets::AssetFetcher;
use crate::upstream::twitter::USER_AGENT;

/// Streams assets over HTTP into place via a `.part` file and a rename.
pub struct HttpAssetFetcher {
    client: Client,
}

impl HttpAssetFetcher {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self { client })
    }
}

fn part_path(destination: &Path) -> PathBuf {
    let mut name = destination.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

#[async_trait]
impl AssetFetcher for HttpAssetFetcher {
    async fn fetch(&self, url: &str, destination: &Path) -> Result<()> {
        let fail = |reason: String| MirrorError::Fetch {
            url: url.to_string(),
            reason,
        };

        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| fail(e.to_string()))?;

        if response.status() != StatusCode::OK {
            return Err(fail(format!("HTTP {}", response.status())));
        }

        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| fail(e.to_string()))?;
        }

        let part = part_path(destination);
        let mut file = fs::File::create(&part)
            .await
            .map_err(|e| fail(e.to_string()))?;

        let written = async {
            while let Some(chunk) = response.chunk().await.map_err(|e| fail(e.to_string()))? {
                file.write_all(&chunk).await.map_err(|e| fail(e.to_string()))?;
            }
            file.flush().await.map_err(|e| fail(e.to_string()))?;
            Ok::<_, MirrorError>(())
        }
        .await;

        if let Err(e) = written {
            let _ = fs::remove_file(&part).await;
            return Err(e);
        }
        drop(file);

        fs::rename(&part, destination)
            .await
            .map_err(|e| fail(e.to_string()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_part_path_keeps_extension() {
        assert_eq!(
            part_path(Path::new("/srv/profile_images/5.png")),
            PathBuf::from("/srv/profile_images/5.png.part")
        );
    }

    #[test]
    fn test_unreachable_host_is_fetch_error() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("5.jpg");
        let fetcher = HttpAssetFetcher::new().unwrap();

        let err = tokio_test::block_on(fetcher.fetch("http://127.0.0.1:9/avatar.jpg", &dest))
            .unwrap_err();

        assert!(matches!(err, MirrorError::Fetch { .. }));
        assert!(!dest.exists());
    }
}
