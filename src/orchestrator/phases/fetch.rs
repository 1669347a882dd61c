//! Download stage: concurrent, idempotent artifact fetching.
//!
//! A destination file, once present, is always complete: bodies are streamed
//! to `<dest>.tmp` and only renamed into place after the last byte is
//! written. Concurrent tasks never share a destination because artifact
//! names are unique, so the rename is the only synchronization needed.

use crate::error::FetchError;
use crate::models::{Artifact, DownloadOutcome, FetchStatus};
use futures::{Stream, StreamExt};
use std::fmt::Display;
use std::io;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

/// Downloads artifacts into a single directory.
#[derive(Clone, Debug)]
pub struct ArtifactFetcher {
    client: reqwest::Client,
    download_dir: PathBuf,
}

impl ArtifactFetcher {
    pub fn new(download_dir: impl Into<PathBuf>) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(concat!("winstrap/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|e| {
                log::warn!("[Fetch] Falling back to default HTTP client: {}", e);
                reqwest::Client::new()
            });
        Self::with_client(client, download_dir)
    }

    pub fn with_client(client: reqwest::Client, download_dir: impl Into<PathBuf>) -> Self {
        ArtifactFetcher {
            client,
            download_dir: download_dir.into(),
        }
    }

    /// Fetch one artifact unless its destination already exists.
    pub async fn fetch(&self, artifact: &Artifact) -> Result<FetchStatus, FetchError> {
        let dest = artifact.destination(&self.download_dir);
        if tokio::fs::try_exists(&dest).await.unwrap_or(false) {
            log::info!("[Fetch] {} already on desktop; skipping", artifact.name);
            return Ok(FetchStatus::AlreadyPresent);
        }

        tokio::fs::create_dir_all(&self.download_dir)
            .await
            .map_err(|source| FetchError::Storage {
                path: self.download_dir.clone(),
                source,
            })?;

        let response = self
            .client
            .get(&artifact.url)
            .send()
            .await
            .map_err(|e| FetchError::Request {
                url: artifact.url.clone(),
                reason: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(FetchError::Status {
                url: artifact.url.clone(),
                status: response.status().as_u16(),
            });
        }

        let bytes = persist_stream(response.bytes_stream(), &dest, &artifact.url).await?;
        log::info!(
            "[Fetch] Downloaded {} ({} bytes) to {}",
            artifact.name,
            bytes,
            dest.display()
        );
        Ok(FetchStatus::Downloaded { bytes, path: dest })
    }

    /// Fetch every artifact concurrently, one task each, and wait for all of them.
    ///
    /// Outcomes come back in table order. A failed artifact never cancels its
    /// siblings.
    pub async fn fetch_all(&self, artifacts: &[Artifact]) -> Vec<DownloadOutcome> {
        let handles: Vec<_> = artifacts
            .iter()
            .cloned()
            .map(|artifact| {
                let fetcher = self.clone();
                tokio::spawn(async move {
                    let result = fetcher.fetch(&artifact).await;
                    DownloadOutcome {
                        name: artifact.name,
                        result,
                    }
                })
            })
            .collect();

        let joined = futures::future::join_all(handles).await;

        joined
            .into_iter()
            .zip(artifacts)
            .map(|(joined, artifact)| {
                joined.unwrap_or_else(|e| DownloadOutcome {
                    name: artifact.name.clone(),
                    result: Err(FetchError::TaskAborted {
                        name: artifact.name.clone(),
                        reason: e.to_string(),
                    }),
                })
            })
            .collect()
    }
}

/// Temporary sibling of a destination: `<dest>.tmp`.
pub fn tmp_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_os_string();
    name.push(".tmp");
    PathBuf::from(name)
}

/// Stream `body` into `dest` through its temporary sibling.
///
/// Stale leftovers from an earlier attempt are removed first. If the stream
/// or a write fails, the temporary file is discarded and `dest` is left
/// absent. Returns the number of bytes written.
pub async fn persist_stream<S, B, E>(body: S, dest: &Path, url: &str) -> Result<u64, FetchError>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: Display,
{
    let tmp = tmp_path(dest);
    remove_stale(&tmp).await?;
    remove_stale(dest).await?;

    let mut file = tokio::fs::File::create(&tmp)
        .await
        .map_err(|source| FetchError::Storage {
            path: tmp.clone(),
            source,
        })?;

    futures::pin_mut!(body);
    let mut written: u64 = 0;
    while let Some(chunk) = body.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                drop(file);
                discard(&tmp).await;
                return Err(FetchError::Body {
                    url: url.to_string(),
                    reason: e.to_string(),
                });
            }
        };
        let bytes = chunk.as_ref();
        if let Err(source) = file.write_all(bytes).await {
            drop(file);
            discard(&tmp).await;
            return Err(FetchError::Storage { path: tmp, source });
        }
        written += bytes.len() as u64;
    }

    let finished = async {
        file.flush().await?;
        file.sync_all().await
    }
    .await;
    drop(file);
    if let Err(source) = finished {
        discard(&tmp).await;
        return Err(FetchError::Storage { path: tmp, source });
    }

    tokio::fs::rename(&tmp, dest)
        .await
        .map_err(|source| FetchError::Storage {
            path: dest.to_path_buf(),
            source,
        })?;
    Ok(written)
}

async fn remove_stale(path: &Path) -> Result<(), FetchError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            log::debug!("[Fetch] Removed stale {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(FetchError::Storage {
            path: path.to_path_buf(),
            source,
        }),
    }
}

async fn discard(tmp: &Path) {
    if let Err(e) = tokio::fs::remove_file(tmp).await {
        if e.kind() != io::ErrorKind::NotFound {
            log::warn!("[Fetch] Could not remove partial download {}: {}", tmp.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    #[test]
    fn test_tmp_path_is_sibling() {
        let dest = Path::new("/tmp/h/Desktop/Install Git.exe");
        assert_eq!(
            tmp_path(dest),
            PathBuf::from("/tmp/h/Desktop/Install Git.exe.tmp")
        );
    }

    #[tokio::test]
    async fn test_persist_stream_writes_and_renames() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("a.exe");
        let chunks: Vec<Result<Vec<u8>, String>> = vec![Ok(b"hello ".to_vec()), Ok(b"world".to_vec())];

        let n = persist_stream(stream::iter(chunks), &dest, "http://x/a.exe")
            .await
            .unwrap();

        assert_eq!(n, 11);
        assert_eq!(std::fs::read(&dest).unwrap(), b"hello world");
        assert!(!tmp_path(&dest).exists());
    }

    #[tokio::test]
    async fn test_interrupted_stream_leaves_no_destination() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("b.exe");
        let chunks: Vec<Result<Vec<u8>, String>> = vec![
            Ok(vec![0u8; 4096]),
            Err("connection reset by peer".to_string()),
        ];

        let result = persist_stream(stream::iter(chunks), &dest, "http://x/b.exe").await;

        assert!(matches!(result, Err(FetchError::Body { .. })));
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn test_stale_tmp_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("c.exe");
        std::fs::write(tmp_path(&dest), b"stale partial bytes from last run").unwrap();
        let chunks: Vec<Result<Vec<u8>, String>> = vec![Ok(b"fresh".to_vec())];

        persist_stream(stream::iter(chunks), &dest, "http://x/c.exe")
            .await
            .unwrap();

        assert_eq!(std::fs::read(&dest).unwrap(), b"fresh");
        assert!(!tmp_path(&dest).exists());
    }

    #[tokio::test]
    async fn test_existing_destination_skips_request() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("here.exe"), b"done").unwrap();
        // Unroutable URL: any request would fail the test.
        let artifact = Artifact::new("here.exe", "http://127.0.0.1:9/here.exe");
        let fetcher = ArtifactFetcher::new(dir.path());

        let status = fetcher.fetch(&artifact).await.unwrap();
        assert_eq!(status, FetchStatus::AlreadyPresent);
    }
}
