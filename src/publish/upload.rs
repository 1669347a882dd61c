//! Upload of the helper binary to the public bucket.

use crate::error::PublishError;
use futures::future::BoxFuture;
use serde::Deserialize;
use std::path::Path;

/// Trait for storing a published binary under a public name.
pub trait Uploader: Send + Sync {
    fn upload(&self, name: &str, content: Vec<u8>) -> BoxFuture<'static, Result<(), PublishError>>;
}

/// Stored OAuth token, as written by the credential helper.
#[derive(Debug, Deserialize)]
struct StoredToken {
    access_token: String,
}

/// Read the bearer token from a JSON credential file.
pub fn load_token(path: &Path) -> Result<String, PublishError> {
    let raw = std::fs::read_to_string(path).map_err(|e| PublishError::Credentials {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let token: StoredToken =
        serde_json::from_str(&raw).map_err(|e| PublishError::Credentials {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
    if token.access_token.trim().is_empty() {
        return Err(PublishError::Credentials {
            path: path.to_path_buf(),
            reason: "access_token is empty".to_string(),
        });
    }
    Ok(token.access_token)
}

/// Uploads with an HTTP PUT to `<base_url>/<name>`.
#[derive(Clone)]
pub struct HttpUploader {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl HttpUploader {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, token: impl Into<String>) -> Self {
        HttpUploader {
            client,
            base_url: base_url.into(),
            token: token.into(),
        }
    }

    pub fn from_credentials(base_url: impl Into<String>, credentials: &Path) -> Result<Self, PublishError> {
        let token = load_token(credentials)?;
        Ok(Self::new(reqwest::Client::new(), base_url, token))
    }

    fn object_url(&self, name: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), name)
    }
}

impl Uploader for HttpUploader {
    fn upload(&self, name: &str, content: Vec<u8>) -> BoxFuture<'static, Result<(), PublishError>> {
        let url = self.object_url(name);
        let request = self
            .client
            .put(&url)
            .bearer_auth(&self.token)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(content);

        Box::pin(async move {
            log::info!("[Publish] Uploading to {}", url);
            let response = request
                .send()
                .await
                .map_err(|e| PublishError::Upload(e.to_string()))?;
            let status = response.status();
            if status.is_success() {
                return Ok(());
            }
            let body = response.text().await.unwrap_or_default();
            Err(PublishError::Upload(format!("{} returned {}: {}", url, status, body.trim())))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_token() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        std::fs::write(&path, r#"{"access_token":"abc","token_type":"Bearer"}"#).unwrap();
        assert_eq!(load_token(&path).unwrap(), "abc");
    }

    #[test]
    fn test_load_token_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(load_token(&path), Err(PublishError::Credentials { .. })));
        assert!(load_token(&dir.path().join("missing.json")).is_err());
    }

    #[tokio::test]
    async fn test_http_upload_sends_bearer_put() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("PUT", "/winstrap-2026-10-19-abcdef0.exe")
            .match_header("authorization", "Bearer secret")
            .match_body("binary")
            .with_status(200)
            .create_async()
            .await;

        let uploader = HttpUploader::new(reqwest::Client::new(), server.url(), "secret");
        uploader
            .upload("winstrap-2026-10-19-abcdef0.exe", b"binary".to_vec())
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_http_upload_reports_status() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("PUT", "/w.exe")
            .with_status(403)
            .with_body("forbidden")
            .create_async()
            .await;

        let uploader = HttpUploader::new(reqwest::Client::new(), format!("{}/", server.url()), "t");
        let err = uploader.upload("w.exe", Vec::new()).await.unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("403"));
        assert!(msg.contains("forbidden"));
    }
}
