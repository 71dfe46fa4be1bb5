//! Blob storage backends for uploaded media.
//!
//! Resolves a stored-file reference to an in-memory byte buffer. Two
//! variants satisfy the identical contract, including identical error
//! classification (`Error::NotFound` when a reference does not resolve),
//! so the orchestrator is agnostic to which is active:
//!
//! - [`FilesystemBackend`] — local-disk storage with sharded blob paths
//!   and atomic temp-file + rename writes.
//! - [`HttpObjectBackend`] — cloud object store spoken to over HTTP
//!   (PUT/GET/DELETE against a base URL with bearer-token auth).

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

use scriva_core::{defaults, Error, Result};

/// Storage backend for uploaded media blobs.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Store a blob and return its storage reference.
    async fn upload(&self, data: &[u8], name: &str) -> Result<String>;

    /// Resolve a reference to the stored bytes.
    ///
    /// Fails with [`Error::NotFound`] when the reference does not resolve
    /// to an existing object under this backend.
    async fn fetch(&self, reference: &str) -> Result<Vec<u8>>;

    /// Delete a stored blob. Deleting a missing reference is a no-op.
    async fn delete(&self, reference: &str) -> Result<()>;

    /// Check whether a reference resolves to an existing object.
    async fn exists(&self, reference: &str) -> Result<bool>;
}

/// Generate a sharded storage reference for a new blob.
///
/// Format: `blobs/{first-2-hex}/{next-2-hex}/{uuid}-{name}`
pub fn generate_storage_path(name: &str) -> String {
    let id = Uuid::new_v4();
    let hex = id.as_hyphenated().to_string().replace('-', "");
    format!("blobs/{}/{}/{}-{}", &hex[0..2], &hex[2..4], id.as_hyphenated(), name)
}

/// Filesystem storage backend.
pub struct FilesystemBackend {
    base_path: PathBuf,
}

impl FilesystemBackend {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    fn full_path(&self, reference: &str) -> PathBuf {
        self.base_path.join(reference)
    }

    /// Validate that the backend can write, read, and delete files.
    ///
    /// Performs a full round-trip at startup to catch filesystem issues
    /// (permission errors, missing directories) early.
    pub async fn validate(&self) -> std::result::Result<(), String> {
        let test_dir = self.base_path.join("blobs/.health-check");
        let test_file = test_dir.join("test.bin");

        fs::create_dir_all(&test_dir)
            .await
            .map_err(|e| format!("create_dir_all({:?}): {}", test_dir, e))?;

        let data = b"storage-health-check";
        fs::write(&test_file, data)
            .await
            .map_err(|e| format!("write({:?}): {}", test_file, e))?;

        let read_data = fs::read(&test_file)
            .await
            .map_err(|e| format!("read({:?}): {}", test_file, e))?;
        if read_data != data {
            return Err("read-back mismatch".to_string());
        }

        fs::remove_file(&test_file)
            .await
            .map_err(|e| format!("remove_file({:?}): {}", test_file, e))?;
        let _ = fs::remove_dir(&test_dir).await;

        Ok(())
    }
}

#[async_trait]
impl StorageBackend for FilesystemBackend {
    async fn upload(&self, data: &[u8], name: &str) -> Result<String> {
        let reference = generate_storage_path(name);
        let full_path = self.full_path(&reference);
        debug!(reference = %reference, size = data.len(), "object_store: upload");

        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                warn!(parent = %parent.display(), error = %e, "object_store: create_dir_all failed");
                e
            })?;
        }

        // Atomic write: temp file + rename
        let temp_path = full_path.with_extension("tmp");
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(data).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&temp_path, &full_path).await.map_err(|e| {
            warn!(from = %temp_path.display(), to = %full_path.display(), error = %e, "object_store: rename failed");
            e
        })?;

        Ok(reference)
    }

    async fn fetch(&self, reference: &str) -> Result<Vec<u8>> {
        let full_path = self.full_path(reference);
        match fs::read(&full_path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::NotFound(format!("blob {}", reference)))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, reference: &str) -> Result<()> {
        let full_path = self.full_path(reference);
        if fs::try_exists(&full_path).await? {
            fs::remove_file(full_path).await?;
        }
        Ok(())
    }

    async fn exists(&self, reference: &str) -> Result<bool> {
        Ok(fs::try_exists(self.full_path(reference)).await?)
    }
}

/// HTTP object-store backend (cloud variant).
///
/// Objects live at `{base_url}/{reference}`; requests carry a bearer token
/// when configured. A 404 response is classified as [`Error::NotFound`],
/// matching the filesystem backend.
pub struct HttpObjectBackend {
    base_url: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl HttpObjectBackend {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            base_url,
            token,
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(
                    defaults::OBJECT_STORE_TIMEOUT_SECS,
                ))
                .build()
                .unwrap_or_default(),
        }
    }

    fn url(&self, reference: &str) -> String {
        format!("{}/{}", self.base_url, reference)
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }
}

#[async_trait]
impl StorageBackend for HttpObjectBackend {
    async fn upload(&self, data: &[u8], name: &str) -> Result<String> {
        let reference = generate_storage_path(name);
        let response = self
            .request(self.client.put(self.url(&reference)))
            .body(data.to_vec())
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Error::Storage(format!(
                "object store PUT returned {}",
                response.status()
            )));
        }
        Ok(reference)
    }

    async fn fetch(&self, reference: &str) -> Result<Vec<u8>> {
        let response = self
            .request(self.client.get(self.url(reference)))
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(Error::NotFound(format!("blob {}", reference)));
        }
        if !response.status().is_success() {
            return Err(Error::Storage(format!(
                "object store GET returned {}",
                response.status()
            )));
        }
        Ok(response.bytes().await?.to_vec())
    }

    async fn delete(&self, reference: &str) -> Result<()> {
        let response = self
            .request(self.client.delete(self.url(reference)))
            .send()
            .await?;

        // Missing object on delete is a no-op, as with the filesystem backend
        if response.status() == reqwest::StatusCode::NOT_FOUND || response.status().is_success() {
            return Ok(());
        }
        Err(Error::Storage(format!(
            "object store DELETE returned {}",
            response.status()
        )))
    }

    async fn exists(&self, reference: &str) -> Result<bool> {
        let response = self
            .request(self.client.head(self.url(reference)))
            .send()
            .await?;
        Ok(response.status().is_success())
    }
}

/// Backend selection, driven purely by configuration.
#[derive(Debug, Clone)]
pub enum StorageConfig {
    Filesystem { base_path: PathBuf },
    Http { base_url: String, token: Option<String> },
}

impl StorageConfig {
    /// Read the backend switch from the environment.
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `STORAGE_BACKEND` | `filesystem` | `filesystem` or `http` |
    /// | `STORAGE_PATH` | `/var/scriva/blobs` | base dir (filesystem) |
    /// | `OBJECT_STORE_URL` | — | base URL (http, required) |
    /// | `OBJECT_STORE_TOKEN` | — | bearer token (http, optional) |
    pub fn from_env() -> Result<Self> {
        let backend = std::env::var(defaults::ENV_STORAGE_BACKEND)
            .unwrap_or_else(|_| "filesystem".to_string());

        match backend.as_str() {
            "filesystem" => {
                let base_path = std::env::var(defaults::ENV_STORAGE_PATH)
                    .unwrap_or_else(|_| defaults::DEFAULT_STORAGE_PATH.to_string());
                Ok(StorageConfig::Filesystem {
                    base_path: base_path.into(),
                })
            }
            "http" => {
                let base_url = std::env::var(defaults::ENV_OBJECT_STORE_URL).map_err(|_| {
                    Error::Config(format!(
                        "{} is required when {}=http",
                        defaults::ENV_OBJECT_STORE_URL,
                        defaults::ENV_STORAGE_BACKEND
                    ))
                })?;
                let token = std::env::var(defaults::ENV_OBJECT_STORE_TOKEN).ok();
                Ok(StorageConfig::Http { base_url, token })
            }
            other => Err(Error::Config(format!(
                "unknown storage backend: {}",
                other
            ))),
        }
    }

    /// Build the configured backend.
    pub fn build(self) -> Box<dyn StorageBackend> {
        match self {
            StorageConfig::Filesystem { base_path } => {
                Box::new(FilesystemBackend::new(base_path))
            }
            StorageConfig::Http { base_url, token } => {
                Box::new(HttpObjectBackend::new(base_url, token))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_generate_storage_path_shape() {
        let reference = generate_storage_path("audio.mp3");
        assert!(reference.starts_with("blobs/"));
        assert!(reference.ends_with("-audio.mp3"));
        // blobs / xx / yy / uuid-name
        assert_eq!(reference.split('/').count(), 4);
    }

    #[test]
    fn test_generate_storage_path_unique() {
        assert_ne!(generate_storage_path("a.wav"), generate_storage_path("a.wav"));
    }

    #[tokio::test]
    async fn test_filesystem_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBackend::new(dir.path());

        let reference = backend.upload(b"audio bytes", "clip.wav").await.unwrap();
        assert!(backend.exists(&reference).await.unwrap());

        let data = backend.fetch(&reference).await.unwrap();
        assert_eq!(data, b"audio bytes");

        backend.delete(&reference).await.unwrap();
        assert!(!backend.exists(&reference).await.unwrap());
    }

    #[tokio::test]
    async fn test_filesystem_fetch_missing_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBackend::new(dir.path());

        let err = backend.fetch("blobs/aa/bb/nope.bin").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_filesystem_delete_missing_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBackend::new(dir.path());
        backend.delete("blobs/aa/bb/nope.bin").await.unwrap();
    }

    #[tokio::test]
    async fn test_filesystem_validate() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBackend::new(dir.path());
        backend.validate().await.unwrap();
    }

    #[tokio::test]
    async fn test_http_fetch_404_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path_regex(r"^/blobs/.*$"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let backend = HttpObjectBackend::new(server.uri(), None);
        let err = backend.fetch("blobs/aa/bb/gone.bin").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_http_upload_and_fetch() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path_regex(r"^/blobs/.*$"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path_regex(r"^/blobs/.*$"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"payload".to_vec()))
            .mount(&server)
            .await;

        let backend = HttpObjectBackend::new(server.uri(), Some("secret".into()));
        let reference = backend.upload(b"payload", "clip.mp3").await.unwrap();
        let data = backend.fetch(&reference).await.unwrap();
        assert_eq!(data, b"payload");
    }

    #[tokio::test]
    async fn test_http_server_error_is_storage_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path_regex(r"^/blobs/.*$"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let backend = HttpObjectBackend::new(server.uri(), None);
        let err = backend.fetch("blobs/aa/bb/x.bin").await.unwrap_err();
        assert!(matches!(err, Error::Storage(_)));
    }

    #[tokio::test]
    async fn test_http_delete_missing_is_noop() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path_regex(r"^/blobs/.*$"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let backend = HttpObjectBackend::new(server.uri(), None);
        backend.delete("blobs/aa/bb/x.bin").await.unwrap();
    }

    #[test]
    fn test_storage_config_build_filesystem() {
        let config = StorageConfig::Filesystem {
            base_path: "/tmp/scriva-test".into(),
        };
        let _backend = config.build();
    }
}
