//! Storage for uploaded course files and profile photos.
//!
//! The application only keeps the returned `url` and the opaque `public_id`; the
//! `public_id` is handed back unchanged to [`BlobStore::delete`].

use anyhow::{Context, anyhow, bail};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use tracing::{debug, info};
use url::Url;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlob {
    pub url: String,
    pub public_id: String,
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn upload(&self, file: UploadedFile) -> anyhow::Result<StoredBlob>;

    async fn delete(&self, public_id: &str) -> anyhow::Result<()>;
}

/// Replaces path separators and shell-hostile characters so the name is safe on disk and in URLs.
pub fn sanitize_file_name(file_name: &str) -> String {
    let cleaned: String = file_name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '#' | '%' => '_',
            c if c.is_control() => '_',
            c if c.is_whitespace() => '_',
            _ => c,
        })
        .collect::<String>()
        .trim_matches(|c| c == '.' || c == '_')
        .to_string();

    if cleaned.is_empty() {
        "fichier".to_string()
    } else {
        cleaned
    }
}

/// Keeps files under a local directory, one sub-directory per upload.
pub struct LocalStore {
    root: PathBuf,
    public_base_url: String,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        LocalStore {
            root: root.into(),
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl BlobStore for LocalStore {
    async fn upload(&self, file: UploadedFile) -> anyhow::Result<StoredBlob> {
        let public_id = Uuid::new_v4().to_string();
        let file_name = sanitize_file_name(&file.file_name);
        let dir = self.root.join(&public_id);

        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to create upload directory {}", dir.display()))?;
        tokio::fs::write(dir.join(&file_name), &file.bytes)
            .await
            .with_context(|| format!("Failed to write uploaded file {}", file_name))?;

        debug!(
            "Stored {} bytes as {}/{}",
            file.bytes.len(),
            public_id,
            file_name
        );
        Ok(StoredBlob {
            url: format!("{}/{}/{}", self.public_base_url, public_id, file_name),
            public_id,
        })
    }

    async fn delete(&self, public_id: &str) -> anyhow::Result<()> {
        let id = Uuid::parse_str(public_id)
            .with_context(|| format!("Invalid local blob id '{}'", public_id))?;
        let dir = self.root.join(id.to_string());
        tokio::fs::remove_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to remove {}", dir.display()))?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct CloudinaryConfig {
    pub base_url: Url,
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
    pub folder: String,
}

/// Signed uploads to Cloudinary. The stored `public_id` is `<resource_type>/<cloudinary public id>`
/// because destroy calls are addressed per resource type.
pub struct CloudinaryStore {
    client: reqwest::Client,
    config: CloudinaryConfig,
}

#[derive(Deserialize, Debug)]
struct CloudinaryUploadResponse {
    secure_url: String,
    public_id: String,
    resource_type: String,
}

#[derive(Deserialize, Debug)]
struct CloudinaryDestroyResponse {
    result: String,
}

impl CloudinaryStore {
    pub fn new(config: CloudinaryConfig) -> Self {
        CloudinaryStore {
            client: reqwest::Client::new(),
            config,
        }
    }

    fn endpoint(&self, resource_type: &str, action: &str) -> anyhow::Result<Url> {
        let path = format!(
            "v1_1/{}/{}/{}",
            self.config.cloud_name, resource_type, action
        );
        self.config
            .base_url
            .join(&path)
            .with_context(|| format!("Invalid Cloudinary endpoint {}", path))
    }
}

/// Cloudinary request signature: parameters sorted by name, joined as `k=v&...`, secret appended.
pub fn cloudinary_signature(params: &[(&str, &str)], api_secret: &str) -> String {
    let mut sorted: Vec<_> = params.iter().filter(|(_, v)| !v.is_empty()).collect();
    sorted.sort_by(|a, b| a.0.cmp(b.0));
    let to_sign = sorted
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");

    let mut hasher = Sha256::new();
    hasher.update(to_sign.as_bytes());
    hasher.update(api_secret.as_bytes());
    hex::encode(hasher.finalize())
}

#[async_trait]
impl BlobStore for CloudinaryStore {
    async fn upload(&self, file: UploadedFile) -> anyhow::Result<StoredBlob> {
        let timestamp = Utc::now().timestamp().to_string();
        let signature = cloudinary_signature(
            &[
                ("folder", self.config.folder.as_str()),
                ("timestamp", timestamp.as_str()),
            ],
            &self.config.api_secret,
        );

        let part = Part::bytes(file.bytes.to_vec())
            .file_name(sanitize_file_name(&file.file_name))
            .mime_str(&file.content_type)
            .context("Invalid content type for upload")?;
        let form = Form::new()
            .part("file", part)
            .text("api_key", self.config.api_key.clone())
            .text("timestamp", timestamp)
            .text("folder", self.config.folder.clone())
            .text("signature_algorithm", "sha256")
            .text("signature", signature);

        let response = self
            .client
            .post(self.endpoint("auto", "upload")?)
            .multipart(form)
            .send()
            .await
            .context("Cloudinary upload request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Cloudinary upload returned {}: {}", status, body);
        }
        let uploaded: CloudinaryUploadResponse = response
            .json()
            .await
            .context("Unexpected Cloudinary upload response")?;

        info!("Uploaded {} to Cloudinary", uploaded.public_id);
        Ok(StoredBlob {
            url: uploaded.secure_url,
            public_id: format!("{}/{}", uploaded.resource_type, uploaded.public_id),
        })
    }

    async fn delete(&self, public_id: &str) -> anyhow::Result<()> {
        let (resource_type, cloud_id) = public_id
            .split_once('/')
            .ok_or_else(|| anyhow!("Malformed Cloudinary blob id '{}'", public_id))?;

        let timestamp = Utc::now().timestamp().to_string();
        let signature = cloudinary_signature(
            &[("public_id", cloud_id), ("timestamp", timestamp.as_str())],
            &self.config.api_secret,
        );
        let params = [
            ("public_id", cloud_id.to_string()),
            ("timestamp", timestamp),
            ("api_key", self.config.api_key.clone()),
            ("signature_algorithm", "sha256".to_string()),
            ("signature", signature),
        ];

        let response = self
            .client
            .post(self.endpoint(resource_type, "destroy")?)
            .form(&params)
            .send()
            .await
            .context("Cloudinary destroy request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Cloudinary destroy returned {}: {}", status, body);
        }
        let destroyed: CloudinaryDestroyResponse = response
            .json()
            .await
            .context("Unexpected Cloudinary destroy response")?;
        if destroyed.result != "ok" {
            bail!(
                "Cloudinary could not destroy '{}': {}",
                public_id,
                destroyed.result
            );
        }
        Ok(())
    }
}
