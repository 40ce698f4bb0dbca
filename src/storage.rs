//! Object storage client for found-item images.
//!
//! Speaks the Supabase storage REST API directly over reqwest with a bearer
//! service key. Uploaded objects are named `{uuid}_{sanitized filename}` so
//! concurrent uploads of identically-named files never collide, and the
//! returned locator carries the bucket, path, and derived public URL.
//!
//! # Environment Variables
//!
//! - `STORAGE_SERVICE_KEY` — required; service-role key for backend uploads.

use anyhow::{bail, Result};
use async_trait::async_trait;
use uuid::Uuid;

use crate::config::StorageConfig;
use crate::models::StorageLocator;
use crate::traits::ObjectStore;

/// Supabase-storage-compatible object store.
pub struct SupabaseStorage {
    url: String,
    key: String,
    bucket: String,
    client: reqwest::Client,
}

impl SupabaseStorage {
    /// Create a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if `STORAGE_SERVICE_KEY` is not in the environment.
    pub fn new(config: &StorageConfig) -> Result<Self> {
        let key = std::env::var("STORAGE_SERVICE_KEY")
            .map_err(|_| anyhow::anyhow!("STORAGE_SERVICE_KEY environment variable not set"))?;

        Ok(Self {
            url: config.url.trim_end_matches('/').to_string(),
            key,
            bucket: config.bucket.clone(),
            client: reqwest::Client::new(),
        })
    }

    fn object_url(&self, path: &str) -> String {
        format!("{}/storage/v1/object/{}/{}", self.url, self.bucket, path)
    }

    fn public_url(&self, path: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.url, self.bucket, path
        )
    }
}

#[async_trait]
impl ObjectStore for SupabaseStorage {
    async fn upload(&self, bytes: &[u8], filename: &str) -> Result<StorageLocator> {
        let path = format!("{}_{}", Uuid::new_v4(), sanitize_filename(filename));

        let response = self
            .client
            .post(self.object_url(&path))
            .header("Authorization", format!("Bearer {}", self.key))
            .header("Content-Type", detect_content_type(filename))
            .body(bytes.to_vec())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("Image upload failed ({}): {}", status, body_text);
        }

        Ok(StorageLocator {
            bucket: self.bucket.clone(),
            path: path.clone(),
            public_url: self.public_url(&path),
        })
    }
}

/// Strip path components and replace characters the storage API rejects.
fn sanitize_filename(filename: &str) -> String {
    let base = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(filename)
        .trim();

    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '-'
            }
        })
        .collect();

    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned
    }
}

/// Map an image file extension to its MIME type.
fn detect_content_type(filename: &str) -> &'static str {
    let ext = filename.rsplit('.').next().unwrap_or("").to_lowercase();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "heic" => "image/heic",
        _ => "application/octet-stream",
    }
}
