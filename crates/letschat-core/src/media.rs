//! Image upload to Firebase Storage.
//!
//! Images are stored under a per-user unique name and referenced from chat
//! messages by their public download URL.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use reqwest::{Client, Url};
use serde::Deserialize;
use tracing::{debug, info};

use crate::auth::BearerToken;
use crate::remote::ApiError;

const STORAGE_BASE_URL: &str = "https://firebasestorage.googleapis.com/v0/b";

/// Upload timeout in seconds
const UPLOAD_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadResponse {
    name: String,
    #[serde(default)]
    download_tokens: Option<String>,
}

/// Object name for an upload: `{user_id}-{millis}-{file_name}`
pub fn generate_reference(user_id: &str, now: DateTime<Utc>, path: &Path) -> String {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    format!("{}-{}-{}", user_id, now.timestamp_millis(), file_name)
}

/// MIME type from the file extension, defaulting to a binary stream
pub fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("heic") => "image/heic",
        Some("bmp") => "image/bmp",
        _ => "application/octet-stream",
    }
}

#[derive(Clone)]
pub struct MediaUploader {
    client: Client,
    bucket: String,
    user_id: String,
    token: BearerToken,
}

impl MediaUploader {
    pub fn new(bucket: impl Into<String>, user_id: impl Into<String>, token: BearerToken) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(UPLOAD_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client,
            bucket: bucket.into(),
            user_id: user_id.into(),
            token,
        })
    }

    fn objects_url(&self) -> Result<Url> {
        let mut url = Url::parse(STORAGE_BASE_URL)?;
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("Storage URL cannot be a base"))?
            .push(&self.bucket)
            .push("o");
        Ok(url)
    }

    /// Public URL for an uploaded object
    pub fn download_url(&self, name: &str, token: Option<&str>) -> Result<String> {
        let mut url = self.objects_url()?;
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("Storage URL cannot be a base"))?
            .push(name);
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("alt", "media");
            if let Some(token) = token {
                query.append_pair("token", token);
            }
        }
        Ok(url.to_string())
    }

    /// Upload a local image and return its download URL
    pub async fn upload_image(&self, path: &Path) -> Result<String> {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read image {}", path.display()))?;
        let reference = generate_reference(&self.user_id, Utc::now(), path);
        debug!(reference = %reference, size = bytes.len(), "Uploading image");

        let mut request = self
            .client
            .post(self.objects_url()?)
            .query(&[("uploadType", "media"), ("name", reference.as_str())])
            .header(reqwest::header::CONTENT_TYPE, content_type_for(path))
            .body(bytes);
        if let Some(token) = self.token.get() {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .context("Failed to send image upload")?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::from_status(status, &body).into());
        }

        let uploaded: UploadResponse = response
            .json()
            .await
            .context("Failed to parse upload response")?;
        // Several tokens may be listed; any of them grants read access
        let token = uploaded
            .download_tokens
            .as_deref()
            .and_then(|tokens| tokens.split(',').next());

        let url = self.download_url(&uploaded.name, token)?;
        info!(reference = %uploaded.name, "Image uploaded");
        Ok(url)
    }
}
