//! Cloudinary image storage
//!
//! Signed uploads and deletions against the Cloudinary REST API. Signatures
//! are SHA-256 over the alphabetically sorted parameters followed by the API
//! secret.

use chrono::Utc;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::time::Duration;

use crate::core::config::CloudinaryConfig;

/// Largest accepted image
pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

const ALLOWED_CONTENT_TYPES: &[&str] = &[
    "image/jpeg",
    "image/png",
    "image/gif",
    "image/webp",
    "image/svg+xml",
];

const DEFAULT_API_BASE: &str = "https://api.cloudinary.com/v1_1";
const DEFAULT_FOLDER: &str = "inkpost";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("Image uploads are not configured")]
    NotConfigured,

    #[error("Unsupported file type: {0}")]
    UnsupportedType(String),

    #[error("Image is {size} bytes, the limit is {max} bytes")]
    TooLarge { size: usize, max: usize },

    #[error("Image is empty")]
    Empty,

    #[error("Upload request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Cloudinary rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },
}

/// An image received from a client
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub bytes: Vec<u8>,
    pub file_name: String,
    pub content_type: String,
}

impl ImageUpload {
    /// Check type and size before anything leaves the server
    pub fn validate(&self) -> Result<(), UploadError> {
        if self.bytes.is_empty() {
            return Err(UploadError::Empty);
        }
        if !ALLOWED_CONTENT_TYPES.contains(&self.content_type.as_str()) {
            return Err(UploadError::UnsupportedType(self.content_type.clone()));
        }
        if self.bytes.len() > MAX_IMAGE_BYTES {
            return Err(UploadError::TooLarge {
                size: self.bytes.len(),
                max: MAX_IMAGE_BYTES,
            });
        }
        Ok(())
    }
}

/// Stored image location
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UploadedImage {
    #[serde(rename = "secure_url")]
    pub url: String,
    pub public_id: String,
}

#[derive(Debug, Deserialize)]
struct CloudinaryErrorBody {
    error: CloudinaryErrorMessage,
}

#[derive(Debug, Deserialize)]
struct CloudinaryErrorMessage {
    message: String,
}

#[derive(Debug, Deserialize)]
struct DestroyResponse {
    result: String,
}

#[derive(Clone)]
pub struct CloudinaryClient {
    http: reqwest::Client,
    cloud_name: String,
    api_key: String,
    api_secret: String,
    api_base: String,
    folder: String,
}

impl CloudinaryClient {
    pub fn new(
        cloud_name: impl Into<String>,
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
    ) -> Result<Self, UploadError> {
        Self::with_timeout(cloud_name, api_key, api_secret, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(
        cloud_name: impl Into<String>,
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, UploadError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http,
            cloud_name: cloud_name.into(),
            api_key: api_key.into(),
            api_secret: api_secret.into(),
            api_base: DEFAULT_API_BASE.to_string(),
            folder: DEFAULT_FOLDER.to_string(),
        })
    }

    /// Client for the configured account; `None` unless all credentials are present
    pub fn from_config(config: &CloudinaryConfig) -> Result<Option<Self>, UploadError> {
        let (Some(cloud), Some(key), Some(secret)) =
            (&config.cloud_name, &config.api_key, &config.api_secret)
        else {
            return Ok(None);
        };

        let mut client = Self::new(cloud, key, secret)?;
        if let Some(folder) = &config.folder {
            client = client.with_folder(folder);
        }
        Ok(Some(client))
    }

    /// Point the client at another API root (used against mock servers)
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_folder(mut self, folder: impl Into<String>) -> Self {
        self.folder = folder.into();
        self
    }

    /// Sign request parameters: `k1=v1&k2=v2...` sorted by key, then the secret
    pub fn sign(params: &[(&str, &str)], api_secret: &str) -> String {
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

    fn endpoint(&self, action: &str) -> String {
        format!("{}/{}/image/{}", self.api_base, self.cloud_name, action)
    }

    async fn rejection(response: reqwest::Response) -> UploadError {
        let status = response.status().as_u16();
        let message = match response.json::<CloudinaryErrorBody>().await {
            Ok(body) => body.error.message,
            Err(_) => "unexpected response".to_string(),
        };
        UploadError::Rejected { status, message }
    }

    /// Upload an image into the configured folder
    pub async fn upload(&self, image: ImageUpload) -> Result<UploadedImage, UploadError> {
        image.validate()?;

        let timestamp = Utc::now().timestamp().to_string();
        let signature = Self::sign(
            &[("folder", &self.folder), ("timestamp", &timestamp)],
            &self.api_secret,
        );

        let file = Part::bytes(image.bytes)
            .file_name(image.file_name)
            .mime_str(&image.content_type)?;

        let form = Form::new()
            .part("file", file)
            .text("api_key", self.api_key.clone())
            .text("timestamp", timestamp)
            .text("folder", self.folder.clone())
            .text("signature_algorithm", "sha256")
            .text("signature", signature);

        let response = self
            .http
            .post(self.endpoint("upload"))
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::rejection(response).await);
        }

        let uploaded = response.json::<UploadedImage>().await?;
        tracing::info!("Uploaded image {}", uploaded.public_id);
        Ok(uploaded)
    }

    /// Delete an image. Returns false when Cloudinary did not know it.
    pub async fn destroy(&self, public_id: &str) -> Result<bool, UploadError> {
        let timestamp = Utc::now().timestamp().to_string();
        let signature = Self::sign(
            &[("public_id", public_id), ("timestamp", &timestamp)],
            &self.api_secret,
        );

        let params = [
            ("public_id", public_id.to_string()),
            ("timestamp", timestamp),
            ("api_key", self.api_key.clone()),
            ("signature_algorithm", "sha256".to_string()),
            ("signature", signature),
        ];

        let response = self
            .http
            .post(self.endpoint("destroy"))
            .form(&params)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::rejection(response).await);
        }

        let body = response.json::<DestroyResponse>().await?;
        Ok(body.result == "ok")
    }
}
