/// Image hosting
///
/// Avatars and supply photos are uploaded through an [`ImageStore`]. The
/// production store is Cloudinary's signed upload API; the returned
/// `secure_url` is what gets saved on the user or supply row.
///
/// Signing follows Cloudinary's scheme: the upload parameters (excluding
/// `file`, `api_key` and `signature_algorithm`) are sorted, joined as
/// `key=value&...`, suffixed with the API secret and hashed with SHA-256.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{multipart, Client};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::time::Duration;

use crate::config::CloudinaryConfig;

/// Largest accepted upload (5 MiB)
pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

const ALLOWED_CONTENT_TYPES: &[&str] = &["image/jpeg", "image/png", "image/webp", "image/gif"];

#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("Unsupported image type: {0}")]
    UnsupportedType(String),

    #[error("Image is larger than {} bytes", MAX_IMAGE_BYTES)]
    TooLarge,

    #[error("Image is empty")]
    Empty,

    #[error("Upload request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Image host rejected the upload ({status}): {body}")]
    Rejected { status: u16, body: String },
}

/// An image read from a multipart field
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub file_name: String,
    pub content_type: String,
    pub data: Bytes,
}

impl ImageUpload {
    pub fn validate(&self) -> Result<(), ImageError> {
        if !ALLOWED_CONTENT_TYPES.contains(&self.content_type.as_str()) {
            return Err(ImageError::UnsupportedType(self.content_type.clone()));
        }
        if self.data.is_empty() {
            return Err(ImageError::Empty);
        }
        if self.data.len() > MAX_IMAGE_BYTES {
            return Err(ImageError::TooLarge);
        }
        Ok(())
    }
}

#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Stores the image under `folder/public_id` and returns its public URL
    async fn upload(&self, folder: &str, public_id: &str, image: ImageUpload) -> Result<String, ImageError>;
}

pub struct CloudinaryStore {
    client: Client,
    config: CloudinaryConfig,
}

#[derive(Deserialize)]
struct UploadResponse {
    secure_url: String,
}

impl CloudinaryStore {
    pub fn new(config: CloudinaryConfig) -> Result<Self, ImageError> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self { client, config })
    }

    fn upload_url(&self) -> String {
        format!(
            "https://api.cloudinary.com/v1_1/{}/image/upload",
            self.config.cloud_name
        )
    }
}

/// Hex SHA-256 signature over the sorted parameters
pub fn sign_params(params: &[(&str, String)], api_secret: &str) -> String {
    let mut sorted: Vec<&(&str, String)> = params.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(b.0));

    let to_sign = sorted
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");

    hex::encode(Sha256::digest(format!("{}{}", to_sign, api_secret).as_bytes()))
}

#[async_trait]
impl ImageStore for CloudinaryStore {
    async fn upload(&self, folder: &str, public_id: &str, image: ImageUpload) -> Result<String, ImageError> {
        image.validate()?;

        let timestamp = chrono::Utc::now().timestamp().to_string();
        let params = [
            ("folder", folder.to_string()),
            ("overwrite", "true".to_string()),
            ("public_id", public_id.to_string()),
            ("timestamp", timestamp),
        ];
        let signature = sign_params(&params, &self.config.api_secret);

        let file = multipart::Part::bytes(image.data.to_vec())
            .file_name(image.file_name)
            .mime_str(&image.content_type)?;

        let mut form = multipart::Form::new()
            .part("file", file)
            .text("api_key", self.config.api_key.clone())
            .text("signature", signature)
            .text("signature_algorithm", "sha256");
        for (key, value) in params {
            form = form.text(key, value);
        }

        let response = self.client.post(self.upload_url()).multipart(form).send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ImageError::Rejected { status, body });
        }

        let uploaded: UploadResponse = response.json().await?;
        tracing::debug!(folder, public_id, url = %uploaded.secure_url, "Image uploaded");
        Ok(uploaded.secure_url)
    }
}
