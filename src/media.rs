//! Profile image storage on the external media host.

use serde::Deserialize;
use sha1::{Digest, Sha1};

use crate::config::Media;
use crate::error::{Result, ServerError};

const ALLOWED_EXTENSIONS: [&str; 3] = [".png", ".jpg", ".jpeg"];

/// Whether a filename carries an accepted image extension.
///
/// Checked before any upload call, so rejected files never reach the host.
pub fn has_allowed_extension(filename: &str) -> bool {
    let lower = filename.to_lowercase();
    ALLOWED_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    secure_url: String,
}

/// Media host (Cloudinary) manager.
#[derive(Clone, Default)]
pub struct MediaManager {
    http: reqwest::Client,
    cloud_name: String,
    api_key: Option<String>,
    api_secret: Option<String>,
}

impl MediaManager {
    /// Create a new [`MediaManager`].
    pub fn new(config: &Media, api_key: Option<String>, api_secret: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            cloud_name: config.cloud_name.clone(),
            api_key,
            api_secret,
        }
    }

    fn credentials(&self) -> Result<(&str, &str)> {
        match (self.api_key.as_deref(), self.api_secret.as_deref()) {
            (Some(key), Some(secret)) if !self.cloud_name.is_empty() => Ok((key, secret)),
            _ => Err(ServerError::internal("media host is not configured")),
        }
    }

    /// Signature over the request parameters, sorted by name, with the API
    /// secret appended.
    fn sign(params: &[(&str, &str)], secret: &str) -> String {
        let mut sorted: Vec<_> = params.to_vec();
        sorted.sort_by_key(|(name, _)| *name);
        let joined = sorted
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("&");

        let mut hasher = Sha1::new();
        hasher.update(joined.as_bytes());
        hasher.update(secret.as_bytes());
        hex::encode(hasher.finalize())
    }

    fn timestamp() -> String {
        chrono::Utc::now().timestamp().to_string()
    }

    /// Upload an image, returning its public URL.
    pub async fn upload(&self, filename: &str, bytes: Vec<u8>) -> Result<String> {
        let (api_key, api_secret) = self.credentials()?;
        let timestamp = Self::timestamp();
        let signature = Self::sign(&[("timestamp", &timestamp)], api_secret);

        let form = reqwest::multipart::Form::new()
            .text("api_key", api_key.to_owned())
            .text("timestamp", timestamp)
            .text("signature", signature)
            .part(
                "file",
                reqwest::multipart::Part::bytes(bytes).file_name(filename.to_owned()),
            );

        let url = format!(
            "https://api.cloudinary.com/v1_1/{}/image/upload",
            self.cloud_name
        );
        let response = self
            .http
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|err| ServerError::upstream("cloudinary", err))?
            .error_for_status()
            .map_err(|err| ServerError::upstream("cloudinary", err))?;

        let uploaded: UploadResponse = response
            .json()
            .await
            .map_err(|err| ServerError::upstream("cloudinary", err))?;

        Ok(uploaded.secure_url)
    }

    /// Best-effort removal of a previously uploaded asset. Failures are
    /// logged and swallowed; they are never user-facing.
    pub async fn delete_by_url(&self, asset_url: &str) {
        let Some(public_id) = public_id_from_url(asset_url) else {
            tracing::warn!(%asset_url, "cannot derive public id from asset url");
            return;
        };

        let Ok((api_key, api_secret)) = self.credentials() else {
            return;
        };
        let timestamp = Self::timestamp();
        let signature = Self::sign(
            &[("public_id", &public_id), ("timestamp", &timestamp)],
            api_secret,
        );

        let url = format!(
            "https://api.cloudinary.com/v1_1/{}/image/destroy",
            self.cloud_name
        );
        let result = self
            .http
            .post(&url)
            .form(&[
                ("public_id", public_id.as_str()),
                ("api_key", api_key),
                ("timestamp", &timestamp),
                ("signature", &signature),
            ])
            .send()
            .await
            .and_then(reqwest::Response::error_for_status);

        if let Err(err) = result {
            tracing::warn!(error = %err, %public_id, "failed to delete previous asset");
        }
    }
}

/// Extract the Cloudinary public id from a delivery URL, dropping the
/// version segment and the file extension.
fn public_id_from_url(asset_url: &str) -> Option<String> {
    let url = url::Url::parse(asset_url).ok()?;
    let segments: Vec<&str> = url.path_segments()?.collect();
    let upload_pos = segments.iter().position(|s| *s == "upload")?;

    let mut rest: &[&str] = &segments[upload_pos + 1..];
    if let Some(first) = rest.first() {
        let is_version = first.starts_with('v')
            && first.len() > 1
            && first[1..].chars().all(|c| c.is_ascii_digit());
        if is_version {
            rest = &rest[1..];
        }
    }

    if rest.is_empty() {
        return None;
    }

    let joined = rest.join("/");
    let public_id = match joined.rsplit_once('.') {
        Some((stem, _ext)) => stem.to_owned(),
        None => joined,
    };

    (!public_id.is_empty()).then_some(public_id)
}
