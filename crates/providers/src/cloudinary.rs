use crate::error::{ProviderError, Result};
use crate::object_store::{ObjectStore, StoredObject};
use crate::source::sniff_mime;
use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;

const PROVIDER: &str = "cloudinary";
const URL_SIGNATURE_LEN: usize = 32;
const DELIVERY_TYPE: &str = "authenticated";

#[derive(Debug, Clone)]
pub struct CloudinaryConfig {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
    pub api_base: String,
    pub delivery_base: String,
}

impl CloudinaryConfig {
    pub fn new(
        cloud_name: impl Into<String>,
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
    ) -> Self {
        Self {
            cloud_name: cloud_name.into(),
            api_key: api_key.into(),
            api_secret: api_secret.into(),
            api_base: "https://api.cloudinary.com/v1_1".to_string(),
            delivery_base: "https://res.cloudinary.com".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    public_id: String,
    secure_url: String,
}

#[derive(Debug, Deserialize)]
struct DestroyResponse {
    result: String,
}

/// Cloudinary-backed object store.
///
/// Uploads are signed with SHA-256 request signatures. Retrieval URLs use the `authenticated`
/// delivery type; signed URLs embed an `exp_<unix>` path segment covered by the signature.
pub struct CloudinaryStore {
    client: Client,
    config: CloudinaryConfig,
}

impl CloudinaryStore {
    pub fn new(client: Client, config: CloudinaryConfig) -> Self {
        Self { client, config }
    }

    fn endpoint(&self, action: &str) -> String {
        format!(
            "{}/{}/image/{action}",
            self.config.api_base.trim_end_matches('/'),
            self.config.cloud_name
        )
    }

    /// Hex SHA-256 over the alphabetically sorted `k=v` pairs followed by the API secret.
    fn request_signature(&self, params: &[(&str, String)]) -> String {
        let mut sorted: Vec<&(&str, String)> = params.iter().collect();
        sorted.sort_by(|a, b| a.0.cmp(b.0));
        let joined = sorted
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");
        format!("{:x}", Sha256::digest(format!("{joined}{}", self.config.api_secret)))
    }

    fn url_signature(&self, to_sign: &str) -> String {
        let digest = Sha256::digest(format!("{to_sign}{}", self.config.api_secret));
        let mut encoded = URL_SAFE_NO_PAD.encode(digest);
        encoded.truncate(URL_SIGNATURE_LEN);
        encoded
    }

    fn delivery_prefix(&self) -> String {
        format!(
            "{}/{}/image/{DELIVERY_TYPE}",
            self.config.delivery_base.trim_end_matches('/'),
            self.config.cloud_name
        )
    }

    fn signed_url_at(&self, object_id: &str, expires_at: i64) -> String {
        let path = format!("exp_{expires_at}/{object_id}");
        let signature = self.url_signature(&path);
        format!("{}/s--{signature}--/{path}", self.delivery_prefix())
    }

    /// Checks signature and expiry of a URL produced by [`ObjectStore::signed_url`].
    pub fn verify_signed_url(&self, url: &str, now_unix: i64) -> bool {
        let Some(rest) = url.strip_prefix(&format!("{}/s--", self.delivery_prefix())) else {
            return false;
        };
        let Some((signature, path)) = rest.split_once("--/") else {
            return false;
        };
        let Some(expires_at) = path
            .strip_prefix("exp_")
            .and_then(|p| p.split_once('/'))
            .and_then(|(ts, _)| ts.parse::<i64>().ok())
        else {
            return false;
        };
        expires_at >= now_unix && self.url_signature(path) == signature
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ProviderError::Http {
            provider: PROVIDER,
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl ObjectStore for CloudinaryStore {
    async fn put(&self, data: Arc<[u8]>, folder: &str) -> Result<StoredObject> {
        if data.is_empty() {
            return Err(ProviderError::InvalidInput("refusing to upload an empty file".to_string()));
        }
        let timestamp = chrono::Utc::now().timestamp().to_string();
        let params = [
            ("folder", folder.to_string()),
            ("timestamp", timestamp.clone()),
            ("type", DELIVERY_TYPE.to_string()),
        ];
        let signature = self.request_signature(&params);

        let mime = sniff_mime(&data);
        let part = Part::bytes(data.to_vec())
            .file_name("upload")
            .mime_str(mime)?;
        let form = Form::new()
            .part("file", part)
            .text("folder", folder.to_string())
            .text("timestamp", timestamp)
            .text("type", DELIVERY_TYPE)
            .text("api_key", self.config.api_key.clone())
            .text("signature", signature)
            .text("signature_algorithm", "sha256");

        log::debug!("Uploading {} bytes to {PROVIDER} folder '{folder}'", data.len());
        let response = self
            .client
            .post(self.endpoint("upload"))
            .multipart(form)
            .send()
            .await?;
        let uploaded: UploadResponse = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|err| ProviderError::malformed(PROVIDER, err.to_string()))?;

        Ok(StoredObject {
            object_id: uploaded.public_id,
            url: uploaded.secure_url,
        })
    }

    async fn delete(&self, object_id: &str) -> Result<()> {
        let timestamp = chrono::Utc::now().timestamp().to_string();
        let params = [
            ("public_id", object_id.to_string()),
            ("timestamp", timestamp.clone()),
            ("type", DELIVERY_TYPE.to_string()),
        ];
        let signature = self.request_signature(&params);
        let form = [
            ("public_id", object_id.to_string()),
            ("timestamp", timestamp),
            ("type", DELIVERY_TYPE.to_string()),
            ("api_key", self.config.api_key.clone()),
            ("signature", signature),
            ("signature_algorithm", "sha256".to_string()),
        ];

        let response = self
            .client
            .post(self.endpoint("destroy"))
            .form(&form)
            .send()
            .await?;
        let destroyed: DestroyResponse = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|err| ProviderError::malformed(PROVIDER, err.to_string()))?;

        match destroyed.result.as_str() {
            "ok" | "not found" => Ok(()),
            other => Err(ProviderError::malformed(
                PROVIDER,
                format!("unexpected destroy result '{other}'"),
            )),
        }
    }

    fn signed_url(&self, object_id: &str, ttl: Duration) -> String {
        let ttl = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX / 2);
        let expires_at = chrono::Utc::now().timestamp().saturating_add(ttl);
        self.signed_url_at(object_id, expires_at)
    }

    fn public_url(&self, object_id: &str) -> String {
        format!(
            "{}/{}/image/upload/{object_id}",
            self.config.delivery_base.trim_end_matches('/'),
            self.config.cloud_name
        )
    }
}
