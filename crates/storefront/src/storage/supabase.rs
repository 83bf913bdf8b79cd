//! Supabase Storage client.
//!
//! Uses the service key, so every object in the bucket is reachable. Callers
//! are responsible for deciding whether a visitor may have a given file.

use std::time::Duration;

use async_trait::async_trait;
use futures::TryStreamExt;
use reqwest::StatusCode;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE, HeaderMap, HeaderValue};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};

use super::{ObjectStorage, SignedUrl, StorageError, StoredObject, validate_path};
use crate::config::StorageConfig;

/// Supabase Storage client for a single bucket.
#[derive(Clone)]
pub struct SupabaseStorage {
    client: reqwest::Client,
    base_url: String,
    bucket: String,
}

impl std::fmt::Debug for SupabaseStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupabaseStorage")
            .field("base_url", &self.base_url)
            .field("bucket", &self.bucket)
            .finish_non_exhaustive()
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SignRequest {
    expires_in: u64,
}

#[derive(Deserialize)]
struct SignResponse {
    #[serde(rename = "signedURL")]
    signed_url: String,
}

impl SupabaseStorage {
    /// Create a new storage client.
    ///
    /// # Errors
    ///
    /// Returns error if the service key is not a valid header value or the
    /// HTTP client fails to build.
    pub fn new(config: &StorageConfig) -> Result<Self, StorageError> {
        let key = config.service_key.expose_secret();
        let mut headers = HeaderMap::new();

        let mut auth = HeaderValue::from_str(&format!("Bearer {key}"))
            .map_err(|e| StorageError::Parse(format!("Invalid service key format: {e}")))?;
        auth.set_sensitive(true);
        headers.insert("Authorization", auth);

        let mut apikey = HeaderValue::from_str(key)
            .map_err(|e| StorageError::Parse(format!("Invalid service key format: {e}")))?;
        apikey.set_sensitive(true);
        headers.insert("apikey", apikey);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(5))
            .build()?;

        Ok(Self {
            client,
            base_url: format!("{}/storage/v1", config.url),
            bucket: config.bucket.clone(),
        })
    }

    fn object_key(&self, path: &str) -> Result<String, StorageError> {
        let path = validate_path(path)?;
        let encoded: Vec<_> = path
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect();
        Ok(format!("{}/{}", self.bucket, encoded.join("/")))
    }

    async fn api_error(response: reqwest::Response, path: &str) -> StorageError {
        let status = response.status();
        // Supabase reports missing objects as 400 with a "not_found" body on some versions
        let message = response.text().await.unwrap_or_default();
        if status == StatusCode::NOT_FOUND || message.contains("not_found") {
            return StorageError::NotFound(path.to_string());
        }
        StorageError::Api {
            status: status.as_u16(),
            message,
        }
    }
}

#[async_trait]
impl ObjectStorage for SupabaseStorage {
    #[tracing::instrument(skip(self))]
    async fn signed_url(&self, path: &str, ttl: Duration) -> Result<SignedUrl, StorageError> {
        let url = format!("{}/object/sign/{}", self.base_url, self.object_key(path)?);

        let response = self
            .client
            .post(&url)
            .json(&SignRequest {
                expires_in: ttl.as_secs().max(1),
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::api_error(response, path).await);
        }

        let body: SignResponse = response
            .json()
            .await
            .map_err(|e| StorageError::Parse(e.to_string()))?;

        Ok(SignedUrl {
            url: format!("{}{}", self.base_url, body.signed_url),
            expires_in: ttl,
        })
    }

    #[tracing::instrument(skip(self))]
    async fn fetch(&self, path: &str) -> Result<StoredObject, StorageError> {
        let url = format!(
            "{}/object/authenticated/{}",
            self.base_url,
            self.object_key(path)?
        );

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(Self::api_error(response, path).await);
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        let content_length = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok());

        let body = response.bytes_stream().map_err(std::io::Error::other);

        Ok(StoredObject {
            content_type,
            content_length,
            body: Box::pin(body),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use secrecy::SecretString;

    use super::*;

    fn storage() -> SupabaseStorage {
        SupabaseStorage::new(&StorageConfig {
            url: "https://abc.supabase.co".to_string(),
            service_key: SecretString::from("k3y-Zq81.mxP"),
            bucket: "printables".to_string(),
        })
        .unwrap()
    }

    #[test]
    fn test_object_key_encodes_segments() {
        let key = storage().object_key("pages/sleepy fox.pdf").unwrap();
        assert_eq!(key, "printables/pages/sleepy%20fox.pdf");
    }

    #[test]
    fn test_object_key_rejects_traversal() {
        assert!(matches!(
            storage().object_key("../other-bucket/file.pdf"),
            Err(StorageError::InvalidPath(_))
        ));
    }

    #[test]
    fn test_debug_hides_client() {
        let debug_output = format!("{:?}", storage());
        assert!(debug_output.contains("printables"));
        assert!(!debug_output.contains("k3y-Zq81.mxP"));
    }
}
