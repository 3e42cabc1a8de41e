//! S3 adapter implementation
//!
//! Wraps aws-sdk-s3 and implements the BackendAdapter trait from obstor-core.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use obstor_core::{BackendAdapter, Entry, Error, ObjectMeta, PutOptions, Result};

/// Connection settings for one S3-compatible account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    /// Logical account name (credential-cache key)
    pub name: String,
    pub endpoint: String,
    pub region: String,
    pub access_key: String,
    pub secret_key: String,
    /// Path-style addressing; most S3-compatible servers require it
    #[serde(default = "default_path_style")]
    pub path_style: bool,
}

fn default_path_style() -> bool {
    true
}

impl Account {
    pub fn new(
        name: impl Into<String>,
        endpoint: impl Into<String>,
        region: impl Into<String>,
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            endpoint: endpoint.into(),
            region: region.into(),
            access_key: access_key.into(),
            secret_key: secret_key.into(),
            path_style: default_path_style(),
        }
    }
}

/// S3 client wrapper implementing the obstor adapter contract
pub struct S3Adapter {
    inner: aws_sdk_s3::Client,
    account: Account,
}

impl S3Adapter {
    /// Create a new adapter from an account configuration
    pub async fn connect(account: Account) -> Result<Self> {
        // Build credentials provider
        let credentials = aws_credential_types::Credentials::new(
            account.access_key.clone(),
            account.secret_key.clone(),
            None, // session token
            None, // expiry
            "obstor-static-credentials",
        );

        // Build SDK config
        let config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .credentials_provider(credentials)
            .region(aws_config::Region::new(account.region.clone()))
            .endpoint_url(&account.endpoint)
            .load()
            .await;

        let s3_config = aws_sdk_s3::config::Builder::from(&config)
            .force_path_style(account.path_style)
            .build();

        let client = aws_sdk_s3::Client::from_conf(s3_config);

        Ok(Self {
            inner: client,
            account,
        })
    }

    /// Get the underlying aws-sdk-s3 client
    pub fn inner(&self) -> &aws_sdk_s3::Client {
        &self.inner
    }

    pub fn account(&self) -> &Account {
        &self.account
    }
}

/// Translate an SDK failure into the obstor taxonomy.
///
/// The HTTP status decides when the service answered; transport-level
/// failures (timeouts, dispatch errors) count as transient.
fn translate<E: std::fmt::Display>(
    context: &str,
    error: &aws_sdk_s3::error::SdkError<E>,
) -> Error {
    use aws_sdk_s3::error::SdkError;

    match error {
        SdkError::ServiceError(service_err) => {
            let status = service_err.raw().status().as_u16();
            let msg = format!("{context}: {}", service_err.err());
            match status {
                401 | 403 => Error::Unauthorized(msg),
                404 => Error::NotFound(msg),
                409 => Error::Conflict(msg),
                429 | 500 | 502 | 503 | 504 => Error::Unavailable(msg),
                _ => classify_by_text(msg),
            }
        }
        SdkError::TimeoutError(_) => Error::Unavailable(format!("{context}: request timeout")),
        SdkError::DispatchFailure(err) => {
            Error::Unavailable(format!("{context}: network dispatch error: {err:?}"))
        }
        SdkError::ResponseError(err) => {
            Error::Remote(format!("{context}: response error: {err:?}"))
        }
        SdkError::ConstructionFailure(err) => {
            Error::InvalidArgument(format!("{context}: request construction failed: {err:?}"))
        }
        _ => Error::Remote(format!("{context}: {error}")),
    }
}

/// Fallback classification for service errors with unexpected statuses
fn classify_by_text(msg: String) -> Error {
    let lower = msg.to_lowercase();
    if lower.contains("nosuchkey") || lower.contains("nosuchbucket") || lower.contains("not found")
    {
        Error::NotFound(msg)
    } else if lower.contains("slow down")
        || lower.contains("service unavailable")
        || lower.contains("too many requests")
    {
        Error::Unavailable(msg)
    } else if lower.contains("access denied") {
        Error::Unauthorized(msg)
    } else if lower.contains("md5") || lower.contains("etag mismatch") {
        // content verification failures are worth a re-read
        Error::InconsistentTransfer(msg)
    } else {
        Error::Remote(msg)
    }
}

fn entry_from_key(key: String, size: i64) -> Entry {
    let is_prefix = key.ends_with('/');
    Entry {
        name: key,
        size: size.max(0) as u64,
        is_prefix,
    }
}

#[async_trait]
impl BackendAdapter for S3Adapter {
    async fn list(
        &self,
        container: &str,
        prefix: &str,
        limit: Option<usize>,
    ) -> Result<Vec<Entry>> {
        let context = format!("list s3://{container}/{prefix}");
        let mut entries = Vec::new();
        let mut continuation_token: Option<String> = None;

        // Fold the continuation-token pagination in here; callers always
        // see a complete listing.
        loop {
            let mut request = self.inner.list_objects_v2().bucket(container);
            if !prefix.is_empty() {
                request = request.prefix(prefix);
            }
            if let Some(token) = &continuation_token {
                request = request.continuation_token(token);
            }
            if let Some(limit) = limit {
                let remaining = limit.saturating_sub(entries.len()).min(1000);
                request = request.max_keys(remaining as i32);
            }

            let response = request.send().await.map_err(|e| translate(&context, &e))?;

            for object in response.contents() {
                let key = object.key().unwrap_or_default().to_string();
                entries.push(entry_from_key(key, object.size().unwrap_or(0)));
            }

            if let Some(limit) = limit
                && entries.len() >= limit
            {
                entries.truncate(limit);
                break;
            }
            match response.next_continuation_token() {
                Some(token) if response.is_truncated().unwrap_or(false) => {
                    continuation_token = Some(token.to_string());
                }
                _ => break,
            }
        }

        Ok(entries)
    }

    async fn get(&self, container: &str, name: &str) -> Result<Vec<u8>> {
        let context = format!("get s3://{container}/{name}");
        let response = self
            .inner
            .get_object()
            .bucket(container)
            .key(name)
            .send()
            .await
            .map_err(|e| translate(&context, &e))?;

        let data = response
            .body
            .collect()
            .await
            .map_err(|e| Error::Remote(format!("{context}: {e}")))?
            .into_bytes()
            .to_vec();

        Ok(data)
    }

    async fn put(
        &self,
        container: &str,
        name: &str,
        data: Vec<u8>,
        options: PutOptions,
    ) -> Result<()> {
        let context = format!("put s3://{container}/{name}");
        let body = aws_sdk_s3::primitives::ByteStream::from(data);

        let mut request = self
            .inner
            .put_object()
            .bucket(container)
            .key(name)
            .body(body);

        if let Some(ct) = &options.content_type {
            request = request.content_type(ct);
        }
        for (key, value) in &options.metadata {
            request = request.metadata(key, value);
        }

        request.send().await.map_err(|e| translate(&context, &e))?;
        Ok(())
    }

    async fn delete(&self, container: &str, names: &[String]) -> Result<()> {
        use aws_sdk_s3::types::{Delete, ObjectIdentifier};

        if names.is_empty() {
            return Ok(());
        }
        let context = format!("delete in s3://{container}");

        // the batch API caps at 1000 objects per request
        for chunk in names.chunks(1000) {
            let objects: Vec<ObjectIdentifier> = chunk
                .iter()
                .map(|key| {
                    ObjectIdentifier::builder()
                        .key(key)
                        .build()
                        .map_err(|e| Error::InvalidArgument(format!("{context}: {e}")))
                })
                .collect::<Result<_>>()?;

            let delete = Delete::builder()
                .set_objects(Some(objects))
                .build()
                .map_err(|e| Error::InvalidArgument(format!("{context}: {e}")))?;

            let response = self
                .inner
                .delete_objects()
                .bucket(container)
                .delete(delete)
                .send()
                .await
                .map_err(|e| translate(&context, &e))?;

            if !response.errors().is_empty() {
                let error_keys: Vec<String> = response
                    .errors()
                    .iter()
                    .filter_map(|e| e.key().map(|k| k.to_string()))
                    .collect();
                tracing::warn!(keys = ?error_keys, "failed to delete some objects");
                return Err(Error::Remote(format!(
                    "{context}: failed to delete {} object(s): {}",
                    error_keys.len(),
                    error_keys.join(", ")
                )));
            }
        }

        Ok(())
    }

    async fn stat(&self, container: &str, name: &str) -> Result<ObjectMeta> {
        let context = format!("stat s3://{container}/{name}");
        let response = self
            .inner
            .head_object()
            .bucket(container)
            .key(name)
            .send()
            .await
            .map_err(|e| translate(&context, &e))?;

        let mut meta = ObjectMeta {
            size: response.content_length().unwrap_or(0).max(0) as u64,
            ..ObjectMeta::default()
        };
        if let Some(etag) = response.e_tag() {
            meta.etag = Some(etag.trim_matches('"').to_string());
        }
        if let Some(ct) = response.content_type() {
            meta.content_type = Some(ct.to_string());
        }
        if let Some(modified) = response.last_modified() {
            meta.last_modified = jiff::Timestamp::from_second(modified.secs()).ok();
        }
        if let Some(metadata) = response.metadata() {
            meta.extra = metadata.clone();
        }

        Ok(meta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_defaults_to_path_style() {
        let account = Account::new("play", "http://localhost:9000", "us-east-1", "ak", "sk");
        assert!(account.path_style);
    }

    #[test]
    fn test_entry_from_key_marks_dir_sentinels() {
        let obj = entry_from_key("dir/file.txt".to_string(), 42);
        assert!(!obj.is_prefix);
        assert_eq!(obj.size, 42);

        let marker = entry_from_key("dir/".to_string(), 0);
        assert!(marker.is_prefix);

        // a negative SDK size never underflows
        let odd = entry_from_key("x".to_string(), -1);
        assert_eq!(odd.size, 0);
    }

    #[test]
    fn test_classify_by_text() {
        assert!(matches!(
            classify_by_text("NoSuchKey: the key does not exist".to_string()),
            Error::NotFound(_)
        ));
        assert!(matches!(
            classify_by_text("503 Service Unavailable".to_string()),
            Error::Unavailable(_)
        ));
        assert!(matches!(
            classify_by_text("Access Denied".to_string()),
            Error::Unauthorized(_)
        ));
        assert!(matches!(
            classify_by_text("something else entirely".to_string()),
            Error::Remote(_)
        ));
    }
}
