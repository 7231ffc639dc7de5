use crate::commons::object_store::CONTENT_SHA256_METADATA_KEY;
use crate::commons::{ObjectMetadata, ObjectStore, ObjectSummary, PutOptions};
use crate::config::Settings;
use crate::workers::TransferError;
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::config::Credentials;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{ChecksumMode, ServerSideEncryption};
use aws_sdk_s3::Client;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use std::path::Path;
use tracing::{debug, info, instrument, warn};

// S3 error codes that no amount of retrying will fix
const PERMANENT_ERROR_CODES: &[&str] = &[
    "AccessDenied",
    "AccountProblem",
    "AllAccessDisabled",
    "ExpiredToken",
    "InvalidAccessKeyId",
    "InvalidBucketName",
    "InvalidToken",
    "NoSuchBucket",
    "SignatureDoesNotMatch",
];

const TRANSIENT_ERROR_CODES: &[&str] = &[
    "InternalError",
    "RequestTimeout",
    "RequestLimitExceeded",
    "ServiceUnavailable",
    "SlowDown",
    "Throttling",
    "ThrottlingException",
];

/// `ObjectStore` backed by AWS S3 (or an S3-compatible endpoint such as MinIO).
#[derive(Clone)]
pub struct S3ObjectStore {
    client: Client,
}

impl S3ObjectStore {
    pub async fn new(settings: &Settings) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(settings.aws_default_region.clone()));

        // Profile takes precedence over explicit keys
        if let Some(profile) = &settings.aws_profile {
            debug!("Creating S3 client with profile: {}", profile);
            loader = loader.profile_name(profile);
        } else if let (Some(access_key), Some(secret_key)) =
            (&settings.aws_access_key_id, &settings.aws_secret_access_key)
        {
            debug!("Creating S3 client with access keys");
            loader = loader.credentials_provider(Credentials::new(
                access_key,
                secret_key,
                None,
                None,
                "hma-ingest",
            ));
        } else {
            debug!("Creating S3 client with default credentials");
        }

        let sdk_config = loader.load().await;
        let mut builder = aws_sdk_s3::config::Builder::from(&sdk_config);
        if let Some(endpoint) = &settings.s3_endpoint_url {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        info!(
            "S3 client initialized for region {}",
            settings.aws_default_region
        );

        Self {
            client: Client::from_conf(builder.build()),
        }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    #[instrument(skip(self))]
    async fn head(&self, bucket: &str, key: &str) -> Result<Option<ObjectMetadata>, TransferError> {
        let response = self
            .client
            .head_object()
            .bucket(bucket)
            .key(key)
            .checksum_mode(ChecksumMode::Enabled)
            .send()
            .await;

        let output = match response {
            Ok(output) => output,
            Err(err) => {
                if err.as_service_error().map(|e| e.is_not_found()).unwrap_or(false) {
                    debug!("Object not found: s3://{}/{}", bucket, key);
                    return Ok(None);
                }
                return Err(classify_sdk_error("head_object", &err));
            }
        };

        let sha256 = output
            .metadata()
            .and_then(|metadata| metadata.get(CONTENT_SHA256_METADATA_KEY))
            .cloned()
            .or_else(|| output.checksum_sha256().and_then(base64_to_hex));

        let metadata = ObjectMetadata {
            size: output.content_length().unwrap_or_default().max(0) as u64,
            sha256,
            etag: output.e_tag().map(|etag| etag.trim_matches('"').to_string()),
        };

        debug!(
            "Object exists: s3://{}/{} (size: {} bytes)",
            bucket, key, metadata.size
        );
        Ok(Some(metadata))
    }

    #[instrument(skip(self, options))]
    async fn put_file(
        &self,
        bucket: &str,
        key: &str,
        source: &Path,
        options: &PutOptions,
    ) -> Result<(), TransferError> {
        if let Err(e) = tokio::fs::metadata(source).await {
            return Err(TransferError::Permanent(format!(
                "Cannot read source {}: {}",
                source.display(),
                e
            )));
        }

        let body = ByteStream::from_path(source).await.map_err(|e| {
            TransferError::Permanent(format!("Cannot open source {}: {}", source.display(), e))
        })?;

        let mut request = self
            .client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(body)
            .set_metadata(Some(options.metadata.clone()));

        if let Some(sse) = &options.server_side_encryption {
            request = request.server_side_encryption(ServerSideEncryption::from(sse.as_str()));
        }

        if let Some(checksum) = options.content_sha256.as_deref().and_then(hex_to_base64) {
            request = request.checksum_sha256(checksum);
        }

        request
            .send()
            .await
            .map_err(|err| classify_sdk_error("put_object", &err))?;

        debug!("Uploaded {} -> s3://{}/{}", source.display(), bucket, key);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list(
        &self,
        bucket: &str,
        prefix: &str,
        max_keys: usize,
    ) -> Result<Vec<ObjectSummary>, TransferError> {
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .prefix(prefix)
            .into_paginator()
            .send();

        let mut objects = Vec::new();
        'pages: while let Some(page) = pages.next().await {
            let page = page.map_err(|err| classify_sdk_error("list_objects_v2", &err))?;
            for object in page.contents() {
                if objects.len() >= max_keys {
                    break 'pages;
                }
                objects.push(ObjectSummary {
                    key: object.key().unwrap_or_default().to_string(),
                    size: object.size().unwrap_or_default().max(0) as u64,
                    last_modified: object
                        .last_modified()
                        .and_then(|t| DateTime::<Utc>::from_timestamp(t.secs(), t.subsec_nanos())),
                    etag: object.e_tag().map(|etag| etag.trim_matches('"').to_string()),
                });
            }
        }

        info!("Found {} files in s3://{}/{}", objects.len(), bucket, prefix);
        Ok(objects)
    }
}

fn classify_sdk_error<E>(operation: &str, err: &SdkError<E, HttpResponse>) -> TransferError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
{
    let message = format!("{} failed: {}", operation, DisplayErrorContext(err));

    let retryable = match err {
        SdkError::ConstructionFailure(_) => false,
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => true,
        SdkError::ServiceError(_) => is_retryable_response(
            err.as_service_error().and_then(|e| e.code()),
            err.raw_response().map(|r| r.status().as_u16()),
        ),
        _ => true,
    };

    if retryable {
        TransferError::Transient(message)
    } else {
        warn!("{}", message);
        TransferError::Permanent(message)
    }
}

/// Decide whether an S3 service error is worth retrying from its code and HTTP status.
pub fn is_retryable_response(code: Option<&str>, status: Option<u16>) -> bool {
    if let Some(code) = code {
        if PERMANENT_ERROR_CODES.contains(&code) {
            return false;
        }
        if TRANSIENT_ERROR_CODES.contains(&code) {
            return true;
        }
    }

    match status {
        Some(408) | Some(429) => true,
        Some(status) if (400..500).contains(&status) => false,
        _ => true,
    }
}

fn hex_to_base64(digest: &str) -> Option<String> {
    hex::decode(digest).ok().map(|bytes| STANDARD.encode(bytes))
}

fn base64_to_hex(checksum: &str) -> Option<String> {
    STANDARD.decode(checksum).ok().map(hex::encode)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permanent_codes_are_not_retried() {
        assert!(!is_retryable_response(Some("AccessDenied"), Some(403)));
        assert!(!is_retryable_response(Some("NoSuchBucket"), Some(404)));
        assert!(!is_retryable_response(Some("InvalidAccessKeyId"), None));
    }

    #[test]
    fn test_throttling_and_server_errors_are_retried() {
        assert!(is_retryable_response(Some("SlowDown"), Some(503)));
        assert!(is_retryable_response(None, Some(500)));
        assert!(is_retryable_response(None, Some(429)));
        assert!(is_retryable_response(Some("RequestTimeout"), Some(400)));
    }

    #[test]
    fn test_unknown_client_errors_are_permanent() {
        assert!(!is_retryable_response(Some("MalformedXML"), Some(400)));
        assert!(is_retryable_response(None, None));
    }

    #[test]
    fn test_checksum_encoding_matches_s3_format() {
        // SHA-256 of the empty string
        let hex_digest = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";
        let encoded = hex_to_base64(hex_digest).unwrap();

        assert_eq!(encoded, "47DEQpj8HBSa+/TImW+5JCeuQeRkm5NMpJWZG3hSuFU=");
        assert_eq!(base64_to_hex(&encoded).unwrap(), hex_digest);
        assert!(hex_to_base64("not-hex").is_none());
    }
}
