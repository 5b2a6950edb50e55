use std::fmt;

use async_trait::async_trait;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::operation::head_object::HeadObjectError;
use aws_sdk_s3::Client;
use bytes::Bytes;
use url::Url;

use super::{check_range, RangeReader};
use crate::error::IoError;

/// Bucket and key of an S3 object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Location {
    pub bucket: String,
    pub key: String,
}

impl S3Location {
    /// Parse an `s3://bucket/key` URL.
    pub fn parse(url: &str) -> Result<Self, IoError> {
        let parsed =
            Url::parse(url).map_err(|e| IoError::S3(format!("invalid URL {}: {}", url, e)))?;
        if parsed.scheme() != "s3" {
            return Err(IoError::S3(format!("expected an s3:// URL, got {}", url)));
        }

        let bucket = match parsed.host_str() {
            Some(host) if !host.is_empty() => host.to_string(),
            _ => return Err(IoError::S3(format!("missing bucket in {}", url))),
        };
        let key = parsed.path().trim_start_matches('/');
        if key.is_empty() {
            return Err(IoError::S3(format!("missing object key in {}", url)));
        }

        Ok(Self {
            bucket,
            key: key.to_string(),
        })
    }
}

impl fmt::Display for S3Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.key)
    }
}

/// RangeReader over an object in S3 or an S3-compatible store.
///
/// The object size comes from a single HEAD request at open time; every
/// read after that is one ranged GET.
#[derive(Clone)]
pub struct S3RangeReader {
    client: Client,
    location: S3Location,
    size: u64,
    identifier: String,
}

impl S3RangeReader {
    /// Open the object at `location`.
    ///
    /// Fails with `NotFound` when the object does not exist.
    pub async fn open(client: Client, location: S3Location) -> Result<Self, IoError> {
        let identifier = location.to_string();

        let head = client
            .head_object()
            .bucket(&location.bucket)
            .key(&location.key)
            .send()
            .await
            .map_err(|e| head_error(e, &identifier))?;

        Ok(Self {
            client,
            location,
            size: head.content_length().unwrap_or(0).max(0) as u64,
            identifier,
        })
    }

    /// Open an `s3://bucket/key` URL.
    pub async fn from_url(client: Client, url: &str) -> Result<Self, IoError> {
        Self::open(client, S3Location::parse(url)?).await
    }

    pub fn location(&self) -> &S3Location {
        &self.location
    }
}

fn head_error(err: SdkError<HeadObjectError>, identifier: &str) -> IoError {
    let missing = err
        .as_service_error()
        .is_some_and(HeadObjectError::is_not_found)
        || err
            .raw_response()
            .is_some_and(|response| response.status().as_u16() == 404);

    if missing {
        IoError::NotFound(identifier.to_string())
    } else {
        IoError::S3(err.to_string())
    }
}

/// HTTP `Range` header value for `len > 0` bytes at `offset` (inclusive bounds).
fn http_range(offset: u64, len: usize) -> String {
    format!("bytes={}-{}", offset, offset + len as u64 - 1)
}

#[async_trait]
impl RangeReader for S3RangeReader {
    async fn read_exact_at(&self, offset: u64, len: usize) -> Result<Bytes, IoError> {
        check_range(offset, len, self.size)?;
        if len == 0 {
            return Ok(Bytes::new());
        }

        let response = self
            .client
            .get_object()
            .bucket(&self.location.bucket)
            .key(&self.location.key)
            .range(http_range(offset, len))
            .send()
            .await
            .map_err(|e| IoError::S3(e.to_string()))?;

        let body = response
            .body
            .collect()
            .await
            .map_err(|e| IoError::Connection(e.to_string()))?;
        Ok(body.into_bytes())
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }
}

/// Build an S3 client for `region`.
///
/// With a custom endpoint (MinIO, LocalStack) path-style addressing is forced,
/// since those services rarely resolve virtual-hosted bucket names.
pub async fn create_s3_client(endpoint_url: Option<&str>, region: &str) -> Client {
    let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(aws_config::Region::new(region.to_string()));
    if let Some(endpoint) = endpoint_url {
        loader = loader.endpoint_url(endpoint);
    }
    let sdk_config = loader.load().await;

    let builder = aws_sdk_s3::config::Builder::from(&sdk_config);
    let builder = if endpoint_url.is_some() {
        builder.force_path_style(true)
    } else {
        builder
    };
    Client::from_conf(builder.build())
}
