use async_trait::async_trait;
use aws_sdk_s3::Client;
use bytes::Bytes;
use url::Url;

use super::range_reader::check_range;
use super::RangeReader;
use crate::error::IoError;

/// A parsed `s3://bucket/key` location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Location {
    pub bucket: String,
    pub key: String,
}

impl S3Location {
    /// Parse an `s3://bucket/key` URL. Returns `None` for any other scheme.
    pub fn parse(location: &str) -> Option<Self> {
        let url = Url::parse(location).ok()?;
        if url.scheme() != "s3" {
            return None;
        }
        let bucket = url.host_str()?.to_string();
        let key = url.path().trim_start_matches('/').to_string();
        Some(Self { bucket, key })
    }

    /// Join a relative key onto this location (used for chunk keys).
    pub fn join(&self, relative: &str) -> String {
        if self.key.is_empty() {
            relative.to_string()
        } else {
            format!("{}/{}", self.key.trim_end_matches('/'), relative)
        }
    }
}

/// Ranged GETs against one S3 object.
///
/// The object size comes from a single HEAD when the reader is opened; every
/// read after that is one GET with a `Range` header.
#[derive(Clone)]
pub struct S3RangeReader {
    client: Client,
    location: S3Location,
    size: u64,
    identifier: String,
}

impl S3RangeReader {
    /// Open the object at `location`; a missing object is `NotFound`.
    pub async fn open(client: Client, location: S3Location) -> Result<Self, IoError> {
        let identifier = location.to_string();
        let head = client
            .head_object()
            .bucket(&location.bucket)
            .key(&location.key)
            .send()
            .await
            .map_err(|e| {
                let missing = e.as_service_error().is_some_and(|se| se.is_not_found())
                    || e.raw_response().is_some_and(|r| r.status().as_u16() == 404);
                if missing {
                    IoError::NotFound(identifier.clone())
                } else {
                    classify_s3_error(e.to_string(), &identifier)
                }
            })?;
        let size = u64::try_from(head.content_length().unwrap_or(0)).unwrap_or(0);

        Ok(Self {
            client,
            location,
            size,
            identifier,
        })
    }

    pub fn location(&self) -> &S3Location {
        &self.location
    }
}

impl std::fmt::Display for S3Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.key)
    }
}

/// Map an SDK error string to `NotFound` when it names a missing key.
pub(crate) fn classify_s3_error(message: String, identifier: &str) -> IoError {
    if message.contains("NotFound") || message.contains("NoSuchKey") || message.contains("404") {
        IoError::NotFound(identifier.to_string())
    } else {
        IoError::S3(message)
    }
}

/// Drain a GET response body.
pub(crate) async fn collect_body(
    body: aws_sdk_s3::primitives::ByteStream,
) -> Result<Bytes, IoError> {
    body.collect()
        .await
        .map(|data| data.into_bytes())
        .map_err(|e| IoError::Connection(e.to_string()))
}

#[async_trait]
impl RangeReader for S3RangeReader {
    async fn read_exact_at(&self, offset: u64, len: usize) -> Result<Bytes, IoError> {
        check_range(offset, len, self.size)?;
        if len == 0 {
            return Ok(Bytes::new());
        }

        // HTTP ranges are inclusive
        let last = offset + len as u64 - 1;
        let resp = self
            .client
            .get_object()
            .bucket(&self.location.bucket)
            .key(&self.location.key)
            .range(format!("bytes={}-{}", offset, last))
            .send()
            .await
            .map_err(|e| classify_s3_error(e.to_string(), &self.identifier))?;

        let data = collect_body(resp.body).await?;
        if data.len() != len {
            return Err(IoError::S3(format!(
                "{}: short read at {}, got {} of {} bytes",
                self.identifier,
                offset,
                data.len(),
                len
            )));
        }
        Ok(data)
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }
}

/// Create an S3 client with an optional custom endpoint (MinIO and other
/// S3-compatible services use path-style addressing).
pub async fn create_s3_client(endpoint_url: Option<&str>, region: &str) -> Client {
    let region = aws_config::Region::new(region.to_string());
    let mut config_loader =
        aws_config::defaults(aws_config::BehaviorVersion::latest()).region(region);

    if let Some(endpoint) = endpoint_url {
        config_loader = config_loader.endpoint_url(endpoint);
    }

    let sdk_config = config_loader.load().await;
    let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
        .force_path_style(endpoint_url.is_some())
        .build();

    Client::from_conf(s3_config)
}
