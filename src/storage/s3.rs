// S3-compatible object storage: AWS S3, S3-compatible endpoints and GCS interoperability.
use aws_sdk_s3 as s3;
use s3::config::{Credentials, Region};
use s3::error::DisplayErrorContext;
use s3::primitives::ByteStream;
use std::path::Path;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::info;

use crate::errors::{AppError, Result};
use crate::models::{Destination, DestinationType};

pub const GCS_ENDPOINT: &str = "https://storage.googleapis.com";
const DEFAULT_REGION: &str = "us-east-1";

/// Where a client for a destination points to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientTarget {
    pub region: String,
    pub endpoint_url: Option<String>,
    pub force_path_style: bool,
}

/// GCS goes through its S3 interoperability endpoint; plain S3 honours an
/// optional endpoint override with path-style addressing.
pub fn client_target(destination: &Destination) -> ClientTarget {
    match destination.destination_type {
        DestinationType::GoogleCloudStorage => ClientTarget {
            region: "auto".into(),
            endpoint_url: Some(GCS_ENDPOINT.into()),
            force_path_style: false,
        },
        _ => {
            let endpoint_url = destination
                .endpoint_url
                .clone()
                .filter(|u| !u.trim().is_empty());
            ClientTarget {
                region: destination
                    .region
                    .clone()
                    .filter(|r| !r.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_REGION.into()),
                force_path_style: endpoint_url.is_some(),
                endpoint_url,
            }
        }
    }
}

/// A client bound to the bucket named by a destination's endpoint.
pub struct S3Backend {
    client: s3::Client,
    bucket: String,
}

impl S3Backend {
    pub async fn connect(destination: &Destination) -> Result<Self> {
        let (access_key, secret_key) = destination.credentials()?;
        let target = client_target(destination);

        let mut loader = aws_config::defaults(s3::config::BehaviorVersion::latest())
            .region(Region::new(target.region.clone()))
            .credentials_provider(Credentials::new(
                access_key,
                secret_key,
                None,     // session_token
                None,     // expiry
                "Static", // provider_name
            ));
        if let Some(url) = &target.endpoint_url {
            loader = loader.endpoint_url(url);
        }
        let sdk_config = loader.load().await;

        let s3_config = s3::config::Builder::from(&sdk_config)
            .force_path_style(target.force_path_style)
            .build();

        Ok(Self {
            client: s3::Client::from_conf(s3_config),
            bucket: destination.endpoint.clone(),
        })
    }

    pub async fn put_file(&self, file_path: &Path, key: &str) -> Result<()> {
        let body = ByteStream::from_path(file_path).await.map_err(|e| {
            AppError::Storage(format!("failed to read {}: {e}", file_path.display()))
        })?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body)
            .send()
            .await
            .map_err(|e| {
                AppError::S3Sdk(format!(
                    "failed to upload to bucket {} with key {}: {}",
                    self.bucket,
                    key,
                    DisplayErrorContext(&e)
                ))
            })?;

        info!("✓ Uploaded {} to bucket {} as {}", file_path.display(), self.bucket, key);
        Ok(())
    }

    /// Streams the object into `destination_path`, returning the number of bytes written.
    pub async fn get_file(&self, key: &str, destination_path: &Path) -> Result<u64> {
        let mut object = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                AppError::S3Sdk(format!(
                    "failed to get object {}/{}: {}",
                    self.bucket,
                    key,
                    DisplayErrorContext(&e)
                ))
            })?;

        let mut output_file = File::create(destination_path).await?;
        let mut total_bytes: u64 = 0;
        while let Some(chunk) = object
            .body
            .try_next()
            .await
            .map_err(|e| AppError::S3Sdk(format!("failed reading object {key}: {e}")))?
        {
            output_file.write_all(&chunk).await?;
            total_bytes += chunk.len() as u64;
        }
        output_file.flush().await?;

        info!(
            "✓ Downloaded {} bytes from {}/{} to {}",
            total_bytes,
            self.bucket,
            key,
            destination_path.display()
        );
        Ok(total_bytes)
    }

    pub async fn delete_object(&self, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                AppError::S3Sdk(format!(
                    "failed to delete {}/{}: {}",
                    self.bucket,
                    key,
                    DisplayErrorContext(&e)
                ))
            })?;
        Ok(())
    }

    /// HEAD on the bucket: it must exist and be reachable with these credentials.
    pub async fn check_bucket(&self) -> Result<()> {
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(|e| {
                AppError::InvalidInput(format!(
                    "cloud connection failed for bucket {}: {}",
                    self.bucket,
                    DisplayErrorContext(&e)
                ))
            })?;
        info!("✓ Bucket {} is accessible", self.bucket);
        Ok(())
    }
}
