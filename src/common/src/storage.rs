//! Archive object store construction.
//!
//! The archive is addressed by a single DSN in `[archive]`:
//!
//! - `memory://` keeps archived files in process memory
//! - `file:///srv/archive` or `file:///.data/archive` (relative) for a local directory
//! - `s3://[access_key:secret_key@]host[:port]/bucket[?region=...]`

use anyhow::{Context, Result};
use object_store::{ObjectStore, aws::AmazonS3Builder, local::LocalFileSystem, memory::InMemory};
use std::sync::Arc;
use url::Url;

use crate::config::ArchiveConfig;

/// Where archived files are kept, as parsed from the archive DSN
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveLocation {
    Memory,
    Directory(String),
    S3 {
        endpoint: Option<String>,
        bucket: String,
        region: Option<String>,
        credentials: Option<(String, String)>,
    },
}

impl ArchiveLocation {
    pub fn parse(dsn: &str) -> Result<Self> {
        let url = Url::parse(dsn).with_context(|| format!("Invalid archive DSN '{dsn}'"))?;

        match url.scheme() {
            "memory" => Ok(Self::Memory),
            "file" => Ok(Self::Directory(file_dsn_path(&url)?)),
            "s3" => s3_location(&url),
            scheme => anyhow::bail!("Unsupported archive scheme: {scheme}. Supported: file, memory, s3"),
        }
    }

    /// Open the object store, creating a local archive directory if needed
    pub fn open(&self) -> Result<Arc<dyn ObjectStore>> {
        match self {
            Self::Memory => Ok(Arc::new(InMemory::new())),
            Self::Directory(path) => {
                std::fs::create_dir_all(path)
                    .with_context(|| format!("Failed to create archive directory {path}"))?;
                Ok(Arc::new(LocalFileSystem::new_with_prefix(path)?))
            }
            Self::S3 {
                endpoint,
                bucket,
                region,
                credentials,
            } => {
                let mut builder = AmazonS3Builder::from_env().with_bucket_name(bucket);
                if let Some(region) = region {
                    builder = builder.with_region(region);
                }
                if let Some((access_key, secret_key)) = credentials {
                    builder = builder
                        .with_access_key_id(access_key)
                        .with_secret_access_key(secret_key);
                }
                if let Some(endpoint) = endpoint {
                    builder = builder
                        .with_endpoint(endpoint)
                        .with_allow_http(endpoint.starts_with("http://"))
                        .with_virtual_hosted_style_request(false);
                }
                Ok(Arc::new(builder.build()?))
            }
        }
    }
}

/// Open the archive object store named in configuration
pub fn create_archive_store(archive_config: &ArchiveConfig) -> Result<Arc<dyn ObjectStore>> {
    let location = ArchiveLocation::parse(&archive_config.dsn)?;
    tracing::debug!(location = ?location, "Opening archive store");
    location.open()
}

/// Filesystem directory named by a `file://` DSN.
///
/// ```
/// use common::storage::file_dsn_path;
/// use url::Url;
///
/// let url = Url::parse("file:///.data/archive").unwrap();
/// assert_eq!(file_dsn_path(&url).unwrap(), ".data/archive");
/// ```
pub fn file_dsn_path(url: &Url) -> Result<String> {
    let path = url.path();
    if path.is_empty() || path == "/" {
        anyhow::bail!("File DSN must specify a path: file:///path/to/archive");
    }
    Ok(match path.strip_prefix("/.") {
        Some(rest) => format!(".{rest}"),
        None => path.to_string(),
    })
}

fn s3_location(url: &Url) -> Result<ArchiveLocation> {
    let host = url
        .host_str()
        .ok_or_else(|| anyhow::anyhow!("Missing S3 host in archive DSN"))?;
    let bucket = url.path().trim_matches('/');
    if bucket.is_empty() {
        anyhow::bail!("S3 DSN must specify a bucket: s3://host/bucket");
    }

    // Anything but AWS itself is an S3-compatible store addressed path-style
    let endpoint = (!host.ends_with("amazonaws.com")).then(|| {
        let scheme = if url.port() == Some(443) { "https" } else { "http" };
        match url.port() {
            Some(port) => format!("{scheme}://{host}:{port}"),
            None => format!("{scheme}://{host}"),
        }
    });

    let credentials = (!url.username().is_empty()).then(|| {
        (
            url.username().to_string(),
            url.password().unwrap_or_default().to_string(),
        )
    });

    let region = url
        .query_pairs()
        .find(|(key, _)| key == "region")
        .map(|(_, value)| value.into_owned());

    Ok(ArchiveLocation::S3 {
        endpoint,
        bucket: bucket.to_string(),
        region,
        credentials,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_archive_store() {
        let config = ArchiveConfig {
            dsn: "memory://".to_string(),
            container: "archive".to_string(),
        };
        assert!(create_archive_store(&config).is_ok());
    }

    #[test]
    fn test_directory_archive_is_created() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let target = temp_dir.path().join("nested/archive");
        let location = ArchiveLocation::parse(&format!("file://{}", target.display())).unwrap();

        assert_eq!(
            location,
            ArchiveLocation::Directory(target.display().to_string())
        );
        assert!(location.open().is_ok());
        assert!(target.is_dir());
    }

    #[test]
    fn test_file_dsn_path_relative_and_absolute() {
        let relative = Url::parse("file:///.data/archive").unwrap();
        assert_eq!(file_dsn_path(&relative).unwrap(), ".data/archive");

        let absolute = Url::parse("file:///srv/archive").unwrap();
        assert_eq!(file_dsn_path(&absolute).unwrap(), "/srv/archive");
    }

    #[test]
    fn test_rejected_dsns() {
        let err = ArchiveLocation::parse("not-a-url").unwrap_err();
        assert!(err.to_string().contains("Invalid archive DSN"));

        let err = ArchiveLocation::parse("gcs://bucket/prefix").unwrap_err();
        assert!(err.to_string().contains("Unsupported archive scheme"));

        let err = ArchiveLocation::parse("file://").unwrap_err();
        assert!(err.to_string().contains("File DSN must specify a path"));

        let err = ArchiveLocation::parse("s3://localhost:9000/").unwrap_err();
        assert!(err.to_string().contains("must specify a bucket"));
    }

    #[test]
    fn test_s3_compatible_location() {
        let location =
            ArchiveLocation::parse("s3://access:secret@minio:9000/archive?region=eu-west-1")
                .unwrap();
        assert_eq!(
            location,
            ArchiveLocation::S3 {
                endpoint: Some("http://minio:9000".to_string()),
                bucket: "archive".to_string(),
                region: Some("eu-west-1".to_string()),
                credentials: Some(("access".to_string(), "secret".to_string())),
            }
        );
    }

    #[test]
    fn test_aws_location_has_no_endpoint() {
        let location = ArchiveLocation::parse("s3://s3.eu-west-1.amazonaws.com/archive").unwrap();
        assert!(matches!(
            location,
            ArchiveLocation::S3 {
                endpoint: None,
                credentials: None,
                ..
            }
        ));
    }
}
