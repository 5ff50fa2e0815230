use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::discovery::{Endpoints, Platform};

/// Default configuration file looked up in the working directory.
pub const CONFIG_FILENAME: &str = "datawarden.toml";

/// Environment variable prefix; nesting uses a double underscore.
pub const ENV_PREFIX: &str = "DATAWARDEN__";

/// Placeholder in the metadata DSN replaced by the discovered metadata host.
pub const METADATA_HOST_PLACEHOLDER: &str = "{metadata_host}";

/// Metadata store configuration (persisted dataset records).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MetadataConfig {
    /// Data source name (PostgreSQL or SQLite DSN).
    ///
    /// Env: DATAWARDEN__METADATA__DSN
    pub dsn: String,
    /// Table holding dataset records.
    ///
    /// Env: DATAWARDEN__METADATA__TABLE
    pub table: String,
    /// Maximum number of pooled connections.
    pub pool_size: u32,
    /// How long an operation waits for a pooled connection.
    #[serde(with = "humantime_serde")]
    pub acquire_timeout: Duration,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            dsn: String::from("sqlite://.data/datawarden.db"),
            table: String::from("platform_datasets"),
            pool_size: 8,
            acquire_timeout: Duration::from_secs(5),
        }
    }
}

impl MetadataConfig {
    /// In-memory metadata store, used for tests and throwaway runs.
    pub fn in_memory() -> Self {
        Self {
            dsn: String::from("sqlite::memory:"),
            ..Self::default()
        }
    }
}

/// Which hierarchical store implementation backs the dataset repository.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FilesystemBackend {
    /// A locally mounted filesystem.
    #[default]
    Local,
    /// HDFS over the WebHDFS REST API.
    WebHdfs,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FilesystemConfig {
    pub backend: FilesystemBackend,
    /// WebHDFS namenode address(es), comma separated (`host:port[,host:port]`).
    ///
    /// Filled from cluster discovery when unset.
    #[serde(default)]
    pub url: Option<String>,
    /// User name sent to WebHDFS.
    pub user: String,
    /// Mount point that store paths are resolved against for the local backend.
    pub root: String,
    /// Repository directory whose `source=<id>` children are the datasets.
    ///
    /// Env: DATAWARDEN__FILESYSTEM__DATA_REPO
    pub data_repo: String,
}

impl Default for FilesystemConfig {
    fn default() -> Self {
        Self {
            backend: FilesystemBackend::Local,
            url: None,
            user: String::from("hdfs"),
            root: String::from(".data/fs"),
            data_repo: String::from("/user/datawarden/datasets"),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ArchiveConfig {
    /// Object store DSN (`file://`, `memory://` or `s3://`).
    pub dsn: String,
    /// Key prefix archived files are written under.
    pub container: String,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            dsn: String::from("file:///.data/archive"),
            container: String::from("archive"),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct AmbariConfig {
    pub host: String,
    pub user: String,
    pub password: String,
}

/// Cluster endpoint discovery configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Discovery dialect.
    ///
    /// Env: DATAWARDEN__DISCOVERY__PLATFORM
    pub platform: Platform,
    /// Namenode address returned by the `local` dialect.
    pub hdfs_url: String,
    /// Metadata host returned by the `local` dialect.
    pub metadata_url: String,
    /// Service name prefix used by the `kubernetes` dialect.
    pub kubernetes_prefix: String,
    #[serde(default)]
    pub ambari: AmbariConfig,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            platform: Platform::Local,
            hdfs_url: String::from("localhost:50070"),
            metadata_url: String::from("localhost"),
            kubernetes_prefix: String::from("datawarden"),
            ambari: AmbariConfig::default(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Interval between reconciliation cycles.
    ///
    /// Env: DATAWARDEN__CATALOG__SYNC_INTERVAL
    #[serde(with = "humantime_serde")]
    pub sync_interval: Duration,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            sync_interval: Duration::from_secs(5),
        }
    }
}

/// A directory swept by age regardless of the catalog.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AgedDirConfig {
    pub path: String,
    #[serde(with = "humantime_serde")]
    pub max_age: Duration,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CleanerConfig {
    /// Enable retention sweeps.
    ///
    /// Env: DATAWARDEN__CLEANER__ENABLED
    #[serde(default)]
    pub enabled: bool,
    /// Interval between retention sweeps.
    ///
    /// Env: DATAWARDEN__CLEANER__SWEEP_INTERVAL
    #[serde(with = "humantime_serde")]
    pub sweep_interval: Duration,
    /// Log actions without executing them.
    ///
    /// Env: DATAWARDEN__CLEANER__DRY_RUN
    pub dry_run: bool,
    /// Scratch directories kept below `general_dirs_max_bytes`.
    #[serde(default)]
    pub general_dirs: Vec<String>,
    pub general_dirs_max_bytes: u64,
    /// Directories whose files are deleted once older than `max_age`.
    #[serde(default)]
    pub aged_dirs: Vec<AgedDirConfig>,
}

impl Default for CleanerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            sweep_interval: Duration::from_secs(3600),
            dry_run: true,
            general_dirs: Vec::new(),
            general_dirs_max_bytes: 2,
            aged_dirs: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Configuration {
    pub metadata: MetadataConfig,
    pub filesystem: FilesystemConfig,
    pub archive: ArchiveConfig,
    pub discovery: DiscoveryConfig,
    pub catalog: CatalogConfig,
    pub cleaner: CleanerConfig,
}

impl Configuration {
    fn figment() -> Figment {
        Figment::from(Serialized::defaults(Configuration::default()))
    }

    /// Load defaults, then `datawarden.toml`, then `DATAWARDEN__*` variables.
    pub fn load() -> Result<Self, Box<figment::Error>> {
        Self::figment()
            .merge(Toml::file(CONFIG_FILENAME))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(Box::new)
    }

    /// Same layering as [`Configuration::load`] with an explicit file.
    pub fn load_from_path(path: &Path) -> Result<Self, Box<figment::Error>> {
        Self::figment()
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(Box::new)
    }

    /// Fold discovered cluster endpoints into settings left unset.
    pub fn apply_endpoints(&mut self, endpoints: &Endpoints) {
        if self.filesystem.url.is_none() {
            self.filesystem.url = Some(endpoints.hdfs_url.clone());
        }
        if self.metadata.dsn.contains(METADATA_HOST_PLACEHOLDER) {
            self.metadata.dsn = self
                .metadata
                .dsn
                .replace(METADATA_HOST_PLACEHOLDER, &endpoints.metadata_url);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_configuration() {
        let config = Configuration::default();

        assert_eq!(config.metadata.dsn, "sqlite://.data/datawarden.db");
        assert_eq!(config.metadata.table, "platform_datasets");
        assert_eq!(config.metadata.pool_size, 8);
        assert_eq!(config.filesystem.backend, FilesystemBackend::Local);
        assert_eq!(config.catalog.sync_interval, Duration::from_secs(5));
        assert!(!config.cleaner.enabled);
        assert!(config.cleaner.dry_run);
        assert_eq!(config.cleaner.general_dirs_max_bytes, 2);
    }

    #[test]
    fn test_configless_operation() {
        let config = Figment::from(Serialized::defaults(Configuration::default()))
            .extract::<Configuration>()
            .unwrap();

        assert_eq!(config.archive.container, "archive");
        assert_eq!(config.discovery.platform, Platform::Local);
    }

    #[test]
    fn test_toml_and_env_layering() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                CONFIG_FILENAME,
                r#"
                [filesystem]
                backend = "webhdfs"
                data_repo = "/data/repo"

                [cleaner]
                enabled = true
                sweep_interval = "10m"
                general_dirs = ["/tmp/spark"]

                [[cleaner.aged_dirs]]
                path = "/var/old"
                max_age = "7days"
                "#,
            )?;
            jail.set_env("DATAWARDEN__METADATA__TABLE", "datasets_v2");

            let config = Configuration::load().map_err(|e| *e)?;

            assert_eq!(config.filesystem.backend, FilesystemBackend::WebHdfs);
            assert_eq!(config.filesystem.data_repo, "/data/repo");
            assert_eq!(config.metadata.table, "datasets_v2");
            assert!(config.cleaner.enabled);
            assert_eq!(config.cleaner.sweep_interval, Duration::from_secs(600));
            assert_eq!(config.cleaner.general_dirs, vec!["/tmp/spark".to_string()]);
            assert_eq!(
                config.cleaner.aged_dirs,
                vec![AgedDirConfig {
                    path: "/var/old".to_string(),
                    max_age: Duration::from_secs(7 * 86400),
                }]
            );
            Ok(())
        });
    }

    #[test]
    fn test_apply_endpoints_fills_unset_values() {
        let mut config = Configuration::default();
        config.metadata.dsn = "postgres://{metadata_host}/datawarden".to_string();

        config.apply_endpoints(&Endpoints {
            hdfs_url: "nn1:50070,nn2:50070".to_string(),
            metadata_url: "meta.internal".to_string(),
        });

        assert_eq!(
            config.filesystem.url.as_deref(),
            Some("nn1:50070,nn2:50070")
        );
        assert_eq!(config.metadata.dsn, "postgres://meta.internal/datawarden");
    }

    #[test]
    fn test_apply_endpoints_keeps_explicit_values() {
        let mut config = Configuration::default();
        config.filesystem.url = Some("explicit:50070".to_string());

        config.apply_endpoints(&Endpoints {
            hdfs_url: "discovered:50070".to_string(),
            metadata_url: "meta".to_string(),
        });

        assert_eq!(config.filesystem.url.as_deref(), Some("explicit:50070"));
        assert_eq!(config.metadata.dsn, "sqlite://.data/datawarden.db");
    }
}
