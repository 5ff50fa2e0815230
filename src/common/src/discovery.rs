//! Cluster endpoint discovery.
//!
//! Resolves the two addresses the rest of the system needs: the HDFS
//! namenode(s) and the metadata store host. One implementation per cluster
//! manager dialect, picked by `discovery.platform`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::config::{AmbariConfig, DiscoveryConfig};

/// Default WebHDFS port on a namenode.
pub const WEBHDFS_PORT: u16 = 50070;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// Fixed addresses from configuration.
    Local,
    /// Well-known service names inside a Kubernetes namespace.
    Kubernetes,
    /// Hortonworks clusters managed by Ambari.
    Ambari,
    /// Cloudera Manager. Recognised but not supported.
    Cloudera,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoints {
    /// `host:port[,host:port]` of the WebHDFS namenode(s).
    pub hdfs_url: String,
    /// Host of the metadata store.
    pub metadata_url: String,
}

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("discovery platform '{0:?}' is not supported")]
    Unsupported(Platform),

    #[error("cluster manager request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("cluster manager returned no {0}")]
    MissingComponent(&'static str),
}

#[async_trait]
pub trait ClusterDiscovery: Send + Sync {
    async fn discover(&self) -> Result<Endpoints, DiscoveryError>;
}

/// Endpoints taken verbatim from configuration.
#[derive(Debug, Clone)]
pub struct StaticDiscovery {
    endpoints: Endpoints,
}

impl StaticDiscovery {
    pub fn new(endpoints: Endpoints) -> Self {
        Self { endpoints }
    }
}

#[async_trait]
impl ClusterDiscovery for StaticDiscovery {
    async fn discover(&self) -> Result<Endpoints, DiscoveryError> {
        Ok(self.endpoints.clone())
    }
}

#[derive(Debug, Clone)]
pub struct KubernetesDiscovery {
    prefix: String,
}

impl KubernetesDiscovery {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

#[async_trait]
impl ClusterDiscovery for KubernetesDiscovery {
    async fn discover(&self) -> Result<Endpoints, DiscoveryError> {
        Ok(Endpoints {
            hdfs_url: format!("{}-hdfs-namenode:{WEBHDFS_PORT}", self.prefix),
            metadata_url: format!("{}-hbase-master", self.prefix),
        })
    }
}

#[derive(Debug, Deserialize)]
struct ClusterList {
    items: Vec<ClusterItem>,
}

#[derive(Debug, Deserialize)]
struct ClusterItem {
    #[serde(rename = "Clusters")]
    clusters: ClusterName,
}

#[derive(Debug, Deserialize)]
struct ClusterName {
    cluster_name: String,
}

#[derive(Debug, Deserialize)]
struct ComponentDetail {
    #[serde(default)]
    host_components: Vec<HostComponent>,
}

#[derive(Debug, Deserialize)]
struct HostComponent {
    #[serde(rename = "HostRoles")]
    host_roles: HostRoles,
}

#[derive(Debug, Deserialize)]
struct HostRoles {
    host_name: String,
}

impl ComponentDetail {
    fn hosts(&self) -> Vec<&str> {
        self.host_components
            .iter()
            .map(|c| c.host_roles.host_name.as_str())
            .collect()
    }
}

/// Queries the Ambari REST API for namenode and metadata master hosts.
#[derive(Debug, Clone)]
pub struct AmbariDiscovery {
    base_url: String,
    config: AmbariConfig,
    client: reqwest::Client,
}

impl AmbariDiscovery {
    pub fn new(config: AmbariConfig) -> Self {
        let base_url = if config.host.starts_with("http") {
            format!("{}/api/v1", config.host.trim_end_matches('/'))
        } else {
            format!("http://{}:8080/api/v1", config.host)
        };
        Self {
            base_url,
            config,
            client: reqwest::Client::new(),
        }
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, uri: &str) -> Result<T, DiscoveryError> {
        let response = self
            .client
            .get(format!("{}{uri}", self.base_url))
            .basic_auth(&self.config.user, Some(&self.config.password))
            .header("X-Requested-By", &self.config.user)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }

    async fn component(
        &self,
        cluster: &str,
        service: &str,
        component: &str,
    ) -> Result<ComponentDetail, DiscoveryError> {
        self.get(&format!(
            "/clusters/{cluster}/services/{service}/components/{component}"
        ))
        .await
    }
}

fn namenode_list(hosts: &[&str]) -> String {
    hosts
        .iter()
        .map(|host| format!("{host}:{WEBHDFS_PORT}"))
        .collect::<Vec<_>>()
        .join(",")
}

#[async_trait]
impl ClusterDiscovery for AmbariDiscovery {
    async fn discover(&self) -> Result<Endpoints, DiscoveryError> {
        let clusters: ClusterList = self.get("/clusters").await?;
        let cluster = clusters
            .items
            .first()
            .map(|item| item.clusters.cluster_name.clone())
            .ok_or(DiscoveryError::MissingComponent("cluster"))?;

        let namenodes = self.component(&cluster, "HDFS", "NAMENODE").await?;
        let namenode_hosts = namenodes.hosts();
        if namenode_hosts.is_empty() {
            return Err(DiscoveryError::MissingComponent("NAMENODE"));
        }

        let masters = self.component(&cluster, "HBASE", "HBASE_MASTER").await?;
        let master = masters
            .hosts()
            .first()
            .map(|host| host.to_string())
            .ok_or(DiscoveryError::MissingComponent("HBASE_MASTER"))?;

        Ok(Endpoints {
            hdfs_url: namenode_list(&namenode_hosts),
            metadata_url: master,
        })
    }
}

/// Pick the discovery dialect named in configuration.
pub fn create_discovery(
    config: &DiscoveryConfig,
) -> Result<Box<dyn ClusterDiscovery>, DiscoveryError> {
    info!(platform = ?config.platform, "Using cluster discovery");
    match config.platform {
        Platform::Local => Ok(Box::new(StaticDiscovery::new(Endpoints {
            hdfs_url: config.hdfs_url.clone(),
            metadata_url: config.metadata_url.clone(),
        }))),
        Platform::Kubernetes => Ok(Box::new(KubernetesDiscovery::new(
            config.kubernetes_prefix.clone(),
        ))),
        Platform::Ambari => Ok(Box::new(AmbariDiscovery::new(config.ambari.clone()))),
        Platform::Cloudera => Err(DiscoveryError::Unsupported(Platform::Cloudera)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_local_discovery_uses_configuration() {
        let config = DiscoveryConfig::default();
        let endpoints = create_discovery(&config).unwrap().discover().await.unwrap();
        assert_eq!(endpoints.hdfs_url, "localhost:50070");
        assert_eq!(endpoints.metadata_url, "localhost");
    }

    #[tokio::test]
    async fn test_kubernetes_service_names() {
        let endpoints = KubernetesDiscovery::new("pnda").discover().await.unwrap();
        assert_eq!(endpoints.hdfs_url, "pnda-hdfs-namenode:50070");
        assert_eq!(endpoints.metadata_url, "pnda-hbase-master");
    }

    #[test]
    fn test_cloudera_is_rejected() {
        let config = DiscoveryConfig {
            platform: Platform::Cloudera,
            ..DiscoveryConfig::default()
        };
        assert!(matches!(
            create_discovery(&config),
            Err(DiscoveryError::Unsupported(Platform::Cloudera))
        ));
    }

    #[test]
    fn test_ambari_component_parsing() {
        let body = r#"{"host_components":[
            {"HostRoles":{"host_name":"nn1.cluster","component_name":"NAMENODE"}},
            {"HostRoles":{"host_name":"nn2.cluster","component_name":"NAMENODE"}}
        ]}"#;
        let detail: ComponentDetail = serde_json::from_str(body).unwrap();
        assert_eq!(
            namenode_list(&detail.hosts()),
            "nn1.cluster:50070,nn2.cluster:50070"
        );

        let clusters: ClusterList =
            serde_json::from_str(r#"{"items":[{"Clusters":{"cluster_name":"pnda"}}]}"#).unwrap();
        assert_eq!(clusters.items[0].clusters.cluster_name, "pnda");
    }

    #[test]
    fn test_ambari_base_url() {
        let discovery = AmbariDiscovery::new(AmbariConfig {
            host: "ambari.internal".to_string(),
            ..AmbariConfig::default()
        });
        assert_eq!(discovery.base_url, "http://ambari.internal:8080/api/v1");
    }
}
