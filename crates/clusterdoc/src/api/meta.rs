//! Cluster health, routing table and index settings payloads.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::client::{ClientError, EsClient};

pub async fn cluster_health(
    client: &EsClient,
    cancel: &CancellationToken,
) -> Result<ClusterHealth, ClientError> {
    client.fetch_json("_cluster/health?level=indices", cancel).await
}

pub async fn cluster_state(
    client: &EsClient,
    cancel: &CancellationToken,
) -> Result<ClusterState, ClientError> {
    client.fetch_json("_cluster/state/routing_table", cancel).await
}

pub async fn indices_settings(
    client: &EsClient,
    cancel: &CancellationToken,
) -> Result<IndicesMetadata, ClientError> {
    client.fetch_json("_all/_settings", cancel).await
}

//
// _cluster/health?level=indices
//

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterHealth {
    pub cluster_name: String,
    pub status: String,
    pub number_of_nodes: i64,
    pub number_of_data_nodes: i64,
    pub active_primary_shards: i64,
    pub active_shards: i64,
    pub relocating_shards: i64,
    pub initializing_shards: i64,
    pub unassigned_shards: i64,
    pub indices: BTreeMap<String, IndexHealth>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexHealth {
    pub status: String,
    pub number_of_shards: i64,
    pub number_of_replicas: i64,
    pub active_primary_shards: i64,
    pub active_shards: i64,
    pub initializing_shards: i64,
    pub unassigned_shards: i64,
}

//
// _cluster/state/routing_table
//

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterState {
    pub cluster_name: String,
    pub routing_table: RoutingTable,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingTable {
    pub indices: BTreeMap<String, IndexRoutingTable>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexRoutingTable {
    pub shards: BTreeMap<String, Vec<ShardRouting>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ShardRouting {
    pub state: String,
    pub primary: bool,
    pub node: Option<String>,
    pub relocating_node: Option<String>,
    pub shard: i64,
    pub index: String,
}

//
// _all/_settings
//

pub type IndicesMetadata = BTreeMap<String, IndexMeta>;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexMeta {
    pub settings: IndexSettings,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexSettings {
    pub index: IndexSettingsInner,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexSettingsInner {
    pub number_of_shards: Option<String>,
    pub number_of_replicas: Option<String>,
    pub uuid: Option<String>,
    pub creation_date: Option<String>,
}
