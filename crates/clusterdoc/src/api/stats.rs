//! Per-index, per-node and per-cluster statistics payloads, and the
//! pending-tasks tree.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::client::{ClientError, EsClient};

pub async fn nodes(
    client: &EsClient,
    cancel: &CancellationToken,
) -> Result<NodesStats, ClientError> {
    client.fetch_json("_nodes/stats", cancel).await
}

pub async fn indices(
    client: &EsClient,
    cancel: &CancellationToken,
) -> Result<IndicesStats, ClientError> {
    client
        .fetch_json("_stats?level=shards&expand_wildcards=all", cancel)
        .await
}

pub async fn cluster(
    client: &EsClient,
    cancel: &CancellationToken,
) -> Result<ClusterStats, ClientError> {
    client.fetch_json("_cluster/stats", cancel).await
}

pub async fn tasks(
    client: &EsClient,
    cancel: &CancellationToken,
) -> Result<TasksResponse, ClientError> {
    client
        .fetch_json("_tasks?detailed=true&group_by=parents", cancel)
        .await
}

//
// _nodes/stats
//

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NodesStats {
    pub nodes: BTreeMap<String, NodeStats>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeStats {
    pub name: String,
    pub roles: Vec<String>,
    pub fs: FsStats,
    pub jvm: JvmStats,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FsStats {
    pub total: FsTotals,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FsTotals {
    pub total_in_bytes: i64,
    pub free_in_bytes: i64,
    pub available_in_bytes: i64,
}

impl FsTotals {
    pub fn used_in_bytes(&self) -> i64 {
        self.total_in_bytes - self.available_in_bytes
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct JvmStats {
    pub mem: JvmMem,
    pub threads: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct JvmMem {
    pub heap_used_in_bytes: i64,
    pub heap_max_in_bytes: i64,
}

//
// _stats?level=shards
//

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IndicesStats {
    pub indices: BTreeMap<String, IndexStats>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexStats {
    pub primaries: StatGroup,
    pub total: StatGroup,
    pub shards: BTreeMap<String, Vec<ShardStats>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StatGroup {
    pub docs: DocsStats,
    pub store: StoreStats,
    pub segments: SegmentsStats,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ShardStats {
    pub routing: ShardStatsRouting,
    pub docs: DocsStats,
    pub store: StoreStats,
    pub segments: SegmentsStats,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ShardStatsRouting {
    pub state: String,
    pub primary: bool,
    pub node: String,
    pub relocating_node: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DocsStats {
    pub count: i64,
    pub deleted: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreStats {
    pub size_in_bytes: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentsStats {
    pub count: i64,
    pub memory_in_bytes: i64,
    pub terms_memory_in_bytes: i64,
    pub stored_fields_memory_in_bytes: i64,
    pub term_vectors_memory_in_bytes: i64,
    pub norms_memory_in_bytes: i64,
    pub points_memory_in_bytes: i64,
    pub doc_values_memory_in_bytes: i64,
    pub index_writer_memory_in_bytes: i64,
    pub version_map_memory_in_bytes: i64,
    pub fixed_bit_set_memory_in_bytes: i64,
}

//
// _cluster/stats
//

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterStats {
    pub cluster_name: String,
    pub status: String,
    pub indices: ClusterIndices,
    pub nodes: ClusterNodes,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterIndices {
    pub count: i64,
    pub shards: ClusterShards,
    pub docs: DocsStats,
    pub store: StoreStats,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterShards {
    pub total: i64,
    pub primaries: i64,
    pub replication: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterNodes {
    pub count: ClusterNodeCount,
    pub versions: Vec<String>,
    pub fs: FsTotals,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterNodeCount {
    pub total: i64,
    pub data: i64,
    pub master: i64,
    pub ingest: i64,
    pub coordinating_only: i64,
}

//
// _tasks?detailed=true&group_by=parents
//

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TasksResponse {
    pub tasks: BTreeMap<String, TaskInfo>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskInfo {
    pub node: String,
    pub id: i64,
    #[serde(rename = "type")]
    pub task_type: String,
    pub action: String,
    pub description: String,
    pub start_time_in_millis: i64,
    pub running_time_in_nanos: i64,
    pub cancellable: bool,
    pub parent_task_id: Option<String>,
    pub children: Vec<TaskInfo>,
}
