//! The diagnosis core: a cross-referenced, read-only model of the
//! cluster built from one fresh payload set, and a fixed battery of
//! independent checks run over it.
//!
//! Bidirectional references (shard to index, shard to node, task
//! parent/children) are expressed as stable ids and arena indices into
//! flat collections, never as owning pointers.

pub mod checks;
pub mod comment;
mod normalize;

pub use comment::{Comment, CommentKind, CommentSink, Commenter};

use std::collections::BTreeMap;
use std::fmt;
use std::sync::RwLock;

use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::api::{meta, stats};
use crate::client::{ClientError, EsClient};
use crate::hotthreads::{self, HotThreadGroup, HotThreadsConfig, HotThreadsError, SampleKind};
use crate::version::{self, EsVersion, VersionError};

#[derive(Debug, Error)]
pub enum DiagnoseError {
    #[error(transparent)]
    Version(#[from] VersionError),
    #[error(transparent)]
    Collect(#[from] ClientError),
    #[error(transparent)]
    HotThreads(#[from] HotThreadsError),
    #[error("{failed} checks failed")]
    Checks {
        failed: usize,
        /// The fully built graph with the partial comment stream;
        /// check failures never invalidate it.
        diagnostics: Box<Diagnostics>,
    },
}

#[derive(Debug, Clone)]
pub struct DiagnoseOptions {
    pub hot_threads: HotThreadsConfig,
}

impl Default for DiagnoseOptions {
    fn default() -> Self {
        Self {
            hot_threads: HotThreadsConfig {
                kinds: vec![SampleKind::Cpu, SampleKind::Block, SampleKind::Wait],
                ..HotThreadsConfig::default()
            },
        }
    }
}

//
// The normalized graph
//

#[derive(Debug, Clone, Default, Serialize)]
pub struct Cluster {
    pub health: meta::ClusterHealth,
    pub state: meta::ClusterState,
    pub stats: stats::ClusterStats,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Nodes {
    /// All nodes keyed by id.
    pub all: BTreeMap<String, Node>,
    /// Ids of nodes carrying a data role.
    pub data: Vec<String>,
    /// Ids of nodes carrying a master role.
    pub master: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Node {
    pub id: String,
    pub name: String,
    pub roles: Vec<String>,
    pub stats: stats::NodeStats,
    /// Indices into [`Diagnostics::shards`] of the shards this node hosts.
    pub shards: Vec<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Index {
    pub name: String,
    pub metadata: Option<meta::IndexMeta>,
    pub stats: Option<stats::IndexStats>,
    /// Indices into [`Diagnostics::shards`], in routing-table order.
    pub shards: Vec<usize>,
    /// Ids of the nodes hosting at least one shard of this index,
    /// deduplicated and sorted by node name.
    pub nodes: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ShardState {
    Unassigned,
    Initializing,
    Started,
    Relocating,
    Unknown,
}

impl ShardState {
    pub fn parse(s: &str) -> ShardState {
        match s {
            "UNASSIGNED" => ShardState::Unassigned,
            "INITIALIZING" => ShardState::Initializing,
            "STARTED" => ShardState::Started,
            "RELOCATING" => ShardState::Relocating,
            _ => ShardState::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ShardState::Unassigned => "UNASSIGNED",
            ShardState::Initializing => "INITIALIZING",
            ShardState::Started => "STARTED",
            ShardState::Relocating => "RELOCATING",
            ShardState::Unknown => "UNKNOWN",
        }
    }

    /// STARTED is the only terminal state; everything else is a shard
    /// in flight.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ShardState::Started)
    }
}

impl fmt::Display for ShardState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Shard {
    /// Stable id: `"{index}[{number}][p|r]@{node-id}"`.
    pub id: String,
    pub index: String,
    pub number: i64,
    pub primary: bool,
    pub state: ShardState,
    /// Owning node id; absent for unassigned shards.
    pub node: Option<String>,
    /// Matching shard-stats entry; absent when the stats payload has no
    /// entry routed to the same node (partial data, tolerated).
    pub stats: Option<stats::ShardStats>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Task {
    /// Synthetic id: `"{node-id}:{local-id}"`.
    pub id: String,
    pub node: String,
    pub action: String,
    pub description: String,
    pub running_time_nanos: i64,
    pub cancellable: bool,
    /// Arena index of the parent task; `None` for roots.
    pub parent: Option<usize>,
    /// Arena indices of the children.
    pub children: Vec<usize>,
}

/// The populated graph plus the accumulated comment stream. Built once
/// per run; read-only afterwards (checks never mutate it).
#[derive(Debug, Default, Serialize)]
pub struct Diagnostics {
    pub version: Option<EsVersion>,
    pub cluster: Cluster,
    pub nodes: Nodes,
    pub indices: BTreeMap<String, Index>,
    pub shards: Vec<Shard>,
    pub tasks: Vec<Task>,
    pub hot_threads: HotThreadGroup,
    #[serde(skip)]
    comments: RwLock<Vec<Comment>>,
}

#[derive(Serialize)]
pub struct DiagnosticsDump<'a> {
    #[serde(flatten)]
    diagnostics: &'a Diagnostics,
    comments: Vec<Comment>,
}

impl Diagnostics {
    /// Fetches one fresh payload set and normalizes it into the graph.
    /// Any collection or hot-thread parse failure aborts the run.
    pub async fn load(
        client: &EsClient,
        options: &DiagnoseOptions,
        cancel: &CancellationToken,
    ) -> Result<Diagnostics, DiagnoseError> {
        let version = version::discover(client, cancel).await?;
        tracing::info!(%version, "discovered cluster version");

        let health = meta::cluster_health(client, cancel).await?;
        let state = meta::cluster_state(client, cancel).await?;
        let metadata = meta::indices_settings(client, cancel).await?;
        let indices_stats = stats::indices(client, cancel).await?;
        let nodes_stats = stats::nodes(client, cancel).await?;
        let cluster_stats = stats::cluster(client, cancel).await?;
        let tasks = stats::tasks(client, cancel).await?;
        let hot_threads = hotthreads::collect(client, &options.hot_threads, cancel).await?;
        tracing::info!("fetched all supporting data");

        Ok(normalize::build(normalize::Payloads {
            version,
            health,
            state,
            metadata,
            indices_stats,
            nodes_stats,
            cluster_stats,
            tasks,
            hot_threads,
        }))
    }

    /// Runs the fixed check battery and returns the number of failed
    /// checks. Check failures never stop sibling checks; they are
    /// logged and surfaced only as that aggregate count.
    pub fn run_checks(&self, sink: Option<&dyn CommentSink>) -> usize {
        let commenter = Commenter::new(self, sink);
        let mut failed = 0;
        for (name, check) in checks::CHECKS {
            match check(self, &commenter) {
                Ok(()) => tracing::debug!(check = name, "check completed"),
                Err(error) => {
                    tracing::error!(check = name, %error, "check failed");
                    failed += 1;
                }
            }
        }
        failed
    }

    pub fn add_comment(&self, comment: Comment) {
        self.comments.write().unwrap().push(comment);
    }

    /// Snapshot of the comment stream; appends may continue while a
    /// snapshot is being taken.
    pub fn comments(&self) -> Vec<Comment> {
        self.comments.read().unwrap().clone()
    }

    /// Full serializable view of the run, comments included.
    pub fn dump(&self) -> DiagnosticsDump<'_> {
        DiagnosticsDump {
            diagnostics: self,
            comments: self.comments(),
        }
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.all.get(id)
    }
}

/// One-shot entry point: load the graph, run the battery, forwarding
/// comments to `sink` as they are produced. On check failure the graph
/// and its comment stream come back inside the `Checks` error.
pub async fn diagnose(
    client: &EsClient,
    options: &DiagnoseOptions,
    sink: Option<&dyn CommentSink>,
    cancel: &CancellationToken,
) -> Result<Diagnostics, DiagnoseError> {
    tracing::debug!(endpoint = client.endpoint(), "running diagnostics");
    let diagnostics = Diagnostics::load(client, options, cancel).await?;
    evaluate(diagnostics, sink)
}

fn evaluate(
    diagnostics: Diagnostics,
    sink: Option<&dyn CommentSink>,
) -> Result<Diagnostics, DiagnoseError> {
    if let Some(sink) = sink {
        if let Err(error) = sink.begin(&diagnostics) {
            tracing::error!(%error, "comment sink failed to begin");
        }
    }
    let failed = diagnostics.run_checks(sink);
    if let Some(sink) = sink {
        if let Err(error) = sink.end(&diagnostics) {
            tracing::error!(%error, "comment sink failed to end");
        }
    }

    if failed > 0 {
        return Err(DiagnoseError::Checks {
            failed,
            diagnostics: Box::new(diagnostics),
        });
    }
    Ok(diagnostics)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shard_state_parse() {
        assert_eq!(ShardState::parse("STARTED"), ShardState::Started);
        assert_eq!(ShardState::parse("UNASSIGNED"), ShardState::Unassigned);
        assert_eq!(ShardState::parse("INITIALIZING"), ShardState::Initializing);
        assert_eq!(ShardState::parse("RELOCATING"), ShardState::Relocating);
        assert_eq!(ShardState::parse("SOMETHING_ELSE"), ShardState::Unknown);
    }

    #[test]
    fn test_only_started_is_terminal() {
        assert!(ShardState::Started.is_terminal());
        assert!(!ShardState::Unassigned.is_terminal());
        assert!(!ShardState::Initializing.is_terminal());
        assert!(!ShardState::Relocating.is_terminal());
    }

    #[test]
    fn test_comments_snapshot_is_isolated() {
        let diag = Diagnostics::default();
        diag.add_comment(Comment::new("I001: first"));
        let snapshot = diag.comments();
        diag.add_comment(Comment::new("I002: second"));
        assert_eq!(snapshot.len(), 1);
        assert_eq!(diag.comments().len(), 2);
    }

    #[test]
    fn test_failing_checks_keep_graph_and_comments() {
        let mut diag = Diagnostics::default();
        diag.cluster.health.status = "chartreuse".to_string();
        let error = evaluate(diag, None).unwrap_err();
        match error {
            DiagnoseError::Checks {
                failed,
                diagnostics,
            } => {
                assert_eq!(failed, 1);
                // sibling checks still ran and their comments survive
                assert!(!diagnostics.comments().is_empty());
                assert_eq!(diagnostics.cluster.health.status, "chartreuse");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_passing_checks_return_the_graph() {
        let mut diag = Diagnostics::default();
        diag.cluster.health.status = "green".to_string();
        let diag = evaluate(diag, None).unwrap();
        assert!(diag.comments().iter().any(|c| c.code == "S100"));
    }

    #[test]
    fn test_dump_includes_comments() {
        let diag = Diagnostics::default();
        diag.add_comment(Comment::new("S100: totals"));
        let json = serde_json::to_value(diag.dump()).unwrap();
        assert_eq!(json["comments"].as_array().unwrap().len(), 1);
        assert!(json["shards"].as_array().unwrap().is_empty());
    }
}
