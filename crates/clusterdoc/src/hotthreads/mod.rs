//! Live thread-activity collection. The cluster exposes one raw text
//! dump per sampling dimension (cpu, block, wait); collection fans out
//! one task per dimension and joins first-error-wins, cancelling the
//! in-flight fetches on the first failure.

pub mod parse;

pub use parse::{parse, ParseError};

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::client::{ClientError, EsClient};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleKind {
    Cpu,
    Block,
    Wait,
}

impl SampleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SampleKind::Cpu => "cpu",
            SampleKind::Block => "block",
            SampleKind::Wait => "wait",
        }
    }

    pub fn parse(s: &str) -> Option<SampleKind> {
        match s {
            "cpu" => Some(SampleKind::Cpu),
            "block" => Some(SampleKind::Block),
            "wait" => Some(SampleKind::Wait),
            _ => None,
        }
    }
}

impl fmt::Display for SampleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct HotThreadGroup {
    pub cpu: Option<HotThreads>,
    pub block: Option<HotThreads>,
    pub wait: Option<HotThreads>,
}

impl HotThreadGroup {
    pub fn set(&mut self, kind: SampleKind, threads: HotThreads) {
        match kind {
            SampleKind::Cpu => self.cpu = Some(threads),
            SampleKind::Block => self.block = Some(threads),
            SampleKind::Wait => self.wait = Some(threads),
        }
    }

    pub fn get(&self, kind: SampleKind) -> Option<&HotThreads> {
        match kind {
            SampleKind::Cpu => self.cpu.as_ref(),
            SampleKind::Block => self.block.as_ref(),
            SampleKind::Wait => self.wait.as_ref(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct HotThreads {
    /// Sampling dimension of the dump, fixed from the first thread-usage
    /// line encountered.
    pub kind: Option<SampleKind>,
    pub nodes: BTreeMap<String, NodeThreads>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NodeThreads {
    pub id: String,
    pub threads: Vec<Thread>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Thread {
    pub name: String,
    pub kind: SampleKind,
    /// Recomputed as time/interval, never taken from the literal
    /// percentage in the dump.
    pub usage_percent: f64,
    pub time: Duration,
    pub interval: Duration,
    pub snapshots: Vec<SnapshotSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SnapshotSummary {
    pub occurred: u32,
    pub stack: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct HotThreadsConfig {
    pub interval: Duration,
    pub snapshots: u32,
    pub threads: u32,
    pub kinds: Vec<SampleKind>,
}

impl Default for HotThreadsConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(500),
            snapshots: 10,
            threads: 10,
            kinds: vec![SampleKind::Cpu],
        }
    }
}

#[derive(Debug, Error)]
pub enum HotThreadsError {
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error("failed to parse hot threads dump from {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: ParseError,
    },
    #[error("hot threads collection task panicked")]
    Join,
}

fn dump_path(kind: SampleKind, config: &HotThreadsConfig) -> String {
    format!(
        "_nodes/hot_threads?interval={}ms&snapshots={}&threads={}&type={}",
        config.interval.as_millis(),
        config.snapshots,
        config.threads,
        kind,
    )
}

pub async fn collect(
    client: &EsClient,
    config: &HotThreadsConfig,
    cancel: &CancellationToken,
) -> Result<HotThreadGroup, HotThreadsError> {
    tracing::debug!(?config, "fetching hot threads");
    let client = client.clone();
    let config_owned = config.clone();
    collect_with(config.kinds.clone(), cancel.child_token(), move |kind, token| {
        let client = client.clone();
        let config = config_owned.clone();
        async move {
            let path = dump_path(kind, &config);
            let body = client.fetch_text(&path, &token).await?;
            parse(&body).map_err(|source| HotThreadsError::Parse { path, source })
        }
    })
    .await
}

/// Fan-out driver: one spawned task per sampling dimension, joined
/// first-error-wins. The first failure cancels `cancel`; results of
/// dimensions completing after that are discarded.
async fn collect_with<F, Fut>(
    kinds: Vec<SampleKind>,
    cancel: CancellationToken,
    fetch: F,
) -> Result<HotThreadGroup, HotThreadsError>
where
    F: Fn(SampleKind, CancellationToken) -> Fut,
    Fut: Future<Output = Result<HotThreads, HotThreadsError>> + Send + 'static,
{
    let mut set = JoinSet::new();
    for kind in kinds {
        let fut = fetch(kind, cancel.clone());
        set.spawn(async move { fut.await.map(|threads| (kind, threads)) });
    }

    let mut group = HotThreadGroup::default();
    let mut first_error = None;
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(Ok((kind, threads))) => {
                if first_error.is_none() {
                    group.set(kind, threads);
                }
            }
            Ok(Err(error)) => {
                if first_error.is_none() {
                    cancel.cancel();
                    first_error = Some(error);
                }
            }
            Err(_) => {
                if first_error.is_none() {
                    cancel.cancel();
                    first_error = Some(HotThreadsError::Join);
                }
            }
        }
    }

    match first_error {
        Some(error) => Err(error),
        None => Ok(group),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_threads(kind: SampleKind) -> HotThreads {
        HotThreads {
            kind: Some(kind),
            nodes: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn test_collect_all_dimensions() {
        let kinds = vec![SampleKind::Cpu, SampleKind::Block, SampleKind::Wait];
        let group = collect_with(kinds, CancellationToken::new(), |kind, _token| async move {
            Ok(empty_threads(kind))
        })
        .await
        .unwrap();
        assert!(group.cpu.is_some());
        assert!(group.block.is_some());
        assert!(group.wait.is_some());
    }

    #[tokio::test]
    async fn test_first_error_fails_the_collection() {
        let kinds = vec![SampleKind::Cpu, SampleKind::Block, SampleKind::Wait];
        let result = collect_with(kinds, CancellationToken::new(), |kind, token| async move {
            match kind {
                // "block" fails straight away; the others only finish once
                // the shared token is cancelled.
                SampleKind::Block => Err(HotThreadsError::Client(ClientError::Status {
                    path: "_nodes/hot_threads".to_string(),
                    status: 503,
                })),
                _ => {
                    token.cancelled().await;
                    Ok(empty_threads(kind))
                }
            }
        })
        .await;
        assert!(matches!(
            result,
            Err(HotThreadsError::Client(ClientError::Status { status: 503, .. }))
        ));
    }

    #[tokio::test]
    async fn test_failure_cancels_siblings() {
        let kinds = vec![SampleKind::Cpu, SampleKind::Block];
        let result = collect_with(kinds, CancellationToken::new(), |kind, token| async move {
            match kind {
                SampleKind::Block => Err(HotThreadsError::Client(ClientError::Cancelled)),
                _ => {
                    // would hang forever if the fan-out did not cancel
                    token.cancelled().await;
                    Err(HotThreadsError::Client(ClientError::Cancelled))
                }
            }
        })
        .await;
        assert!(result.is_err());
    }

    #[test]
    fn test_dump_path() {
        let config = HotThreadsConfig::default();
        assert_eq!(
            dump_path(SampleKind::Cpu, &config),
            "_nodes/hot_threads?interval=500ms&snapshots=10&threads=10&type=cpu"
        );
    }

    #[test]
    fn test_group_set_and_get() {
        let mut group = HotThreadGroup::default();
        group.set(SampleKind::Wait, empty_threads(SampleKind::Wait));
        assert!(group.get(SampleKind::Wait).is_some());
        assert!(group.get(SampleKind::Cpu).is_none());
    }

    #[test]
    fn test_sample_kind_round_trip() {
        for kind in [SampleKind::Cpu, SampleKind::Block, SampleKind::Wait] {
            assert_eq!(SampleKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(SampleKind::parse("gpu"), None);
    }
}
