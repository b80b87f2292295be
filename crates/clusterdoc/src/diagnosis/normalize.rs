//! Reconciles the disjoint raw payloads into the cross-referenced
//! graph. A partially degraded cluster is the expected common case:
//! missing optional cross-references (shard stats nobody reported, an
//! unassigned shard without a node) degrade to absent references and
//! never abort normalization.

use std::collections::{BTreeMap, BTreeSet};

use crate::api::{meta, stats};
use crate::hotthreads::HotThreadGroup;
use crate::version::EsVersion;

use super::{Cluster, Diagnostics, Index, Node, Nodes, Shard, ShardState, Task};

pub(crate) struct Payloads {
    pub version: EsVersion,
    pub health: meta::ClusterHealth,
    pub state: meta::ClusterState,
    pub metadata: meta::IndicesMetadata,
    pub indices_stats: stats::IndicesStats,
    pub nodes_stats: stats::NodesStats,
    pub cluster_stats: stats::ClusterStats,
    pub tasks: stats::TasksResponse,
    pub hot_threads: HotThreadGroup,
}

pub(crate) fn build(payloads: Payloads) -> Diagnostics {
    let mut diag = Diagnostics {
        version: Some(payloads.version),
        cluster: Cluster {
            health: payloads.health,
            state: payloads.state,
            stats: payloads.cluster_stats,
        },
        hot_threads: payloads.hot_threads,
        ..Diagnostics::default()
    };

    build_nodes(&mut diag.nodes, &payloads.nodes_stats);
    build_indices(
        &mut diag.indices,
        &payloads.metadata,
        &payloads.indices_stats,
    );
    build_shards(&mut diag, &payloads.indices_stats);
    build_tasks(&mut diag.tasks, &payloads.tasks);

    tracing::debug!(
        nodes = diag.nodes.all.len(),
        indices = diag.indices.len(),
        shards = diag.shards.len(),
        tasks = diag.tasks.len(),
        "normalized cluster state"
    );
    diag
}

fn build_nodes(nodes: &mut Nodes, payload: &stats::NodesStats) {
    for (id, node_stats) in &payload.nodes {
        // a node may carry several roles and lands in every matching
        // role collection
        if node_stats.roles.iter().any(|role| role.starts_with("data")) {
            nodes.data.push(id.clone());
        }
        if node_stats.roles.iter().any(|role| role == "master") {
            nodes.master.push(id.clone());
        }
        nodes.all.insert(
            id.clone(),
            Node {
                id: id.clone(),
                name: node_stats.name.clone(),
                roles: node_stats.roles.clone(),
                stats: node_stats.clone(),
                shards: Vec::new(),
            },
        );
    }
}

fn build_indices(
    indices: &mut BTreeMap<String, Index>,
    metadata: &meta::IndicesMetadata,
    indices_stats: &stats::IndicesStats,
) {
    for (name, index_meta) in metadata {
        indices.insert(
            name.clone(),
            Index {
                name: name.clone(),
                metadata: Some(index_meta.clone()),
                stats: None,
                shards: Vec::new(),
                nodes: Vec::new(),
            },
        );
    }
    for (name, index_stats) in &indices_stats.indices {
        indices
            .entry(name.clone())
            .or_insert_with(|| Index {
                name: name.clone(),
                metadata: None,
                stats: None,
                shards: Vec::new(),
                nodes: Vec::new(),
            })
            .stats = Some(index_stats.clone());
    }
}

/// Walks the routing table shard by shard, locating the matching
/// shard-stats entry by node-assignment equality, and wires the shard
/// into both owner collections.
fn build_shards(diag: &mut Diagnostics, indices_stats: &stats::IndicesStats) {
    let mut touched: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

    let routing_indices = diag.cluster.state.routing_table.indices.clone();
    for (index_name, routing_table) in &routing_indices {
        // shard map keys are shard numbers as strings; walk them in
        // numeric order
        let mut shard_numbers: Vec<(i64, &String)> = routing_table
            .shards
            .keys()
            .filter_map(|key| key.parse::<i64>().ok().map(|number| (number, key)))
            .collect();
        shard_numbers.sort();

        for (number, key) in shard_numbers {
            for routing in &routing_table.shards[key] {
                let shard_stats = find_shard_stats(indices_stats, index_name, key, routing);
                let node_id = routing.node.clone();
                let id = format!(
                    "{}[{}][{}]@{}",
                    index_name,
                    number,
                    if routing.primary { "p" } else { "r" },
                    node_id.as_deref().unwrap_or("unassigned"),
                );

                let arena_idx = diag.shards.len();
                diag.shards.push(Shard {
                    id,
                    index: index_name.clone(),
                    number,
                    primary: routing.primary,
                    state: ShardState::parse(&routing.state),
                    node: node_id.clone(),
                    stats: shard_stats.cloned(),
                });

                let index = diag.indices.entry(index_name.clone()).or_insert_with(|| {
                    Index {
                        name: index_name.clone(),
                        metadata: None,
                        stats: None,
                        shards: Vec::new(),
                        nodes: Vec::new(),
                    }
                });
                index.shards.push(arena_idx);

                if let Some(node_id) = node_id {
                    if let Some(node) = diag.nodes.all.get_mut(&node_id) {
                        node.shards.push(arena_idx);
                    }
                    touched
                        .entry(index_name.clone())
                        .or_default()
                        .insert(node_id);
                }
            }
        }
    }

    // deduplicated set of touched nodes per index, ordered by node name
    for (index_name, node_ids) in touched {
        if let Some(index) = diag.indices.get_mut(&index_name) {
            let mut node_ids: Vec<String> = node_ids.into_iter().collect();
            node_ids.sort_by(|a, b| {
                let name_a = diag.nodes.all.get(a).map(|n| n.name.as_str()).unwrap_or(a);
                let name_b = diag.nodes.all.get(b).map(|n| n.name.as_str()).unwrap_or(b);
                name_a.cmp(name_b).then_with(|| a.cmp(b))
            });
            index.nodes = node_ids;
        }
    }
}

fn find_shard_stats<'a>(
    indices_stats: &'a stats::IndicesStats,
    index_name: &str,
    shard_key: &str,
    routing: &meta::ShardRouting,
) -> Option<&'a stats::ShardStats> {
    let copies = indices_stats
        .indices
        .get(index_name)?
        .shards
        .get(shard_key)?;
    // several copies of the same shard report stats; the one routed to
    // the same node is ours. No match is tolerated partial data.
    copies
        .iter()
        .find(|entry| Some(entry.routing.node.as_str()) == routing.node.as_deref())
}

fn build_tasks(arena: &mut Vec<Task>, payload: &stats::TasksResponse) {
    for info in payload.tasks.values() {
        add_task(arena, info, None);
    }
}

fn add_task(arena: &mut Vec<Task>, info: &stats::TaskInfo, parent: Option<usize>) -> usize {
    let arena_idx = arena.len();
    arena.push(Task {
        id: format!("{}:{}", info.node, info.id),
        node: info.node.clone(),
        action: info.action.clone(),
        description: info.description.clone(),
        running_time_nanos: info.running_time_in_nanos,
        cancellable: info.cancellable,
        parent,
        children: Vec::new(),
    });
    for child in &info.children {
        let child_idx = add_task(arena, child, Some(arena_idx));
        arena[arena_idx].children.push(child_idx);
    }
    arena_idx
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hotthreads::HotThreadGroup;

    fn node_stats(name: &str, roles: &[&str]) -> stats::NodeStats {
        stats::NodeStats {
            name: name.to_string(),
            roles: roles.iter().map(|r| r.to_string()).collect(),
            ..stats::NodeStats::default()
        }
    }

    fn routing(state: &str, primary: bool, node: Option<&str>) -> meta::ShardRouting {
        meta::ShardRouting {
            state: state.to_string(),
            primary,
            node: node.map(|n| n.to_string()),
            ..meta::ShardRouting::default()
        }
    }

    fn shard_stats_on(node: &str, docs: i64) -> stats::ShardStats {
        stats::ShardStats {
            routing: stats::ShardStatsRouting {
                node: node.to_string(),
                ..stats::ShardStatsRouting::default()
            },
            docs: stats::DocsStats {
                count: docs,
                deleted: 0,
            },
            ..stats::ShardStats::default()
        }
    }

    fn payloads() -> Payloads {
        let mut nodes_stats = stats::NodesStats::default();
        nodes_stats
            .nodes
            .insert("n1".to_string(), node_stats("zeta", &["data", "master"]));
        nodes_stats
            .nodes
            .insert("n2".to_string(), node_stats("alpha", &["data"]));

        let mut state = meta::ClusterState::default();
        let mut shards = BTreeMap::new();
        shards.insert(
            "0".to_string(),
            vec![
                routing("STARTED", true, Some("n1")),
                routing("STARTED", false, Some("n2")),
            ],
        );
        shards.insert(
            "1".to_string(),
            vec![
                routing("STARTED", true, Some("n2")),
                routing("UNASSIGNED", false, None),
            ],
        );
        state
            .routing_table
            .indices
            .insert("orders".to_string(), meta::IndexRoutingTable { shards });

        let mut indices_stats = stats::IndicesStats::default();
        let mut stat_shards = BTreeMap::new();
        stat_shards.insert(
            "0".to_string(),
            vec![shard_stats_on("n1", 100), shard_stats_on("n2", 100)],
        );
        stat_shards.insert("1".to_string(), vec![shard_stats_on("n2", 40)]);
        indices_stats.indices.insert(
            "orders".to_string(),
            stats::IndexStats {
                shards: stat_shards,
                ..stats::IndexStats::default()
            },
        );

        let mut metadata = meta::IndicesMetadata::default();
        metadata.insert(
            "orders".to_string(),
            meta::IndexMeta {
                settings: meta::IndexSettings {
                    index: meta::IndexSettingsInner {
                        number_of_replicas: Some("1".to_string()),
                        ..meta::IndexSettingsInner::default()
                    },
                },
            },
        );

        let mut tasks = stats::TasksResponse::default();
        tasks.tasks.insert(
            "n1:12".to_string(),
            stats::TaskInfo {
                node: "n1".to_string(),
                id: 12,
                action: "indices:data/write/bulk".to_string(),
                children: vec![stats::TaskInfo {
                    node: "n2".to_string(),
                    id: 34,
                    action: "indices:data/write/bulk[s]".to_string(),
                    ..stats::TaskInfo::default()
                }],
                ..stats::TaskInfo::default()
            },
        );

        Payloads {
            version: "7.10.2".parse().unwrap(),
            health: meta::ClusterHealth::default(),
            state,
            metadata,
            indices_stats,
            nodes_stats,
            cluster_stats: stats::ClusterStats::default(),
            tasks,
            hot_threads: HotThreadGroup::default(),
        }
    }

    #[test]
    fn test_every_shard_reachable_from_index_and_node() {
        let diag = build(payloads());
        assert_eq!(diag.shards.len(), 4);

        let index = &diag.indices["orders"];
        assert_eq!(index.shards.len(), 4);
        for &arena_idx in &index.shards {
            assert_eq!(diag.shards[arena_idx].index, "orders");
        }

        for node in diag.nodes.all.values() {
            for &arena_idx in &node.shards {
                assert_eq!(diag.shards[arena_idx].node.as_deref(), Some(node.id.as_str()));
            }
        }

        // every assigned shard appears in exactly one node's list
        let assigned: usize = diag
            .nodes
            .all
            .values()
            .map(|node| node.shards.len())
            .sum();
        assert_eq!(assigned, 3);
    }

    #[test]
    fn test_shard_stats_matched_by_node_assignment() {
        let diag = build(payloads());
        let replica_0 = diag
            .shards
            .iter()
            .find(|s| s.number == 0 && !s.primary)
            .unwrap();
        assert_eq!(replica_0.node.as_deref(), Some("n2"));
        assert_eq!(replica_0.stats.as_ref().unwrap().routing.node, "n2");
    }

    #[test]
    fn test_unassigned_shard_tolerated() {
        let diag = build(payloads());
        let unassigned = diag
            .shards
            .iter()
            .find(|s| s.state == ShardState::Unassigned)
            .unwrap();
        assert!(unassigned.node.is_none());
        assert!(unassigned.stats.is_none());
        assert_eq!(unassigned.id, "orders[1][r]@unassigned");
    }

    #[test]
    fn test_index_nodes_deduplicated_and_sorted_by_name() {
        let diag = build(payloads());
        // n2 hosts two shards but appears once; "alpha" (n2) sorts
        // before "zeta" (n1)
        assert_eq!(diag.indices["orders"].nodes, vec!["n2", "n1"]);
    }

    #[test]
    fn test_role_collections() {
        let diag = build(payloads());
        assert_eq!(diag.nodes.data, vec!["n1", "n2"]);
        assert_eq!(diag.nodes.master, vec!["n1"]);
    }

    #[test]
    fn test_task_forest_links_both_ways() {
        let diag = build(payloads());
        assert_eq!(diag.tasks.len(), 2);
        let root = &diag.tasks[0];
        assert_eq!(root.id, "n1:12");
        assert!(root.parent.is_none());
        assert_eq!(root.children, vec![1]);
        let child = &diag.tasks[1];
        assert_eq!(child.id, "n2:34");
        assert_eq!(child.parent, Some(0));
        assert!(child.children.is_empty());
    }

    #[test]
    fn test_routing_only_index_still_materializes() {
        let mut p = payloads();
        p.metadata.clear();
        p.indices_stats.indices.clear();
        let diag = build(p);
        let index = &diag.indices["orders"];
        assert!(index.metadata.is_none());
        assert!(index.stats.is_none());
        assert_eq!(index.shards.len(), 4);
        // stats are gone, shards degrade to stats-less
        assert!(diag.shards.iter().all(|s| s.stats.is_none()));
    }
}
