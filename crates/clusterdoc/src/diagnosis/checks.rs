//! The fixed rule battery. Every check reads the graph, emits zero or
//! more comments through the [`Commenter`], and may itself fail when it
//! cannot interpret its input. A failed check never stops its siblings.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::math;
use crate::units::{humanize_bytes, humanize_bytes_f};

use super::{Commenter, Diagnostics, ShardState};

#[derive(Debug, Error)]
pub enum CheckError {
    #[error("unrecognized cluster status {status:?}")]
    UnknownClusterStatus { status: String },
    #[error("shard {shard} is in an unrecognized state")]
    UnknownShardState { shard: String },
    #[error("index {index} has a non-numeric replica count {value:?}")]
    BadReplicaCount { index: String, value: String },
}

pub type Check = fn(&Diagnostics, &Commenter) -> Result<(), CheckError>;

/// The battery, in evaluation order.
pub const CHECKS: &[(&str, Check)] = &[
    ("cluster_health", cluster_health),
    ("replica_counts", replica_counts),
    ("shard_states", shard_states),
    ("storage_balance", storage_balance),
    ("disk_heterogeneity", disk_heterogeneity),
    ("segment_memory", segment_memory),
];

fn cluster_health(diag: &Diagnostics, commenter: &Commenter) -> Result<(), CheckError> {
    let health = &diag.cluster.health;
    match health.status.as_str() {
        "green" => {
            commenter.comment(format!(
                "S100: Cluster {} is green: {} indices with {} active shards ({} primaries) on {} data nodes",
                health.cluster_name,
                health.indices.len(),
                health.active_shards,
                health.active_primary_shards,
                health.number_of_data_nodes,
            ));
        }
        "red" => {
            // group "index (missing of total)" pairs by how many
            // primaries each index is missing
            let mut groups: BTreeMap<i64, Vec<String>> = BTreeMap::new();
            for (name, index) in &health.indices {
                let missing = index.number_of_shards - index.active_primary_shards;
                if missing > 0 {
                    groups.entry(missing).or_default().push(format!(
                        "{} ({} of {})",
                        name, missing, index.number_of_shards
                    ));
                }
            }
            for (missing, indices) in groups {
                commenter.comment(format!(
                    "W101: Cluster is red: {} indices are missing {} primary shards: {}",
                    indices.len(),
                    missing,
                    indices.join(", "),
                ));
            }
        }
        "yellow" => {
            let mut groups: BTreeMap<i64, Vec<String>> = BTreeMap::new();
            for (name, index) in &health.indices {
                let expected = index.number_of_shards * (1 + index.number_of_replicas);
                let missing = expected - index.active_shards;
                if missing > 0 {
                    groups.entry(missing).or_default().push(format!(
                        "{} ({} of {})",
                        name,
                        missing,
                        index.number_of_shards * index.number_of_replicas,
                    ));
                }
            }
            for (missing, indices) in groups {
                commenter.comment(format!(
                    "W102: Cluster is yellow: {} indices are missing {} replica shards: {}",
                    indices.len(),
                    missing,
                    indices.join(", "),
                ));
            }
        }
        other => {
            return Err(CheckError::UnknownClusterStatus {
                status: other.to_string(),
            })
        }
    }
    Ok(())
}

fn replica_counts(diag: &Diagnostics, commenter: &Commenter) -> Result<(), CheckError> {
    let total_nodes = diag.nodes.all.len() as i64;
    let mut per_count: BTreeMap<i64, i64> = BTreeMap::new();

    for (name, index) in &diag.indices {
        let Some(metadata) = &index.metadata else {
            continue;
        };
        let Some(raw) = &metadata.settings.index.number_of_replicas else {
            continue;
        };
        let replicas: i64 = raw.parse().map_err(|_| CheckError::BadReplicaCount {
            index: name.clone(),
            value: raw.clone(),
        })?;
        *per_count.entry(replicas).or_default() += 1;

        let hosting = index.nodes.len() as i64;
        // an empty node map would make the percentage NaN
        let spread = if total_nodes > 0 {
            let (num, den, pct) = math::fraction(hosting, total_nodes);
            format!("hosted on {}/{} ({:.1}%) of the nodes", num, den, pct)
        } else {
            "hosted on 0 known nodes".to_string()
        };
        if replicas == 0 {
            commenter.comment(format!(
                "W110: Index {} has no replicas: one node failure away from data loss, {}",
                name, spread,
            ));
        } else if replicas > 2 {
            commenter.comment(format!(
                "A111: Index {} has {} replicas, more than commonly needed, {}",
                name, replicas, spread,
            ));
        } else {
            commenter.comment(format!(
                "I112: Index {} has {} replica(s), {}",
                name, replicas, spread,
            ));
        }
    }

    for (replicas, count) in per_count {
        commenter.comment(format!(
            "S113: {} indices are configured with {} replica(s)",
            count, replicas,
        ));
    }
    Ok(())
}

fn shard_states(diag: &Diagnostics, commenter: &Commenter) -> Result<(), CheckError> {
    let mut per_state: BTreeMap<ShardState, i64> = BTreeMap::new();

    for shard in &diag.shards {
        if shard.state == ShardState::Unknown {
            return Err(CheckError::UnknownShardState {
                shard: shard.id.clone(),
            });
        }
        *per_state.entry(shard.state).or_default() += 1;

        let stats = shard.stats.clone().unwrap_or_default();
        let avg_doc = if stats.docs.count > 0 {
            stats.store.size_in_bytes as f64 / stats.docs.count as f64
        } else {
            0.0
        };
        commenter.comment(format!(
            "I120: Shard {} is {}: {} docs in {} (avg doc size {}), {} segments using {}",
            shard.id,
            shard.state,
            stats.docs.count,
            humanize_bytes(stats.store.size_in_bytes),
            humanize_bytes_f(avg_doc),
            stats.segments.count,
            humanize_bytes(stats.segments.memory_in_bytes),
        ));
        if !shard.state.is_terminal() {
            commenter.comment(format!("W121: Shard {} is {}", shard.id, shard.state));
        }
    }

    let total = diag.shards.len() as i64;
    for (state, count) in per_state {
        commenter.comment(format!(
            "S122: {} shards ({:.1}%) are {}",
            count,
            math::pct(count, total),
            state,
        ));
    }
    Ok(())
}

fn storage_balance(diag: &Diagnostics, commenter: &Commenter) -> Result<(), CheckError> {
    let used: Vec<i64> = diag
        .nodes
        .all
        .values()
        .map(|node| node.stats.fs.total.used_in_bytes())
        .collect();
    let Some(dist) = math::percentiles(&used, 10) else {
        return Ok(());
    };

    let labels: Vec<String> = dist
        .iter()
        .enumerate()
        .map(|(i, bytes)| {
            let label = match i {
                0 => "min".to_string(),
                10 => "max".to_string(),
                _ => format!("p{}", i * 10),
            };
            format!("{} {}", label, humanize_bytes(*bytes))
        })
        .collect();
    commenter.comment(format!("S130: Node storage used: {}", labels.join(", ")));

    let median = dist[5] as f64;
    for node in diag.nodes.all.values() {
        let used = node.stats.fs.total.used_in_bytes() as f64;
        let direction = if used > median * 1.2 {
            "above"
        } else if used < median * 0.8 {
            "below"
        } else {
            continue;
        };
        commenter.comment(format!(
            "W131: Node {} uses {}, more than 20% {} the cluster median of {}",
            node.name,
            humanize_bytes_f(used),
            direction,
            humanize_bytes_f(median),
        ));
    }
    Ok(())
}

fn disk_heterogeneity(diag: &Diagnostics, commenter: &Commenter) -> Result<(), CheckError> {
    let mut per_size: BTreeMap<i64, i64> = BTreeMap::new();
    for node in diag.nodes.all.values() {
        *per_size
            .entry(node.stats.fs.total.total_in_bytes)
            .or_default() += 1;
    }
    if per_size.len() > 1 {
        let distribution: Vec<String> = per_size
            .iter()
            .map(|(size, count)| format!("{} nodes with {}", count, humanize_bytes(*size)))
            .collect();
        commenter.comment(format!(
            "W140: Nodes have heterogeneous disk sizes: {}",
            distribution.join(", "),
        ));
    }
    Ok(())
}

fn segment_memory(diag: &Diagnostics, commenter: &Commenter) -> Result<(), CheckError> {
    let mut categories: Vec<(&str, i64)> = vec![
        ("terms", 0),
        ("stored fields", 0),
        ("term vectors", 0),
        ("norms", 0),
        ("points", 0),
        ("doc values", 0),
        ("index writer", 0),
        ("version map", 0),
        ("fixed bit sets", 0),
    ];
    for shard in &diag.shards {
        let Some(stats) = &shard.stats else { continue };
        let segments = &stats.segments;
        for (name, sum) in categories.iter_mut() {
            *sum += match *name {
                "terms" => segments.terms_memory_in_bytes,
                "stored fields" => segments.stored_fields_memory_in_bytes,
                "term vectors" => segments.term_vectors_memory_in_bytes,
                "norms" => segments.norms_memory_in_bytes,
                "points" => segments.points_memory_in_bytes,
                "doc values" => segments.doc_values_memory_in_bytes,
                "index writer" => segments.index_writer_memory_in_bytes,
                "version map" => segments.version_map_memory_in_bytes,
                _ => segments.fixed_bit_set_memory_in_bytes,
            };
        }
    }

    let total: i64 = categories.iter().map(|(_, sum)| sum).sum();
    if total == 0 {
        commenter.comment("S150: Segment memory: 0b in use");
        return Ok(());
    }

    categories.sort_by(|a, b| b.1.cmp(&a.1));
    let breakdown: Vec<String> = categories
        .iter()
        .filter(|(_, sum)| *sum > 0)
        .map(|(name, sum)| {
            format!("{} {:.1}% ({})", name, math::pct(*sum, total), humanize_bytes(*sum))
        })
        .collect();
    commenter.comment(format!(
        "S150: Segment memory: {} in use: {}",
        humanize_bytes(total),
        breakdown.join(", "),
    ));
    Ok(())
}
