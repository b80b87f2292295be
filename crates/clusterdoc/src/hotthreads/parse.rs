//! Parser for the raw hot-threads text dump. The format is line
//! oriented and recognized by indentation prefix, most specific first:
//!
//! ```text
//! ::: {node-name}{node-id}{ephemeral-id}{host}{ip}{roles}
//!    Hot threads at 2021-04-01T10:00:00Z, interval=500ms, ...
//!    28.1% (140.5ms out of 500ms) cpu usage by thread 'search[T#4]'
//!      9/10 snapshots sharing following 8 elements
//!        java.base@15.0.1/jdk.internal.misc.Unsafe.park(Native Method)
//!        ...
//!      unique snapshot
//!        ...
//! ```

use std::collections::BTreeMap;
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use thiserror::Error;

use super::{HotThreads, NodeThreads, SampleKind, SnapshotSummary, Thread};

const NODE_PREFIX: &str = "::: ";
const TITLE_PREFIX: &str = "   Hot threads at ";
const THREAD_PREFIX: &str = "   ";
const SNAPSHOTS_PREFIX: &str = "     ";
const STACK_PREFIX: &str = "       ";

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("could not parse node line {line}: {content:?}")]
    NodeLine { line: usize, content: String },
    #[error("could not parse thread line {line}: {content:?}")]
    ThreadLine { line: usize, content: String },
    #[error("could not parse snapshot line {line}: {content:?}")]
    SnapshotLine { line: usize, content: String },
    #[error("thread line {line} appears before any node header: {content:?}")]
    ThreadOutsideNode { line: usize, content: String },
    #[error("snapshot line {line} appears before any thread header: {content:?}")]
    SnapshotOutsideThread { line: usize, content: String },
    #[error("stack line {line} appears before any snapshot header: {content:?}")]
    StackOutsideSnapshot { line: usize, content: String },
}

struct Patterns {
    // first brace-delimited token of a node boundary line holds the name
    node_id: Regex,
    // 28.1% (140.5ms out of 500ms) cpu usage by thread 'search[T#4]'
    // The closing quote of the thread name is sometimes missing, so it
    // is not required.
    thread: Regex,
    // 9/10 snapshots sharing following 8 elements
    snapshots: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        node_id: Regex::new(r"^\{([^}]+)\}").unwrap(),
        thread: Regex::new(
            r"\d+(?:\.\d+)?% \((\d+(?:\.\d+)?)(\w+) out of (\d+(?:\.\d+)?)(\w+)\) (\w+) usage by thread '([^']+)",
        )
        .unwrap(),
        snapshots: Regex::new(r"^(\d+)/\d+ snapshots sharing following \d+ elements").unwrap(),
    })
}

pub fn parse(data: &str) -> Result<HotThreads, ParseError> {
    let patterns = patterns();
    let mut result = HotThreads {
        kind: None,
        nodes: BTreeMap::new(),
    };
    let mut current_node: Option<String> = None;

    for (idx, raw) in data.lines().enumerate() {
        let line = idx + 1;
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            continue;
        }

        if let Some(rest) = raw.strip_prefix(NODE_PREFIX) {
            let captures =
                patterns
                    .node_id
                    .captures(rest)
                    .ok_or_else(|| ParseError::NodeLine {
                        line,
                        content: raw.to_string(),
                    })?;
            let id = captures[1].to_string();
            result.nodes.insert(
                id.clone(),
                NodeThreads {
                    id: id.clone(),
                    threads: Vec::new(),
                },
            );
            current_node = Some(id);
        } else if raw.starts_with(TITLE_PREFIX) {
            // per-node sampling header, nothing worth keeping
        } else if raw.starts_with(STACK_PREFIX) {
            let snapshot = current_snapshot(&mut result, &current_node).ok_or_else(|| {
                ParseError::StackOutsideSnapshot {
                    line,
                    content: raw.to_string(),
                }
            })?;
            snapshot.stack.push(trimmed.to_string());
        } else if raw.starts_with(SNAPSHOTS_PREFIX) {
            let occurred = if trimmed == "unique snapshot" {
                1
            } else {
                let captures =
                    patterns
                        .snapshots
                        .captures(trimmed)
                        .ok_or_else(|| ParseError::SnapshotLine {
                            line,
                            content: raw.to_string(),
                        })?;
                captures[1].parse().map_err(|_| ParseError::SnapshotLine {
                    line,
                    content: raw.to_string(),
                })?
            };
            let thread = current_thread(&mut result, &current_node).ok_or_else(|| {
                ParseError::SnapshotOutsideThread {
                    line,
                    content: raw.to_string(),
                }
            })?;
            thread.snapshots.push(SnapshotSummary {
                occurred,
                stack: Vec::new(),
            });
        } else if raw.starts_with(THREAD_PREFIX) {
            let error = || ParseError::ThreadLine {
                line,
                content: raw.to_string(),
            };
            let captures = patterns.thread.captures(trimmed).ok_or_else(error)?;
            let time = parse_amount(&captures[1], &captures[2]).ok_or_else(error)?;
            let interval = parse_amount(&captures[3], &captures[4]).ok_or_else(error)?;
            let kind = SampleKind::parse(&captures[5]).ok_or_else(error)?;
            let name = captures[6].to_string();

            // the literal percentage in the dump is rounded, recompute it
            let usage_percent = time.as_secs_f64() / interval.as_secs_f64() * 100.0;

            // threads of one dump all sample the same dimension, so the
            // first one fixes the dump's kind
            if result.kind.is_none() {
                result.kind = Some(kind);
            }

            let node = current_node
                .as_ref()
                .and_then(|id| result.nodes.get_mut(id))
                .ok_or_else(|| ParseError::ThreadOutsideNode {
                    line,
                    content: raw.to_string(),
                })?;
            node.threads.push(Thread {
                name,
                kind,
                usage_percent,
                time,
                interval,
                snapshots: Vec::new(),
            });
        }
        // anything else (unindented noise) is skipped
    }

    Ok(result)
}

fn current_thread<'a>(
    result: &'a mut HotThreads,
    current_node: &Option<String>,
) -> Option<&'a mut Thread> {
    current_node
        .as_ref()
        .and_then(|id| result.nodes.get_mut(id))
        .and_then(|node| node.threads.last_mut())
}

fn current_snapshot<'a>(
    result: &'a mut HotThreads,
    current_node: &Option<String>,
) -> Option<&'a mut SnapshotSummary> {
    current_thread(result, current_node).and_then(|thread| thread.snapshots.last_mut())
}

fn parse_amount(amount: &str, unit: &str) -> Option<Duration> {
    let amount: f64 = amount.parse().ok()?;
    let unit = match unit {
        "nanos" | "ns" => Duration::from_nanos(1),
        "micros" | "us" => Duration::from_micros(1),
        "ms" => Duration::from_millis(1),
        "s" => Duration::from_secs(1),
        "m" => Duration::from_secs(60),
        "h" => Duration::from_secs(3600),
        _ => return None,
    };
    Some(unit.mul_f64(amount))
}

#[cfg(test)]
mod tests {
    use super::*;

    const DUMP: &str = "\
::: {node-alpha}{AbC123}{ephemeral}{10.0.0.1}{10.0.0.1:9300}{dm}
   Hot threads at 2021-04-01T10:00:00Z, interval=500ms, busiestThreads=10:
   23.4% (100ms out of 500ms) cpu usage by thread 'worker-1'
     9/10 snapshots sharing following 3 elements
       app.Search.run(Search.java:120)
       app.Query.execute(Query.java:88)
       java.lang.Thread.run(Thread.java:832)
     unique snapshot
       app.Idle.sleep(Idle.java:10)
   1.0% (5ms out of 500ms) cpu usage by thread 'worker-2'

::: {node-beta}{DeF456}{ephemeral}{10.0.0.2}{10.0.0.2:9300}{m}
   Hot threads at 2021-04-01T10:00:00Z, interval=500ms, busiestThreads=10:
   50.0% (250ms out of 500ms) cpu usage by thread 'merge[T#1]'
     unique snapshot
       app.Merge.run(Merge.java:41)
";

    #[test]
    fn test_parse_full_dump() {
        let parsed = parse(DUMP).unwrap();
        assert_eq!(parsed.kind, Some(SampleKind::Cpu));
        assert_eq!(parsed.nodes.len(), 2);

        let alpha = &parsed.nodes["node-alpha"];
        assert_eq!(alpha.threads.len(), 2);
        let worker = &alpha.threads[0];
        assert_eq!(worker.name, "worker-1");
        // 100ms / 500ms, not the literal 23.4%
        assert!((worker.usage_percent - 20.0).abs() < 1e-9);
        assert_eq!(worker.time, Duration::from_millis(100));
        assert_eq!(worker.interval, Duration::from_millis(500));
        assert_eq!(worker.snapshots.len(), 2);
        assert_eq!(worker.snapshots[0].occurred, 9);
        assert_eq!(worker.snapshots[0].stack.len(), 3);
        assert_eq!(
            worker.snapshots[0].stack[0],
            "app.Search.run(Search.java:120)"
        );
        assert_eq!(worker.snapshots[1].occurred, 1);
        assert_eq!(worker.snapshots[1].stack.len(), 1);

        let beta = &parsed.nodes["node-beta"];
        assert_eq!(beta.threads.len(), 1);
        assert!((beta.threads[0].usage_percent - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_malformed_thread_line_names_line_number() {
        let dump = "\
::: {node-alpha}{AbC123}
   Hot threads at 2021-04-01T10:00:00Z, interval=500ms:
   garbage that is not a thread header
";
        let error = parse(dump).unwrap_err();
        match error {
            ParseError::ThreadLine { line, content } => {
                assert_eq!(line, 3);
                assert!(content.contains("garbage"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_malformed_snapshot_line_names_line_number() {
        let dump = "\
::: {node-alpha}{AbC123}
   10.0% (50ms out of 500ms) cpu usage by thread 'worker-1'
     snapshots but not the expected shape
";
        let error = parse(dump).unwrap_err();
        match error {
            ParseError::SnapshotLine { line, .. } => assert_eq!(line, 3),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_kind_fixed_from_first_thread_line() {
        let dump = "\
::: {node-alpha}{AbC123}
   10.0% (50ms out of 500ms) wait usage by thread 'worker-1'
";
        let parsed = parse(dump).unwrap();
        assert_eq!(parsed.kind, Some(SampleKind::Wait));
    }

    #[test]
    fn test_micros_and_seconds_units() {
        let dump = "\
::: {node-alpha}{AbC123}
   10.0% (250micros out of 1s) cpu usage by thread 'worker-1'
";
        let parsed = parse(dump).unwrap();
        let thread = &parsed.nodes["node-alpha"].threads[0];
        assert_eq!(thread.time, Duration::from_micros(250));
        assert_eq!(thread.interval, Duration::from_secs(1));
        assert!((thread.usage_percent - 0.025).abs() < 1e-9);
    }

    #[test]
    fn test_unterminated_thread_name_is_accepted() {
        // some deployments hide the stack and drop the closing quote
        let dump = "\
::: {node-alpha}{AbC123}
   10.0% (50ms out of 500ms) cpu usage by thread '[REDACTED]
";
        let parsed = parse(dump).unwrap();
        assert_eq!(parsed.nodes["node-alpha"].threads[0].name, "[REDACTED]");
    }

    #[test]
    fn test_blank_lines_and_empty_input() {
        let parsed = parse("\n\n\n").unwrap();
        assert!(parsed.nodes.is_empty());
        assert_eq!(parsed.kind, None);
    }

    #[test]
    fn test_node_line_without_braces_fails() {
        let error = parse("::: bare words\n").unwrap_err();
        assert!(matches!(error, ParseError::NodeLine { line: 1, .. }));
    }

    #[test]
    fn test_stack_line_outside_snapshot_fails() {
        let dump = "\
::: {node-alpha}{AbC123}
   10.0% (50ms out of 500ms) cpu usage by thread 'worker-1'
       app.Search.run(Search.java:120)
";
        let error = parse(dump).unwrap_err();
        assert!(matches!(error, ParseError::StackOutsideSnapshot { line: 3, .. }));
    }
}
