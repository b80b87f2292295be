//! Command-line front end: flag parsing, sink selection and the
//! Ctrl-C-cancellable run.

use std::collections::HashSet;
use std::io;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;

use crate::client::EsClient;
use crate::diagnosis::comment::{CommentKind, CommentSink, JsonSink, TextSink};
use crate::diagnosis::{self, DiagnoseOptions};
use crate::hotthreads::{HotThreadsConfig, SampleKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    /// One comment per line, filtered by the -i/-s/-a/-w/-A flags.
    Text,
    /// All comments as a JSON array.
    Json,
    /// The whole diagnostics state as JSON, supporting data included.
    JsonDump,
}

#[derive(Debug, Parser)]
#[command(name = "clusterdoc")]
#[command(about = "Runs a series of diagnostics over an Elasticsearch cluster", long_about = None)]
pub struct Cli {
    /// HTTP endpoint of the cluster, e.g. https://some.address:9200
    pub endpoint: String,

    /// Log verbosity; repeat for more detail (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbosity: u8,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub format: Format,

    /// Same as --format=json
    #[arg(short = 'j', long)]
    pub json: bool,

    /// Same as --format=json-dump
    #[arg(short = 'J', long)]
    pub json_dump: bool,

    /// Also print informational comments (text format only)
    #[arg(short, long)]
    pub info: bool,

    /// Also print summary comments (text format only)
    #[arg(short, long)]
    pub summary: bool,

    /// Also print advice comments (text format only)
    #[arg(short, long)]
    pub advice: bool,

    /// Also print warning comments (text format only)
    #[arg(short, long)]
    pub warning: bool,

    /// Print all comments regardless of type (text format only)
    #[arg(short = 'A', long)]
    pub all: bool,

    /// Hot-thread sampling interval in milliseconds
    #[arg(long, default_value = "500")]
    pub ht_interval_ms: u64,

    /// Number of hot-thread stack snapshots per sample
    #[arg(long, default_value = "10")]
    pub ht_snapshots: u32,

    /// Number of hottest threads reported per node
    #[arg(long, default_value = "10")]
    pub ht_threads: u32,

    /// Per-request timeout in seconds
    #[arg(long, default_value = "30", env = "CLUSTERDOC_TIMEOUT_SECS")]
    pub timeout_secs: u64,
}

impl Cli {
    fn format(&self) -> Format {
        if self.json_dump {
            Format::JsonDump
        } else if self.json {
            Format::Json
        } else {
            self.format
        }
    }

    /// The comment kinds the text sink should print. Errors when no
    /// kind is selected, since a silent text run helps nobody.
    fn kinds(&self) -> Result<HashSet<CommentKind>> {
        if self.all {
            return Ok(CommentKind::all().into_iter().collect());
        }
        let mut kinds = HashSet::new();
        if self.info {
            kinds.insert(CommentKind::Info);
        }
        if self.summary {
            kinds.insert(CommentKind::Summary);
        }
        if self.advice {
            kinds.insert(CommentKind::Advice);
        }
        if self.warning {
            kinds.insert(CommentKind::Warning);
        }
        if kinds.is_empty() {
            anyhow::bail!(
                "need at least one comment level for the text format: \
                 use -A for all comments or a combination of -i, -s, -a and -w"
            );
        }
        Ok(kinds)
    }

    fn sink(&self) -> Result<Box<dyn CommentSink>> {
        Ok(match self.format() {
            Format::Text => Box::new(TextSink::new(io::stdout(), self.kinds()?)),
            Format::Json => Box::new(JsonSink::new(io::stdout(), false)),
            Format::JsonDump => Box::new(JsonSink::new(io::stdout(), true)),
        })
    }

    pub async fn run(self) -> Result<()> {
        let sink = self.sink()?;
        let client = EsClient::with_timeout(&self.endpoint, Duration::from_secs(self.timeout_secs))?;
        let options = DiagnoseOptions {
            hot_threads: HotThreadsConfig {
                interval: Duration::from_millis(self.ht_interval_ms),
                snapshots: self.ht_snapshots,
                threads: self.ht_threads,
                kinds: vec![SampleKind::Cpu, SampleKind::Block, SampleKind::Wait],
            },
        };

        let cancel = CancellationToken::new();
        let guard = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupted, cancelling the run");
                guard.cancel();
            }
        });

        diagnosis::diagnose(&client, &options, Some(sink.as_ref()), &cancel).await?;
        Ok(())
    }
}
