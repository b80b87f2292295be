//! Cluster diagnostics: fetch the runtime state of a search/storage cluster
//! (version, health, routing table, statistics, pending tasks, hot threads),
//! reconcile it into one cross-referenced model and run a battery of checks
//! over it, each emitting typed, coded diagnostic comments.

pub mod api;
pub mod cli;
pub mod client;
pub mod diagnosis;
pub mod hotthreads;
pub mod math;
pub mod units;
pub mod version;

pub use client::{ClientError, EsClient};
pub use diagnosis::comment::{Comment, CommentKind, CommentSink, JsonSink, TextSink};
pub use diagnosis::{diagnose, DiagnoseError, DiagnoseOptions, Diagnostics};
pub use version::EsVersion;
