//! Diagnostic comments and their presentation sinks. Checks write
//! message templates that start with a `CODE: ` prefix (letter + three
//! digits); the letter encodes the comment kind.

use std::collections::HashSet;
use std::io::Write;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Diagnostics;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommentKind {
    Info,
    Summary,
    Advice,
    Warning,
    /// Fallback for a template without a well-formed code; never
    /// selectable for printing.
    #[serde(rename = "?")]
    Unknown,
}

impl CommentKind {
    /// The four selectable kinds, in code-letter order.
    pub fn all() -> [CommentKind; 4] {
        [
            CommentKind::Info,
            CommentKind::Summary,
            CommentKind::Advice,
            CommentKind::Warning,
        ]
    }

    fn from_code_letter(letter: u8) -> Option<CommentKind> {
        match letter {
            b'I' => Some(CommentKind::Info),
            b'S' => Some(CommentKind::Summary),
            b'A' => Some(CommentKind::Advice),
            b'W' => Some(CommentKind::Warning),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub time: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: CommentKind,
    pub code: String,
    pub message: String,
}

impl Comment {
    pub fn new(message: impl Into<String>) -> Comment {
        Comment::at(Utc::now(), message)
    }

    pub fn at(time: DateTime<Utc>, message: impl Into<String>) -> Comment {
        let message = message.into();
        match split_code(&message) {
            Some((kind, code, rest)) => Comment {
                time,
                kind,
                code,
                message: rest,
            },
            None => {
                tracing::error!(
                    message,
                    "cannot infer comment kind: template does not start with a 'CODE: ' prefix"
                );
                Comment {
                    time,
                    kind: CommentKind::Unknown,
                    code: "????".to_string(),
                    message,
                }
            }
        }
    }
}

/// Splits a `"W101: rest of the message"` template into kind, code and
/// the remaining message.
fn split_code(message: &str) -> Option<(CommentKind, String, String)> {
    let bytes = message.as_bytes();
    if bytes.len() < 5 || bytes[4] != b':' {
        return None;
    }
    let kind = CommentKind::from_code_letter(bytes[0])?;
    if !bytes[1..4].iter().all(u8::is_ascii_digit) {
        return None;
    }
    let code = message[..4].to_string();
    let rest = message[5..].trim_start().to_string();
    Some((kind, code, rest))
}

/// Consumes the comment stream for presentation: called once before the
/// checks run, once per comment, and once after the last check.
pub trait CommentSink: Send + Sync {
    fn begin(&self, _diag: &Diagnostics) -> anyhow::Result<()> {
        Ok(())
    }
    fn write(&self, diag: &Diagnostics, comment: &Comment) -> anyhow::Result<()>;
    fn end(&self, diag: &Diagnostics) -> anyhow::Result<()>;
}

/// Emission capability handed to each check: appends to the run's
/// comment list and forwards to the configured sink.
pub struct Commenter<'a> {
    diag: &'a Diagnostics,
    sink: Option<&'a dyn CommentSink>,
}

impl<'a> Commenter<'a> {
    pub(crate) fn new(diag: &'a Diagnostics, sink: Option<&'a dyn CommentSink>) -> Commenter<'a> {
        Commenter { diag, sink }
    }

    pub fn comment(&self, message: impl Into<String>) {
        let comment = Comment::new(message);
        self.diag.add_comment(comment.clone());
        if let Some(sink) = self.sink {
            if let Err(error) = sink.write(self.diag, &comment) {
                tracing::error!(code = %comment.code, %error, "failed to write comment");
            }
        }
    }
}

//
// Text sink
//

#[derive(Debug, Default)]
struct KindCounts {
    infos: u64,
    summaries: u64,
    advices: u64,
    warnings: u64,
}

pub struct TextSink<W: Write + Send> {
    writer: Mutex<W>,
    kinds: HashSet<CommentKind>,
    counts: Mutex<KindCounts>,
}

impl<W: Write + Send> TextSink<W> {
    pub fn new(writer: W, kinds: HashSet<CommentKind>) -> TextSink<W> {
        TextSink {
            writer: Mutex::new(writer),
            kinds,
            counts: Mutex::new(KindCounts::default()),
        }
    }
}

impl<W: Write + Send> CommentSink for TextSink<W> {
    fn write(&self, _diag: &Diagnostics, comment: &Comment) -> anyhow::Result<()> {
        {
            let mut counts = self.counts.lock().unwrap();
            match comment.kind {
                CommentKind::Info => counts.infos += 1,
                CommentKind::Summary => counts.summaries += 1,
                CommentKind::Advice => counts.advices += 1,
                CommentKind::Warning => counts.warnings += 1,
                CommentKind::Unknown => {}
            }
        }
        if self.kinds.contains(&comment.kind) {
            let mut writer = self.writer.lock().unwrap();
            writeln!(writer, "{} {}", comment.code, comment.message)?;
        }
        Ok(())
    }

    fn end(&self, _diag: &Diagnostics) -> anyhow::Result<()> {
        let counts = self.counts.lock().unwrap();
        let mut writer = self.writer.lock().unwrap();
        writeln!(
            writer,
            "Result: {} warnings, {} advices, {} summaries and {} informational comments",
            counts.warnings, counts.advices, counts.summaries, counts.infos,
        )?;
        Ok(())
    }
}

//
// JSON sink
//

pub struct JsonSink<W: Write + Send> {
    writer: Mutex<W>,
    dump: bool,
}

impl<W: Write + Send> JsonSink<W> {
    /// With `dump` set the whole diagnostics state is emitted at the
    /// end of the run instead of just the comment list.
    pub fn new(writer: W, dump: bool) -> JsonSink<W> {
        JsonSink {
            writer: Mutex::new(writer),
            dump,
        }
    }
}

impl<W: Write + Send> CommentSink for JsonSink<W> {
    fn write(&self, _diag: &Diagnostics, _comment: &Comment) -> anyhow::Result<()> {
        Ok(())
    }

    fn end(&self, diag: &Diagnostics) -> anyhow::Result<()> {
        let mut writer = self.writer.lock().unwrap();
        if self.dump {
            serde_json::to_writer_pretty(&mut *writer, &diag.dump())?;
        } else {
            serde_json::to_writer_pretty(&mut *writer, &diag.comments())?;
        }
        writeln!(writer)?;
        Ok(())
    }
}
