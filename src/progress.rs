//! Reindex progress reporting.
//!
//! Progress goes to **stderr** so stdout stays parseable for scripts.
//! Several corpora may report at once; each line carries its knowledgebase.

use std::io::Write;

/// A single progress event for one corpus.
#[derive(Clone, Debug)]
pub enum ReindexEvent {
    /// Walking the corpus directory. Total unknown.
    Scanning { knowledgebase: String },
    /// `n` of `total` parsed records written.
    Writing {
        knowledgebase: String,
        n: u64,
        total: u64,
    },
}

/// Receives progress events from the reindex pipeline.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ReindexEvent);
}

/// Human-friendly progress on stderr: "reindex android  writing  120 / 1,204 records".
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn report(&self, event: ReindexEvent) {
        let line = match &event {
            ReindexEvent::Scanning { knowledgebase } => {
                format!("reindex {}  scanning...\n", knowledgebase)
            }
            ReindexEvent::Writing {
                knowledgebase,
                n,
                total,
            } => format!(
                "reindex {}  writing  {} / {} records\n",
                knowledgebase,
                format_number(*n),
                format_number(*total)
            ),
        };
        let mut stderr = std::io::stderr().lock();
        let _ = stderr.write_all(line.as_bytes());
        let _ = stderr.flush();
    }
}

/// One JSON object per line on stderr.
pub struct JsonProgress;

impl ProgressReporter for JsonProgress {
    fn report(&self, event: ReindexEvent) {
        let obj = match &event {
            ReindexEvent::Scanning { knowledgebase } => serde_json::json!({
                "event": "progress",
                "knowledgebase": knowledgebase,
                "phase": "scanning"
            }),
            ReindexEvent::Writing {
                knowledgebase,
                n,
                total,
            } => serde_json::json!({
                "event": "progress",
                "knowledgebase": knowledgebase,
                "phase": "writing",
                "n": n,
                "total": total
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let mut stderr = std::io::stderr().lock();
            let _ = writeln!(stderr, "{}", line);
            let _ = stderr.flush();
        }
    }
}

pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _event: ReindexEvent) {}
}

pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn ProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
