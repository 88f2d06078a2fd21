//! Event recording and replay.
//!
//! Every event the reactor handles can be appended to a log, one JSON object
//! per line, and a recorded log can be fed back through a fresh reactor to
//! reproduce the registry it built. Queries are not recorded; they carry
//! response channels.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use anyhow::Context;
use tracing::warn;

use crate::actor::reactor::{Event, Reactor};
use crate::common::config::Config;
use crate::model::server::Snapshot;

pub struct Record {
    out: Option<BufWriter<File>>,
}

impl Record {
    pub fn none() -> Record { Record { out: None } }

    pub fn to_file(path: &Path) -> anyhow::Result<Record> {
        let file = File::create(path)
            .with_context(|| format!("creating record file {}", path.display()))?;
        Ok(Record { out: Some(BufWriter::new(file)) })
    }

    pub(super) fn write(&mut self, event: &Event) {
        let Some(out) = &mut self.out else { return };
        // Unserializable events (queries) are skipped.
        if let Ok(line) = serde_json::to_string(event) {
            _ = writeln!(out, "{line}");
            _ = out.flush();
        }
    }
}

/// Replays a recorded event log through an inert reactor and returns the
/// registry state it ends up with.
pub fn replay(path: &Path, config: Config) -> anyhow::Result<Snapshot> {
    let file =
        File::open(path).with_context(|| format!("opening record file {}", path.display()))?;
    let mut reactor = Reactor::new_inert(config);
    for (lineno, line) in BufReader::new(file).lines().enumerate() {
        let line = line.context("reading record file")?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Event>(&line) {
            Ok(event) => reactor.handle_event(event),
            Err(err) => warn!(lineno, %err, "skipping unparseable event"),
        }
    }
    Ok(reactor.snapshot())
}
