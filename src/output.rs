use std::io::{self, Write};
use std::sync::Mutex;

use serde::Serialize;

use crate::app::{BatchPlan, OrganismLookup, ProgressEvent, ProgressSink, RunReport};

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Interactive,
    NonInteractive,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_reports(reports: &[RunReport]) -> io::Result<()> {
        Self::print_json(&reports)
    }

    pub fn print_batches(plan: &BatchPlan) -> io::Result<()> {
        Self::print_json(plan)
    }

    pub fn print_organism(lookup: &OrganismLookup) -> io::Result<()> {
        Self::print_json(lookup)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

/// Writes one line per progress event to stderr.
#[derive(Default)]
pub struct ConsoleSink {
    lock: Mutex<()>,
}

impl ConsoleSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn format_event(event: &ProgressEvent) -> String {
        match event.elapsed {
            Some(elapsed) => format!("{} ({:.1}s)", event.message, elapsed.as_secs_f64()),
            None => event.message.clone(),
        }
    }
}

impl ProgressSink for ConsoleSink {
    fn event(&self, event: ProgressEvent) {
        // Workers share the sink; keep lines whole.
        let _guard = self.lock.lock();
        let mut stderr = io::stderr();
        let _ = writeln!(stderr, "\x1b[2m{}\x1b[0m", Self::format_event(&event));
    }
}
