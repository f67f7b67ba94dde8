//! Operator event log
//!
//! A bounded ring buffer of [`LogEntry`] values consumed by the monitoring
//! surface. Entries are optionally journaled to a JSON-lines file so the log
//! can be queried after a restart. Every entry is mirrored to `tracing`.

use crate::domain::{EntityKind, ExporterError, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{mpsc, Mutex, MutexGuard};
use std::thread;

/// Severity shown to the operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
    Success,
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "info" => Ok(LogLevel::Info),
            "warning" | "warn" => Ok(LogLevel::Warning),
            "error" => Ok(LogLevel::Error),
            "success" => Ok(LogLevel::Success),
            other => Err(format!(
                "Unknown log level '{other}'. Must be one of: info, warning, error, success"
            )),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogLevel::Info => "info",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
            LogLevel::Success => "success",
        };
        f.write_str(s)
    }
}

/// Component an entry is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum LogSource {
    Entity(EntityKind),
    Sheets,
    System,
    Webhook,
}

impl From<EntityKind> for LogSource {
    fn from(kind: EntityKind) -> Self {
        LogSource::Entity(kind)
    }
}

impl fmt::Display for LogSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogSource::Entity(kind) => kind.fmt(f),
            LogSource::Sheets => f.write_str("sheets"),
            LogSource::System => f.write_str("system"),
            LogSource::Webhook => f.write_str("webhook"),
        }
    }
}

impl FromStr for LogSource {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sheets" => Ok(LogSource::Sheets),
            "system" => Ok(LogSource::System),
            "webhook" => Ok(LogSource::Webhook),
            other => other.parse().map(LogSource::Entity),
        }
    }
}

impl TryFrom<String> for LogSource {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<LogSource> for String {
    fn from(source: LogSource) -> Self {
        source.to_string()
    }
}

/// One operator-facing event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub entity: LogSource,
    pub message: String,
}

impl LogEntry {
    pub fn new(level: LogLevel, entity: impl Into<LogSource>, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            entity: entity.into(),
            message: message.into(),
        }
    }
}

/// Filter for [`LogAggregator::query`]
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogQuery {
    #[serde(default)]
    pub entity: Option<LogSource>,
    #[serde(default)]
    pub level: Option<LogLevel>,
    /// Keep only the newest N matches
    #[serde(default)]
    pub limit: Option<usize>,
}

impl LogQuery {
    fn matches(&self, entry: &LogEntry) -> bool {
        self.entity.map_or(true, |e| e == entry.entity)
            && self.level.map_or(true, |l| l == entry.level)
    }
}

enum JournalOp {
    Append(LogEntry),
    Flush(mpsc::SyncSender<()>),
}

/// Channel to the thread that owns journal file I/O
struct JournalHandle {
    ops: Option<mpsc::Sender<JournalOp>>,
    worker: Option<thread::JoinHandle<()>>,
}

/// Bounded, optionally durable event log
///
/// Journal writes happen on a dedicated thread, so `record` never blocks on
/// disk. Several processes may share one journal file: opening never rewrites
/// it, every append reopens the path, and compaction re-reads the file first.
pub struct LogAggregator {
    capacity: usize,
    entries: Mutex<VecDeque<LogEntry>>,
    journal: Option<JournalHandle>,
}

impl LogAggregator {
    /// Memory-only aggregator; entries are lost on restart
    pub fn in_memory(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: Mutex::new(VecDeque::with_capacity(capacity.max(1))),
            journal: None,
        }
    }

    /// Open a journaled aggregator, replaying entries newer than `retention_days`
    ///
    /// The file is only read here; another process appending to it keeps
    /// a valid handle.
    ///
    /// # Errors
    ///
    /// Returns an error if the journal cannot be created or read.
    pub fn open(path: impl AsRef<Path>, capacity: usize, retention_days: u32) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let capacity = capacity.max(1);

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        OpenOptions::new().append(true).create(true).open(&path)?;

        let (entries, lines) = read_journal(&path, capacity, retention_cutoff(retention_days))?;

        tracing::debug!(
            path = %path.display(),
            replayed = entries.len(),
            lines,
            "Event journal opened"
        );

        let writer = JournalWriter {
            path,
            capacity,
            retention_days,
            lines,
        };
        let (ops, queue) = mpsc::channel();
        let worker = thread::Builder::new()
            .name("event-journal".to_string())
            .spawn(move || writer.run(queue))?;

        Ok(Self {
            capacity,
            entries: Mutex::new(entries),
            journal: Some(JournalHandle {
                ops: Some(ops),
                worker: Some(worker),
            }),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append an entry, evicting the oldest past capacity
    pub fn record(&self, entry: LogEntry) {
        mirror_to_tracing(&entry);

        {
            let mut entries = self.lock();
            if entries.len() == self.capacity {
                entries.pop_front();
            }
            entries.push_back(entry.clone());
        }

        if let Some(ops) = self.journal.as_ref().and_then(|j| j.ops.as_ref()) {
            if ops.send(JournalOp::Append(entry)).is_err() {
                tracing::warn!("Event journal writer stopped; entry kept in memory only");
            }
        }
    }

    pub fn info(&self, source: impl Into<LogSource>, message: impl Into<String>) {
        self.record(LogEntry::new(LogLevel::Info, source, message));
    }

    pub fn warning(&self, source: impl Into<LogSource>, message: impl Into<String>) {
        self.record(LogEntry::new(LogLevel::Warning, source, message));
    }

    pub fn error(&self, source: impl Into<LogSource>, message: impl Into<String>) {
        self.record(LogEntry::new(LogLevel::Error, source, message));
    }

    pub fn success(&self, source: impl Into<LogSource>, message: impl Into<String>) {
        self.record(LogEntry::new(LogLevel::Success, source, message));
    }

    /// Block until every entry recorded so far has reached the journal
    pub fn flush(&self) {
        if let Some(ops) = self.journal.as_ref().and_then(|j| j.ops.as_ref()) {
            let (done, wait) = mpsc::sync_channel(1);
            if ops.send(JournalOp::Flush(done)).is_ok() {
                let _ = wait.recv();
            }
        }
    }

    /// Matching entries in insertion order
    ///
    /// A query copies the current buffer; it is not a live subscription.
    pub fn query(&self, query: &LogQuery) -> Vec<LogEntry> {
        let entries = self.lock();
        let mut matched: Vec<LogEntry> = entries
            .iter()
            .filter(|e| query.matches(e))
            .cloned()
            .collect();

        if let Some(limit) = query.limit {
            if matched.len() > limit {
                matched.drain(..matched.len() - limit);
            }
        }
        matched
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<LogEntry>> {
        self.entries.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl Drop for LogAggregator {
    fn drop(&mut self) {
        if let Some(journal) = self.journal.as_mut() {
            // Closing the channel lets the writer drain and exit
            journal.ops.take();
            if let Some(worker) = journal.worker.take() {
                let _ = worker.join();
            }
        }
    }
}

struct JournalWriter {
    path: PathBuf,
    capacity: usize,
    retention_days: u32,
    lines: usize,
}

impl JournalWriter {
    fn run(mut self, queue: mpsc::Receiver<JournalOp>) {
        for op in queue {
            match op {
                JournalOp::Append(entry) => self.append(&entry),
                JournalOp::Flush(done) => {
                    let _ = done.send(());
                }
            }
        }
    }

    fn append(&mut self, entry: &LogEntry) {
        if let Err(e) = append_line(&self.path, entry) {
            tracing::warn!(error = %e, path = %self.path.display(), "Failed to journal event");
            return;
        }
        self.lines += 1;

        if self.lines > self.capacity.saturating_mul(2) {
            if let Err(e) = self.compact() {
                tracing::warn!(error = %e, path = %self.path.display(), "Failed to compact event journal");
            }
        }
    }

    /// Rewrite the file to its newest `capacity` live entries
    ///
    /// Re-reading first keeps lines other processes appended.
    fn compact(&mut self) -> Result<()> {
        let cutoff = retention_cutoff(self.retention_days);
        let (entries, _) = read_journal(&self.path, self.capacity, cutoff)?;
        write_journal(&self.path, entries.iter())?;
        self.lines = entries.len();
        Ok(())
    }
}

fn retention_cutoff(retention_days: u32) -> DateTime<Utc> {
    Utc::now() - Duration::days(i64::from(retention_days))
}

/// Newest `capacity` entries at or after `cutoff`, plus the raw line count
fn read_journal(
    path: &Path,
    capacity: usize,
    cutoff: DateTime<Utc>,
) -> Result<(VecDeque<LogEntry>, usize)> {
    let mut entries = VecDeque::with_capacity(capacity);
    if !path.exists() {
        return Ok((entries, 0));
    }

    let reader = BufReader::new(File::open(path)?);
    let mut lines = 0usize;
    let mut skipped = 0usize;
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        lines += 1;
        match serde_json::from_str::<LogEntry>(&line) {
            Ok(entry) if entry.timestamp >= cutoff => {
                if entries.len() == capacity {
                    entries.pop_front();
                }
                entries.push_back(entry);
            }
            Ok(_) => {}
            Err(_) => skipped += 1,
        }
    }
    if skipped > 0 {
        tracing::warn!(
            path = %path.display(),
            skipped,
            "Skipped unreadable event journal lines"
        );
    }
    Ok((entries, lines))
}

/// One write per line so concurrent appenders do not interleave
fn append_line(path: &Path, entry: &LogEntry) -> Result<()> {
    let mut line = serde_json::to_string(entry)?;
    line.push('\n');
    let mut file = OpenOptions::new().append(true).create(true).open(path)?;
    file.write_all(line.as_bytes())?;
    Ok(())
}

/// Atomically replace the journal with `entries`
fn write_journal<'a>(path: &Path, entries: impl Iterator<Item = &'a LogEntry>) -> Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    for entry in entries {
        writeln!(tmp, "{}", serde_json::to_string(entry)?)?;
    }
    tmp.flush()?;
    tmp.persist(path)
        .map_err(|e| ExporterError::Io(format!("Failed to replace {}: {}", path.display(), e)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_ring_buffer_evicts_oldest() {
        let log = LogAggregator::in_memory(3);
        for i in 0..5 {
            log.info(LogSource::System, format!("event {i}"));
        }

        let entries = log.query(&LogQuery::default());
        let messages: Vec<_> = entries.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, vec!["event 2", "event 3", "event 4"]);
    }

    #[test]
    fn test_query_filters_by_entity_and_level() {
        let log = LogAggregator::in_memory(10);
        log.info(EntityKind::Deals, "started");
        log.warning(EntityKind::Deals, "retrying");
        log.success(EntityKind::Contacts, "page stored");
        log.error(LogSource::Sheets, "quota");

        let deals = log.query(&LogQuery {
            entity: Some(EntityKind::Deals.into()),
            ..Default::default()
        });
        assert_eq!(deals.len(), 2);

        let warnings = log.query(&LogQuery {
            entity: Some(EntityKind::Deals.into()),
            level: Some(LogLevel::Warning),
            limit: None,
        });
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].message, "retrying");

        let sheets = log.query(&LogQuery {
            entity: Some(LogSource::Sheets),
            ..Default::default()
        });
        assert_eq!(sheets[0].level, LogLevel::Error);
    }

    #[test]
    fn test_query_limit_keeps_newest() {
        let log = LogAggregator::in_memory(10);
        for i in 0..4 {
            log.info(LogSource::System, format!("event {i}"));
        }
        let entries = log.query(&LogQuery {
            limit: Some(2),
            ..Default::default()
        });
        assert_eq!(entries[0].message, "event 2");
        assert_eq!(entries[1].message, "event 3");
    }

    #[test]
    fn test_source_serde_as_plain_string() {
        let entry = LogEntry::new(LogLevel::Success, EntityKind::Companies, "done");
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["entity"], "companies");
        assert_eq!(json["level"], "success");

        let back: LogEntry = serde_json::from_value(json).unwrap();
        assert_eq!(back.entity, LogSource::Entity(EntityKind::Companies));
    }

    #[test]
    fn test_journal_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("events.jsonl");

        {
            let log = LogAggregator::open(&path, 10, 7).unwrap();
            log.info(EntityKind::Events, "first");
            log.error(EntityKind::Events, "second");
        }

        let log = LogAggregator::open(&path, 10, 7).unwrap();
        let entries = log.query(&LogQuery::default());
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].message, "second");
    }

    #[test]
    fn test_journal_drops_expired_entries() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("events.jsonl");

        let mut old = LogEntry::new(LogLevel::Info, LogSource::System, "old");
        old.timestamp = Utc::now() - Duration::days(30);
        let fresh = LogEntry::new(LogLevel::Info, LogSource::System, "fresh");
        let contents = format!(
            "{}\nnot json\n{}\n",
            serde_json::to_string(&old).unwrap(),
            serde_json::to_string(&fresh).unwrap()
        );
        fs::write(&path, contents).unwrap();

        let log = LogAggregator::open(&path, 10, 7).unwrap();
        let entries = log.query(&LogQuery::default());
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].message, "fresh");
    }

    #[test]
    fn test_journal_compacts_past_twice_capacity() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("events.jsonl");

        let log = LogAggregator::open(&path, 2, 7).unwrap();
        for i in 0..10 {
            log.info(LogSource::System, format!("event {i}"));
        }
        log.flush();

        let lines = fs::read_to_string(&path).unwrap().lines().count();
        assert!(lines <= 5, "journal has {lines} lines");

        let reopened = LogAggregator::open(&path, 2, 7).unwrap();
        let entries = reopened.query(&LogQuery::default());
        assert_eq!(entries.last().unwrap().message, "event 9");
    }

    #[test]
    fn test_second_open_keeps_first_writer_journaling() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("events.jsonl");

        let server = LogAggregator::open(&path, 10, 7).unwrap();
        server.info(LogSource::System, "before reader");
        server.flush();

        // A short-lived reader, as `logs` would open it
        let reader = LogAggregator::open(&path, 10, 7).unwrap();
        assert_eq!(reader.len(), 1);
        drop(reader);

        server.info(LogSource::System, "after reader");
        drop(server);

        let reopened = LogAggregator::open(&path, 10, 7).unwrap();
        let messages: Vec<_> = reopened
            .query(&LogQuery::default())
            .into_iter()
            .map(|e| e.message)
            .collect();
        assert_eq!(messages, vec!["before reader", "after reader"]);
    }

    #[test]
    fn test_compaction_keeps_entries_from_other_writers() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("events.jsonl");

        let first = LogAggregator::open(&path, 3, 7).unwrap();
        let second = LogAggregator::open(&path, 3, 7).unwrap();
        for i in 0..6 {
            first.info(LogSource::System, format!("first {i}"));
        }
        first.flush();
        second.info(LogSource::System, "second 0");
        second.flush();

        // The seventh line pushes the first writer past twice its capacity
        first.info(LogSource::System, "first 6");
        first.flush();
        assert_eq!(fs::read_to_string(&path).unwrap().lines().count(), 3);
        drop(first);
        drop(second);

        let reopened = LogAggregator::open(&path, 10, 7).unwrap();
        let messages: Vec<_> = reopened
            .query(&LogQuery::default())
            .into_iter()
            .map(|e| e.message)
            .collect();
        assert_eq!(messages, vec!["first 5", "second 0", "first 6"]);
    }
}
