//! Request audit log.
//!
//! Alongside `tracing` output the gateway keeps a JSONL file of per-request audit
//! entries (model, token usage, cost, failures), mirrored in an in-memory ring
//! buffer of the most recent entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::pricing::CostBreakdown;
use crate::translate::bedrock_types::TokenUsage;

const MAX_LOG_ENTRIES: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub component: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,
}

impl LogEntry {
    pub fn new(level: LogLevel, component: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            component: component.into(),
            message: message.into(),
            context: None,
        }
    }

    pub fn with_context(mut self, ctx: serde_json::Value) -> Self {
        self.context = Some(ctx);
        self
    }
}

/// Structured context attached to a completed one-shot request.
#[derive(Debug, Clone, Serialize)]
pub struct CompletionAudit<'a> {
    pub model: &'a str,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    /// Absent when no pricing is known for the model.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost: Option<CostBreakdown>,
}

impl<'a> CompletionAudit<'a> {
    pub fn new(model: &'a str, usage: TokenUsage, cost: Option<CostBreakdown>) -> Self {
        Self {
            model,
            prompt_tokens: usage.input_tokens,
            completion_tokens: usage.output_tokens,
            cost,
        }
    }
}

/// Ring buffer persisted to JSONL.
pub struct Logger {
    entries: VecDeque<LogEntry>,
    file_path: PathBuf,
    writer: Option<BufWriter<File>>,
}

impl Logger {
    /// Open (or create) the log file and replay its most recent entries.
    /// A file holding more than the buffer capacity is compacted in place.
    pub fn new(file_path: impl AsRef<Path>) -> std::io::Result<Self> {
        let file_path = file_path.as_ref().to_path_buf();

        if let Some(parent) = file_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut entries = VecDeque::with_capacity(MAX_LOG_ENTRIES);
        let mut overflowed = false;

        if file_path.exists() {
            let reader = BufReader::new(File::open(&file_path)?);
            for line in reader.lines().map_while(std::result::Result::ok) {
                if let Ok(entry) = serde_json::from_str::<LogEntry>(&line) {
                    if entries.len() >= MAX_LOG_ENTRIES {
                        entries.pop_front();
                        overflowed = true;
                    }
                    entries.push_back(entry);
                }
            }
        }

        let mut logger = Self {
            entries,
            writer: Some(open_append(&file_path)?),
            file_path,
        };
        if overflowed {
            logger.compact()?;
        }
        Ok(logger)
    }

    pub fn log(&mut self, entry: LogEntry) {
        if let Some(ref mut writer) = self.writer {
            if let Ok(json) = serde_json::to_string(&entry) {
                let _ = writeln!(writer, "{}", json);
                let _ = writer.flush();
            }
        }
        if self.entries.len() >= MAX_LOG_ENTRIES {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    /// Newest first.
    pub fn recent(&self, limit: usize) -> Vec<LogEntry> {
        self.entries.iter().rev().take(limit).cloned().collect()
    }

    /// Rewrite the file so it holds only the buffered entries.
    pub fn compact(&mut self) -> std::io::Result<()> {
        self.writer = None;
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.file_path)?;
        let mut writer = BufWriter::new(file);
        for entry in &self.entries {
            if let Ok(json) = serde_json::to_string(entry) {
                writeln!(writer, "{}", json)?;
            }
        }
        writer.flush()?;
        self.writer = Some(open_append(&self.file_path)?);
        Ok(())
    }
}

fn open_append(path: &Path) -> std::io::Result<BufWriter<File>> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    Ok(BufWriter::new(file))
}

#[derive(Clone)]
pub struct SharedLogger(Arc<Mutex<Logger>>);

impl SharedLogger {
    pub fn new(file_path: impl AsRef<Path>) -> std::io::Result<Self> {
        Ok(Self(Arc::new(Mutex::new(Logger::new(file_path)?))))
    }

    pub fn log(&self, entry: LogEntry) {
        if let Ok(mut logger) = self.0.lock() {
            logger.log(entry);
        }
    }

    pub fn info(&self, component: impl Into<String>, message: impl Into<String>) {
        self.log(LogEntry::new(LogLevel::Info, component, message));
    }

    pub fn error(&self, component: impl Into<String>, message: impl Into<String>) {
        self.log(LogEntry::new(LogLevel::Error, component, message));
    }

    pub fn log_with_context(
        &self,
        level: LogLevel,
        component: impl Into<String>,
        message: impl Into<String>,
        context: serde_json::Value,
    ) {
        self.log(LogEntry::new(level, component, message).with_context(context));
    }

    /// Record token usage and cost for a finished completion.
    pub fn completion(&self, audit: &CompletionAudit<'_>) {
        let message = match audit.cost {
            Some(ref cost) => format!(
                "Completed: model={} in={} out={} cost={}",
                audit.model, audit.prompt_tokens, audit.completion_tokens, cost.total_cost
            ),
            None => format!(
                "Completed: model={} in={} out={} (no pricing)",
                audit.model, audit.prompt_tokens, audit.completion_tokens
            ),
        };
        let context = serde_json::to_value(audit).unwrap_or_default();
        self.log_with_context(LogLevel::Info, "audit", message, context);
    }

    pub fn recent(&self, limit: usize) -> Vec<LogEntry> {
        self.0.lock().map(|l| l.recent(limit)).unwrap_or_default()
    }
}
