//! Resumable concurrent record processor.
//!
//! Applies a per-record transform across a JSONL dataset with a bounded
//! worker pool. Output is durable and idempotent: each record's `id` is its
//! original dataset position, finished records are appended under a lock
//! (one line, atomic with respect to siblings), and a re-run against the
//! same source/destination pair dispatches only the ids missing from the
//! destination. A record whose transform fails (or panics) is logged and
//! left unwritten so the next resume retries it; it never affects other
//! records. After the pool drains, the destination is re-sorted by `id`.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, Semaphore};
use tracing::{error, info, instrument, warn};

use crate::error::{Error, Result};

/// Per-record transform applied by the processor.
#[async_trait]
pub trait RecordTransform: Send + Sync {
    /// Produce the output value for one record. Errors mark the record
    /// failed for this run; it stays eligible for the next resume.
    async fn transform(&self, record: &Value) -> Result<Value>;
}

/// Configuration for the record processor.
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// Maximum records processed concurrently.
    pub max_workers: usize,
    /// Output field name the transform result is stored under.
    pub answer_key: String,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            max_workers: 2,
            answer_key: "result".to_string(),
        }
    }
}

impl ProcessorConfig {
    pub fn new(answer_key: impl Into<String>) -> Self {
        Self {
            answer_key: answer_key.into(),
            ..Self::default()
        }
    }

    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers.max(1);
        self
    }
}

/// Outcome counters for one processed file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessStats {
    /// Records in the source file.
    pub total: usize,
    /// Records already present in the destination and skipped.
    pub resumed: usize,
    /// Records dispatched to workers this run.
    pub dispatched: usize,
    /// Records durably written this run.
    pub written: usize,
    /// Records that failed and were left unwritten.
    pub failed: usize,
}

/// Drives a [`RecordTransform`] across JSONL datasets.
pub struct RecordProcessor<T: RecordTransform + 'static> {
    transform: Arc<T>,
    config: ProcessorConfig,
}

impl<T: RecordTransform + 'static> RecordProcessor<T> {
    pub fn new(transform: T, config: ProcessorConfig) -> Self {
        Self {
            transform: Arc::new(transform),
            config,
        }
    }

    pub fn from_arc(transform: Arc<T>, config: ProcessorConfig) -> Self {
        Self { transform, config }
    }

    /// Process one source file into one destination file, resuming any
    /// previous partial run against the same destination.
    #[instrument(skip(self), fields(source = %source.display(), dest = %dest.display()))]
    pub async fn process_file(&self, source: &Path, dest: &Path) -> Result<ProcessStats> {
        let records = read_jsonl(source).await?;
        let total = records.len();

        let processed_ids = if tokio::fs::try_exists(dest).await? {
            collect_ids(&read_jsonl(dest).await?)
        } else {
            HashSet::new()
        };
        let resumed = processed_ids.len();

        if let Some(parent) = dest.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let pending: Vec<(usize, Value)> = records
            .into_iter()
            .enumerate()
            .filter(|(idx, _)| !processed_ids.contains(&(*idx as u64)))
            .collect();
        let dispatched = pending.len();
        info!("{} record(s) to process", dispatched);

        let semaphore = Arc::new(Semaphore::new(self.config.max_workers));
        let write_lock = Arc::new(Mutex::new(()));

        let mut handles = Vec::with_capacity(dispatched);
        for (index, record) in pending {
            let transform = Arc::clone(&self.transform);
            let semaphore = Arc::clone(&semaphore);
            let write_lock = Arc::clone(&write_lock);
            let answer_key = self.config.answer_key.clone();
            let dest = dest.to_path_buf();

            handles.push(tokio::spawn(async move {
                let _permit = semaphore
                    .acquire()
                    .await
                    .expect("semaphore closed unexpectedly");

                match process_one(&*transform, &record, index, &answer_key).await {
                    Ok(line) => {
                        let _guard = write_lock.lock().await;
                        match append_line(&dest, &line).await {
                            Ok(()) => {
                                info!("processed: {}", index);
                                true
                            }
                            Err(e) => {
                                error!("failed to write record {}: {}", index, e);
                                false
                            }
                        }
                    }
                    Err(e) => {
                        error!("record {} failed, leaving it for the next resume: {}", index, e);
                        false
                    }
                }
            }));
        }

        let mut written = 0;
        let mut failed = 0;
        for outcome in join_all(handles).await {
            match outcome {
                Ok(true) => written += 1,
                Ok(false) => failed += 1,
                Err(e) => {
                    // A panicking transform is isolated to its own task.
                    error!("record task panicked: {}", e);
                    failed += 1;
                }
            }
        }

        sort_by_id(dest).await?;

        Ok(ProcessStats {
            total,
            resumed,
            dispatched,
            written,
            failed,
        })
    }

    /// Process every file in `source_dir` (non-recursive, name order), each
    /// to its own destination under `dest_dir`. Files run one at a time;
    /// records within a file run concurrently.
    pub async fn process_dir(
        &self,
        source_dir: &Path,
        dest_dir: &Path,
    ) -> Result<Vec<(PathBuf, ProcessStats)>> {
        let mut sources = Vec::new();
        let mut entries = tokio::fs::read_dir(source_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                sources.push(entry.path());
            }
        }
        sources.sort();
        self.process_sources(sources, dest_dir).await
    }

    /// Glob-expand `pattern` and process each matched file to its own
    /// destination under `dest_dir`.
    pub async fn process_pattern(
        &self,
        pattern: &str,
        dest_dir: &Path,
    ) -> Result<Vec<(PathBuf, ProcessStats)>> {
        let mut sources: Vec<PathBuf> = glob::glob(pattern)
            .map_err(|e| Error::config(format!("invalid source pattern: {}", e)))?
            .filter_map(|entry| match entry {
                Ok(path) => Some(path),
                Err(e) => {
                    warn!("skipping unreadable path: {}", e);
                    None
                }
            })
            .collect();
        sources.sort();
        self.process_sources(sources, dest_dir).await
    }

    async fn process_sources(
        &self,
        sources: Vec<PathBuf>,
        dest_dir: &Path,
    ) -> Result<Vec<(PathBuf, ProcessStats)>> {
        if sources.is_empty() {
            warn!("no source files matched");
        }
        let mut results = Vec::with_capacity(sources.len());
        for source in sources {
            let file_name = source
                .file_name()
                .ok_or_else(|| Error::config(format!("source has no file name: {}", source.display())))?;
            let dest = dest_dir.join(file_name);
            let stats = self.process_file(&source, &dest).await?;
            results.push((dest, stats));
        }
        Ok(results)
    }
}

async fn process_one<T: RecordTransform>(
    transform: &T,
    record: &Value,
    index: usize,
    answer_key: &str,
) -> Result<String> {
    let output = transform.transform(record).await?;

    let mut out_record = record
        .as_object()
        .cloned()
        .ok_or_else(|| Error::validation(format!("record {} is not a JSON object", index)))?;
    out_record.insert("id".to_string(), Value::from(index as u64));
    out_record.insert(answer_key.to_string(), output);

    Ok(serde_json::to_string(&Value::Object(out_record))?)
}

async fn append_line(path: &Path, line: &str) -> Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(line.as_bytes()).await?;
    file.write_all(b"\n").await?;
    Ok(())
}

/// Read a JSONL file, skipping blank lines.
pub async fn read_jsonl(path: &Path) -> Result<Vec<Value>> {
    let contents = tokio::fs::read_to_string(path).await?;
    contents
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).map_err(Error::from))
        .collect()
}

/// Rewrite a JSONL file sorted by its records' integer `id`.
pub async fn sort_by_id(path: &Path) -> Result<()> {
    if !tokio::fs::try_exists(path).await? {
        return Ok(());
    }
    let mut records = read_jsonl(path).await?;
    records.sort_by_key(|record| record.get("id").and_then(Value::as_u64).unwrap_or(u64::MAX));

    let mut out = String::new();
    for record in &records {
        out.push_str(&serde_json::to_string(record)?);
        out.push('\n');
    }
    tokio::fs::write(path, out).await?;
    Ok(())
}

fn collect_ids(records: &[Value]) -> HashSet<u64> {
    records
        .iter()
        .filter_map(|record| record.get("id").and_then(Value::as_u64))
        .collect()
}
