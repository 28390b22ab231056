use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::warn;

use crate::config::PipelineConfig;
use crate::errors::{AppError, AppResult};

const JOURNAL_FILE: &str = "pipeline-journal.jsonl";

/// Append-only JSONL log of pipeline events, flushed in batches and rotated
/// when the active file would grow past `max_file_bytes`.
pub struct RunJournal {
    sink: Option<JournalSink>,
}

struct JournalSink {
    queue: Mutex<Vec<JournalEvent>>,
    path: PathBuf,
    batch_size: usize,
    max_file_bytes: u64,
    max_file_count: usize,
}

#[derive(Debug, Serialize)]
pub struct JournalEvent {
    pub name: String,
    pub timestamp: DateTime<Utc>,
    pub payload: serde_json::Value,
}

impl RunJournal {
    pub fn open(config: &PipelineConfig) -> AppResult<Self> {
        if !config.journal_enabled {
            return Ok(Self::disabled());
        }
        let dir = config.journal_dir.as_path();
        fs::create_dir_all(dir)?;
        let path = dir.join(JOURNAL_FILE);
        OpenOptions::new().create(true).append(true).open(&path)?;

        Ok(Self {
            sink: Some(JournalSink {
                queue: Mutex::new(Vec::new()),
                path,
                batch_size: config.journal_batch_size.max(1),
                max_file_bytes: config.journal_max_bytes,
                max_file_count: config.journal_max_files.max(1),
            }),
        })
    }

    pub fn disabled() -> Self {
        Self { sink: None }
    }

    pub fn path(&self) -> Option<&Path> {
        self.sink.as_ref().map(|sink| sink.path.as_path())
    }

    pub fn record(&self, name: impl Into<String>, payload: serde_json::Value) -> AppResult<()> {
        let Some(sink) = &self.sink else {
            return Ok(());
        };
        let mut queue = sink.queue.lock();
        queue.push(JournalEvent {
            name: name.into(),
            timestamp: Utc::now(),
            payload,
        });
        if queue.len() >= sink.batch_size {
            sink.persist_locked(&mut queue)?;
        }
        Ok(())
    }

    /// Journal problems are reported but never stop the pipeline.
    pub fn note<T: Serialize + ?Sized>(&self, name: &str, payload: &T) {
        if self.sink.is_none() {
            return;
        }
        let result = serde_json::to_value(payload)
            .map_err(AppError::from)
            .and_then(|value| self.record(name, value));
        if let Err(err) = result {
            warn!(?err, event = name, "failed to journal pipeline event");
        }
    }

    pub fn flush(&self) -> AppResult<()> {
        match &self.sink {
            Some(sink) => {
                let mut queue = sink.queue.lock();
                sink.persist_locked(&mut queue)
            }
            None => Ok(()),
        }
    }

    pub fn queue_depth(&self) -> usize {
        self.sink
            .as_ref()
            .map(|sink| sink.queue.lock().len())
            .unwrap_or(0)
    }
}

impl JournalSink {
    fn persist_locked(&self, queue: &mut Vec<JournalEvent>) -> AppResult<()> {
        if queue.is_empty() {
            return Ok(());
        }

        let mut encoded = Vec::with_capacity(queue.len());
        let mut incoming_bytes = 0_u64;
        for event in queue.iter() {
            let line = serde_json::to_vec(event)?;
            incoming_bytes += (line.len() + 1) as u64;
            encoded.push(line);
        }

        self.rotate_if_needed(incoming_bytes)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        for line in &encoded {
            file.write_all(line)?;
            file.write_all(b"\n")?;
        }
        file.flush()?;
        queue.clear();
        Ok(())
    }

    fn rotate_if_needed(&self, incoming_bytes: u64) -> AppResult<()> {
        let current_size = fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0);
        if current_size == 0 || current_size + incoming_bytes <= self.max_file_bytes {
            return Ok(());
        }

        if self.max_file_count > 1 {
            let rotated_path = self.parent_dir().join(format!(
                "{}-{}.jsonl",
                self.stem(),
                Utc::now().format("%Y%m%d%H%M%S%3f")
            ));
            fs::rename(&self.path, &rotated_path)?;
            self.prune_rotations()?;
        }

        OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.path)?;
        Ok(())
    }

    fn prune_rotations(&self) -> AppResult<()> {
        let prefix = format!("{}-", self.stem());
        let mut rotations = fs::read_dir(self.parent_dir())?
            .filter_map(|entry| {
                let entry = entry.ok()?;
                let name = entry.file_name().to_string_lossy().to_string();
                (name.starts_with(&prefix) && name.ends_with(".jsonl")).then(|| entry.path())
            })
            .collect::<Vec<_>>();

        // Rotation names embed a sortable timestamp.
        rotations.sort();
        let allowed = self.max_file_count.saturating_sub(1);
        if rotations.len() > allowed {
            let excess = rotations.len() - allowed;
            for path in rotations.into_iter().take(excess) {
                let _ = fs::remove_file(path);
            }
        }
        Ok(())
    }

    fn parent_dir(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new("."))
    }

    fn stem(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "pipeline-journal".into())
    }
}

impl Drop for RunJournal {
    fn drop(&mut self) {
        if let Err(err) = self.flush() {
            warn!(?err, "failed to flush pipeline journal");
        }
    }
}
