//! File-backed outcome store persisted as JSON lines.

use std::collections::HashMap;
use std::fs::{create_dir_all, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::error::SchedulerError;
use crate::core::mailbox::Mailbox;
use crate::core::task::TaskOutcome;
use crate::util::TaskId;

#[derive(Serialize, Deserialize)]
struct Record {
    task: TaskId,
    outcome: TaskOutcome,
}

/// File-backed mailbox using JSON lines for durability across restarts.
pub struct FileMailbox {
    path: PathBuf,
    stream: String,
    outcomes: HashMap<TaskId, TaskOutcome>,
}

impl FileMailbox {
    /// Open (creating if absent) a mailbox persisted under `path`, replaying
    /// any existing `{stream}_mailbox.jsonl` file.
    pub fn new(path: impl AsRef<Path>, stream: impl Into<String>) -> Result<Self, SchedulerError> {
        let path = path.as_ref().to_path_buf();
        let stream = stream.into();
        create_dir_all(&path).map_err(|e| SchedulerError::Backend(e.to_string()))?;
        let mut mb = Self {
            path,
            stream,
            outcomes: HashMap::new(),
        };
        mb.load_from_disk()?;
        Ok(mb)
    }

    fn file_path(&self) -> PathBuf {
        self.path.join(format!("{}_mailbox.jsonl", self.stream))
    }

    fn load_from_disk(&mut self) -> Result<(), SchedulerError> {
        let file_path = self.file_path();
        if !file_path.exists() {
            return Ok(());
        }
        let file = OpenOptions::new()
            .read(true)
            .open(&file_path)
            .map_err(|e| SchedulerError::Backend(e.to_string()))?;
        for line in BufReader::new(file).lines() {
            let line = line.map_err(|e| SchedulerError::Backend(e.to_string()))?;
            let record: Record =
                serde_json::from_str(&line).map_err(|e| SchedulerError::Backend(e.to_string()))?;
            self.outcomes.insert(record.task, record.outcome);
        }
        Ok(())
    }

    fn append_to_disk(&self, record: &Record) -> Result<(), SchedulerError> {
        let file_path = self.file_path();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&file_path)
            .map_err(|e| SchedulerError::Backend(e.to_string()))?;
        let line =
            serde_json::to_string(record).map_err(|e| SchedulerError::Backend(e.to_string()))?;
        writeln!(file, "{line}").map_err(|e| SchedulerError::Backend(e.to_string()))
    }
}

impl Mailbox for FileMailbox {
    fn deliver(&mut self, task: TaskId, outcome: TaskOutcome) -> Result<(), SchedulerError> {
        let record = Record { task, outcome: outcome.clone() };
        self.outcomes.insert(task, outcome);
        self.append_to_disk(&record)
    }

    fn fetch(&self, task: TaskId) -> Option<TaskOutcome> {
        self.outcomes.get(&task).cloned()
    }

    fn remove(&mut self, task: TaskId) -> Option<TaskOutcome> {
        self.outcomes.remove(&task)
    }
}
