//! File-backed queue persisted as JSON lines.
//!
//! Simpler than the in-memory priority heap: a FIFO on disk, since
//! durability rather than priority ordering is the point of this backend.
//! Callers that need both should layer [`super::memory::InMemoryQueue`] in
//! front and use this only as a crash-recovery log.

use std::collections::VecDeque;
use std::fs::{create_dir_all, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use crate::core::error::SchedulerError;
use crate::core::queue::TaskQueue;
use crate::core::task::Task;
use crate::util::TaskId;

/// File-backed queue using JSON lines for durability.
pub struct FileQueue {
    path: PathBuf,
    stream: String,
    max_depth: usize,
    tasks: VecDeque<Task>,
}

impl FileQueue {
    /// Open (creating if absent) a queue persisted under `path`, replaying
    /// any existing `{stream}.jsonl` file.
    pub fn new(
        path: impl AsRef<Path>,
        stream: impl Into<String>,
        max_depth: usize,
    ) -> Result<Self, SchedulerError> {
        let path = path.as_ref().to_path_buf();
        let stream = stream.into();
        create_dir_all(&path).map_err(|e| SchedulerError::Backend(e.to_string()))?;
        let mut queue = Self {
            path,
            stream,
            max_depth,
            tasks: VecDeque::new(),
        };
        queue.load_from_disk()?;
        Ok(queue)
    }

    fn file_path(&self) -> PathBuf {
        self.path.join(format!("{}.jsonl", self.stream))
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
            let task: Task =
                serde_json::from_str(&line).map_err(|e| SchedulerError::Backend(e.to_string()))?;
            self.tasks.push_back(task);
        }
        Ok(())
    }

    fn rewrite_disk(&self) -> Result<(), SchedulerError> {
        let file_path = self.file_path();
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&file_path)
            .map_err(|e| SchedulerError::Backend(e.to_string()))?;
        for task in &self.tasks {
            let line =
                serde_json::to_string(task).map_err(|e| SchedulerError::Backend(e.to_string()))?;
            writeln!(file, "{line}").map_err(|e| SchedulerError::Backend(e.to_string()))?;
        }
        Ok(())
    }
}

impl TaskQueue for FileQueue {
    fn enqueue(&mut self, task: Task) -> Result<(), SchedulerError> {
        if self.len() >= self.max_depth() {
            return Err(SchedulerError::QueueFull(format!(
                "max queue depth {} reached",
                self.max_depth
            )));
        }
        self.tasks.push_back(task);
        self.rewrite_disk()
    }

    fn dequeue(&mut self) -> Option<Task> {
        let item = self.tasks.pop_front();
        if item.is_some() {
            let _ = self.rewrite_disk();
        }
        item
    }

    fn prune_expired(&mut self, now_ms: u128) -> Vec<Task> {
        let (keep, expired): (VecDeque<_>, VecDeque<_>) =
            self.tasks.drain(..).partition(|t| !t.is_expired(now_ms));
        self.tasks = keep;
        let _ = self.rewrite_disk();
        expired.into_iter().collect()
    }

    fn remove(&mut self, id: TaskId) -> Option<Task> {
        let idx = self.tasks.iter().position(|t| t.id == id)?;
        let task = self.tasks.remove(idx);
        let _ = self.rewrite_disk();
        task
    }

    fn max_depth(&self) -> usize {
        self.max_depth
    }

    fn len(&self) -> usize {
        self.tasks.len()
    }
}
