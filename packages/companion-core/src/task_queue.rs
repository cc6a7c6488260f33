//! Bounded task queue between the HTTP layer and the companion loop.
//!
//! The HTTP handlers push [`Task`]s through a [`TaskSender`]; the loop drains
//! them one per iteration with the non-blocking [`TaskQueue::try_pop`].

use std::collections::HashMap;

use thiserror::Error;
use tokio::sync::mpsc::{self, error::TryRecvError, error::TrySendError};

use crate::error::CompanionError;

/// Key-value payload of a task, as received from the controller.
pub type TaskData = HashMap<String, String>;

/// Kind of work a task asks the loop to perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskAction {
    /// Mirror a remote play queue into the local player.
    Playlist,
    /// Any action this coordinator does not know how to perform.
    Unsupported(String),
}

impl TaskAction {
    /// Parses an action name. Unknown names are preserved for logging.
    pub fn parse(name: &str) -> Self {
        match name {
            "playlist" => Self::Playlist,
            other => Self::Unsupported(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Playlist => "playlist",
            Self::Unsupported(name) => name,
        }
    }
}

/// One queued command. Consumed exactly once by the loop.
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub action: TaskAction,
    pub data: TaskData,
}

impl Task {
    pub fn new(action: TaskAction, data: TaskData) -> Self {
        Self { action, data }
    }

    /// Creates a playlist task from controller parameters.
    pub fn playlist(data: TaskData) -> Self {
        Self::new(TaskAction::Playlist, data)
    }

    /// Returns a data value by key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.data.get(key).map(String::as_str)
    }
}

/// Errors returned when a task cannot be enqueued.
#[derive(Debug, Error)]
pub enum EnqueueError {
    /// The queue is at capacity.
    #[error("task queue is full")]
    Full(Task),

    /// The loop side of the queue has been dropped.
    #[error("task queue is closed")]
    Closed(Task),
}

impl From<EnqueueError> for CompanionError {
    fn from(err: EnqueueError) -> Self {
        match err {
            EnqueueError::Full(_) => Self::QueueFull,
            EnqueueError::Closed(_) => Self::ShuttingDown,
        }
    }
}

/// Producer side of the task queue. Cheap to clone.
#[derive(Clone)]
pub struct TaskSender {
    tx: mpsc::Sender<Task>,
}

impl TaskSender {
    /// Enqueues a task without waiting.
    pub fn try_push(&self, task: Task) -> Result<(), EnqueueError> {
        self.tx.try_send(task).map_err(|e| match e {
            TrySendError::Full(task) => EnqueueError::Full(task),
            TrySendError::Closed(task) => EnqueueError::Closed(task),
        })
    }
}

/// Consumer side of the task queue, owned by the companion loop.
pub struct TaskQueue {
    rx: mpsc::Receiver<Task>,
    completed: u64,
}

impl TaskQueue {
    /// Creates a bounded queue and its producer handle.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero. [`CompanionConfig::validate`](crate::state::CompanionConfig::validate)
    /// rejects that value.
    pub fn bounded(capacity: usize) -> (TaskSender, TaskQueue) {
        let (tx, rx) = mpsc::channel(capacity);
        (TaskSender { tx }, TaskQueue { rx, completed: 0 })
    }

    /// Pops the oldest task, or `None` if nothing is waiting.
    ///
    /// Never blocks. A queue whose producers are all gone is simply empty.
    pub fn try_pop(&mut self) -> Option<Task> {
        match self.rx.try_recv() {
            Ok(task) => Some(task),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Marks the most recently popped task as processed.
    pub fn task_done(&mut self) {
        self.completed += 1;
    }

    /// Number of tasks processed so far.
    pub fn completed(&self) -> u64 {
        self.completed
    }

    /// Number of tasks waiting.
    pub fn pending(&self) -> usize {
        self.rx.len()
    }
}
