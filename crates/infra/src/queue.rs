//! Bounded in-process task queue shared by all workers.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};

use taskmill_core::{JobId, TaskId};

/// Default queue capacity, sized above the maximum fan-out.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Reference to a task waiting for a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueEntry {
    pub task_id: TaskId,
    pub job_id: JobId,
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("task queue is closed")]
    Closed,
}

/// Multi-producer, multi-consumer FIFO.
///
/// Producers wait while the queue is full; entries are never dropped.
#[derive(Debug, Clone)]
pub struct TaskQueue {
    sender: mpsc::Sender<QueueEntry>,
    receiver: Arc<Mutex<mpsc::Receiver<QueueEntry>>>,
    capacity: usize,
}

impl TaskQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, receiver) = mpsc::channel(capacity);
        Self {
            sender,
            receiver: Arc::new(Mutex::new(receiver)),
            capacity,
        }
    }

    /// Append an entry, waiting for room when the queue is full.
    pub async fn enqueue(&self, entry: QueueEntry) -> Result<(), QueueError> {
        self.sender.send(entry).await.map_err(|_| QueueError::Closed)
    }

    /// Next entry in FIFO order; `None` once the queue is closed and drained.
    pub async fn recv(&self) -> Option<QueueEntry> {
        self.receiver.lock().await.recv().await
    }

    /// Stop accepting new entries. Entries already queued can still be received.
    pub async fn close(&self) {
        self.receiver.lock().await.close();
    }

    pub fn depth(&self) -> usize {
        self.capacity - self.sender.capacity()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}
