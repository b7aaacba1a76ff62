//! Bounded queue of pending stream moves
//!
//! Requests are appended during a classification pass and consumed strictly
//! in insertion order, one at a time. The queue never grows past its
//! capacity: overflow is logged and counted, and the request is dropped.

use std::fmt;
use tracing::warn;

use crate::domain::server::Index;

/// Maximum number of moves held in one pass
pub const MOVE_QUEUE_CAPACITY: usize = 16;

/// Reassign `stream` to endpoint `target`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveRequest {
    pub stream: Index,
    pub target: Index,
}

impl MoveRequest {
    pub fn new(stream: Index, target: Index) -> Self {
        Self { stream, target }
    }
}

impl fmt::Display for MoveRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.stream, self.target)
    }
}

/// Fixed-capacity FIFO with completion tracking
#[derive(Debug)]
pub struct MoveQueue {
    requests: Vec<MoveRequest>,
    capacity: usize,
    /// Requests whose move has reported back, successfully or not
    completed: usize,
    dropped: usize,
}

impl MoveQueue {
    pub fn new() -> Self {
        Self::with_capacity(MOVE_QUEUE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            requests: Vec::with_capacity(capacity),
            capacity,
            completed: 0,
            dropped: 0,
        }
    }

    /// Append a request.
    /// Returns false if the queue is full and the request was dropped.
    pub fn enqueue(&mut self, request: MoveRequest) -> bool {
        if self.requests.len() == self.capacity {
            warn!(
                stream = request.stream,
                target = request.target,
                capacity = self.capacity,
                "Dropping move request, queue full"
            );
            self.dropped += 1;
            return false;
        }
        self.requests.push(request);
        true
    }

    /// The oldest request not yet completed
    pub fn next(&self) -> Option<MoveRequest> {
        self.requests.get(self.completed).copied()
    }

    /// Mark the request returned by [`MoveQueue::next`] as finished
    pub fn complete(&mut self) {
        if self.completed < self.requests.len() {
            self.completed += 1;
        }
    }

    /// Forget every request and the completion counter
    pub fn reset(&mut self) {
        self.requests.clear();
        self.completed = 0;
    }

    pub fn is_exhausted(&self) -> bool {
        self.completed == self.requests.len()
    }

    /// Requests accepted this pass
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    pub fn completed(&self) -> usize {
        self.completed
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Requests dropped on overflow since the queue was created
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    #[cfg(test)]
    pub fn requests(&self) -> &[MoveRequest] {
        &self.requests
    }
}

impl Default for MoveQueue {
    fn default() -> Self {
        Self::new()
    }
}
