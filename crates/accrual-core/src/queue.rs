//! Bounded work queue between a stage's producers and its workers.
//!
//! Sending waits while the queue is full and receiving waits while it is
//! empty. Closing stops all further sends, while items already buffered can
//! still be received; once they are drained receivers get `None`.

use async_channel::{Receiver, Sender, TrySendError};

/// Returned when pushing into a closed queue. Carries the rejected item.
#[derive(Debug, PartialEq, Eq)]
pub struct QueueClosed<T>(pub T);

/// Outcome of a non-blocking push.
#[derive(Debug, PartialEq, Eq)]
pub enum TryPushError<T> {
	Full(T),
	Closed(T),
}

/// Multi-producer, multi-consumer queue with a fixed capacity.
#[derive(Debug)]
pub struct WorkQueue<T> {
	tx: Sender<T>,
	rx: Receiver<T>,
	capacity: usize,
}

impl<T> Clone for WorkQueue<T> {
	fn clone(&self) -> Self {
		Self {
			tx: self.tx.clone(),
			rx: self.rx.clone(),
			capacity: self.capacity,
		}
	}
}

impl<T> WorkQueue<T> {
	/// Creates a queue holding at most `capacity` items. A zero capacity is
	/// raised to one.
	pub fn bounded(capacity: usize) -> Self {
		let capacity = capacity.max(1);
		let (tx, rx) = async_channel::bounded(capacity);
		Self { tx, rx, capacity }
	}

	pub fn capacity(&self) -> usize {
		self.capacity
	}

	pub fn len(&self) -> usize {
		self.rx.len()
	}

	pub fn is_empty(&self) -> bool {
		self.rx.is_empty()
	}

	/// Free slots left before a push would wait.
	pub fn room(&self) -> usize {
		self.capacity.saturating_sub(self.len())
	}

	/// Pushes an item, waiting while the queue is full.
	pub async fn push(&self, item: T) -> Result<(), QueueClosed<T>> {
		self.tx.send(item).await.map_err(|e| QueueClosed(e.0))
	}

	/// Pushes an item only if there is room right now.
	pub fn try_push(&self, item: T) -> Result<(), TryPushError<T>> {
		self.tx.try_send(item).map_err(|e| match e {
			TrySendError::Full(item) => TryPushError::Full(item),
			TrySendError::Closed(item) => TryPushError::Closed(item),
		})
	}

	/// Takes the next item, waiting while the queue is empty. Returns `None`
	/// once the queue is closed and drained.
	pub async fn pop(&self) -> Option<T> {
		self.rx.recv().await.ok()
	}

	/// Closes the queue for writers. Buffered items stay receivable.
	pub fn close(&self) {
		self.tx.close();
	}

	pub fn is_closed(&self) -> bool {
		self.tx.is_closed()
	}
}
