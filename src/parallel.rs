//! Job dispatch over a fixed pool of workers
//!
//! A [`JobHandler`] owns a queue of items; each [`Worker`] is a tokio task
//! pulling items from that queue until it is closed and drained. The
//! receiver sits behind an async mutex so only one worker dequeues at a
//! time, and a closed channel hands `None` to every worker once the last
//! item is gone.
//!
//! ```ignore
//! let results = JobHandler::run(paths, 4, |path| async move { hash_file(&path).await }).await?;
//! ```

use std::future::Future;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::SyncError;

type WorkerHandle<R> = JoinHandle<Result<Vec<R>, SyncError>>;

/// Queue of work items plus the workers consuming it
pub struct JobHandler<T, R> {
	sender: Option<mpsc::UnboundedSender<T>>,
	receiver: Arc<Mutex<mpsc::UnboundedReceiver<T>>>,
	queued: usize,
	workers: Vec<WorkerHandle<R>>,
}

impl<T, R> Default for JobHandler<T, R>
where
	T: Send + 'static,
	R: Send + 'static,
{
	fn default() -> Self {
		Self::new()
	}
}

impl<T, R> JobHandler<T, R>
where
	T: Send + 'static,
	R: Send + 'static,
{
	pub fn new() -> Self {
		let (tx, rx) = mpsc::unbounded_channel();
		JobHandler { sender: Some(tx), receiver: Arc::new(Mutex::new(rx)), queued: 0, workers: Vec::new() }
	}

	/// Enqueue an item; workers may already be running
	pub fn put(&mut self, item: T) -> Result<(), SyncError> {
		let sender = self
			.sender
			.as_ref()
			.ok_or_else(|| SyncError::Other { message: "Job queue already closed".to_string() })?;

		sender
			.send(item)
			.map_err(|_| SyncError::Other { message: "Job queue receiver dropped".to_string() })?;
		self.queued += 1;
		Ok(())
	}

	/// Number of items put so far
	pub fn queued(&self) -> usize {
		self.queued
	}

	/// Number of workers started so far
	pub fn workers(&self) -> usize {
		self.workers.len()
	}

	/// Close the queue and wait until every worker has finished
	///
	/// Returns the results of all items, in no particular order, or the
	/// first error any worker hit.
	pub async fn process(mut self) -> Result<Vec<R>, SyncError> {
		self.sender.take();

		if self.workers.is_empty() && self.queued > 0 {
			return Err(SyncError::Other { message: format!("No workers to process {} queued jobs", self.queued) });
		}

		let mut results = Vec::with_capacity(self.queued);
		let mut first_error = None;

		for handle in self.workers.drain(..) {
			match handle.await {
				Ok(Ok(mut r)) => results.append(&mut r),
				Ok(Err(e)) => {
					first_error.get_or_insert(e);
				}
				Err(e) => {
					first_error.get_or_insert(SyncError::Other { message: format!("Worker failed: {}", e) });
				}
			}
		}

		match first_error {
			Some(e) => Err(e),
			None => Ok(results),
		}
	}

	/// Run `func` over `items` with at most `parallelism` workers
	///
	/// The number of workers never exceeds the number of items.
	pub async fn run<F, Fut>(items: Vec<T>, parallelism: usize, func: F) -> Result<Vec<R>, SyncError>
	where
		F: Fn(T) -> Fut + Send + Sync + 'static,
		Fut: Future<Output = Result<R, SyncError>> + Send + 'static,
	{
		let mut handler = JobHandler::new();
		let nworkers = parallelism.max(1).min(items.len());

		for item in items {
			handler.put(item)?;
		}

		let func = Arc::new(func);
		for _ in 0..nworkers {
			Worker::start(&mut handler, Arc::clone(&func));
		}

		handler.process().await
	}
}

/// Handle on a worker task attached to a [`JobHandler`]
#[derive(Debug, Clone, Copy)]
pub struct Worker {
	index: usize,
}

impl Worker {
	/// Spawn a worker that starts pulling items right away
	pub fn start<T, R, F, Fut>(handler: &mut JobHandler<T, R>, func: Arc<F>) -> Worker
	where
		T: Send + 'static,
		R: Send + 'static,
		F: Fn(T) -> Fut + Send + Sync + 'static,
		Fut: Future<Output = Result<R, SyncError>> + Send + 'static,
	{
		let index = handler.workers.len();
		let receiver = Arc::clone(&handler.receiver);

		let handle = tokio::spawn(async move {
			let mut results = Vec::new();
			loop {
				let item = receiver.lock().await.recv().await;
				match item {
					Some(item) => match func(item).await {
						Ok(r) => results.push(r),
						Err(e) => return Err(e),
					},
					None => break,
				}
			}
			debug!("Worker {} done after {} jobs", index, results.len());
			Ok(results)
		});

		handler.workers.push(handle);
		Worker { index }
	}

	pub fn index(&self) -> usize {
		self.index
	}
}


// vim: ts=4
