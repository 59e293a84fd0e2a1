//! Worker thread pool
//!
//! A fixed number of threads consume accepted connections from a bounded
//! queue. The pool is never resized.

use std::net::TcpStream;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, Sender, TrySendError};

use crate::error::{PoolError, Result};

use super::ConnectionHandler;

/// How often `shutdown` checks whether workers have finished
const JOIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

pub struct ThreadPool {
    workers: Vec<Worker>,
    sender: Option<Sender<TcpStream>>,

    /// Workers currently inside a connection
    active: Arc<AtomicUsize>,
}

impl ThreadPool {
    /// Spawn `size` workers behind a queue holding up to `capacity` connections
    pub fn new(size: usize, capacity: usize, handler: Arc<ConnectionHandler>) -> Result<Self> {
        if size == 0 {
            return Err(PoolError::Config("thread pool size must be at least 1".into()));
        }
        if capacity == 0 {
            return Err(PoolError::Config("queue capacity must be at least 1".into()));
        }

        let (sender, receiver) = channel::bounded(capacity);
        let active = Arc::new(AtomicUsize::new(0));

        let mut workers = Vec::with_capacity(size);
        for id in 0..size {
            workers.push(Worker::spawn(
                id,
                receiver.clone(),
                Arc::clone(&handler),
                Arc::clone(&active),
            )?);
        }

        Ok(Self {
            workers,
            sender: Some(sender),
            active,
        })
    }

    /// Queue a connection for the next free worker
    ///
    /// Hands the stream back when the queue is full or the pool is shutting
    /// down, so the caller can answer it.
    pub fn submit(&self, stream: TcpStream) -> std::result::Result<(), TcpStream> {
        let Some(sender) = self.sender.as_ref() else {
            return Err(stream);
        };

        match sender.try_send(stream) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(stream)) | Err(TrySendError::Disconnected(stream)) => {
                Err(stream)
            }
        }
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Connections waiting for a worker
    pub fn queued(&self) -> usize {
        self.sender.as_ref().map(|s| s.len()).unwrap_or(0)
    }

    /// Workers busy with a connection
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Close the queue and wait up to `grace` for workers to drain it
    ///
    /// Returns the number of workers abandoned still running.
    pub fn shutdown(mut self, grace: Duration) -> usize {
        drop(self.sender.take());

        let deadline = Instant::now() + grace;
        let mut abandoned = 0;

        for worker in self.workers.drain(..) {
            while !worker.thread.is_finished() && Instant::now() < deadline {
                thread::sleep(JOIN_POLL_INTERVAL);
            }

            if worker.thread.is_finished() {
                tracing::debug!("Shutting down worker {}", worker.id);
                if worker.thread.join().is_err() {
                    tracing::error!("Worker {} panicked", worker.id);
                }
            } else {
                tracing::warn!("Abandoning busy worker {}", worker.id);
                abandoned += 1;
            }
        }

        abandoned
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        // Closing the queue lets idle workers exit; nobody is joined here
        drop(self.sender.take());
    }
}

struct Worker {
    id: usize,
    thread: thread::JoinHandle<()>,
}

impl Worker {
    fn spawn(
        id: usize,
        receiver: Receiver<TcpStream>,
        handler: Arc<ConnectionHandler>,
        active: Arc<AtomicUsize>,
    ) -> Result<Self> {
        let thread = thread::Builder::new()
            .name(format!("poolfs-worker-{}", id))
            .spawn(move || {
                // Ends once the queue is closed and drained
                for stream in receiver.iter() {
                    active.fetch_add(1, Ordering::SeqCst);
                    tracing::trace!("worker {} handling a connection", id);
                    handler.handle(stream);
                    active.fetch_sub(1, Ordering::SeqCst);
                }
                tracing::trace!("worker {} disconnected", id);
            })?;

        Ok(Self { id, thread })
    }
}
