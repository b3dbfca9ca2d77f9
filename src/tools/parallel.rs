//! A small named worker pool: a fixed number of joined threads pulling
//! items off a bounded channel and applying one closure per item.
//!
//! Modeled on the teacher's own `tools::ParallelHandler`, referenced (but
//! not retrieved) from `client/pull.rs`'s `ParallelHandler::new("sync
//! chunk writer", 4, move |item| { .. })` — the same named-pool-of-closures
//! shape, generalized here to own its channel explicitly and to surface
//! worker errors through `join()` instead of letting a panic take down the
//! whole process silently.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use anyhow::Result;
use crossbeam_channel::{bounded, Sender};
use parking_lot::Mutex;

pub struct ParallelHandler<T: Send + 'static> {
    name: String,
    sender: Option<Sender<T>>,
    handles: Vec<JoinHandle<()>>,
    error: Arc<Mutex<Option<anyhow::Error>>>,
    failed: Arc<AtomicBool>,
}

impl<T: Send + 'static> ParallelHandler<T> {
    /// Spawns `threads` workers named `"<name>-<i>"`, each repeatedly
    /// pulling an item from a channel of capacity `queue_depth` and
    /// applying `handler`. `queue_depth` is the pipeline's sole
    /// backpressure mechanism: `send` blocks once it is full.
    pub fn new<F>(name: &str, threads: usize, queue_depth: usize, handler: F) -> Self
    where
        F: Fn(T) -> Result<()> + Send + Sync + 'static,
    {
        let (sender, receiver) = bounded::<T>(queue_depth);
        let handler = Arc::new(handler);
        let error: Arc<Mutex<Option<anyhow::Error>>> = Arc::new(Mutex::new(None));
        let failed = Arc::new(AtomicBool::new(false));

        let handles = (0..threads.max(1))
            .map(|i| {
                let receiver = receiver.clone();
                let handler = Arc::clone(&handler);
                let error = Arc::clone(&error);
                let failed = Arc::clone(&failed);
                std::thread::Builder::new()
                    .name(format!("{}-{}", name, i))
                    .spawn(move || {
                        while let Ok(item) = receiver.recv() {
                            if let Err(err) = handler(item) {
                                let mut slot = error.lock();
                                if slot.is_none() {
                                    *slot = Some(err);
                                }
                                failed.store(true, Ordering::SeqCst);
                            }
                        }
                    })
                    .expect("failed to spawn worker thread")
            })
            .collect();

        Self {
            name: name.to_string(),
            sender: Some(sender),
            handles,
            error,
            failed,
        }
    }

    /// Blocks until there is room in the queue, then hands `item` to
    /// whichever worker picks it up next.
    pub fn send(&self, item: T) -> Result<()> {
        self.sender
            .as_ref()
            .expect("send after join")
            .send(item)
            .map_err(|_| anyhow::anyhow!("{}: worker pool channel closed", self.name))
    }

    /// True once any worker has reported an error. Callers may poll this
    /// to stop feeding new work early, though `join` is what actually
    /// surfaces the error.
    pub fn has_failed(&self) -> bool {
        self.failed.load(Ordering::SeqCst)
    }

    /// Closes the input side, waits for every worker to drain and exit,
    /// then returns the first error any worker reported. No error is ever
    /// silently dropped (§5/§7).
    pub fn join(mut self) -> Result<()> {
        self.sender.take();
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
        match self.error.lock().take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn processes_every_item() {
        let seen = Arc::new(AtomicUsize::new(0));
        let seen2 = Arc::clone(&seen);
        let pool = ParallelHandler::new("test", 4, 4, move |_: usize| {
            seen2.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        for i in 0..100 {
            pool.send(i).unwrap();
        }
        pool.join().unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 100);
    }

    #[test]
    fn surfaces_first_worker_error() {
        let pool = ParallelHandler::new("test", 2, 2, |item: i32| {
            if item == 3 {
                Err(anyhow::anyhow!("boom at 3"))
            } else {
                Ok(())
            }
        });
        for i in 0..10 {
            pool.send(i).unwrap();
        }
        let result = pool.join();
        assert!(result.is_err());
    }
}
