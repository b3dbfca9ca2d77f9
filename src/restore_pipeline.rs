//! Restore Pipeline (§4.5): manifest → FIFO fetch-task pool → fetch workers
//! → offset-ordered writer.
//!
//! The manifest names blocks in offset order but nothing guarantees they
//! arrive back from the backend in that order once `workers` fetch workers
//! are racing against each other. §4.5 describes the original ordering
//! fix as a busy-spinning priority queue; here the writer instead blocks on
//! a condvar until the block at its expected offset appears, which is the
//! same ordering guarantee without burning a core while it waits (see
//! SPEC_FULL.md's restore-ordering design note).

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use anyhow::{anyhow, Result};
use parking_lot::{Condvar, Mutex};

use crate::block::Block;
use crate::block_store::BlockStore;
use crate::config::Config;
use crate::error::CasstorError;
use crate::manifest_store::ManifestStore;
use crate::stats::RestoreStats;

/// Reads the manifest for `src_path` and reassembles its content into
/// `dst`, dispatching fetches across `config.workers` threads, each
/// pulling up to `config.batch_size` descriptors per `fetch_many` round
/// trip.
pub fn restore_file(
    block_store: Arc<BlockStore>,
    manifest_store: &ManifestStore,
    config: &Config,
    src_path: &str,
    dst: &Path,
) -> Result<RestoreStats> {
    let start = Instant::now();
    let descriptors = Arc::new(manifest_store.read(src_path)?);

    let mut out = File::create(dst)?;
    if descriptors.is_empty() {
        return Ok(RestoreStats {
            elapsed: start.elapsed(),
            ..Default::default()
        });
    }

    let next_index = Arc::new(AtomicUsize::new(0));
    let queue = Arc::new(RestoreQueue::new(config.workers));

    let handles: Vec<_> = (0..config.workers)
        .map(|_| {
            let block_store = Arc::clone(&block_store);
            let descriptors = Arc::clone(&descriptors);
            let next_index = Arc::clone(&next_index);
            let queue = Arc::clone(&queue);
            let batch_size = config.batch_size.max(1);
            thread::spawn(move || {
                let _guard = WorkerGuard(&queue);
                if let Err(err) = fetch_worker(&block_store, &descriptors, &next_index, &queue, batch_size) {
                    queue.fail(err);
                }
            })
        })
        .collect();

    let mut written: u64 = 0;
    let mut write_error = None;
    for expected in descriptors.iter() {
        match queue.pop_expected(expected.offset) {
            Ok(block) => {
                let content = block
                    .content
                    .as_deref()
                    .expect("fetch worker always populates content");
                if let Err(err) = out.write_all(content) {
                    write_error = Some(err.into());
                    break;
                }
                written += block.size;
            }
            Err(err) => {
                write_error = Some(err);
                break;
            }
        }
    }

    for handle in handles {
        let _ = handle.join();
    }

    if let Some(err) = write_error {
        return Err(err);
    }

    Ok(RestoreStats {
        total_bytes: written,
        block_count: descriptors.len() as u64,
        peak_queue_depth: queue.peak_depth(),
        elapsed: start.elapsed(),
    })
}

fn fetch_worker(
    block_store: &BlockStore,
    descriptors: &[Block],
    next_index: &AtomicUsize,
    queue: &RestoreQueue,
    batch_size: usize,
) -> Result<()> {
    loop {
        let start = next_index.fetch_add(batch_size, Ordering::SeqCst);
        if start >= descriptors.len() {
            return Ok(());
        }
        let end = (start + batch_size).min(descriptors.len());
        let slice = &descriptors[start..end];

        let hashes: Vec<String> = slice.iter().map(|d| d.hash.clone()).collect();
        let fetched = block_store.fetch_many(&hashes)?;
        let mut by_hash: HashMap<String, Vec<u8>> = fetched.into_iter().collect();

        for descriptor in slice {
            let content = by_hash.remove(&descriptor.hash).ok_or_else(|| {
                CasstorError::MissingBlock {
                    offset: descriptor.offset,
                    hash: descriptor.hash.clone(),
                }
            })?;

            let actual = Block::hash_content(&content);
            if actual != descriptor.hash {
                return Err(CasstorError::HashMismatch {
                    offset: descriptor.offset,
                    expected: descriptor.hash.clone(),
                    actual,
                }
                .into());
            }

            let mut block = descriptor.clone();
            block.content = Some(content);
            queue.push(block);
        }
    }
}

/// Orders fetched blocks by offset and lets the writer thread wait for the
/// next one it needs instead of busy-spinning.
struct RestoreQueue {
    state: Mutex<QueueState>,
    condvar: Condvar,
}

struct QueueState {
    heap: BinaryHeap<Reverse<OrderedBlock>>,
    error: Option<anyhow::Error>,
    workers_remaining: usize,
    peak_depth: usize,
}

struct OrderedBlock(Block);

impl PartialEq for OrderedBlock {
    fn eq(&self, other: &Self) -> bool {
        self.0.offset == other.0.offset
    }
}
impl Eq for OrderedBlock {}
impl PartialOrd for OrderedBlock {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for OrderedBlock {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.offset.cmp(&other.0.offset)
    }
}

impl RestoreQueue {
    fn new(workers: usize) -> Self {
        Self {
            state: Mutex::new(QueueState {
                heap: BinaryHeap::new(),
                error: None,
                workers_remaining: workers.max(1),
                peak_depth: 0,
            }),
            condvar: Condvar::new(),
        }
    }

    fn push(&self, block: Block) {
        let mut state = self.state.lock();
        state.heap.push(Reverse(OrderedBlock(block)));
        state.peak_depth = state.peak_depth.max(state.heap.len());
        self.condvar.notify_all();
    }

    fn fail(&self, err: anyhow::Error) {
        let mut state = self.state.lock();
        if state.error.is_none() {
            state.error = Some(err);
        }
        self.condvar.notify_all();
    }

    fn worker_done(&self) {
        let mut state = self.state.lock();
        state.workers_remaining = state.workers_remaining.saturating_sub(1);
        self.condvar.notify_all();
    }

    /// Blocks until the block at `expected_offset` is at the front of the
    /// heap, a worker reported an error, or every worker has exited without
    /// ever producing it (a bug, surfaced rather than hung on forever).
    fn pop_expected(&self, expected_offset: u64) -> Result<Block> {
        let mut state = self.state.lock();
        loop {
            if let Some(Reverse(top)) = state.heap.peek() {
                if top.0.offset == expected_offset {
                    let Reverse(OrderedBlock(block)) = state.heap.pop().expect("peeked above");
                    return Ok(block);
                }
            }
            if let Some(err) = state.error.take() {
                return Err(err);
            }
            if state.workers_remaining == 0 {
                return Err(anyhow!(
                    "restore stalled: offset {} never arrived and no worker reported why",
                    expected_offset
                ));
            }
            self.condvar.wait(&mut state);
        }
    }

    fn peak_depth(&self) -> usize {
        self.state.lock().peak_depth
    }
}

struct WorkerGuard<'a>(&'a RestoreQueue);

impl Drop for WorkerGuard<'_> {
    fn drop(&mut self) {
        self.0.worker_done();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory_gateway::MemoryGateway;
    use crate::chunking::fixed_chunk_sizes;
    use crate::store_pipeline::store_file;
    use std::io::{Read, Write as _};

    fn setup() -> (Arc<BlockStore>, ManifestStore, Config) {
        let gateway = Arc::new(MemoryGateway::new());
        let config = Config {
            workers: 4,
            batch_size: 5,
            ..Config::default()
        };
        let block_store = Arc::new(BlockStore::new(gateway.clone(), &config).unwrap());
        let manifest_store = ManifestStore::new(gateway).unwrap();
        (block_store, manifest_store, config)
    }

    #[test]
    fn empty_manifest_restores_to_empty_file() {
        let (block_store, manifest_store, config) = setup();
        let dir = tempfile::tempdir().unwrap();
        let dst = dir.path().join("out");

        let stats =
            restore_file(block_store, &manifest_store, &config, "/never/written", &dst).unwrap();

        assert_eq!(stats.total_bytes, 0);
        assert_eq!(std::fs::read(&dst).unwrap().len(), 0);
    }

    #[test]
    fn restores_content_identical_to_source_with_many_small_blocks() {
        let (block_store, manifest_store, config) = setup();
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        let data: Vec<u8> = (0..1000u32).map(|i| (i % 251) as u8).collect();
        let mut f = File::create(&src).unwrap();
        f.write_all(&data).unwrap();
        drop(f);

        store_file(
            Arc::clone(&block_store),
            &manifest_store,
            &config,
            &src,
            "/stress",
            fixed_chunk_sizes(1000, 7),
        )
        .unwrap();

        let dst = dir.path().join("restored");
        let stats = restore_file(block_store, &manifest_store, &config, "/stress", &dst).unwrap();

        assert_eq!(stats.total_bytes, 1000);
        let mut restored = Vec::new();
        File::open(&dst).unwrap().read_to_end(&mut restored).unwrap();
        assert_eq!(restored, data);
    }

    #[test]
    fn missing_block_surfaces_as_missing_block_error() {
        let memory_gateway = Arc::new(MemoryGateway::new());
        let config = Config {
            workers: 4,
            batch_size: 5,
            ..Config::default()
        };
        let block_store = Arc::new(BlockStore::new(memory_gateway.clone(), &config).unwrap());
        let manifest_store = ManifestStore::new(memory_gateway.clone()).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        std::fs::write(&src, b"some content to chunk up").unwrap();

        store_file(
            Arc::clone(&block_store),
            &manifest_store,
            &config,
            &src,
            "/gone",
            fixed_chunk_sizes(24, 8),
        )
        .unwrap();

        // Simulate an operator having manually deleted an underlying block.
        let manifest = manifest_store.read("/gone").unwrap();
        let victim_hash = manifest[0].hash.clone();
        memory_gateway.remove_block_for_test(&victim_hash);

        let dst = dir.path().join("restored");
        let err = restore_file(block_store, &manifest_store, &config, "/gone", &dst).unwrap_err();
        let casstor_err = err.downcast_ref::<CasstorError>();
        assert!(matches!(casstor_err, Some(CasstorError::MissingBlock { .. })));
    }
}
