//! Store Pipeline (§4.4): reader → bounded batch queue → worker pool
//! {hash, dedup-check, conditional insert} → manifest write.
//!
//! The calling thread *is* the reader/producer; `ParallelHandler::send`
//! blocking on a full queue is the pipeline's sole backpressure mechanism,
//! bounding in-flight content to roughly `workers * batch_size *
//! max_chunk_size` bytes (§5 "Memory bound").

use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use parking_lot::Mutex;

use crate::block::{Block, Novelty};
use crate::block_store::BlockStore;
use crate::chunking::ChunkSizes;
use crate::config::Config;
use crate::manifest_store::ManifestStore;
use crate::stats::StoreStats;
use crate::tools::parallel::ParallelHandler;

/// One unit of work handed to a store-pipeline worker: up to `batch_size`
/// consecutive `(offset, content)` pairs.
type ChunkBatch = Vec<(u64, Vec<u8>)>;

/// Reads `src`, splits it per `chunk_sizes`, deduplicates and stores each
/// unique chunk, and writes the resulting manifest under `dst_path`.
pub fn store_file(
    block_store: Arc<BlockStore>,
    manifest_store: &ManifestStore,
    config: &Config,
    src: &Path,
    dst_path: &str,
    chunk_sizes: impl ChunkSizes,
) -> Result<StoreStats> {
    let start = Instant::now();

    let results: Arc<Mutex<Vec<Block>>> = Arc::new(Mutex::new(Vec::new()));
    let pool = {
        let results = Arc::clone(&results);
        ParallelHandler::new(
            "store-worker",
            config.workers,
            config.workers,
            move |batch: ChunkBatch| {
                let blocks = block_store.maybe_store_batch(&batch)?;
                results.lock().extend(blocks);
                Ok(())
            },
        )
    };

    read_and_dispatch(src, chunk_sizes, config.batch_size, &pool)?;
    pool.join()?;

    let mut blocks = Arc::try_unwrap(results)
        .map(Mutex::into_inner)
        .unwrap_or_else(|arc| arc.lock().clone());
    blocks.sort_by_key(|b| b.offset);

    manifest_store.write(dst_path, &blocks)?;

    let mut stats = StoreStats {
        elapsed: start.elapsed(),
        ..Default::default()
    };
    for block in &blocks {
        match block.is_new {
            Novelty::New => stats.new_bytes += block.size,
            Novelty::Existing => stats.existing_bytes += block.size,
            Novelty::Unknown => {}
        }
    }

    Ok(stats)
}

fn read_and_dispatch(
    src: &Path,
    chunk_sizes: impl ChunkSizes,
    batch_size: usize,
    pool: &ParallelHandler<ChunkBatch>,
) -> Result<()> {
    let mut file = File::open(src)?;
    let mut offset: u64 = 0;
    let mut batch: ChunkBatch = Vec::with_capacity(batch_size);

    for size in chunk_sizes {
        let size = size?;
        let mut buf = vec![0u8; size];
        match file.read_exact(&mut buf) {
            Ok(()) => {
                batch.push((offset, buf));
                offset += size as u64;
                if batch.len() >= batch_size {
                    pool.send(std::mem::replace(&mut batch, Vec::with_capacity(batch_size)))?;
                }
            }
            Err(err) if err.kind() == ErrorKind::UnexpectedEof => {
                // Short read: the source is shorter than the CDC
                // collaborator expected. Stop reading; whatever complete
                // chunks are already batched still get dispatched below.
                break;
            }
            Err(err) => return Err(err.into()),
        }
    }

    if !batch.is_empty() {
        pool.send(batch)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory_gateway::MemoryGateway;
    use crate::chunking::fixed_chunk_sizes;
    use std::io::Write;

    fn setup() -> (Arc<BlockStore>, ManifestStore, Config) {
        let gateway = Arc::new(MemoryGateway::new());
        let config = Config::default();
        let block_store = Arc::new(BlockStore::new(gateway.clone(), &config).unwrap());
        let manifest_store = ManifestStore::new(gateway).unwrap();
        (block_store, manifest_store, config)
    }

    #[test]
    fn empty_file_produces_empty_manifest_and_zero_stats() {
        let (block_store, manifest_store, config) = setup();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty");
        File::create(&path).unwrap();

        let stats = store_file(
            block_store,
            &manifest_store,
            &config,
            &path,
            "/empty",
            fixed_chunk_sizes(0, 10),
        )
        .unwrap();

        assert_eq!(stats.total_bytes(), 0);
        assert!(manifest_store.read("/empty").unwrap().is_empty());
    }

    #[test]
    fn fully_duplicate_chunks_are_all_existing_on_second_store() {
        let (block_store, manifest_store, config) = setup();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("repeat");
        let mut file = File::create(&path).unwrap();
        file.write_all(&[7u8; 40]).unwrap();
        drop(file);

        store_file(
            Arc::clone(&block_store),
            &manifest_store,
            &config,
            &path,
            "/a",
            fixed_chunk_sizes(40, 10),
        )
        .unwrap();

        let stats = store_file(
            block_store,
            &manifest_store,
            &config,
            &path,
            "/b",
            fixed_chunk_sizes(40, 10),
        )
        .unwrap();

        assert_eq!(stats.existing_bytes, 40);
        assert_eq!(stats.new_bytes, 0);
        assert_eq!(manifest_store.read("/b").unwrap().len(), 4);
    }

    #[test]
    fn manifest_preserves_offset_order_across_batches() {
        let (block_store, manifest_store, config) = setup();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("many-chunks");
        let mut file = File::create(&path).unwrap();
        let data: Vec<u8> = (0..200u32).map(|i| (i % 256) as u8).collect();
        file.write_all(&data).unwrap();
        drop(file);

        store_file(
            block_store,
            &manifest_store,
            &config,
            &path,
            "/many",
            fixed_chunk_sizes(200, 10),
        )
        .unwrap();

        let manifest = manifest_store.read("/many").unwrap();
        assert_eq!(manifest.len(), 20);
        for (i, block) in manifest.iter().enumerate() {
            assert_eq!(block.offset, (i * 10) as u64);
        }
    }
}
