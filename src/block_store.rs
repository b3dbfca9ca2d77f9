//! Block Store: the content-addressed blob namespace (§4.2).
//!
//! Keyed by `hash` alone — the Open Question in §9 about keying on
//! `(hash, size)` is resolved against `hash`, since BLAKE2b-256 makes
//! collisions infeasible and `size` is a pure function of `content`.
//! `BlockStore` owns every CQL statement that touches `<data_ks>.blocks`
//! and `<meta_ks>.blocks_usage`; nothing above it ever sees statement text.

use std::sync::Arc;

use anyhow::{anyhow, Result};

use crate::backend::{Consistency, Gateway, Handle, Value};
use crate::block::{Block, Novelty};
use crate::config::{Config, DATA_KEYSPACE, META_KEYSPACE};

pub struct BlockStore {
    gateway: Arc<dyn Gateway>,
    insert_block: Handle,
    exists_block: Handle,
    exists_many: Handle,
    exists_many_width: usize,
    select_content_many: Handle,
    inc_usage: Handle,
    maintain_usage_counters: bool,
}

impl BlockStore {
    /// Prepares every statement this component needs, once, at
    /// construction. `exists_many_width` fixes N for `exists_many`/
    /// `select_content_many` to the configured batch size (§4.2: "N fixed
    /// per deployment").
    pub fn new(gateway: Arc<dyn Gateway>, config: &Config) -> Result<Self> {
        let width = config.batch_size.max(1);

        let insert_block = gateway.prepare(&format!(
            "insert into {}.blocks (block_hash, block_size, content) values (?, ?, ?)",
            DATA_KEYSPACE
        ))?;

        let exists_block = gateway.prepare(&format!(
            "select block_hash from {}.blocks where block_hash = ? limit 1",
            DATA_KEYSPACE
        ))?;

        let placeholders = std::iter::repeat("?")
            .take(width)
            .collect::<Vec<_>>()
            .join(", ");

        let exists_many = gateway.prepare(&format!(
            "select block_hash from {}.blocks where block_hash in ({})",
            DATA_KEYSPACE, placeholders
        ))?;

        let select_content_many = gateway.prepare(&format!(
            "select block_hash, block_size, content from {}.blocks where block_hash in ({})",
            DATA_KEYSPACE, placeholders
        ))?;

        let inc_usage = gateway.prepare(&format!(
            "update {}.blocks_usage set num_ref = num_ref + 1 where block_hash = ? and block_size = ?",
            META_KEYSPACE
        ))?;

        Ok(Self {
            gateway,
            insert_block,
            exists_block,
            exists_many,
            exists_many_width: width,
            select_content_many,
            inc_usage,
            maintain_usage_counters: config.maintain_usage_counters,
        })
    }

    /// Returns true iff a row with this hash is present. Never fetches
    /// `content` (§4.2).
    pub fn exists(&self, hash: &str) -> Result<bool> {
        let rows = self.gateway.execute(
            self.exists_block,
            &[Value::from(hash)],
            Consistency::LocalOne,
        )?;
        Ok(!rows.is_empty())
    }

    /// One round trip determining which of up to `exists_many_width`
    /// hashes already exist. `hashes` must not exceed that width.
    pub fn exists_many(&self, hashes: &[String]) -> Result<std::collections::HashSet<String>> {
        let params = self.padded_hash_params(hashes)?;
        let rows = self
            .gateway
            .execute(self.exists_many, &params, Consistency::LocalOne)?;
        Ok(rows
            .into_iter()
            .filter_map(|row| row.text(0).map(|s| s.to_string()))
            .collect())
    }

    /// Idempotent insert of `(hash, |content|, content)`.
    pub fn put(&self, hash: &str, content: &[u8]) -> Result<()> {
        self.gateway.execute(
            self.insert_block,
            &[
                Value::from(hash),
                Value::from(content.len() as i64),
                Value::from(content.to_vec()),
            ],
            Consistency::LocalOne,
        )?;
        Ok(())
    }

    /// Inserts `(hash, content)` iff no row for `hash` existed at call
    /// start. Returns whether this call actually created the row; this is
    /// advisory (used for stats), not a correctness signal — two
    /// concurrent callers racing on the same hash may both observe
    /// `!exists` and both `put`, which is safe because `put` is an
    /// idempotent upsert on the primary key and content is a function of
    /// the hash.
    pub fn maybe_store(&self, hash: &str, content: &[u8]) -> Result<bool> {
        let was_new = !self.exists(hash)?;
        if was_new {
            self.put(hash, content)?;
        } else if self.maintain_usage_counters {
            self.gateway.execute(
                self.inc_usage,
                &[Value::from(hash), Value::from(content.len() as i64)],
                Consistency::LocalOne,
            )?;
        }
        Ok(was_new)
    }

    /// One `exists_many` round trip followed by `put` for whichever chunks
    /// were missing, returning a `Block` per input chunk with `is_new` set
    /// relative to the pre-call state. This is the entry point the Store
    /// Pipeline's workers actually call (§4.4).
    pub fn maybe_store_batch(&self, chunks: &[(u64, Vec<u8>)]) -> Result<Vec<Block>> {
        if chunks.len() > self.exists_many_width {
            return Err(anyhow!(
                "maybe_store_batch: {} chunks exceeds configured width {}",
                chunks.len(),
                self.exists_many_width
            ));
        }

        let hashes: Vec<String> = chunks
            .iter()
            .map(|(_, content)| Block::hash_content(content))
            .collect();
        let existing = self.exists_many(&hashes)?;

        let mut blocks = Vec::with_capacity(chunks.len());
        for ((offset, content), hash) in chunks.iter().zip(hashes.into_iter()) {
            let already_present = existing.contains(&hash);
            if already_present {
                if self.maintain_usage_counters {
                    self.gateway.execute(
                        self.inc_usage,
                        &[Value::from(hash.as_str()), Value::from(content.len() as i64)],
                        Consistency::LocalOne,
                    )?;
                }
            } else {
                self.put(&hash, content)?;
            }
            let is_new = if already_present {
                Novelty::Existing
            } else {
                Novelty::New
            };
            blocks.push(Block::new(*offset, content.len() as u64, hash, is_new));
        }

        Ok(blocks)
    }

    /// Fetches the content for up to `exists_many_width` hashes in one
    /// round trip, used by the Restore Pipeline's fetch workers (§4.5).
    /// Returns `(hash, content)` pairs for whatever was found; a hash with
    /// no matching row is simply absent from the result (the caller raises
    /// `MissingBlock`).
    pub fn fetch_many(&self, hashes: &[String]) -> Result<Vec<(String, Vec<u8>)>> {
        let params = self.padded_hash_params(hashes)?;
        let rows =
            self.gateway
                .execute(self.select_content_many, &params, Consistency::One)?;
        Ok(rows
            .into_iter()
            .filter_map(|row| {
                let hash = row.text(0)?.to_string();
                let content = row.blob(2)?.to_vec();
                Some((hash, content))
            })
            .collect())
    }

    /// `IN (...)` needs exactly `exists_many_width` bound parameters since
    /// the statement was prepared with that many placeholders; pad with a
    /// hash that cannot collide with anything real (the zero hash never
    /// occurs because it is not `BLAKE2b-256` of anything we store, by
    /// construction of the digest).
    fn padded_hash_params(&self, hashes: &[String]) -> Result<Vec<Value>> {
        if hashes.len() > self.exists_many_width {
            return Err(anyhow!(
                "batch of {} hashes exceeds configured width {}",
                hashes.len(),
                self.exists_many_width
            ));
        }
        let mut params: Vec<Value> = hashes.iter().map(|h| Value::from(h.as_str())).collect();
        while params.len() < self.exists_many_width {
            params.push(Value::from(""));
        }
        Ok(params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory_gateway::MemoryGateway;

    fn store() -> BlockStore {
        let gateway = Arc::new(MemoryGateway::new());
        BlockStore::new(gateway, &Config::default()).unwrap()
    }

    #[test]
    fn put_then_exists_is_true() {
        let store = store();
        let hash = Block::hash_content(b"hello");
        assert!(!store.exists(&hash).unwrap());
        store.put(&hash, b"hello").unwrap();
        assert!(store.exists(&hash).unwrap());
    }

    #[test]
    fn maybe_store_reports_novelty_correctly() {
        let store = store();
        let hash = Block::hash_content(b"hello");
        assert!(store.maybe_store(&hash, b"hello").unwrap());
        assert!(!store.maybe_store(&hash, b"hello").unwrap());
    }

    #[test]
    fn maybe_store_batch_sets_is_new_per_chunk() {
        let store = store();
        let pre_existing = b"already here".to_vec();
        let hash = Block::hash_content(&pre_existing);
        store.put(&hash, &pre_existing).unwrap();

        let chunks = vec![(0u64, pre_existing.clone()), (100u64, b"brand new".to_vec())];
        let blocks = store.maybe_store_batch(&chunks).unwrap();

        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].is_new, Novelty::Existing);
        assert_eq!(blocks[1].is_new, Novelty::New);
        assert!(store.exists(&blocks[1].hash).unwrap());
    }

    #[test]
    fn fetch_many_roundtrips_content() {
        let store = store();
        let content = b"round trip me".to_vec();
        let hash = Block::hash_content(&content);
        store.put(&hash, &content).unwrap();

        let found = store.fetch_many(&[hash.clone()]).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].0, hash);
        assert_eq!(found[0].1, content);
    }

    #[test]
    fn fetch_many_omits_missing_hashes() {
        let store = store();
        let found = store.fetch_many(&["not-a-real-hash".to_string()]).unwrap();
        assert!(found.is_empty());
    }
}
