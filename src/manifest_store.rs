//! Manifest Store: the per-path ordered chunk list (§4.3).
//!
//! A manifest row is `(path, offset) -> (hash, size)`. Writing a manifest
//! deletes every existing row for `path` and re-inserts the supplied
//! sequence in batches of ~100 statements, all at quorum; reading one
//! yields an ascending-offset sequence of [`Block`]s with `content` unset.
//!
//! The Open Question in §9 about the malformed `store_file` statement is
//! resolved here: the insert is properly qualified as
//! `insert into <meta_ks>.files(path, block_offset, block_hash, block_size)
//! values (?,?,?,?)`.

use std::sync::Arc;

use anyhow::Result;

use crate::backend::{Consistency, Gateway, Handle, Value};
use crate::block::{Block, Novelty};
use crate::config::META_KEYSPACE;

/// Batches larger than this are split into multiple `execute_batch` calls
/// (§4.3: "batches bounded at ~100 statements each").
const MAX_BATCH_STATEMENTS: usize = 100;

pub struct ManifestStore {
    gateway: Arc<dyn Gateway>,
    delete_by_path: Handle,
    insert_file: Handle,
    select_manifest: Handle,
}

impl ManifestStore {
    pub fn new(gateway: Arc<dyn Gateway>) -> Result<Self> {
        let delete_by_path = gateway.prepare(&format!(
            "delete from {}.files where path = ?",
            META_KEYSPACE
        ))?;

        let insert_file = gateway.prepare(&format!(
            "insert into {}.files(path, block_offset, block_hash, block_size) values (?,?,?,?)",
            META_KEYSPACE
        ))?;

        let select_manifest = gateway.prepare(&format!(
            "select block_offset, block_hash, block_size from {}.files where path = ? order by block_offset asc",
            META_KEYSPACE
        ))?;

        Ok(Self {
            gateway,
            delete_by_path,
            insert_file,
            select_manifest,
        })
    }

    /// Replaces every manifest row for `path` with `blocks`, from a
    /// reader's perspective atomically. `blocks` need not already be
    /// sorted by offset — the `offset` clustering key orders the rows
    /// regardless of insertion order — but callers conventionally sort
    /// first so a partial failure leaves as sensible a prefix as possible.
    ///
    /// A write that fails partway leaves manifest state for `path`
    /// undefined; callers must treat that as "retry or discard", never as
    /// a partially-valid manifest. Blocks already durable in the Block
    /// Store at that point become orphans, recoverable only by a GC this
    /// core does not implement.
    pub fn write(&self, path: &str, blocks: &[Block]) -> Result<()> {
        self.gateway.execute(
            self.delete_by_path,
            &[Value::from(path)],
            Consistency::Quorum,
        )?;

        for chunk in blocks.chunks(MAX_BATCH_STATEMENTS) {
            let mut batch = self.gateway.batch(Consistency::Quorum);
            for block in chunk {
                self.gateway.batch_add(
                    &mut batch,
                    self.insert_file,
                    &[
                        Value::from(path),
                        Value::from(block.offset),
                        Value::from(block.hash.as_str()),
                        Value::from(block.size),
                    ],
                );
            }
            self.gateway.execute_batch(batch)?;
        }

        Ok(())
    }

    /// Yields the manifest for `path` in strictly ascending `offset`
    /// order, with `content` unset and `is_new` meaningless
    /// (`Novelty::Unknown`).
    pub fn read(&self, path: &str) -> Result<Vec<Block>> {
        let rows = self.gateway.execute(
            self.select_manifest,
            &[Value::from(path)],
            Consistency::Quorum,
        )?;

        let mut blocks = Vec::with_capacity(rows.len());
        for row in rows {
            let offset = row.bigint(0).unwrap_or_default() as u64;
            let hash = row.text(1).unwrap_or_default().to_string();
            let size = row.bigint(2).unwrap_or_default() as u64;
            blocks.push(Block::new(offset, size, hash, Novelty::Unknown));
        }
        Ok(blocks)
    }
}
