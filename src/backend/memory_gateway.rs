//! An in-process stand-in for the wide-column backend, used by tests and
//! by anything exercising the pipelines without a real cluster.
//!
//! It satisfies the exact same [`Gateway`] trait the production
//! [`ScyllaGateway`](super::scylla_gateway::ScyllaGateway) does. Since there
//! is no real CQL engine behind it, `prepare` classifies the statement
//! text once (by shape, not by exact string) into one of the handful of
//! operations `BlockStore`/`ManifestStore` ever issue, and `execute`
//! dispatches on that classification against two in-memory maps mirroring
//! the schema in §6.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{anyhow, Result};
use parking_lot::Mutex;

use super::{Batch, Consistency, Gateway, Handle, Row, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StmtKind {
    InsertBlock,
    ExistsBlock,
    ExistsMany,
    SelectContentMany,
    IncUsage,
    DeleteByPath,
    InsertFile,
    SelectManifest,
}

fn classify(stmt: &str) -> Result<StmtKind> {
    let lower = stmt.to_lowercase();
    let touches_blocks = lower.contains(".blocks ") || lower.contains(".blocks\n") || lower.contains(".blocks(")
        || lower.ends_with(".blocks") || lower.contains(".blocks where") || lower.contains(".blocks_usage");
    if lower.contains("update") && lower.contains("blocks_usage") {
        return Ok(StmtKind::IncUsage);
    }
    if lower.contains("insert into") && lower.contains(".blocks") {
        return Ok(StmtKind::InsertBlock);
    }
    if lower.contains("select block_hash, block_size, content") {
        return Ok(StmtKind::SelectContentMany);
    }
    if lower.contains("select block_hash from") && lower.contains(" in (") {
        return Ok(StmtKind::ExistsMany);
    }
    if lower.contains("select block_hash from") && lower.contains("limit 1") {
        return Ok(StmtKind::ExistsBlock);
    }
    if lower.contains("delete from") && lower.contains(".files") {
        return Ok(StmtKind::DeleteByPath);
    }
    if lower.contains("insert into") && lower.contains(".files") {
        return Ok(StmtKind::InsertFile);
    }
    if lower.contains("select block_offset") && lower.contains(".files") {
        return Ok(StmtKind::SelectManifest);
    }
    let _ = touches_blocks;
    Err(anyhow!("MemoryGateway: unrecognized statement shape: {}", stmt))
}

#[derive(Default)]
struct Tables {
    /// hash -> (size, content)
    blocks: HashMap<String, (i64, Vec<u8>)>,
    /// (path, offset) -> (hash, size)
    files: HashMap<(String, i64), (String, i64)>,
    /// (hash, size) -> num_ref
    blocks_usage: HashMap<(String, i64), i64>,
}

pub struct MemoryGateway {
    statements: Mutex<HashMap<Handle, StmtKind>>,
    next_handle: AtomicU64,
    tables: Mutex<Tables>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self {
            statements: Mutex::new(HashMap::new()),
            next_handle: AtomicU64::new(1),
            tables: Mutex::new(Tables::default()),
        }
    }

    fn kind_of(&self, handle: Handle) -> Result<StmtKind> {
        self.statements
            .lock()
            .get(&handle)
            .copied()
            .ok_or_else(|| anyhow!("MemoryGateway: unknown statement handle {:?}", handle))
    }

    fn apply(&self, kind: StmtKind, params: &[Value]) -> Result<Vec<Row>> {
        let mut tables = self.tables.lock();
        match kind {
            StmtKind::InsertBlock => {
                let hash = text_param(params, 0)?;
                let size = bigint_param(params, 1)?;
                let content = blob_param(params, 2)?;
                tables.blocks.insert(hash, (size, content));
                Ok(vec![])
            }
            StmtKind::ExistsBlock => {
                let hash = text_param(params, 0)?;
                if tables.blocks.contains_key(&hash) {
                    Ok(vec![Row(vec![Value::Text(hash)])])
                } else {
                    Ok(vec![])
                }
            }
            StmtKind::ExistsMany => {
                let mut rows = Vec::new();
                for value in params {
                    if let Value::Text(hash) = value {
                        if !hash.is_empty() && tables.blocks.contains_key(hash) {
                            rows.push(Row(vec![Value::Text(hash.clone())]));
                        }
                    }
                }
                Ok(rows)
            }
            StmtKind::SelectContentMany => {
                let mut rows = Vec::new();
                for value in params {
                    if let Value::Text(hash) = value {
                        if hash.is_empty() {
                            continue;
                        }
                        if let Some((size, content)) = tables.blocks.get(hash) {
                            rows.push(Row(vec![
                                Value::Text(hash.clone()),
                                Value::BigInt(*size),
                                Value::Blob(content.clone()),
                            ]));
                        }
                    }
                }
                Ok(rows)
            }
            StmtKind::IncUsage => {
                let hash = text_param(params, 0)?;
                let size = bigint_param(params, 1)?;
                *tables.blocks_usage.entry((hash, size)).or_insert(0) += 1;
                Ok(vec![])
            }
            StmtKind::DeleteByPath => {
                let path = text_param(params, 0)?;
                tables.files.retain(|(p, _), _| p != &path);
                Ok(vec![])
            }
            StmtKind::InsertFile => {
                let path = text_param(params, 0)?;
                let offset = bigint_param(params, 1)?;
                let hash = text_param(params, 2)?;
                let size = bigint_param(params, 3)?;
                tables.files.insert((path, offset), (hash, size));
                Ok(vec![])
            }
            StmtKind::SelectManifest => {
                let path = text_param(params, 0)?;
                let mut matches: Vec<(i64, String, i64)> = tables
                    .files
                    .iter()
                    .filter(|((p, _), _)| p == &path)
                    .map(|((_, offset), (hash, size))| (*offset, hash.clone(), *size))
                    .collect();
                matches.sort_by_key(|(offset, _, _)| *offset);
                Ok(matches
                    .into_iter()
                    .map(|(offset, hash, size)| {
                        Row(vec![Value::BigInt(offset), Value::Text(hash), Value::BigInt(size)])
                    })
                    .collect())
            }
        }
    }
}

impl Default for MemoryGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryGateway {
    /// Test-only hook simulating an operator (or a failed GC pass) having
    /// removed a block's row directly, bypassing the Block Store's own
    /// insert path. Used to exercise `MissingBlock` on restore. Not gated
    /// behind `cfg(test)` so integration tests in `tests/` can reach it too.
    pub fn remove_block_for_test(&self, hash: &str) {
        self.tables.lock().blocks.remove(hash);
    }
}

impl Gateway for MemoryGateway {
    fn prepare(&self, stmt: &str) -> Result<Handle> {
        let kind = classify(stmt)?;
        let handle = Handle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        self.statements.lock().insert(handle, kind);
        Ok(handle)
    }

    fn execute(
        &self,
        handle: Handle,
        params: &[Value],
        _consistency: Consistency,
    ) -> Result<Vec<Row>> {
        let kind = self.kind_of(handle)?;
        self.apply(kind, params)
    }

    fn execute_batch(&self, batch: Batch) -> Result<()> {
        for (handle, params) in batch.entries {
            let kind = self.kind_of(handle)?;
            self.apply(kind, &params)?;
        }
        Ok(())
    }
}

fn text_param(params: &[Value], i: usize) -> Result<String> {
    match params.get(i) {
        Some(Value::Text(s)) => Ok(s.clone()),
        other => Err(anyhow!("expected text param at {}, got {:?}", i, other)),
    }
}

fn bigint_param(params: &[Value], i: usize) -> Result<i64> {
    match params.get(i) {
        Some(Value::BigInt(n)) => Ok(*n),
        other => Err(anyhow!("expected bigint param at {}, got {:?}", i, other)),
    }
}

fn blob_param(params: &[Value], i: usize) -> Result<Vec<u8>> {
    match params.get(i) {
        Some(Value::Blob(b)) => Ok(b.clone()),
        other => Err(anyhow!("expected blob param at {}, got {:?}", i, other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unrecognized_statement_is_rejected_at_prepare_time() {
        let gateway = MemoryGateway::new();
        assert!(gateway.prepare("drop table blocks").is_err());
    }

    #[test]
    fn insert_and_exists_round_trip() {
        let gateway = MemoryGateway::new();
        let insert = gateway
            .prepare("insert into dedup_data.blocks (block_hash, block_size, content) values (?, ?, ?)")
            .unwrap();
        let exists = gateway
            .prepare("select block_hash from dedup_data.blocks where block_hash = ? limit 1")
            .unwrap();

        gateway
            .execute(
                insert,
                &[Value::from("h"), Value::from(3i64), Value::from(b"abc".to_vec())],
                Consistency::LocalOne,
            )
            .unwrap();

        let rows = gateway
            .execute(exists, &[Value::from("h")], Consistency::LocalOne)
            .unwrap();
        assert_eq!(rows.len(), 1);

        let rows = gateway
            .execute(exists, &[Value::from("missing")], Consistency::LocalOne)
            .unwrap();
        assert!(rows.is_empty());
    }
}
