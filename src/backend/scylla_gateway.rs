//! Production [`Gateway`] binding: a `scylla::Session` wrapped so that
//! callers see a synchronous interface.
//!
//! §5 describes the backend as "synchronous, round-trip-heavy"; the real
//! CQL driver is async. Rather than push `async` through both pipelines
//! (which are plain `std::thread` worker pools, not a task executor), each
//! `Gateway` call here borrows a `tokio::runtime::Handle` and blocks the
//! calling thread on it with `block_on`. The driver's own connection
//! multiplexing still applies: many worker threads block concurrently on
//! the same `Session`, and the runtime interleaves their requests on its
//! I/O driver underneath.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use parking_lot::Mutex;
use scylla::batch::{Batch as ScyllaBatch, BatchType};
use scylla::frame::value::SerializedValues;
use scylla::prepared_statement::PreparedStatement;
use scylla::statement::Consistency as ScyllaConsistency;
use scylla::{Session, SessionBuilder};
use tokio::runtime::Handle as RuntimeHandle;

use super::{Batch, Consistency, Gateway, Handle, Row, Value};
use crate::error::CasstorError;

pub struct ScyllaGateway {
    session: Session,
    runtime: RuntimeHandle,
    statements: Mutex<HashMap<Handle, PreparedStatement>>,
    next_handle: AtomicU64,
}

impl ScyllaGateway {
    /// Connects to `nodes` (the contact points read from `CASSTOR_NODES`)
    /// and returns a gateway ready to `prepare` statements. `runtime` is
    /// shared by every worker thread that ends up calling into this
    /// gateway.
    pub fn connect(nodes: &[String], runtime: RuntimeHandle) -> Result<Self> {
        let session = runtime
            .block_on(async {
                let mut builder = SessionBuilder::new();
                for node in nodes {
                    builder = builder.known_node(node);
                }
                builder.build().await
            })
            .map_err(|err| anyhow!(CasstorError::BackendUnavailable(err.to_string())))?;

        Ok(Self {
            session,
            runtime,
            statements: Mutex::new(HashMap::new()),
            next_handle: AtomicU64::new(1),
        })
    }

    fn statement(&self, handle: Handle) -> Result<PreparedStatement> {
        self.statements
            .lock()
            .get(&handle)
            .cloned()
            .ok_or_else(|| anyhow!("ScyllaGateway: unknown statement handle {:?}", handle))
    }
}

impl Gateway for ScyllaGateway {
    fn prepare(&self, stmt: &str) -> Result<Handle> {
        let prepared = self
            .runtime
            .block_on(self.session.prepare(stmt))
            .with_context(|| format!("failed to prepare statement: {}", stmt))
            .map_err(|err| anyhow!(CasstorError::BackendUnavailable(err.to_string())))?;

        let handle = Handle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        self.statements.lock().insert(handle, prepared);
        Ok(handle)
    }

    fn execute(
        &self,
        handle: Handle,
        params: &[Value],
        consistency: Consistency,
    ) -> Result<Vec<Row>> {
        let mut prepared = self.statement(handle)?;
        prepared.set_consistency(to_scylla_consistency(consistency));

        let values = to_serialized_values(params)?;
        let result = self
            .runtime
            .block_on(self.session.execute(&prepared, values))
            .map_err(classify_scylla_error)?;

        rows_from_result(result)
    }

    fn execute_batch(&self, batch: Batch) -> Result<()> {
        let mut scylla_batch = ScyllaBatch::new(BatchType::Logged);
        scylla_batch.set_consistency(to_scylla_consistency(batch.consistency));

        let mut values_list = Vec::with_capacity(batch.entries.len());
        for (handle, params) in &batch.entries {
            let prepared = self.statement(*handle)?;
            scylla_batch.append_statement(prepared);
            values_list.push(to_serialized_values(params)?);
        }

        self.runtime
            .block_on(self.session.batch(&scylla_batch, values_list))
            .map_err(classify_scylla_error)?;

        Ok(())
    }
}

fn to_scylla_consistency(consistency: Consistency) -> ScyllaConsistency {
    match consistency {
        Consistency::One => ScyllaConsistency::One,
        Consistency::LocalOne => ScyllaConsistency::LocalOne,
        Consistency::Quorum => ScyllaConsistency::Quorum,
    }
}

fn to_serialized_values(params: &[Value]) -> Result<SerializedValues> {
    let mut values = SerializedValues::new();
    for param in params {
        match param {
            Value::Text(s) => values.add_value(s)?,
            Value::BigInt(n) => values.add_value(n)?,
            Value::Blob(b) => values.add_value(b)?,
        }
    }
    Ok(values)
}

fn rows_from_result(result: scylla::QueryResult) -> Result<Vec<Row>> {
    let rows = match result.rows {
        Some(rows) => rows,
        None => return Ok(vec![]),
    };

    rows.into_iter()
        .map(|row| {
            let values = row
                .columns
                .into_iter()
                .map(|col| match col {
                    Some(scylla::frame::response::result::CqlValue::Text(s)) => Ok(Value::Text(s)),
                    Some(scylla::frame::response::result::CqlValue::BigInt(n)) => {
                        Ok(Value::BigInt(n))
                    }
                    Some(scylla::frame::response::result::CqlValue::Blob(b)) => Ok(Value::Blob(b)),
                    Some(scylla::frame::response::result::CqlValue::Int(n)) => {
                        Ok(Value::BigInt(n as i64))
                    }
                    other => Err(anyhow!("unexpected column type in result row: {:?}", other)),
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(Row(values))
        })
        .collect()
}

/// Any failure here is either a connection/quorum problem
/// (`BackendUnavailable`) or a single request that timed out / was
/// rate-limited (`BackendTransient`). The Gateway itself never retries
/// (§7) — it just classifies.
fn classify_scylla_error(err: impl std::fmt::Display) -> anyhow::Error {
    let message = err.to_string();
    let lowered = message.to_lowercase();
    if lowered.contains("timeout") || lowered.contains("overloaded") || lowered.contains("rate") {
        anyhow!(CasstorError::BackendTransient(message))
    } else {
        anyhow!(CasstorError::BackendUnavailable(message))
    }
}
