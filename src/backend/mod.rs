//! The Backend Gateway: a thin capability layer over the database session.
//!
//! §4.1 is explicit that upper layers never see statement text or a
//! session handle directly — they call typed wrappers on [`BlockStore`]
//! and [`ManifestStore`], which in turn speak only this capability set:
//! prepare, execute, batch, batch-add, execute-batch, each consistency
//! tagged. The database driver itself is an external collaborator (§1);
//! [`scylla_gateway`] is the production binding, [`memory_gateway`] is an
//! in-process stand-in used by tests and by anything exercising the
//! pipelines without a cluster available.
//!
//! [`BlockStore`]: crate::block_store::BlockStore
//! [`ManifestStore`]: crate::manifest_store::ManifestStore

pub mod memory_gateway;
pub mod scylla_gateway;

use anyhow::Result;

/// Consistency level a single request is issued at. §6: manifest writes use
/// `Quorum`; block writes use `LocalOne`; block existence checks and reads
/// use `One` (single replica, lowest latency — acceptable because content
/// is addressed by hash and, in practice, immutable).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Consistency {
    One,
    LocalOne,
    Quorum,
}

/// A bound CQL parameter. Only the handful of types the two tables in §6
/// actually need.
#[derive(Debug, Clone)]
pub enum Value {
    Text(String),
    BigInt(i64),
    Blob(Vec<u8>),
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}
impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}
impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::BigInt(n)
    }
}
impl From<u64> for Value {
    fn from(n: u64) -> Self {
        Value::BigInt(n as i64)
    }
}
impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Blob(b)
    }
}

/// One returned row: positional values, in the order the query's select
/// list names them.
#[derive(Debug, Clone, Default)]
pub struct Row(pub Vec<Value>);

impl Row {
    pub fn text(&self, i: usize) -> Option<&str> {
        match self.0.get(i) {
            Some(Value::Text(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn bigint(&self, i: usize) -> Option<i64> {
        match self.0.get(i) {
            Some(Value::BigInt(n)) => Some(*n),
            _ => None,
        }
    }

    pub fn blob(&self, i: usize) -> Option<&[u8]> {
        match self.0.get(i) {
            Some(Value::Blob(b)) => Some(b.as_slice()),
            _ => None,
        }
    }
}

/// Opaque handle to a prepared statement. Only the Gateway implementation
/// knows what it actually refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle(pub u64);

/// A batch of prepared-statement invocations, built up via [`Gateway::batch_add`]
/// and executed as one round trip by [`Gateway::execute_batch`].
pub struct Batch {
    pub consistency: Consistency,
    pub entries: Vec<(Handle, Vec<Value>)>,
}

/// The capability set upper layers are allowed to use. No implementation of
/// this trait may build CQL by string formatting user- or hash-derived
/// values (§9) — every value here is a bound parameter.
pub trait Gateway: Send + Sync {
    /// Prepare `stmt` once; the returned handle may be reused by any
    /// number of subsequent `execute`/`batch_add` calls.
    fn prepare(&self, stmt: &str) -> Result<Handle>;

    /// Execute a previously prepared statement with bound `params` at the
    /// given consistency level, returning whatever rows it selected (empty
    /// for writes).
    fn execute(&self, handle: Handle, params: &[Value], consistency: Consistency)
        -> Result<Vec<Row>>;

    /// Start a new, empty batch at the given consistency level.
    fn batch(&self, consistency: Consistency) -> Batch {
        Batch {
            consistency,
            entries: Vec::new(),
        }
    }

    /// Queue one prepared-statement invocation into `batch`.
    fn batch_add(&self, batch: &mut Batch, handle: Handle, params: &[Value]) {
        batch.entries.push((handle, params.to_vec()));
    }

    /// Execute every statement queued in `batch` as a single round trip.
    fn execute_batch(&self, batch: Batch) -> Result<()>;
}
