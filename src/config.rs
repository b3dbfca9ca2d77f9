//! Process-wide tunables: contact points, worker/batch geometry, and the
//! opt-in reference-count maintenance switch (§9 Design Notes).

use std::env;

/// Environment variable naming the backend's contact points.
pub const NODES_ENV: &str = "CASSTOR_NODES";

/// Default contact point used when `CASSTOR_NODES` is unset.
pub const DEFAULT_NODE: &str = "127.0.0.1";

/// Default worker-pool width for both pipelines.
pub const DEFAULT_WORKERS: usize = 4;

/// Default chunk-batch size for both pipelines.
pub const DEFAULT_BATCH: usize = 5;

/// Data keyspace name.
pub const DATA_KEYSPACE: &str = "dedup_data";

/// Metadata keyspace name.
pub const META_KEYSPACE: &str = "dedup_meta";

#[derive(Debug, Clone)]
pub struct Config {
    pub nodes: Vec<String>,
    pub workers: usize,
    pub batch_size: usize,
    /// Off by default: the core does not consume `blocks_usage`, so
    /// maintaining it costs a write per dedup hit for no benefit unless an
    /// external GC process is actually reading it.
    pub maintain_usage_counters: bool,
}

impl Config {
    /// Read `CASSTOR_NODES` from the environment, falling back to
    /// `127.0.0.1`, and apply the documented defaults for worker/batch
    /// geometry.
    pub fn from_env() -> Self {
        let nodes = env::var(NODES_ENV)
            .ok()
            .filter(|s| !s.is_empty())
            .map(|s| s.split(',').map(|n| n.trim().to_string()).collect())
            .unwrap_or_else(|| vec![DEFAULT_NODE.to_string()]);

        Self {
            nodes,
            workers: DEFAULT_WORKERS,
            batch_size: DEFAULT_BATCH,
            maintain_usage_counters: false,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            nodes: vec![DEFAULT_NODE.to_string()],
            workers: DEFAULT_WORKERS,
            batch_size: DEFAULT_BATCH,
            maintain_usage_counters: false,
        }
    }
}
