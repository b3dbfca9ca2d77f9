//! Typed stats accumulators, printed by the CLI at the end of each
//! operation (§6 "Stats").

use std::time::Duration;

#[derive(Debug, Clone, Default)]
pub struct StoreStats {
    pub existing_bytes: u64,
    pub new_bytes: u64,
    pub elapsed: Duration,
}

impl StoreStats {
    pub fn total_bytes(&self) -> u64 {
        self.existing_bytes + self.new_bytes
    }

    /// Percentage of total bytes that were already present.
    pub fn duplication_ratio_percent(&self) -> f64 {
        let total = self.total_bytes();
        if total == 0 {
            0.0
        } else {
            100.0 * self.existing_bytes as f64 / total as f64
        }
    }

    pub fn throughput_mb_s(&self) -> f64 {
        let seconds = self.elapsed.as_secs_f64();
        if seconds <= 0.0 {
            0.0
        } else {
            (self.total_bytes() as f64 / (1024.0 * 1024.0)) / seconds
        }
    }

    pub fn report(&self) -> String {
        format!(
            "existing bytes: {}, new bytes: {}, total bytes: {}, duplication: {:.1}%, elapsed: {:.2}s, throughput: {:.2} MB/s",
            self.existing_bytes,
            self.new_bytes,
            self.total_bytes(),
            self.duplication_ratio_percent(),
            self.elapsed.as_secs_f64(),
            self.throughput_mb_s(),
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct RestoreStats {
    pub total_bytes: u64,
    pub block_count: u64,
    pub peak_queue_depth: usize,
    pub elapsed: Duration,
}

impl RestoreStats {
    pub fn throughput_mb_s(&self) -> f64 {
        let seconds = self.elapsed.as_secs_f64();
        if seconds <= 0.0 {
            0.0
        } else {
            (self.total_bytes as f64 / (1024.0 * 1024.0)) / seconds
        }
    }

    pub fn report(&self) -> String {
        format!(
            "total bytes: {}, blocks: {}, peak queue depth: {}, elapsed: {:.2}s, throughput: {:.2} MB/s",
            self.total_bytes,
            self.block_count,
            self.peak_queue_depth,
            self.elapsed.as_secs_f64(),
            self.throughput_mb_s(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplication_ratio_of_fully_new_file_is_zero() {
        let stats = StoreStats {
            existing_bytes: 0,
            new_bytes: 1024,
            elapsed: Duration::from_secs(1),
        };
        assert_eq!(stats.duplication_ratio_percent(), 0.0);
        assert_eq!(stats.total_bytes(), 1024);
    }

    #[test]
    fn duplication_ratio_of_fully_duplicate_file_is_100() {
        let stats = StoreStats {
            existing_bytes: 1024,
            new_bytes: 0,
            elapsed: Duration::from_secs(1),
        };
        assert_eq!(stats.duplication_ratio_percent(), 100.0);
    }

    #[test]
    fn empty_file_has_zero_ratio_and_throughput() {
        let stats = StoreStats::default();
        assert_eq!(stats.duplication_ratio_percent(), 0.0);
        assert_eq!(stats.throughput_mb_s(), 0.0);
    }
}
