//! Build-time telemetry, logged at the end of a run (ambient stack per
//! spec.md's Top-Level Builder). Plain aggregating fields in the same style
//! as the teacher's original posting-list stats struct: no derived state,
//! just counters a caller fills in as each stage finishes.

use std::time::Duration;

#[derive(Default, Debug, Clone)]
pub struct BuildStats {
    pub files_enumerated: usize,
    pub zgrams_digested: usize,
    pub words_emitted: usize,
    pub shard_count: usize,
    pub final_size_bytes: u64,
    pub elapsed: Duration,
}

impl BuildStats {
    pub fn log_summary(&self) {
        log::info!(
            "build complete: {} files, {} zgrams, {} words, {} shards, {} bytes, {:?}",
            self.files_enumerated,
            self.zgrams_digested,
            self.words_emitted,
            self.shard_count,
            self.final_size_bytes,
            self.elapsed,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_stats_are_zeroed() {
        let stats = BuildStats::default();
        assert_eq!(stats.zgrams_digested, 0);
        assert_eq!(stats.final_size_bytes, 0);
    }
}
