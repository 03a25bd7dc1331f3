use crate::block_source::{BlockMeta, BlockSource, BlockTarget, ProviderError};

/// Binary search over block timestamps. Assumes timestamps are
/// monotonically non-decreasing with block number; this is not verified.
pub struct BlockFinder<S> {
    source: S,
}

impl<S: BlockSource> BlockFinder<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    /// Finds the highest-numbered block whose timestamp is at or before
    /// `latest.timestamp - seconds_ago`. Among blocks with equal timestamps
    /// the highest number wins. Returns `None` when every block, genesis
    /// included, is newer than the target time.
    ///
    /// Probes are strictly sequential: each search bound depends on the
    /// previous probe. Any provider error aborts the search immediately.
    pub async fn find_block_at_or_before(
        &self,
        seconds_ago: u64,
    ) -> Result<Option<BlockMeta>, ProviderError> {
        let latest = self.source.block_meta(BlockTarget::Latest).await?;
        let target_time = latest.timestamp.saturating_sub(seconds_ago);

        tracing::debug!(
            "Searching for last block at or before timestamp {target_time} (latest: block {} at {})",
            latest.number,
            latest.timestamp
        );

        let mut lo: u64 = 0;
        let mut hi = latest.number;
        let mut best: Option<BlockMeta> = None;

        while lo <= hi {
            let mid = lo + (hi - lo) / 2;
            let probe = self.source.block_meta(BlockTarget::Number(mid)).await?;

            if probe.timestamp <= target_time {
                best = Some(probe);
                lo = mid + 1;
            } else if mid == 0 {
                // Genesis is already past the target time.
                break;
            } else {
                hi = mid - 1;
            }
        }

        Ok(best)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Chain of `len` blocks with timestamps interpolated linearly
    /// between `genesis_ts` and `latest_ts`.
    struct LinearChain {
        len: u64,
        genesis_ts: u64,
        latest_ts: u64,
        probes: AtomicUsize,
    }

    impl LinearChain {
        fn new(len: u64, genesis_ts: u64, latest_ts: u64) -> Self {
            Self {
                len,
                genesis_ts,
                latest_ts,
                probes: AtomicUsize::new(0),
            }
        }

        fn timestamp(&self, number: u64) -> u64 {
            if self.len == 1 {
                return self.genesis_ts;
            }
            self.genesis_ts + (self.latest_ts - self.genesis_ts) * number / (self.len - 1)
        }
    }

    impl BlockSource for LinearChain {
        async fn block_meta(&self, target: BlockTarget) -> Result<BlockMeta, ProviderError> {
            self.probes.fetch_add(1, Ordering::Relaxed);
            let number = match target {
                BlockTarget::Latest => self.len - 1,
                BlockTarget::Number(n) if n < self.len => n,
                BlockTarget::Number(_) => return Err(ProviderError::BlockNotFound(target)),
            };
            Ok(BlockMeta {
                number,
                timestamp: self.timestamp(number),
            })
        }
    }

    struct FailingSource;

    impl BlockSource for FailingSource {
        async fn block_meta(&self, _target: BlockTarget) -> Result<BlockMeta, ProviderError> {
            Err(ProviderError::Transport("connection refused".to_string()))
        }
    }

    /// Blocks 0..=100 with timestamps 1000..=2000, seconds_ago = 500:
    /// target time is 1500 and block 50 sits exactly on it, so the
    /// boundary-inclusive search must return block 50.
    #[tokio::test]
    async fn test_boundary_inclusive_match() {
        let chain = LinearChain::new(101, 1000, 2000);
        let finder = BlockFinder::new(chain);

        let found = finder.find_block_at_or_before(500).await.unwrap().unwrap();

        assert_eq!(found.number, 50);
        assert_eq!(found.timestamp, 1500);
    }

    #[tokio::test]
    async fn test_target_between_blocks_rounds_down() {
        // Timestamps 1000, 1010, ..., 2000; target time 1995 falls between
        // blocks 99 and 100.
        let chain = LinearChain::new(101, 1000, 2000);
        let finder = BlockFinder::new(chain);

        let found = finder.find_block_at_or_before(5).await.unwrap().unwrap();

        assert_eq!(found.number, 99);
        assert_eq!(found.timestamp, 1990);
    }

    #[tokio::test]
    async fn test_zero_offset_returns_latest() {
        let chain = LinearChain::new(101, 1000, 2000);
        let finder = BlockFinder::new(chain);

        let found = finder.find_block_at_or_before(0).await.unwrap().unwrap();

        assert_eq!(found.number, 100);
    }

    #[tokio::test]
    async fn test_target_before_genesis_returns_none() {
        let chain = LinearChain::new(101, 1000, 2000);
        let finder = BlockFinder::new(chain);

        // target time 2000 - 1500 = 500, older than genesis (1000)
        assert!(finder.find_block_at_or_before(1500).await.unwrap().is_none());

        // seconds_ago past the epoch saturates the target time at 0
        assert!(
            finder
                .find_block_at_or_before(u64::MAX)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_target_at_genesis_returns_genesis() {
        let chain = LinearChain::new(101, 1000, 2000);
        let finder = BlockFinder::new(chain);

        let found = finder.find_block_at_or_before(1000).await.unwrap().unwrap();

        assert_eq!(found.number, 0);
        assert_eq!(found.timestamp, 1000);
    }

    /// Among blocks sharing a timestamp, the highest number wins.
    #[tokio::test]
    async fn test_equal_timestamps_tie_break() {
        struct FlatThenStep;

        impl BlockSource for FlatThenStep {
            async fn block_meta(&self, target: BlockTarget) -> Result<BlockMeta, ProviderError> {
                let number = match target {
                    BlockTarget::Latest => 9,
                    BlockTarget::Number(n) => n,
                };
                // blocks 0..=6 share timestamp 100, blocks 7..=9 are at 200
                let timestamp = if number <= 6 { 100 } else { 200 };
                Ok(BlockMeta { number, timestamp })
            }
        }

        let finder = BlockFinder::new(FlatThenStep);

        let found = finder.find_block_at_or_before(100).await.unwrap().unwrap();

        assert_eq!(found.number, 6);
        assert_eq!(found.timestamp, 100);
    }

    #[tokio::test]
    async fn test_single_block_chain() {
        let chain = LinearChain::new(1, 1000, 1000);
        let finder = BlockFinder::new(chain);

        let found = finder.find_block_at_or_before(0).await.unwrap().unwrap();

        assert_eq!(found.number, 0);
    }

    #[tokio::test]
    async fn test_provider_error_aborts_search() {
        let finder = BlockFinder::new(FailingSource);

        let err = finder.find_block_at_or_before(500).await.unwrap_err();

        assert!(matches!(err, ProviderError::Transport(_)));
    }

    #[tokio::test]
    async fn test_probe_count_is_logarithmic() {
        let chain = LinearChain::new(1_000_001, 1_000_000, 13_000_000);
        let finder = BlockFinder::new(chain);

        let found = finder
            .find_block_at_or_before(6_000_000)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(found.timestamp, 7_000_000);
        // one probe for latest, ~log2(1e6) for the search
        let probes = finder.source.probes.load(Ordering::Relaxed);
        assert!(probes <= 22, "expected at most 22 probes, got {probes}");
    }
}
