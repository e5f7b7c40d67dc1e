//! Shared page cursor
//!
//! Upstream has no server-side cursor and no known length, so workers carve
//! the sequence into pages themselves. Each claim advances the cursor by one
//! page; a range is handed out exactly once and never returned.

use std::sync::atomic::{AtomicU64, Ordering};

/// A claimed `[offset, offset + limit)` range of the upstream sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct PageClaim {
    pub offset: u64,
    pub limit: u64,
}

impl PageClaim {
    pub fn end(&self) -> u64 {
        self.offset + self.limit
    }
}

/// Monotonic cursor shared by every worker of one run
#[derive(Debug)]
pub struct OffsetAllocator {
    next: AtomicU64,
    page_size: u64,
}

impl OffsetAllocator {
    /// A zero page size is bumped to one so claims always make progress.
    pub fn new(page_size: u64) -> Self {
        Self {
            next: AtomicU64::new(0),
            page_size: page_size.max(1),
        }
    }

    pub fn page_size(&self) -> u64 {
        self.page_size
    }

    /// Claim the next unissued page. Never blocks beyond the atomic add.
    pub fn claim(&self) -> PageClaim {
        let offset = self.next.fetch_add(self.page_size, Ordering::AcqRel);
        PageClaim {
            offset,
            limit: self.page_size,
        }
    }

    /// Offset the next claim would receive
    pub fn position(&self) -> u64 {
        self.next.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Arc;
    use std::time::Duration;

    fn assert_contiguous(mut claims: Vec<PageClaim>, page_size: u64) {
        claims.sort();
        for (i, claim) in claims.iter().enumerate() {
            assert_eq!(claim.offset, i as u64 * page_size, "gap or overlap at {i}");
            assert_eq!(claim.limit, page_size);
        }
    }

    #[test]
    fn test_sequential_claims() {
        let allocator = OffsetAllocator::new(5000);
        assert_eq!(allocator.claim(), PageClaim { offset: 0, limit: 5000 });
        assert_eq!(allocator.claim().offset, 5000);
        assert_eq!(allocator.position(), 10_000);
    }

    #[test]
    fn test_zero_page_size_still_advances() {
        let allocator = OffsetAllocator::new(0);
        assert_eq!(allocator.claim().end(), 1);
        assert_eq!(allocator.claim().offset, 1);
    }

    #[test]
    fn test_threads_cover_range_without_overlap() {
        let allocator = Arc::new(OffsetAllocator::new(7));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let allocator = allocator.clone();
                std::thread::spawn(move || (0..250).map(|_| allocator.claim()).collect::<Vec<_>>())
            })
            .collect();

        let claims: Vec<PageClaim> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();

        assert_eq!(claims.len(), 2000);
        assert_contiguous(claims, 7);
        assert_eq!(allocator.position(), 2000 * 7);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_racing_workers_never_overlap(
            delays in proptest::collection::vec((0u64..3, 0u64..3), 1..20),
        ) {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .worker_threads(2)
                .enable_time()
                .build()
                .unwrap();

            let claims = runtime.block_on(async {
                let allocator = Arc::new(OffsetAllocator::new(100));
                let spawn_worker = |pick: fn(&(u64, u64)) -> u64| {
                    let allocator = allocator.clone();
                    let delays = delays.clone();
                    tokio::spawn(async move {
                        let mut mine = Vec::new();
                        for delay in &delays {
                            tokio::time::sleep(Duration::from_millis(pick(delay))).await;
                            mine.push(allocator.claim());
                        }
                        mine
                    })
                };

                let a = spawn_worker(|d| d.0);
                let b = spawn_worker(|d| d.1);
                let mut all = a.await.unwrap();
                all.extend(b.await.unwrap());
                all
            });

            prop_assert_eq!(claims.len(), delays.len() * 2);
            assert_contiguous(claims, 100);
        }
    }
}
