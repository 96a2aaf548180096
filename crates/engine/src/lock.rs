use std::hash::{Hash, Hasher};

use tokio::sync::Mutex;

/// Number of shards in the fingerprint lock table (§5, SPEC_FULL.md §5).
const SHARD_COUNT: usize = 256;

/// Serializes `Engine::process` writes for a given fingerprint without
/// forcing a single global lock: each fingerprint hashes to one of
/// [`SHARD_COUNT`] shards, and distinct fingerprints usually land on
/// distinct shards, so unrelated alerts still process in parallel.
///
/// Grounded in the reference stack's `DistributedLock` abstraction
/// (`acteon-state-memory`'s `DashMap`-backed lock table), generalized here
/// to a fixed in-memory shard table since this core has no
/// distributed-deployment requirement.
pub struct FingerprintLocks {
    shards: Vec<Mutex<()>>,
}

impl FingerprintLocks {
    #[must_use]
    pub fn new() -> Self {
        Self { shards: (0..SHARD_COUNT).map(|_| Mutex::new(())).collect() }
    }

    fn shard_for(&self, fingerprint: &str) -> &Mutex<()> {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        fingerprint.hash(&mut hasher);
        let index = (hasher.finish() as usize) % self.shards.len();
        &self.shards[index]
    }

    /// Hold the shard lock for `fingerprint` for the duration of the guard.
    /// Distinct fingerprints that hash to the same shard serialize too —
    /// an accepted, rare false-sharing cost (SPEC_FULL.md §5).
    pub async fn lock(&self, fingerprint: &str) -> tokio::sync::MutexGuard<'_, ()> {
        self.shard_for(fingerprint).lock().await
    }
}

impl Default for FingerprintLocks {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn same_fingerprint_serializes() {
        let locks = Arc::new(FingerprintLocks::new());
        let counter = Arc::new(AtomicU32::new(0));
        let mut handles = Vec::new();

        for _ in 0..20 {
            let locks = Arc::clone(&locks);
            let counter = Arc::clone(&counter);
            handles.push(tokio::spawn(async move {
                let _guard = locks.lock("same-fp").await;
                let before = counter.fetch_add(1, Ordering::SeqCst);
                assert_eq!(before, 0, "no other task should be inside the critical section");
                tokio::task::yield_now().await;
                counter.fetch_sub(1, Ordering::SeqCst);
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }
    }
}
