//! Store-level mutual exclusion for subscriptions.
//!
//! The optimistic checkpoint write already prevents double advancement.
//! The lock turns the remaining race (two runners reading and handling the
//! same batch) into a hard error at startup.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::Result;

/// Numeric lock key for a subscription id.
///
/// First eight bytes of the SHA-256 digest, big-endian. Stable across
/// processes and releases, which is what advisory locks keyed by `bigint`
/// require.
pub fn lock_id_for(subscription_id: &str) -> i64 {
    let digest = Sha256::digest(subscription_id.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    i64::from_be_bytes(bytes)
}

/// Proof of lock ownership. Must be handed back to `release`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockGuard {
    pub subscription_id: String,
    pub lock_id: i64,
    /// Owner token distinguishing this holder from a previous one.
    pub owner: String,
}

/// Interface for subscription locks.
///
/// Implementations:
/// - `PostgresAdvisoryLock`: session-level `pg_try_advisory_lock`
/// - `SqliteSubscriptionLock`: row in `subscription_locks`
/// - `MockSubscriptionLock`: In-memory mock for testing
#[async_trait]
pub trait SubscriptionLock: Send + Sync {
    /// Try to take the lock without waiting. `None` if someone else holds it.
    async fn try_acquire(&self, subscription_id: &str) -> Result<Option<LockGuard>>;

    /// Release a lock previously returned by `try_acquire`.
    async fn release(&self, guard: LockGuard) -> Result<()>;
}
