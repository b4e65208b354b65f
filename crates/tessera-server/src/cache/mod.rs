//! Distributed session cache tiers.
//!
//! ## Architecture
//!
//! - **L1 (DashMap)**: in-memory, microsecond latency, per-instance
//! - **L2 (Redis)**: network, millisecond latency, shared across instances
//! - **Pub/Sub**: cross-instance invalidation of L1 entries
//!
//! The in-process [`SessionCache`](tessera_auth::SessionCache) sits above
//! both tiers; this module is the [`DistributedCache`] seam below it.
//!
//! ## Graceful Degradation
//!
//! When Redis is disabled or unreachable the backend runs in L1-only mode.
//! Losing L2 costs cross-instance sharing, never correctness.
//!
//! [`DistributedCache`]: tessera_auth::storage::DistributedCache

pub mod backend;
pub mod pubsub;

pub use backend::{CacheBackend, CacheBackendStats, CachedEntry};
pub use pubsub::{INVALIDATION_CHANNEL, InvalidationListener};
