pub mod bootstrap;
pub mod cache;
pub mod config;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod observability;
pub mod readiness;
pub mod retry;
pub mod server;
pub mod state;

pub use cache::{CacheBackend, CachedEntry, InvalidationListener};
pub use config::{AppConfig, RedisConfig, ServerConfig};
pub use observability::init_tracing;
pub use readiness::{ReadinessError, SystemStateMachine};
pub use retry::{BackoffPolicy, ResilientBackend};
pub use server::{ServerBuilder, TesseraServer, build_app};
pub use state::{AppContext, create_cache_backend};
