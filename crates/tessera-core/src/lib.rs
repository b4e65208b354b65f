pub mod error;
pub mod health;
pub mod tenant;
pub mod time;
pub mod user;

pub use error::{CoreError, Result};
pub use health::{ServiceHealth, ServiceStatus, SystemState};
pub use tenant::{DEFAULT_TENANT, TenantId};
pub use time::{Timestamp, now_utc};
pub use user::{Role, User};
