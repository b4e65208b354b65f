//! HTTP handlers for the session endpoints.
//!
//! # Available Handlers
//!
//! - [`login_handler`] - `POST /auth/login`, credential login
//! - [`logout_handler`] - `POST /auth/logout`, session teardown

pub mod error;
pub mod login;
pub mod logout;

pub use login::{LoginState, login_handler};
pub use logout::{LogoutState, logout_handler};
