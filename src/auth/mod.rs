//! Authentication module.
//!
//! Issues HS256 bearer tokens on login/registration and validates them on
//! every protected route via middleware.

mod claims;
mod error;
mod middleware;
mod state;

pub use claims::Claims;
pub use error::AuthError;
pub use middleware::{CurrentUser, auth_middleware};
pub use state::{AuthState, DEFAULT_TOKEN_TTL_MINUTES};
