//! Authentication layer: token codec, password verifiers, session engine, and
//! the cookie-based request gate.

pub mod cookie;
pub mod engine;
pub mod middleware;
pub mod password;
pub mod session;
pub mod token;

pub use engine::{SessionEngine, SessionError, TokenPair};
pub use middleware::{require_session, AppState, AuthSession};
pub use token::{TokenCodec, TokenPurpose};
