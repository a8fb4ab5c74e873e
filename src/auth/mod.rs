//! Authentication and authorization.
//!
//! # Data Flow
//! ```text
//! metadata "authorization" → token.rs (Authenticator) → Option<Identity>
//! rpc method name          → guard.rs (Guards)        → Skip | AtLeast(Group)
//! ```

pub mod guard;
pub mod token;

use serde::{Deserialize, Serialize};

pub use guard::{Group, Guards, Requirement};
pub use token::{Authenticator, TokenTable};

/// Authenticated caller, attached to the request for handlers to read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub username: String,
    pub group: Group,
    #[serde(default)]
    pub dept: String,
}
