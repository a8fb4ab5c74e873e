//! RPC subsystem.
//!
//! # Data Flow
//! ```text
//! POST /{package.Service}/{Method}
//!     → dispatch.rs (decode JSON body, look up handler)
//!     → interceptor.rs (admission, auth, locale, recovery, normalization, access log)
//!     → handler.rs (user handler)
//!     → dispatch.rs (encode reply, rpc-status header)
//! ```
//!
//! # Design Decisions
//! - JSON bodies over HTTP/1.1 or HTTP/2; the transport status is always 200
//!   and the call outcome travels in `rpc-status`
//! - Handlers return boxed errors; the interceptor normalizes them into a
//!   domain [`Error`] exactly once
//! - Domain error prototypes are `const` and never mutated

pub mod dispatch;
pub mod error;
pub mod handler;
pub mod interceptor;
pub mod metadata;
pub mod recovery;
pub mod status;
pub mod system;

pub use dispatch::{REFLECTION_METHOD, REFLECTION_SERVICE};
pub use error::{
    Error, HandlerError, ERR_BAD_REQUEST, ERR_CONFLICT, ERR_FORBIDDEN, ERR_INTERNAL,
    ERR_NOT_FOUND, ERR_RESOURCE_IN_USE, ERR_SERVICE_UNAVAILABLE, ERR_UNAUTHORIZED,
};
pub use handler::{Handler, Registry, Reply, RpcRequest};
pub use interceptor::Interceptor;
pub use status::{Code, Status};
