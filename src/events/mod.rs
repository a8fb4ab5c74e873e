//! Internal event bus.
//!
//! # Data Flow
//! ```text
//! emit(topic, payload)
//!     → snapshot subscribers of topic (read lock)
//!     → one hand-off task per subscriber (bounded queue send)
//!     → Delivery resolves when every hand-off queued or found the receiver closed
//!
//! Subscription::recv() ← queue, until unsubscribe/remove_topic closes it
//! ```
//!
//! # Design Decisions
//! - A slow or dead subscriber only stalls its own hand-off
//! - Closing is an explicit flag (cancellation token), so a hand-off racing a
//!   close becomes a no-op instead of an error
//! - Topic creation is guarded by the map, subscriber lists by a per-topic lock

pub mod bus;
pub mod delivery;

pub use bus::{Event, EventBus, HandlerGuard, Subscription, SubscriptionId};
pub use delivery::Delivery;

/// Topic that triggers a service reload.
pub const RELOAD: &str = "reload";
