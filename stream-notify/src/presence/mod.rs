//! Streaming presence tracking.
//!
//! Keeps a TTL-bounded record of who is currently streaming and decides when a
//! go-live announcement is due.

pub mod classifier;
pub mod events;
pub mod expirer;
pub mod policy;
pub mod store;

pub use classifier::{Classification, FilterReason, SessionClassifier};
pub use events::{PresenceEvent, PresenceListener};
pub use expirer::{DEFAULT_SESSION_TTL, Expirer};
pub use policy::{GuildPolicy, GuildPolicyLookup};
pub use store::{PresenceGuard, PresenceStore, StreamSession};
