//! Go-live notification delivery.
//!
//! New streaming sessions are announced through a [`MessageSink`] with a fixed
//! linear retry budget. Deliveries run on their own tasks and never block the
//! presence path; an announcement that fails every attempt is logged and
//! dropped.

pub mod discord;
pub mod dispatcher;
pub mod message;
pub mod retry;
pub mod sink;

pub use discord::DiscordRestSink;
pub use dispatcher::{DispatchOutcome, DispatchStats, NotificationDispatcher};
pub use retry::{RetryPolicy, Sleeper, TokioSleeper, retry_linear};
pub use sink::MessageSink;
