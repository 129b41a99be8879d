//! Go-live notification dispatcher.
//!
//! Each announcement runs as its own tokio task so a slow or failing sink
//! never holds up event processing. A semaphore caps how many deliveries are
//! in flight at once; excess tasks wait for a permit. The wait queue itself is
//! unbounded.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::message::compose_go_live;
use super::retry::{RetryPolicy, Sleeper, TokioSleeper, retry_linear};
use super::sink::MessageSink;
use crate::presence::{GuildPolicy, StreamSession};

/// Default cap on concurrently running deliveries.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 32;

/// Result of one announcement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Delivered { attempts: u32 },
    /// Every attempt failed; the announcement is dropped.
    Dropped { attempts: u32, error: String },
}

/// Delivery counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub dispatched: u64,
    pub delivered: u64,
    pub failed: u64,
}

#[derive(Debug, Default)]
struct Counters {
    dispatched: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
}

/// Sends go-live announcements with bounded linear retry.
#[derive(Clone)]
pub struct NotificationDispatcher {
    sink: Arc<dyn MessageSink>,
    sleeper: Arc<dyn Sleeper>,
    retry: RetryPolicy,
    permits: Arc<Semaphore>,
    counters: Arc<Counters>,
    runtime: Option<Handle>,
}

impl NotificationDispatcher {
    pub fn new(sink: Arc<dyn MessageSink>) -> Self {
        Self::with_options(
            sink,
            RetryPolicy::default(),
            Arc::new(TokioSleeper),
            DEFAULT_MAX_IN_FLIGHT,
        )
    }

    pub fn with_options(
        sink: Arc<dyn MessageSink>,
        retry: RetryPolicy,
        sleeper: Arc<dyn Sleeper>,
        max_in_flight: usize,
    ) -> Self {
        Self {
            sink,
            sleeper,
            retry,
            permits: Arc::new(Semaphore::new(max_in_flight.max(1))),
            counters: Arc::new(Counters::default()),
            runtime: Handle::try_current().ok(),
        }
    }

    /// Spawn deliveries on `runtime` instead of the runtime this dispatcher
    /// was built in.
    pub fn with_runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Spawn delivery of the announcement for `session`.
    ///
    /// Returns immediately. The handle may be dropped; the task keeps running.
    ///
    /// The task is spawned on the runtime captured at construction (or set via
    /// [`with_runtime`](Self::with_runtime)). A dispatcher built outside any
    /// runtime falls back to `tokio::spawn`, which panics when called off a
    /// runtime thread. Tasks waiting for a delivery permit are not bounded.
    pub fn dispatch(&self, session: StreamSession, policy: &GuildPolicy) -> JoinHandle<DispatchOutcome> {
        self.counters.dispatched.fetch_add(1, Ordering::Relaxed);

        let this = self.clone();
        let channel = policy.channel.clone();
        let role = policy.role.clone();

        let task = async move {
            // The semaphore is never closed, so acquisition only fails if that changes.
            let _permit = this.permits.clone().acquire_owned().await.ok();
            this.deliver(&session, &channel, &role).await
        };

        match &self.runtime {
            Some(runtime) => runtime.spawn(task),
            None => tokio::spawn(task),
        }
    }

    /// Resolve the channel name, compose the message and deliver it with retry.
    pub async fn deliver(
        &self,
        session: &StreamSession,
        announce_channel: &str,
        role: &str,
    ) -> DispatchOutcome {
        let channel_name = match self
            .sink
            .resolve_channel_name(&session.voice_channel_id)
            .await
        {
            Ok(name) => Some(name),
            Err(e) => {
                debug!(
                    voice_channel_id = %session.voice_channel_id,
                    error = %e,
                    "Could not resolve voice channel name, sending without it"
                );
                None
            }
        };

        let text = compose_go_live(role, &session.display_name, channel_name.as_deref());
        let sink = &self.sink;

        let result = retry_linear(&self.retry, self.sleeper.as_ref(), |attempt| {
            let text = text.as_str();
            async move {
                sink.send(announce_channel, text).await.map(|_| attempt).inspect_err(|e| {
                    warn!(
                        channel_id = %announce_channel,
                        attempt,
                        error = %e,
                        "Notification delivery attempt failed"
                    );
                })
            }
        })
        .await;

        match result {
            Ok(attempts) => {
                self.counters.delivered.fetch_add(1, Ordering::Relaxed);
                info!(
                    user_id = %session.user_id,
                    channel_id = %announce_channel,
                    attempts,
                    "Sent go-live notification"
                );
                DispatchOutcome::Delivered { attempts }
            }
            Err(e) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                let attempts = match &e {
                    crate::Error::DeliveryExhausted { attempts, .. } => *attempts,
                    _ => self.retry.max_attempts,
                };
                error!(
                    user_id = %session.user_id,
                    channel_id = %announce_channel,
                    error = %e,
                    "Dropping go-live notification"
                );
                DispatchOutcome::Dropped {
                    attempts,
                    error: e.to_string(),
                }
            }
        }
    }

    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            dispatched: self.counters.dispatched.load(Ordering::Relaxed),
            delivered: self.counters.delivered.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Error, Result};
    use async_trait::async_trait;
    use chrono::Utc;
    use parking_lot::Mutex;
    use std::time::Duration;

    struct InstantSleeper;

    #[async_trait]
    impl Sleeper for InstantSleeper {
        async fn sleep(&self, _duration: Duration) {}
    }

    /// Fails the first `failures` sends.
    struct FlakySink {
        failures: u32,
        channel_name: Option<String>,
        sent: Mutex<Vec<(String, String)>>,
        attempts: Mutex<u32>,
    }

    impl FlakySink {
        fn new(failures: u32, channel_name: Option<&str>) -> Self {
            Self {
                failures,
                channel_name: channel_name.map(str::to_string),
                sent: Mutex::new(Vec::new()),
                attempts: Mutex::new(0),
            }
        }
    }

    #[async_trait]
    impl MessageSink for FlakySink {
        async fn send(&self, channel_id: &str, text: &str) -> Result<()> {
            let mut attempts = self.attempts.lock();
            *attempts += 1;
            if *attempts <= self.failures {
                return Err(Error::http(502, "bad gateway"));
            }
            self.sent.lock().push((channel_id.to_string(), text.to_string()));
            Ok(())
        }

        async fn resolve_channel_name(&self, channel_id: &str) -> Result<String> {
            self.channel_name
                .clone()
                .ok_or_else(|| Error::http(404, format!("unknown channel {channel_id}")))
        }
    }

    fn session() -> StreamSession {
        StreamSession {
            user_id: "u1".to_string(),
            display_name: "Foo".to_string(),
            guild_id: "g1".to_string(),
            voice_channel_id: "v1".to_string(),
            last_seen: Utc::now(),
        }
    }

    fn policy() -> GuildPolicy {
        GuildPolicy {
            enabled: true,
            debug: false,
            channel: "announce".to_string(),
            role: "live".to_string(),
        }
    }

    fn dispatcher(sink: Arc<FlakySink>) -> NotificationDispatcher {
        NotificationDispatcher::with_options(sink, RetryPolicy::default(), Arc::new(InstantSleeper), 4)
    }

    #[tokio::test]
    async fn test_dispatch_delivers_with_channel_name() {
        let sink = Arc::new(FlakySink::new(0, Some("General")));
        let dispatcher = dispatcher(sink.clone());

        let outcome = dispatcher.dispatch(session(), &policy()).await.unwrap();

        assert_eq!(outcome, DispatchOutcome::Delivered { attempts: 1 });
        let sent = sink.sent.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "announce");
        assert_eq!(sent[0].1, "<@&live> Foo is going live in channel General");
    }

    #[tokio::test]
    async fn test_unresolvable_channel_still_sends() {
        let sink = Arc::new(FlakySink::new(0, None));
        let dispatcher = dispatcher(sink.clone());

        let outcome = dispatcher.dispatch(session(), &policy()).await.unwrap();

        assert_eq!(outcome, DispatchOutcome::Delivered { attempts: 1 });
        assert_eq!(sink.sent.lock()[0].1, "<@&live> Foo is going live");
    }

    #[tokio::test]
    async fn test_two_failures_then_success() {
        let sink = Arc::new(FlakySink::new(2, Some("General")));
        let dispatcher = dispatcher(sink.clone());

        let outcome = dispatcher.dispatch(session(), &policy()).await.unwrap();

        assert_eq!(outcome, DispatchOutcome::Delivered { attempts: 3 });
        assert_eq!(*sink.attempts.lock(), 3);
        assert_eq!(
            dispatcher.stats(),
            DispatchStats {
                dispatched: 1,
                delivered: 1,
                failed: 0
            }
        );
    }

    #[tokio::test]
    async fn test_permanent_failure_is_dropped() {
        let sink = Arc::new(FlakySink::new(u32::MAX, Some("General")));
        let dispatcher = dispatcher(sink.clone());

        let outcome = dispatcher.dispatch(session(), &policy()).await.unwrap();

        assert!(matches!(outcome, DispatchOutcome::Dropped { attempts: 3, .. }));
        assert_eq!(*sink.attempts.lock(), 3);
        assert!(sink.sent.lock().is_empty());
        assert_eq!(dispatcher.stats().failed, 1);
    }

    #[tokio::test]
    async fn test_excess_deliveries_wait_for_permit() {
        let sink = Arc::new(FlakySink::new(0, Some("General")));
        let dispatcher = NotificationDispatcher::with_options(
            sink.clone(),
            RetryPolicy::default(),
            Arc::new(InstantSleeper),
            1,
        );

        let handles: Vec<_> = (0..10)
            .map(|_| dispatcher.dispatch(session(), &policy()))
            .collect();
        for handle in handles {
            assert_eq!(handle.await.unwrap(), DispatchOutcome::Delivered { attempts: 1 });
        }

        assert_eq!(sink.sent.lock().len(), 10);
        assert_eq!(dispatcher.stats().delivered, 10);
    }

    #[test]
    fn test_dispatch_from_thread_outside_runtime() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let sink = Arc::new(FlakySink::new(0, Some("General")));
        let dispatcher = NotificationDispatcher::with_options(
            sink.clone(),
            RetryPolicy::default(),
            Arc::new(InstantSleeper),
            4,
        )
        .with_runtime(runtime.handle().clone());

        let handle = std::thread::spawn(move || dispatcher.dispatch(session(), &policy()))
            .join()
            .unwrap();
        let outcome = runtime.block_on(handle).unwrap();

        assert_eq!(outcome, DispatchOutcome::Delivered { attempts: 1 });
        assert_eq!(sink.sent.lock().len(), 1);
    }
}
