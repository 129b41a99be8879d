//! Stream notifier service.
//!
//! Owns the presence store and wires incoming presence events through expiry,
//! classification and notification dispatch.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::info;

use crate::notification::{DispatchOutcome, DispatchStats, NotificationDispatcher};
use crate::presence::{
    Classification, Expirer, GuildPolicyLookup, PresenceEvent, PresenceListener, PresenceStore,
    SessionClassifier,
};
use crate::utils::{Clock, SystemClock};

/// Tracks streaming users and announces new go-live sessions.
pub struct StreamNotifier {
    policies: Arc<dyn GuildPolicyLookup>,
    store: PresenceStore,
    classifier: SessionClassifier,
    expirer: Expirer,
    dispatcher: NotificationDispatcher,
    clock: Arc<dyn Clock>,
}

impl StreamNotifier {
    pub fn new(policies: Arc<dyn GuildPolicyLookup>, dispatcher: NotificationDispatcher) -> Self {
        Self::with_parts(policies, dispatcher, Expirer::default(), Arc::new(SystemClock))
    }

    pub fn with_parts(
        policies: Arc<dyn GuildPolicyLookup>,
        dispatcher: NotificationDispatcher,
        expirer: Expirer,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            policies,
            store: PresenceStore::new(),
            classifier: SessionClassifier::new(),
            expirer,
            dispatcher,
            clock,
        }
    }

    /// Process one event.
    ///
    /// Filtered events return without touching the store. Otherwise expiry,
    /// lookup and store update happen under a single lock acquisition. When the
    /// event starts a new session the announcement is spawned after the lock
    /// is released and its handle returned.
    pub fn process(
        &self,
        event: &PresenceEvent,
    ) -> (Classification, Option<JoinHandle<DispatchOutcome>>) {
        let policy = self.policies.policy(&event.guild_id);

        if let Some(reason) = self.classifier.filter(event, policy.as_ref()) {
            return (Classification::Ignored(reason), None);
        }

        if let Some(policy) = policy.as_ref()
            && policy.debug
        {
            info!(guild_id = %event.guild_id, "Presence event: {:#?}", event);
        }

        let classification = {
            let mut sessions = self.store.lock();
            let now = self.clock.now();
            self.expirer.sweep(&mut sessions, now);
            self.classifier
                .classify(event, policy.as_ref(), &mut sessions, now)
        };

        let handle = match (&classification, policy.as_ref()) {
            (Classification::New(session), Some(policy)) => {
                Some(self.dispatcher.dispatch(session.clone(), policy))
            }
            _ => None,
        };

        (classification, handle)
    }

    pub fn store(&self) -> &PresenceStore {
        &self.store
    }

    pub fn dispatch_stats(&self) -> DispatchStats {
        self.dispatcher.stats()
    }
}

impl PresenceListener for StreamNotifier {
    fn on_presence_change(&self, event: PresenceEvent) {
        // Delivery runs detached; the handle is not needed here.
        let _ = self.process(&event);
    }
}
