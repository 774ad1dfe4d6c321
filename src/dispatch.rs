//! # Conversation Controller
//!
//! The dispatch core: every inbound event resolves to exactly one state
//! handler, and the stored session only moves when that handler succeeds.
//!
//! Resolution order, once per event:
//!
//! 1. payload `/start` → the `Start` handler, regardless of stored state
//!    (explicit reset escape hatch, works even when the stored row is
//!    corrupt);
//! 2. payload `cart` → the `ShowCart` handler (global shortcut);
//! 3. otherwise → the session's persisted state; a chat with no session
//!    is an error, not a silent reset.
//!
//! Events for one chat are serialized by a per-chat lock so handler side
//! effects and the state write-back never interleave; different chats
//! proceed concurrently.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use crate::bot::handlers;
use crate::commerce::CommerceApi;
use crate::errors::{error_logging, BotError, BotResult};
use crate::gateway::ChatGateway;
use crate::observability;
use crate::session_store::SessionStore;
use crate::state::{Event, Scratch, StateName, Transition};

/// Thread-safe pool of per-chat locks, created on first use
///
/// Holding a chat's lock across the whole dispatch is what makes the
/// "single-threaded per chat" guarantee hold under concurrent updates.
pub struct ChatLockRegistry {
    locks: parking_lot::Mutex<HashMap<i64, Arc<tokio::sync::Mutex<()>>>>,
}

impl ChatLockRegistry {
    pub fn new() -> Self {
        Self {
            locks: parking_lot::Mutex::new(HashMap::new()),
        }
    }

    /// Get or create the lock for a chat
    pub fn lock_for(&self, chat_id: i64) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock();
        Arc::clone(
            locks
                .entry(chat_id)
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))),
        )
    }

    /// Number of chats with a registered lock
    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.lock().is_empty()
    }
}

impl Default for ChatLockRegistry {
    fn default() -> Self {
        Self::new()
    }
}

struct DispatchFailure {
    requested: Option<StateName>,
    error: BotError,
}

impl DispatchFailure {
    fn new(requested: Option<StateName>, error: BotError) -> Self {
        Self { requested, error }
    }
}

/// The conversation state machine, shared across all chats.
pub struct Controller {
    store: Arc<dyn SessionStore>,
    commerce: Arc<dyn CommerceApi>,
    gateway: Arc<dyn ChatGateway>,
    locks: ChatLockRegistry,
}

impl Controller {
    pub fn new(
        store: Arc<dyn SessionStore>,
        commerce: Arc<dyn CommerceApi>,
        gateway: Arc<dyn ChatGateway>,
    ) -> Self {
        Self {
            store,
            commerce,
            gateway,
            locks: ChatLockRegistry::new(),
        }
    }

    /// Dispatch one inbound event. Returns the state persisted for the
    /// chat; on any failure the stored session is left exactly as it was.
    pub async fn process(&self, event: &Event) -> BotResult<StateName> {
        let chat_lock = self.locks.lock_for(event.chat_id);
        let _guard = chat_lock.lock().await;
        let started = Instant::now();

        let outcome = self.dispatch(event).await;
        observability::record_dispatch_duration(started.elapsed());

        match outcome {
            Ok((requested, next)) => {
                debug!(
                    chat_id = %event.chat_id,
                    state = %requested,
                    next_state = %next,
                    "event dispatched"
                );
                observability::record_event_dispatched(requested.as_str(), "ok");
                Ok(next)
            }
            Err(failure) => {
                let label = failure.requested.map(|state| state.as_str());
                error_logging::log_dispatch_error(&failure.error, event.chat_id, label);
                observability::record_event_dispatched(label.unwrap_or("unresolved"), "error");
                Err(failure.error)
            }
        }
    }

    async fn dispatch(&self, event: &Event) -> Result<(StateName, StateName), DispatchFailure> {
        let (requested, scratch) = self
            .resolve(event)
            .await
            .map_err(|error| DispatchFailure::new(None, error))?;

        let transition = self
            .run_handler(requested, event, &scratch)
            .await
            .map_err(|error| DispatchFailure::new(Some(requested), error))?;

        self.store
            .set(event.chat_id, transition.next, &transition.scratch)
            .await
            .map_err(|error| DispatchFailure::new(Some(requested), error))?;

        Ok((requested, transition.next))
    }

    /// Compute the state whose handler runs for this event, plus the
    /// scratch it receives.
    async fn resolve(&self, event: &Event) -> BotResult<(StateName, Scratch)> {
        let payload = event.payload.text();

        // The reset must succeed even when the stored row is unreadable,
        // so it never touches the store.
        if payload == "/start" {
            return Ok((StateName::Start, Scratch::default()));
        }

        if payload == "cart" {
            let scratch = match self.store.get(event.chat_id).await? {
                Some(session) => session.scratch,
                None => Scratch::default(),
            };
            return Ok((StateName::ShowCart, scratch));
        }

        match self.store.get(event.chat_id).await? {
            Some(session) => Ok((session.state, session.scratch)),
            None => Err(BotError::MissingSession {
                chat_id: event.chat_id,
            }),
        }
    }

    async fn run_handler(
        &self,
        state: StateName,
        event: &Event,
        scratch: &Scratch,
    ) -> BotResult<Transition> {
        let commerce = self.commerce.as_ref();
        let gateway = self.gateway.as_ref();

        match state {
            StateName::Start => handlers::start(commerce, gateway, event).await,
            StateName::Echo => handlers::echo(gateway, event, scratch).await,
            StateName::HandleMenu => handlers::handle_menu(commerce, gateway, event, scratch).await,
            StateName::HandleDescription => {
                handlers::handle_description(commerce, gateway, event, scratch).await
            }
            StateName::ShowCart => handlers::show_cart(commerce, gateway, event, scratch).await,
            StateName::HandleCart => handlers::handle_cart(commerce, gateway, event, scratch).await,
            StateName::WaitingEmail => {
                handlers::waiting_email(commerce, gateway, event, scratch).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_registry_reuses_per_chat_locks() {
        let registry = ChatLockRegistry::new();
        assert!(registry.is_empty());

        let first = registry.lock_for(42);
        let again = registry.lock_for(42);
        let other = registry.lock_for(7);

        assert!(Arc::ptr_eq(&first, &again));
        assert!(!Arc::ptr_eq(&first, &other));
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn test_lock_serializes_same_chat() {
        let registry = ChatLockRegistry::new();

        let lock = registry.lock_for(42);
        let guard = lock.lock().await;

        let contended = registry.lock_for(42);
        assert!(contended.try_lock().is_err());

        drop(guard);
        assert!(contended.try_lock().is_ok());
    }
}
