//! In-memory event bus
//!
//! The production hook dispatcher converts raw repository hook invocations
//! into [`RepoEvent`]s and feeds them through this bus; tests drive it
//! directly.

use std::collections::HashMap;
use std::sync::Mutex;

use tracing::debug;

use crate::action::RepoAction;
use crate::port::{EventCallback, EventPort, Gate, RepoEvent, RepoId, SubscriptionId};

type Slot = (RepoId, RepoAction);

#[derive(Default)]
struct Registry {
    listeners: HashMap<Slot, Vec<(SubscriptionId, EventCallback)>>,
    handlers: HashMap<Slot, EventCallback>,
}

/// Multicast listeners plus single-slot handlers, keyed by (repo, action).
#[derive(Default)]
pub struct EventBus {
    registry: Mutex<Registry>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver an action to its handler (if any) and then to every current
    /// listener. The `gate` reaches only the handler.
    pub fn fire(
        &self,
        repo: &RepoId,
        action: RepoAction,
        args: Vec<serde_json::Value>,
        gate: Option<Gate>,
    ) {
        let (handler, listeners) = self.snapshot(repo, action);

        if let Some(handler) = handler {
            let mut event = RepoEvent::new(repo.clone(), action, args.clone());
            event.gate = gate;
            handler(event);
        } else if let Some(gate) = gate {
            // No handler installed: the action proceeds by default.
            gate(true);
        }

        for callback in listeners {
            callback(RepoEvent::new(repo.clone(), action, args.clone()));
        }
    }

    /// Deliver an action to listeners only, bypassing any handler.
    pub fn fire_listeners(&self, repo: &RepoId, action: RepoAction, args: Vec<serde_json::Value>) {
        let (_, listeners) = self.snapshot(repo, action);
        for callback in listeners {
            callback(RepoEvent::new(repo.clone(), action, args.clone()));
        }
    }

    /// Clone the current handler and listener set out of the registry so a
    /// callback unbinding itself mid-delivery cannot skew iteration.
    fn snapshot(
        &self,
        repo: &RepoId,
        action: RepoAction,
    ) -> (Option<EventCallback>, Vec<EventCallback>) {
        let registry = self.registry.lock().expect("event bus registry poisoned");
        let slot = (repo.clone(), action);
        let handler = registry.handlers.get(&slot).cloned();
        let listeners = registry
            .listeners
            .get(&slot)
            .map(|subs| subs.iter().map(|(_, cb)| cb.clone()).collect())
            .unwrap_or_default();
        (handler, listeners)
    }
}

impl EventPort for EventBus {
    fn add_listener(
        &self,
        id: SubscriptionId,
        repo: &RepoId,
        action: RepoAction,
        callback: EventCallback,
    ) {
        let mut registry = self.registry.lock().expect("event bus registry poisoned");
        registry
            .listeners
            .entry((repo.clone(), action))
            .or_default()
            .push((id, callback));
    }

    fn remove_listener(&self, id: &SubscriptionId, repo: &RepoId, action: RepoAction) {
        let mut registry = self.registry.lock().expect("event bus registry poisoned");
        if let Some(subs) = registry.listeners.get_mut(&(repo.clone(), action)) {
            subs.retain(|(sub_id, _)| sub_id != id);
        }
    }

    fn set_handler(&self, repo: &RepoId, action: RepoAction, callback: Option<EventCallback>) {
        let mut registry = self.registry.lock().expect("event bus registry poisoned");
        let slot = (repo.clone(), action);
        match callback {
            Some(callback) => {
                if registry.handlers.insert(slot, callback).is_some() {
                    debug!(%repo, %action, "replaced existing handler");
                }
            }
            None => {
                registry.handlers.remove(&slot);
            }
        }
    }
}
