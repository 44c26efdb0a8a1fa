//! Machine notifications and observer registry

use std::sync::{Arc, Mutex};

use serde_json::Value;
use uuid::Uuid;

use crate::config::StateName;

/// Handle returned by [`crate::ExerciseMachine::observe`], used to detach
/// the observer later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(Uuid);

impl ObserverId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

/// Payloads carried by a `step` notification: the data produced by the
/// transition that left the previous state, and the data produced by the
/// new state's entry action.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepData {
    pub prev: Option<Value>,
    pub new: Option<Value>,
}

/// A state change reported to observers.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// The machine entered `new`, leaving `old` (`None` on the initial
    /// transition).
    Step {
        new: StateName,
        old: Option<StateName>,
        data: StepData,
    },
    /// The machine halted. `state` is the state it halted in, or `None`
    /// when it terminated without a named state.
    Halt { state: Option<StateName> },
    /// The time limit elapsed. Followed by a `Halt`.
    Ding,
}

type ObserverFn = Arc<dyn Fn(&Notification) + Send + Sync>;

/// Observer registry. Callbacks are cloned out under the lock and invoked
/// with the lock released, so an observer may re-enter the machine.
#[derive(Default)]
pub(crate) struct Notifier {
    observers: Mutex<Vec<(ObserverId, ObserverFn)>>,
}

impl Notifier {
    pub fn observe(&self, callback: ObserverFn) -> ObserverId {
        let id = ObserverId::new();
        self.observers
            .lock()
            .expect("observer registry poisoned")
            .push((id, callback));
        id
    }

    pub fn unobserve(&self, id: ObserverId) {
        self.observers
            .lock()
            .expect("observer registry poisoned")
            .retain(|(existing, _)| *existing != id);
    }

    pub fn clear(&self) {
        self.observers
            .lock()
            .expect("observer registry poisoned")
            .clear();
    }

    pub fn dispatch(&self, notification: &Notification) {
        let callbacks: Vec<ObserverFn> = self
            .observers
            .lock()
            .expect("observer registry poisoned")
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();
        for callback in callbacks {
            callback(notification);
        }
    }

    pub fn dispatch_all(&self, notifications: &[Notification]) {
        for notification in notifications {
            self.dispatch(notification);
        }
    }
}
