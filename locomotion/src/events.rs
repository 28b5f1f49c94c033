//! Character notifications and the listener list that delivers them.

use crate::states::{MovementAction, MovementState, OverlayState, RotationMode, Stance, ViewMode};

#[derive(Clone, Debug, PartialEq)]
pub enum LocomotionEvent {
    JumpPressed,
    Jumped,
    Landed,
    Breakfall,
    RagdollStateChanged(bool),
    ViewModeChanged(ViewMode),
    RotationModeChanged(RotationMode),
    StanceChanged(Stance),
    OverlayStateChanged(OverlayState),
    MovementStateChanged { previous: MovementState, current: MovementState },
    MovementActionChanged { previous: MovementAction, current: MovementAction },
}

pub type Listener = Box<dyn FnMut(&LocomotionEvent) + Send + Sync>;

/// Synchronous listeners, called in registration order.
#[derive(Default)]
pub struct EventBus {
    listeners: Vec<Listener>,
}

impl EventBus {
    pub fn subscribe(&mut self, listener: impl FnMut(&LocomotionEvent) + Send + Sync + 'static) {
        self.listeners.push(Box::new(listener));
    }

    pub fn emit(&mut self, event: LocomotionEvent) {
        for listener in &mut self.listeners {
            listener(&event);
        }
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus").field("listeners", &self.listeners.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_listeners_run_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut bus = EventBus::default();
        for tag in ["first", "second"] {
            let log = log.clone();
            bus.subscribe(move |event| {
                if *event == LocomotionEvent::JumpPressed {
                    log.lock().unwrap().push(tag);
                }
            });
        }
        bus.emit(LocomotionEvent::JumpPressed);
        bus.emit(LocomotionEvent::Landed);
        assert_eq!(*log.lock().unwrap(), vec!["first", "second"]);
    }
}
