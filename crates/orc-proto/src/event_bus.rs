//! A single-observer fan-out point for unified events.
//!
//! Grounded in the teacher's hat-routing `EventBus`, trimmed to the piece of
//! it every other component actually needs: a place for the Session
//! Controller to announce "here is the next event" to whoever is watching
//! (the Session Store's recorder, a TUI, a test harness) without those
//! observers being wired into the Controller's own call graph.
pub struct EventBus {
    observer: Option<Box<dyn Fn(&crate::Event) + Send + 'static>>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("has_observer", &self.observer.is_some())
            .finish()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self { observer: None }
    }

    /// Registers the single observer. Replaces any previously set observer.
    pub fn set_observer<F>(&mut self, observer: F)
    where
        F: Fn(&crate::Event) + Send + 'static,
    {
        self.observer = Some(Box::new(observer));
    }

    pub fn clear_observer(&mut self) {
        self.observer = None;
    }

    pub fn has_observer(&self) -> bool {
        self.observer.is_some()
    }

    /// Fans `event` out to the observer, if any. Never fails: an observer
    /// panicking is a programming error in the observer, not something the
    /// bus should try to recover from.
    pub fn publish(&self, event: &crate::Event) {
        if let Some(observer) = &self.observer {
            observer(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Event, EventKind, SessionId};
    use std::sync::{Arc, Mutex};

    fn sample_event() -> Event {
        Event::new(SessionId::new("s1"), 0, EventKind::SessionIdle)
    }

    #[test]
    fn publish_with_no_observer_is_a_no_op() {
        let bus = EventBus::new();
        bus.publish(&sample_event());
    }

    #[test]
    fn observer_receives_published_events() {
        let mut bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        bus.set_observer(move |event| seen_clone.lock().unwrap().push(event.type_name()));

        bus.publish(&sample_event());
        bus.publish(&sample_event());

        assert_eq!(*seen.lock().unwrap(), vec!["session.idle", "session.idle"]);
    }

    #[test]
    fn clear_observer_stops_delivery() {
        let mut bus = EventBus::new();
        let seen = Arc::new(Mutex::new(0));
        let seen_clone = Arc::clone(&seen);
        bus.set_observer(move |_| *seen_clone.lock().unwrap() += 1);
        bus.publish(&sample_event());
        bus.clear_observer();
        bus.publish(&sample_event());
        assert_eq!(*seen.lock().unwrap(), 1);
    }
}
