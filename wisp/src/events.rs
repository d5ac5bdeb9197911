//! The scheduler's event bus. Subscribers bind listeners to a [`Topic`] and receive the matching
//! [`Event`], whose payload type is fixed per topic.

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use crate::machine::TickInfo;
use crate::rates::Rates;
use crate::scheduler::MESSAGE_TIMEOUT;

/// A subscriber callback. Identity (for bind/unbind) is the identity of the allocation, so keep a
/// clone of the `Arc` around if you intend to unbind it later.
pub type Listener = Arc<dyn Fn(&Event) + Send + Sync>;

/// Wraps a closure as a [`Listener`].
pub fn listener(func: impl Fn(&Event) + Send + Sync + 'static) -> Listener {
    Arc::new(func)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display)]
pub enum Topic {
    #[display("booted")]
    Booted,
    #[display("frame")]
    Frame,
    #[display("tick")]
    Tick,
    #[display("animation-frame")]
    AnimationFrame,
    #[display("visible")]
    Visible,
    #[display("hidden")]
    Hidden,
    #[display("message")]
    Message,
    #[display("error")]
    Error,
    #[display("frequency")]
    Frequency,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// The machine finished a boot, reset, or hard reset.
    Booted,
    /// A rate window was just sampled.
    Frame(Rates),
    /// A tick cycle was attempted. Failed ticks report zero cycles.
    Tick(TickInfo),
    /// One loop iteration completed.
    AnimationFrame,
    Visible,
    Hidden,
    /// Something the user should be told about.
    Message(Notice),
    /// The machine was rebuilt after an unrecoverable failure.
    Error,
    /// The logic frequency changed (in Hz).
    Frequency(f64),
}

impl Event {
    pub fn topic(&self) -> Topic {
        match self {
            Event::Booted => Topic::Booted,
            Event::Frame(_) => Topic::Frame,
            Event::Tick(_) => Topic::Tick,
            Event::AnimationFrame => Topic::AnimationFrame,
            Event::Visible => Topic::Visible,
            Event::Hidden => Topic::Hidden,
            Event::Message(_) => Topic::Message,
            Event::Error => Topic::Error,
            Event::Frequency(_) => Topic::Frequency,
        }
    }
}

/// A toast-style notification for the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub text: String,
    pub error: bool,
    /// How long the notification should stay up.
    pub timeout: Duration,
}

impl Notice {
    pub fn info(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            error: false,
            timeout: MESSAGE_TIMEOUT,
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            error: true,
            timeout: MESSAGE_TIMEOUT,
        }
    }
}

#[derive(Default)]
pub struct EventBus {
    listeners: HashMap<Topic, Vec<Listener>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds a listener to a topic. Binding the same listener twice is a no-op.
    pub fn bind(&mut self, topic: Topic, listener: Listener) {
        let listeners = self.listeners.entry(topic).or_default();
        if listeners.iter().any(|l| Arc::ptr_eq(l, &listener)) {
            return;
        }
        listeners.push(listener);
    }

    /// Removes a listener from a topic. Unknown listeners are ignored.
    pub fn unbind(&mut self, topic: Topic, listener: &Listener) {
        if let Some(listeners) = self.listeners.get_mut(&topic) {
            listeners.retain(|l| !Arc::ptr_eq(l, listener));
        }
    }

    /// Synchronously calls every listener bound to the event's topic, in the order they were bound.
    pub fn trigger(&self, event: &Event) {
        if let Some(listeners) = self.listeners.get(&event.topic()) {
            listeners.iter().for_each(|l| l(event));
        }
    }

    pub fn listener_count(&self, topic: Topic) -> usize {
        self.listeners.get(&topic).map_or(0, Vec::len)
    }
}

impl Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(self.listeners.iter().map(|(t, l)| (t, l.len())))
            .finish()
    }
}
