//! Turns scheduler events into log output. This is the runner's whole presentation layer.

use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use tracing::Span;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;
use wisp::Event;
use wisp::EventBus;
use wisp::Topic;
use wisp::listener;

/// The topics [`bind`] reports on.
pub const TOPICS: [Topic; 7] = [
    Topic::Booted,
    Topic::Frame,
    Topic::Message,
    Topic::Error,
    Topic::Visible,
    Topic::Hidden,
    Topic::Frequency,
];

/// Binds a listener that logs to `span` for every reported topic. `logic_frequency` is used to turn
/// the cycle rate into an emulation speed, and is kept up to date from frequency events.
pub fn bind(events: &mut EventBus, span: Span, logic_frequency: f64) {
    // f64 bits
    let frequency = AtomicU64::new(logic_frequency.to_bits());
    let report = listener(move |event| {
        if let Event::Frequency(hz) = event {
            frequency.store(hz.to_bits(), Ordering::Relaxed);
        }
        log_event(&span, event, f64::from_bits(frequency.load(Ordering::Relaxed)))
    });
    for topic in TOPICS {
        events.bind(topic, report.clone());
    }
}

fn log_event(span: &Span, event: &Event, logic_frequency: f64) {
    match event {
        Event::Booted => info!(parent: span, "Machine booted"),
        Event::Frame(rates) => info!(
            parent: span,
            fps = rates.framerate,
            refreshes = rates.animationrate,
            "Running at {:.1}% speed",
            rates.emulation_speed(logic_frequency)
        ),
        Event::Message(notice) if notice.error => warn!(parent: span, "{}", notice.text),
        Event::Message(notice) => info!(parent: span, "{}", notice.text),
        Event::Error => error!(parent: span, "Machine was rebuilt, resume to continue"),
        Event::Visible | Event::Hidden => debug!(parent: span, "Now {}", event.topic()),
        Event::Frequency(hz) => info!(parent: span, "Logic frequency set to {hz} Hz"),
        Event::Tick(_) | Event::AnimationFrame => {}
    }
}
