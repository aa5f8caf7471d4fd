//! The append-only, hash-chained event log and its read-side projections.

mod store;
pub mod types;

pub use store::{EventBundle, EventStore};

use types::Event;

/// A fire-and-forget, in-process observer of appended events. Subscribers must not re-enter
/// the kernel from `on_event` — delivery happens synchronously inside `EventStore::append`.
pub trait EventSubscriber {
    fn on_event(&mut self, event: &Event);
}

/// Maps an event to a one-line human summary. Purely a read-side transformation; never persisted.
pub fn summarize_event(event: &Event) -> String {
    types::summarize_event(event)
}
