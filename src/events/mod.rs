//! Upcoming events: fetching, caching and selection.
//!
//! # Modules
//!
//! - `event` - The [`Event`] data structure
//! - `response_structs` - Data structures for event store responses
//! - `store` - HTTP client for the event store
//! - `cache` - In-memory snapshot of the last fetched events
//! - `poller` - Periodic, business-hours gated refresh of the cache
//! - `selector` - Pure selection of the next upcoming event

mod cache;
mod event;
mod poller;
mod response_structs;
mod selector;
mod store;

pub use crate::events::cache::EventCache;
pub use crate::events::event::Event;
pub use crate::events::poller::EventPoller;
pub use crate::events::selector::next_event;
pub use crate::events::store::{EventStore, MongoEventStore};
