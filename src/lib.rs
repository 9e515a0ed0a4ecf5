// src/lib.rs
// Public library surface for integration tests (and potential reuse).

pub mod analytics;
pub mod announce;
pub mod api;
pub mod broadcast;
pub mod config;
pub mod domain;
pub mod metrics;
pub mod scheduler;
pub mod store;
pub mod window;

// ---- Re-exports for stable public API ----
pub use crate::broadcast::{EventHub, EventSink, SinkEvent, Snapshot};
pub use crate::config::AnalyticsConfig;
pub use crate::domain::{Identity, Location, LocationSet, PollSnapshot, Publication};
pub use crate::scheduler::Scheduler;
pub use crate::store::{MemoryStore, PollStore, PublicationStore, StoreLifecycle};
pub use crate::window::{resolve_window, TimeWindow, WindowSpan};
