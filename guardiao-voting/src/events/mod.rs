pub mod publisher;

pub use publisher::{EventSink, ModerationEvent, NullEventSink};
