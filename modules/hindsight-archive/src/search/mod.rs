//! Streaming archive search: walks a year × source matrix with bounded
//! concurrency and emits hits and progress over one event stream.

mod engine;
mod events;

pub use engine::{ArchiveSearcher, Direction, SearchConfig, SearchRequest, SearchSource};
pub use events::{ArchiveEvent, Channel, SearchHit, StatusEvent};
