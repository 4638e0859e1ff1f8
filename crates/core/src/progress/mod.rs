//! Progress delivery from producers to a single observer.
//!
//! Producers hold a cloneable [`ProgressReporter`]. Observers that only
//! touch memory can be called inline ([`ProgressReporter::direct`]); anything
//! that may block goes through a bounded queue ([`ProgressReporter::queued`])
//! so a stalled observer cannot stall the pipeline.

mod reporter;
mod types;

pub use reporter::{FnObserver, ProgressDispatcher, ProgressObserver, ProgressReporter};
pub use types::JobProgress;
