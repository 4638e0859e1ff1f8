//! Bounded polling of long-running external tasks.

mod poller;
mod types;

pub use poller::ExternalTaskPoller;
pub use types::{PollError, PollerConfig, StatusChange};
