pub mod poller;

pub use poller::{PollHandle, PollingTracker, DEFAULT_POLL_INTERVAL};
