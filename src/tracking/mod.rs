pub mod drone_location;
pub mod drone_tracker;
pub mod location_sink;
pub mod tracked_drone;
pub mod tracking_error;

pub use drone_location::{DroneLocation, LocationPayload};
pub use drone_tracker::{DroneTracker, TrackHandle, TrackState, DEFAULT_TOPIC_PREFIX};
pub use location_sink::LocationSink;
pub use tracked_drone::{SharedTrackedDrone, TrackedDrone};
pub use tracking_error::{LocationError, TrackingError};
