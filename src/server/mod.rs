mod endpoint;
mod fleet;
mod signal;

pub use endpoint::{BoundEndpoint, Endpoint, ListenerError, ListenerState, READ_TIMEOUT, SHUTDOWN_GRACE};
pub use fleet::{Fleet, FleetError};
pub use signal::shutdown_signal;
