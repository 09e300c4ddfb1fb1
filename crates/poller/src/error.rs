use busstop_client::{BusStopError, TransportError};

/// Errors from the poller orchestration layer.
#[derive(Debug, thiserror::Error)]
pub enum PollerError {
    /// The account credentials could not be used to log in.
    #[error("Login failed: {0}")]
    Auth(#[from] BusStopError),

    /// An HTTP transport could not be constructed.
    #[error("Transport setup failed: {0}")]
    Transport(#[from] TransportError),

    /// Required configuration is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A route set reload could not start any route.
    #[error("Reload failed: {0}")]
    Reload(String),
}
