/// Errors from the HTTP transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Upstream returned a non-2xx status code.
    #[error("Upstream error ({status}): {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// The body could not be decoded as the expected format.
    #[error("Failed to decode response: {0}")]
    Decode(String),

    /// A request header name or value is not valid HTTP.
    #[error("Invalid request header: {0}")]
    InvalidHeader(String),

    /// The connection could not be established or was torn down.
    #[error("Connection error: {0}")]
    Connection(String),
}

/// Errors surfaced by [`SessionClient`](crate::session::SessionClient).
#[derive(Debug, Clone, thiserror::Error)]
pub enum BusStopError {
    /// Login page unparseable, credentials rejected, or transport failure
    /// during login.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// The status request kept failing after the session was renewed.
    #[error("Status request failed: {0}")]
    Api(String),
}
