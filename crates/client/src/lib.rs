//! HTTP session client for the MyBusStop WebForms site.
//!
//! Provides the [`Transport`](transport::Transport) seam over HTTP, a
//! reqwest-backed implementation with a per-session cookie jar, the
//! login state machine in [`SessionClient`](session::SessionClient), the
//! bounded retry policy used when a session expires, and the status
//! payload normalizer.

pub mod error;
pub mod retry;
pub mod session;
pub mod status;
pub mod transport;

pub use error::{BusStopError, TransportError};
pub use retry::RetryPolicy;
pub use session::{Endpoints, SessionClient, SessionState};
pub use transport::{ReqwestTransport, Transport, TransportConfig};
