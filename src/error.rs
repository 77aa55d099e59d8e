use thiserror::Error;

/// Failure of a single voice server call.
///
/// Every client operation returns one of these instead of panicking; the
/// coordinator decides how each one surfaces in the message log.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// Connection refused, reset, or timed out before a response arrived.
    #[error("voice server unreachable: {0}")]
    NetworkUnavailable(String),
    /// The server answered with `status: "error"` (or an unusable HTTP status).
    #[error("{0}")]
    Backend(String),
    /// The server answered, but not in a shape we understand.
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl ClientError {
    pub fn is_network(&self) -> bool {
        matches!(self, Self::NetworkUnavailable(_))
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() || e.is_body() {
            Self::MalformedResponse(e.to_string())
        } else {
            // connect, timeout, request and redirect failures all mean we
            // never got a usable answer from the server
            Self::NetworkUnavailable(e.to_string())
        }
    }
}
