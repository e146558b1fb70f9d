/// Error type returned by this crate.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// Request body has a shape that cannot be serialized.
    #[error("unsupported data format: {0}")]
    InvalidPayload(String),
    /// Header name or value rejected before dispatch.
    #[error("invalid header '{name}'")]
    InvalidHeader { name: String },
    /// Response status outside the success range.
    #[error("{line}")]
    Status {
        /// Numeric HTTP status code.
        code: u16,
        /// Status line text, e.g. `404 Not Found`.
        line: String,
    },
    /// Network, timeout or request execution error from `reqwest`.
    #[error("transport error: {0}")]
    Transport(reqwest::Error),
    /// Connection was interrupted mid-flight.
    #[error("interrupted: {0}")]
    Interrupted(String),
}

impl FetchError {
    /// Returns the HTTP status code carried by this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { code, .. } => Some(*code),
            Self::Transport(err) => err.status().map(|status| status.as_u16()),
            _ => None,
        }
    }

    /// Whether the error is a 4xx/5xx response.
    pub(crate) fn is_client_or_server_status(&self) -> bool {
        self.status().is_some_and(|code| (400..600).contains(&code))
    }

    /// Whether retrying the same request can change the outcome.
    pub(crate) fn is_usage_error(&self) -> bool {
        matches!(self, Self::InvalidPayload(_) | Self::InvalidHeader { .. })
    }
}
