use thiserror::Error;

/// Top-level error type for the `skysync-api` crate.
///
/// Covers every failure mode a protocol client can report: transport
/// faults, instrument-reported errors, and capability gaps.
/// `skysync-core` maps these into user-facing diagnostics.
#[derive(Debug, Error)]
pub enum ApiError {
    // ── Connectivity ────────────────────────────────────────────────
    /// The client has no live connection to the instrument.
    #[error("Instrument not connected")]
    NotConnected,

    /// The request never completed (connection refused, reset, DNS
    /// failure — whatever the transport reports).
    #[error("Transport error: {message}")]
    Transport { message: String },

    /// The transport gave up waiting for a response.
    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    // ── Instrument-reported ─────────────────────────────────────────
    /// Structured error from the instrument's control protocol
    /// (carries the protocol error number when one was supplied).
    #[error("Protocol error: {message}")]
    Protocol { message: String, code: Option<i32> },

    /// The instrument does not implement the requested operation.
    #[error("Unsupported operation: {operation}")]
    Unsupported { operation: String },

    /// The instrument rejected a parameter value.
    #[error("Invalid value for {property}: {message}")]
    InvalidValue { property: String, message: String },

    // ── Data ────────────────────────────────────────────────────────
    /// The response body could not be decoded into the expected shape.
    #[error("Malformed response: {message}")]
    Malformed { message: String },
}

impl ApiError {
    /// Returns `true` if this error signals a missing capability rather
    /// than a fault — the caller should stop asking, not retry.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::Unsupported { .. })
    }

    /// Returns `true` if this is a transient error worth retrying on a
    /// later polling cycle.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::Timeout { .. })
    }

    /// Shorthand for a transport failure with a plain message.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Shorthand for an unsupported-operation failure.
    pub fn unsupported(operation: impl Into<String>) -> Self {
        Self::Unsupported {
            operation: operation.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_is_not_transient() {
        let err = ApiError::unsupported("devicestate");
        assert!(err.is_unsupported());
        assert!(!err.is_transient());
    }

    #[test]
    fn transport_and_timeout_are_transient() {
        assert!(ApiError::transport("connection reset").is_transient());
        assert!(ApiError::Timeout { timeout_secs: 5 }.is_transient());
    }
}
