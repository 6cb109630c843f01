//! Error types for the SIP2 gateway core.
//!
//! This module defines every failure the protocol engine can surface and
//! provides the classification helpers the surrounding layers rely on:
//! the HTTP layer maps errors to status codes via [`GatewayError::http_status`],
//! and the connection manager decides whether an outcome trips the circuit
//! breaker via [`GatewayError::counts_as_failure`].
//!
//! Codec-level failures live in the smaller [`ProtocolError`] and are lifted
//! into [`GatewayError`] with `#[from]` so call sites can use `?` throughout.

use thiserror::Error;

/// Failures raised by the frame codec (checksum, formatter, parser).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// A sequence number outside the single-digit 0–9 range was requested.
    #[error("sequence number {seq} is outside the 0-9 range")]
    InvalidSequence {
        /// The offending sequence number
        seq: u8,
    },

    /// The frame does not end with an `AZ<hex4>` trailer.
    ///
    /// Callers on the receive path treat this the same as a checksum
    /// mismatch: the frame cannot be trusted.
    #[error("frame trailer is missing or malformed")]
    MalformedTrailer,

    /// A response frame carried a different command code than the request
    /// expects.
    #[error("expected response code {expected}, got {actual}")]
    UnexpectedResponseCode {
        /// The command code the caller was waiting for
        expected: String,
        /// The command code actually received
        actual: String,
    },
}

/// All errors surfaced by the gateway core.
///
/// Variants are cloneable so a single socket-level failure can be fanned out
/// to every pending request on that socket.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// The branch id is not present in the current configuration.
    #[error("unknown branch '{branch}'")]
    UnknownBranch {
        /// The branch id that was requested
        branch: String,
    },

    /// The branch circuit breaker is OPEN; the call was rejected without
    /// touching the socket.
    #[error("circuit open for branch '{branch}', retry in {retry_in_ms} ms")]
    CircuitOpen {
        /// The gated branch
        branch: String,
        /// Milliseconds until the breaker will allow a half-open probe
        retry_in_ms: u64,
    },

    /// The breaker is HALF_OPEN and another call already holds the probe
    /// slot.
    #[error("half-open probe already in flight for branch '{branch}'")]
    ProbeInFlight {
        /// The gated branch
        branch: String,
    },

    /// The TCP connect or TLS handshake did not complete within the
    /// configured timeout.
    #[error("connect to {host}:{port} timed out after {timeout_ms} ms")]
    ConnectTimeout {
        /// Remote host
        host: String,
        /// Remote port
        port: u16,
        /// The timeout that elapsed
        timeout_ms: u64,
    },

    /// The connection attempt failed outright (refused, unreachable,
    /// TLS rejection).
    #[error("connect to {host}:{port} failed: {reason}")]
    ConnectFailed {
        /// Remote host
        host: String,
        /// Remote port
        port: u16,
        /// Stringified cause
        reason: String,
    },

    /// The LMS did not answer a request in time. The socket is destroyed
    /// as a side effect, so the next call starts from a fresh connection.
    #[error("request timed out after {timeout_ms} ms")]
    RequestTimeout {
        /// The timeout that elapsed
        timeout_ms: u64,
    },

    /// A response failed checksum verification on a branch that requires
    /// checksums.
    #[error("response checksum verification failed")]
    ChecksumMismatch,

    /// The login handshake was exhausted without a `941` acknowledgement.
    #[error("login rejected after {attempts} attempts")]
    LoginRejected {
        /// Number of attempts performed
        attempts: u32,
    },

    /// A send was issued with a sequence number that already has a pending
    /// request.
    #[error("sequence number {seq} already has a request in flight")]
    SequenceInUse {
        /// The colliding sequence number
        seq: u8,
    },

    /// All ten sequence numbers are occupied by in-flight requests.
    #[error("all ten sequence numbers are in flight")]
    ClientAtCapacity,

    /// The masking master key is not configured; PII-bearing payloads
    /// cannot be emitted.
    #[error("masking master key is not configured")]
    MasterKeyMissing,

    /// The socket closed or errored while requests were pending.
    #[error("socket closed: {reason}")]
    SocketClosed {
        /// Stringified cause reported by the close/error handler
        reason: String,
    },

    /// A codec-level failure.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl GatewayError {
    /// Maps the error to the HTTP status the out-of-scope HTTP layer
    /// surfaces to its callers.
    #[must_use]
    pub fn http_status(&self) -> u16 {
        match self {
            Self::UnknownBranch { .. } => 404,
            Self::CircuitOpen { .. } | Self::ProbeInFlight { .. } => 503,
            Self::ConnectTimeout { .. } | Self::RequestTimeout { .. } => 504,
            Self::ConnectFailed { .. }
            | Self::ChecksumMismatch
            | Self::LoginRejected { .. }
            | Self::SequenceInUse { .. }
            | Self::ClientAtCapacity
            | Self::SocketClosed { .. } => 502,
            // MalformedTrailer is treated as a checksum failure; a response
            // code mismatch is an upstream protocol violation.
            Self::Protocol(ProtocolError::MalformedTrailer)
            | Self::Protocol(ProtocolError::UnexpectedResponseCode { .. }) => 502,
            Self::Protocol(ProtocolError::InvalidSequence { .. }) | Self::MasterKeyMissing => 500,
        }
    }

    /// Returns the error type name used in logs and dashboard events.
    #[must_use]
    pub fn error_type_name(&self) -> &'static str {
        match self {
            Self::UnknownBranch { .. } => "unknown_branch",
            Self::CircuitOpen { .. } => "circuit_open",
            Self::ProbeInFlight { .. } => "probe_in_flight",
            Self::ConnectTimeout { .. } => "connect_timeout",
            Self::ConnectFailed { .. } => "connect_failed",
            Self::RequestTimeout { .. } => "request_timeout",
            Self::ChecksumMismatch => "checksum_mismatch",
            Self::LoginRejected { .. } => "login_rejected",
            Self::SequenceInUse { .. } => "sequence_in_use",
            Self::ClientAtCapacity => "client_at_capacity",
            Self::MasterKeyMissing => "master_key_missing",
            Self::SocketClosed { .. } => "socket_closed",
            Self::Protocol(ProtocolError::InvalidSequence { .. }) => "invalid_sequence",
            Self::Protocol(ProtocolError::MalformedTrailer) => "malformed_trailer",
            Self::Protocol(ProtocolError::UnexpectedResponseCode { .. }) => {
                "unexpected_response_code"
            }
        }
    }

    /// Whether this outcome advances the branch circuit breaker.
    ///
    /// Failures produced by the breaker gate itself must not feed back into
    /// the failure counter, and a missing branch or master key says nothing
    /// about LMS health.
    #[must_use]
    pub fn counts_as_failure(&self) -> bool {
        !matches!(
            self,
            Self::UnknownBranch { .. }
                | Self::CircuitOpen { .. }
                | Self::ProbeInFlight { .. }
                | Self::MasterKeyMissing
        )
    }
}
