//! Error taxonomy for the bucket-brigade audio core (see spec §7).

use thiserror::Error;

/// Every fallible outcome the core can produce. Everything except
/// [`CoreError::ConnectivityLost`] is fatal to the owning session.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("chunk reference {found:?} does not match expected {expected:?}")]
    ClockReferenceMismatch {
        expected: &'static str,
        found: &'static str,
    },

    #[error("chunk starting at {start} is not contiguous with clock at {clock}")]
    NonContiguous { clock: i64, start: i64 },

    #[error("placeholder chunk arrived after clocks were already started")]
    ClockStartedPlaceholder,

    #[error("codec worker response id {got} does not match expected {expected}")]
    ResponseOutOfOrder { expected: u32, got: u32 },

    #[error("codec worker RPC failed with status {status}")]
    CodecRpcFailed { status: i32 },

    #[error("codec worker raised an exception: {exception}")]
    CodecException { exception: String },

    #[error("malformed packed frame: {reason}")]
    MalformedFrame { reason: &'static str },

    #[error("decoded length {actual} deviates from expected {expected} by more than tolerance")]
    DecodeLengthMismatch { expected: i64, actual: i64 },

    #[error("player node reported an underflow")]
    PlayerUnderflow,

    #[error("unrecognized player-node message type: {message_type}")]
    UnknownMessage { message_type: String },

    #[error("connectivity to the server was lost")]
    ConnectivityLost,

    #[error("codec worker setup failed with status {status}")]
    SetupFailed { status: i32 },
}

pub type CoreResult<T> = Result<T, CoreError>;
