//! Crate-wide error type.
//!
//! Parse and serialize boundaries return `Result<T, Error>`. The script
//! evaluator and the transaction verifier never propagate an `Error` past
//! their own boundary: a failing script evaluation or a failing input
//! verification is reported as `false`, with the underlying cause logged via
//! `tracing` (see [`crate::script::Script::evaluate`] and
//! [`crate::transaction::Tx::verify_input`]).

/// Everything that can go wrong while parsing, encoding, or validating a
/// Bitcoin primitive.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed byte input at any serialization layer.
    #[error("failed to parse {0}")]
    Parse(&'static str),

    /// A field or curve operation mixed two elements from different domains
    /// (different prime, or different curve coefficients).
    #[error("operands belong to different domains")]
    DomainMismatch,

    /// Point construction was given coordinates that do not satisfy the
    /// curve equation.
    #[error("point is not on the curve")]
    NotOnCurve,

    /// A Base58Check or network-envelope checksum did not match.
    #[error("checksum mismatch")]
    ChecksumMismatch,

    /// A script push exceeded the 520-byte consensus limit during
    /// serialization.
    #[error("script element is too long to serialize")]
    ScriptTooLong,

    /// A SEC public key or DER signature was malformed.
    #[error("malformed {0}")]
    CryptoFailure(&'static str),

    /// The collaborator that fetches previous transactions failed.
    #[error("failed to fetch transaction: {0}")]
    FetchFailure(String),

    /// A fetched transaction's id did not match the id that was requested.
    #[error("fetched transaction id {fetched} does not match requested id {requested}")]
    TxIdMismatch { requested: String, fetched: String },

    /// A transaction's total input value is less than its total output
    /// value.
    #[error("transaction fee is negative")]
    InsufficientFunds,

    /// A fetch was cancelled by the caller before it completed.
    #[error("fetch was cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, Error>;
