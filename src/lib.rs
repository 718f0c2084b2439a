#![warn(
    unused_extern_crates,
    missing_debug_implementations,
    rust_2018_idioms,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss,
    clippy::cast_possible_wrap,
    clippy::dbg_macro
)]
#![cfg_attr(not(test), warn(clippy::unwrap_used))]
#![forbid(unsafe_code)]
#![allow(non_snake_case)]

//! Consensus-layer Bitcoin primitives: prime-field and elliptic-curve
//! arithmetic, ECDSA, Script, and transaction parsing/verification.
//!
//! Data flows upward — bytes parse into entities, entities feed the Script
//! evaluator, the evaluator calls into signature verification, which calls
//! into curve arithmetic. Fetching a previous transaction is the only seam
//! that leaves the crate: `Tx::verify`/`sig_hash` are generic over
//! [`tx_fetcher::FetchTransaction`], left to the embedding application the
//! same way the teacher crate leaves broadcast and address generation to
//! the wallet that embeds it.

mod base58;
mod block;
mod constants;
mod curve;
mod error;
mod field;
mod hash;
mod network;
mod private_key;
mod script;
mod secp256k1;
mod signature;
mod transaction;
mod tx_fetcher;

pub use base58::{decode_check, encode_check, h160_to_p2pkh_address, h160_to_p2sh_address};
pub use block::{calculate_new_bits, Block};
pub use constants::{MAX_TARGET, SIGHASH_ALL, SIGHASH_NONE, SIGHASH_SINGLE, TWO_WEEKS};
pub use curve::Point;
pub use error::{Error, Result};
pub use field::FieldElement;
pub use hash::{hash160, hash256};
pub use network::{NetworkEnvelope, VersionMessage};
pub use private_key::PrivateKey;
pub use script::{Command, Script};
pub use secp256k1::Secp256k1Point;
pub use signature::Signature;
pub use transaction::{Tx, TxIn, TxOut};
pub use tx_fetcher::{CachingFetcher, FetchTransaction};
