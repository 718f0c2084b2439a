//! Base58Check encoding and P2PKH/P2SH address derivation.

use crate::error::{Error, Result};

const P2PKH_MAINNET: u8 = 0x00;
const P2PKH_TESTNET: u8 = 0x6f;
const P2SH_MAINNET: u8 = 0x05;
const P2SH_TESTNET: u8 = 0xc4;

pub fn encode_check(payload: &[u8]) -> String {
    bs58::encode(payload).with_check().into_string()
}

pub fn decode_check(s: &str) -> Result<Vec<u8>> {
    bs58::decode(s)
        .with_check(None)
        .into_vec()
        .map_err(|_| Error::ChecksumMismatch)
}

pub fn h160_to_p2pkh_address(h160: &[u8; 20], testnet: bool) -> String {
    let prefix = if testnet { P2PKH_TESTNET } else { P2PKH_MAINNET };
    let mut payload = vec![prefix];
    payload.extend_from_slice(h160);
    encode_check(&payload)
}

pub fn h160_to_p2sh_address(h160: &[u8; 20], testnet: bool) -> String {
    let prefix = if testnet { P2SH_TESTNET } else { P2SH_MAINNET };
    let mut payload = vec![prefix];
    payload.extend_from_slice(h160);
    encode_check(&payload)
}
