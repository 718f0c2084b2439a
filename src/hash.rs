//! Hashing primitives and the Bitcoin varint wire format.

use crate::error::{Error, Result};
use ripemd::Ripemd160;
use sha2::{Digest, Sha256};
use std::io::Read;

/// SHA256(SHA256(payload)).
pub fn hash256(payload: &[u8]) -> [u8; 32] {
    let first = Sha256::digest(payload);
    let second = Sha256::digest(first);
    let mut out = [0u8; 32];
    out.copy_from_slice(&second);
    out
}

/// RIPEMD160(SHA256(payload)).
pub fn hash160(payload: &[u8]) -> [u8; 20] {
    let sha = Sha256::digest(payload);
    let ripe = Ripemd160::digest(sha);
    let mut out = [0u8; 20];
    out.copy_from_slice(&ripe);
    out
}

/// Reads a Bitcoin `CompactSize` varint from `reader`.
pub fn read_varint<R: Read>(reader: &mut R) -> Result<u64> {
    let mut prefix = [0u8; 1];
    reader
        .read_exact(&mut prefix)
        .map_err(|_| Error::Parse("varint prefix"))?;
    match prefix[0] {
        0xfd => {
            let mut buf = [0u8; 2];
            reader.read_exact(&mut buf).map_err(|_| Error::Parse("varint"))?;
            Ok(u16::from_le_bytes(buf) as u64)
        }
        0xfe => {
            let mut buf = [0u8; 4];
            reader.read_exact(&mut buf).map_err(|_| Error::Parse("varint"))?;
            Ok(u32::from_le_bytes(buf) as u64)
        }
        0xff => {
            let mut buf = [0u8; 8];
            reader.read_exact(&mut buf).map_err(|_| Error::Parse("varint"))?;
            Ok(u64::from_le_bytes(buf))
        }
        n => Ok(n as u64),
    }
}

/// Encodes `n` as a Bitcoin `CompactSize` varint.
pub fn encode_varint(n: u64) -> Vec<u8> {
    if n < 0xfd {
        vec![n as u8]
    } else if n <= 0xffff {
        let mut out = vec![0xfd];
        out.extend_from_slice(&(n as u16).to_le_bytes());
        out
    } else if n <= 0xffff_ffff {
        let mut out = vec![0xfe];
        out.extend_from_slice(&(n as u32).to_le_bytes());
        out
    } else {
        let mut out = vec![0xff];
        out.extend_from_slice(&n.to_le_bytes());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn varint_round_trips_single_byte() {
        let encoded = encode_varint(100);
        assert_eq!(encoded, vec![100]);
        assert_eq!(read_varint(&mut Cursor::new(encoded)).unwrap(), 100);
    }

    #[test]
    fn varint_round_trips_each_prefix_boundary() {
        for n in [0xfcu64, 0xfd, 0xffff, 0x1_0000, 0xffff_ffff, 0x1_0000_0000] {
            let encoded = encode_varint(n);
            assert_eq!(read_varint(&mut Cursor::new(encoded)).unwrap(), n);
        }
    }

    #[test]
    fn hash256_is_deterministic_and_differs_from_single_sha256() {
        let digest = hash256(b"hello");
        assert_eq!(digest, hash256(b"hello"));
        let single: [u8; 32] = Sha256::digest(b"hello").into();
        assert_ne!(digest, single);
    }

    #[test]
    fn hash160_is_20_bytes_and_deterministic() {
        assert_eq!(hash160(b"hello").len(), 20);
        assert_eq!(hash160(b"hello"), hash160(b"hello"));
    }
}
