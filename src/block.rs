//! Block headers: parsing, serialization, and proof-of-work helpers.

use crate::constants::{MAX_TARGET, TWO_WEEKS};
use crate::error::{Error, Result};
use crate::hash::hash256;
use num_bigint::BigUint;
use num_traits::Num;
use std::io::Read;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Block {
    version: u32,
    prev_block: [u8; 32],
    merkle_root: [u8; 32],
    timestamp: u32,
    bits: [u8; 4],
    nonce: [u8; 4],
}

impl Block {
    pub fn new(
        version: u32,
        prev_block: [u8; 32],
        merkle_root: [u8; 32],
        timestamp: u32,
        bits: [u8; 4],
        nonce: [u8; 4],
    ) -> Self {
        Self { version, prev_block, merkle_root, timestamp, bits, nonce }
    }

    pub fn parse<R: Read>(reader: &mut R) -> Result<Self> {
        let mut version_buf = [0u8; 4];
        reader.read_exact(&mut version_buf).map_err(|_| Error::Parse("block version"))?;
        let version = u32::from_le_bytes(version_buf);

        let mut prev_block = [0u8; 32];
        reader.read_exact(&mut prev_block).map_err(|_| Error::Parse("block prev_block"))?;
        prev_block.reverse();

        let mut merkle_root = [0u8; 32];
        reader.read_exact(&mut merkle_root).map_err(|_| Error::Parse("block merkle_root"))?;
        merkle_root.reverse();

        let mut timestamp_buf = [0u8; 4];
        reader.read_exact(&mut timestamp_buf).map_err(|_| Error::Parse("block timestamp"))?;
        let timestamp = u32::from_le_bytes(timestamp_buf);

        let mut bits = [0u8; 4];
        reader.read_exact(&mut bits).map_err(|_| Error::Parse("block bits"))?;

        let mut nonce = [0u8; 4];
        reader.read_exact(&mut nonce).map_err(|_| Error::Parse("block nonce"))?;

        Ok(Self { version, prev_block, merkle_root, timestamp, bits, nonce })
    }

    /// Concatenates all six header fields. An earlier revision of this
    /// routine overwrote its accumulator field by field instead of
    /// concatenating, silently truncating every serialized header to its
    /// last write.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = self.version.to_le_bytes().to_vec();
        let mut prev_block = self.prev_block;
        prev_block.reverse();
        out.extend_from_slice(&prev_block);
        let mut merkle_root = self.merkle_root;
        merkle_root.reverse();
        out.extend_from_slice(&merkle_root);
        out.extend_from_slice(&self.timestamp.to_le_bytes());
        out.extend_from_slice(&self.bits);
        out.extend_from_slice(&self.nonce);
        out
    }

    pub fn hash(&self) -> [u8; 32] {
        let mut digest = hash256(&self.serialize());
        digest.reverse();
        digest
    }

    pub fn bip9(&self) -> bool {
        self.version >> 29 == 0b001
    }

    pub fn bip91(&self) -> bool {
        (self.version >> 4) & 1 == 1
    }

    pub fn bip141(&self) -> bool {
        (self.version >> 1) & 1 == 1
    }

    pub fn target(&self) -> BigUint {
        bits_to_target(&self.bits)
    }

    pub fn difficulty(&self) -> BigUint {
        let max_target = BigUint::from_str_radix(MAX_TARGET, 16).expect("valid max target");
        &max_target / self.target()
    }

    /// hash256 of the header, interpreted little-endian, must be below the
    /// target encoded in `bits`.
    pub fn check_pow(&self) -> bool {
        let mut digest = hash256(&self.serialize());
        digest.reverse();
        BigUint::from_bytes_be(&digest) < self.target()
    }
}

fn bits_to_target(bits: &[u8; 4]) -> BigUint {
    let exponent = bits[3] as u32;
    let coefficient = BigUint::from_bytes_le(&bits[..3]);
    coefficient * BigUint::from(256u32).pow(exponent - 3)
}

fn target_to_bits(target: &BigUint) -> [u8; 4] {
    let mut raw = target.to_bytes_be();
    while raw.first() == Some(&0) && raw.len() > 1 {
        raw.remove(0);
    }
    let (exponent, coefficient) = if raw.first().copied().unwrap_or(0) > 0x7f {
        (raw.len() as u8 + 1, {
            let mut c = vec![0u8];
            c.extend_from_slice(&raw[..raw.len().min(2)]);
            c
        })
    } else {
        (raw.len() as u8, raw[..raw.len().min(3)].to_vec())
    };
    let mut bits = [0u8; 4];
    let mut coefficient_le = coefficient;
    coefficient_le.reverse();
    for (i, byte) in coefficient_le.iter().take(3).enumerate() {
        bits[i] = *byte;
    }
    bits[3] = exponent;
    bits
}

/// Clamps the retarget interval to `[TWOWEEKS/4, TWOWEEKS*4]`, then scales
/// the previous target by that clamped ratio, capped at `MAX_TARGET`.
pub fn calculate_new_bits(previous_bits: &[u8; 4], time_diff: i64) -> [u8; 4] {
    let time_diff = time_diff.clamp((TWO_WEEKS / 4) as i64, (TWO_WEEKS as i64) * 4);
    let previous_target = bits_to_target(previous_bits);
    let mut new_target = previous_target * BigUint::from(time_diff as u64) / BigUint::from(TWO_WEEKS);
    let max_target = BigUint::from_str_radix(MAX_TARGET, 16).expect("valid max target");
    if new_target > max_target {
        new_target = max_target;
    }
    target_to_bits(&new_target)
}
