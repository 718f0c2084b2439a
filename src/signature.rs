//! ECDSA signatures and their DER encoding.

use crate::error::{Error, Result};
use num_bigint::BigUint;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Signature {
    r: BigUint,
    s: BigUint,
}

impl Signature {
    pub fn new(r: BigUint, s: BigUint) -> Self {
        Self { r, s }
    }

    pub fn r(&self) -> &BigUint {
        &self.r
    }

    pub fn s(&self) -> &BigUint {
        &self.s
    }

    /// DER encoding: `0x30 len 0x02 rlen r 0x02 slen s`, each integer
    /// prefixed with a `0x00` pad byte when its high bit is set.
    pub fn der(&self) -> Vec<u8> {
        let mut out = vec![0x30];
        let rbin = der_integer(&self.r);
        let sbin = der_integer(&self.s);
        let body_len = rbin.len() + sbin.len();
        out.push(body_len as u8);
        out.extend_from_slice(&rbin);
        out.extend_from_slice(&sbin);
        out
    }

    /// Parses a DER signature, the inverse of [`Signature::der`].
    pub fn parse(der: &[u8]) -> Result<Self> {
        if der.first() != Some(&0x30) {
            return Err(Error::CryptoFailure("DER signature header"));
        }
        let total_len = *der.get(1).ok_or(Error::CryptoFailure("DER signature length"))? as usize;
        if der.len() != total_len + 2 {
            return Err(Error::CryptoFailure("DER signature length"));
        }
        let (r, rest) = parse_der_integer(&der[2..])?;
        let (s, rest) = parse_der_integer(rest)?;
        if !rest.is_empty() {
            return Err(Error::CryptoFailure("DER signature trailing bytes"));
        }
        Ok(Self { r, s })
    }
}

fn der_integer(n: &BigUint) -> Vec<u8> {
    let mut bytes = n.to_bytes_be();
    if bytes.is_empty() {
        bytes.push(0);
    }
    if bytes[0] & 0x80 != 0 {
        bytes.insert(0, 0x00);
    } else {
        while bytes.len() > 1 && bytes[0] == 0x00 && bytes[1] & 0x80 == 0 {
            bytes.remove(0);
        }
    }
    let mut out = vec![0x02, bytes.len() as u8];
    out.extend_from_slice(&bytes);
    out
}

fn parse_der_integer(input: &[u8]) -> Result<(BigUint, &[u8])> {
    if input.first() != Some(&0x02) {
        return Err(Error::CryptoFailure("DER integer marker"));
    }
    let len = *input.get(1).ok_or(Error::CryptoFailure("DER integer length"))? as usize;
    let bytes = input
        .get(2..2 + len)
        .ok_or(Error::CryptoFailure("DER integer body"))?;
    Ok((BigUint::from_bytes_be(bytes), &input[2 + len..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn der_round_trips() {
        let sig = Signature::new(BigUint::from(37206357899u64), BigUint::from(128u64));
        let der = sig.der();
        assert_eq!(Signature::parse(&der).unwrap(), sig);
    }

    #[test]
    fn der_pads_high_bit_integers() {
        // An r whose top byte has the high bit set needs a 0x00 pad so DER
        // does not read it as negative.
        let r = BigUint::from_bytes_be(&[0xff, 0x01]);
        let s = BigUint::from(1u8);
        let sig = Signature::new(r, s);
        let der = sig.der();
        // 0x30 len 0x02 rlen 0x00 0xff 0x01 0x02 slen 0x01
        assert_eq!(der[3], 3); // rlen includes the pad byte
        assert_eq!(der[4], 0x00);
        assert_eq!(Signature::parse(&der).unwrap(), sig);
    }
}
