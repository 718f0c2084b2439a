//! The secp256k1 curve: fixed parameters, SEC encoding, and address derivation.

use crate::error::{Error, Result};
use crate::field::FieldElement;
use crate::hash::hash160;
use crate::curve::Point;
use num_bigint::{BigInt, BigUint};
use num_traits::{Num, One, Zero};
use once_cell::sync::Lazy;

pub static P: Lazy<BigUint> = Lazy::new(|| {
    (BigUint::one() << 256u32) - (BigUint::one() << 32u32) - BigUint::from(977u32)
});

pub static N: Lazy<BigUint> = Lazy::new(|| {
    BigUint::from_str_radix(
        "fffffffffffffffffffffffffffffffebaaedce6af48a03bbfd25e8cd0364141",
        16,
    )
    .expect("valid secp256k1 order")
});

static GX: Lazy<BigUint> = Lazy::new(|| {
    BigUint::from_str_radix(
        "79be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798",
        16,
    )
    .expect("valid secp256k1 generator x")
});

static GY: Lazy<BigUint> = Lazy::new(|| {
    BigUint::from_str_radix(
        "483ada7726a3c4655da4fbfc0e1108a8fd17b448a68554199c47d08ffb10d4b8",
        16,
    )
    .expect("valid secp256k1 generator y")
});

fn a() -> FieldElement {
    FieldElement::reduced(BigUint::zero(), P.clone())
}

fn b() -> FieldElement {
    FieldElement::reduced(BigUint::from(7u8), P.clone())
}

/// A point on secp256k1. Coordinates are reduced mod `P`; scalar
/// multiplication reduces the scalar mod `N` first.
#[derive(Clone, Debug, PartialEq)]
pub struct Secp256k1Point(Point);

impl Secp256k1Point {
    pub fn generator() -> Self {
        Self::new(GX.clone(), GY.clone()).expect("generator is on the curve")
    }

    pub fn identity() -> Self {
        Self(Point::identity(a(), b()))
    }

    pub fn new(x: BigUint, y: BigUint) -> Result<Self> {
        let x = FieldElement::new(x, P.clone()).map_err(|_| Error::NotOnCurve)?;
        let y = FieldElement::new(y, P.clone()).map_err(|_| Error::NotOnCurve)?;
        Ok(Self(Point::new(x, y, a(), b())?))
    }

    pub fn inner(&self) -> &Point {
        &self.0
    }

    pub fn add(&self, other: &Self) -> Self {
        Self(self.0.add(&other.0).expect("secp256k1 points always share a domain"))
    }

    pub fn scalar_mul(&self, coefficient: &BigUint) -> Self {
        let coefficient = coefficient % &*N;
        Self(self.0.scalar_mul(&coefficient))
    }

    /// `y^2 = x^3 + 7`; `P mod 4 == 3`, so the square root is `w^((P+1)/4)`.
    fn sqrt(w: &FieldElement) -> FieldElement {
        let exponent = BigInt::from((&*P + BigUint::one()) / BigUint::from(4u8));
        w.pow(&exponent)
    }

    /// SEC format: `0x04 || x || y` uncompressed, `0x02/0x03 || x` compressed.
    pub fn sec(&self, compressed: bool) -> Vec<u8> {
        let (x, y) = match (self.0.x(), self.0.y()) {
            (Some(x), Some(y)) => (x, y),
            _ => return vec![0x00],
        };
        let x_bytes = to_32_bytes(x.num());
        if compressed {
            let prefix = if y.num() % BigUint::from(2u8) == BigUint::zero() { 0x02 } else { 0x03 };
            let mut out = Vec::with_capacity(33);
            out.push(prefix);
            out.extend_from_slice(&x_bytes);
            out
        } else {
            let mut out = Vec::with_capacity(65);
            out.push(0x04);
            out.extend_from_slice(&x_bytes);
            out.extend_from_slice(&to_32_bytes(y.num()));
            out
        }
    }

    pub fn parse(sec_bytes: &[u8]) -> Result<Self> {
        match sec_bytes.first() {
            Some(0x04) => {
                if sec_bytes.len() != 65 {
                    return Err(Error::CryptoFailure("uncompressed SEC public key"));
                }
                let x = BigUint::from_bytes_be(&sec_bytes[1..33]);
                let y = BigUint::from_bytes_be(&sec_bytes[33..65]);
                Self::new(x, y)
            }
            Some(prefix @ (0x02 | 0x03)) => {
                if sec_bytes.len() != 33 {
                    return Err(Error::CryptoFailure("compressed SEC public key"));
                }
                let x_num = BigUint::from_bytes_be(&sec_bytes[1..33]);
                let x = FieldElement::new(x_num, P.clone())
                    .map_err(|_| Error::CryptoFailure("compressed SEC public key"))?;
                let alpha = x.mul(&x).unwrap().mul(&x).unwrap().add(&b()).unwrap();
                let beta = Self::sqrt(&alpha);
                let is_beta_even = beta.num() % BigUint::from(2u8) == BigUint::zero();
                let want_even = *prefix == 0x02;
                let (even_beta, odd_beta) = if is_beta_even {
                    (beta.clone(), FieldElement::reduced(&*P - beta.num(), P.clone()))
                } else {
                    (FieldElement::reduced(&*P - beta.num(), P.clone()), beta.clone())
                };
                let y = if want_even { even_beta } else { odd_beta };
                Ok(Self(Point::new(x, y, a(), b())?))
            }
            _ => Err(Error::CryptoFailure("SEC public key prefix")),
        }
    }

    /// RIPEMD160(SHA256(sec)) of the public key.
    pub fn hash160(&self, compressed: bool) -> [u8; 20] {
        hash160(&self.sec(compressed))
    }

    pub fn address(&self, compressed: bool, testnet: bool) -> String {
        crate::base58::h160_to_p2pkh_address(&self.hash160(compressed), testnet)
    }

    pub fn verify(&self, z: &BigUint, signature: &crate::signature::Signature) -> bool {
        let n = &*N;
        let s_inv = signature.s().modpow(&(n - BigUint::from(2u8)), n);
        let u = (z * &s_inv) % n;
        let v = (signature.r() * &s_inv) % n;
        let total = Self::generator().scalar_mul(&u).add(&self.scalar_mul(&v));
        match total.0.x() {
            Some(x) => x.num() == signature.r(),
            None => false,
        }
    }
}

fn to_32_bytes(n: &BigUint) -> [u8; 32] {
    let bytes = n.to_bytes_be();
    let mut out = [0u8; 32];
    out[32 - bytes.len()..].copy_from_slice(&bytes);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generator_has_order_n() {
        let g = Secp256k1Point::generator();
        assert!(g.scalar_mul(&N).0.is_identity());
    }

    #[test]
    fn sec_round_trips_compressed_and_uncompressed() {
        let point = Secp256k1Point::generator().scalar_mul(&BigUint::from(999u32));
        let compressed = point.sec(true);
        let uncompressed = point.sec(false);
        assert_eq!(Secp256k1Point::parse(&compressed).unwrap(), point);
        assert_eq!(Secp256k1Point::parse(&uncompressed).unwrap(), point);
    }

    #[test]
    fn address_from_known_secret() {
        // secret = 5002, uncompressed, testnet
        let point = Secp256k1Point::generator().scalar_mul(&BigUint::from(5002u32));
        let address = point.address(false, true);
        assert_eq!(address, "mmTPbXQFxboEtNRkwfh6K51jvdtHLxGeMA");
    }

    #[test]
    fn address_from_known_secret_compressed_testnet() {
        let secret = BigUint::from(2020u32).pow(5);
        let point = Secp256k1Point::generator().scalar_mul(&secret);
        let address = point.address(true, true);
        assert_eq!(address, "mopVkxp8UhXqRYbCYJsbeE1h1fiF64jcoH");
    }

    #[test]
    fn address_from_cubed_secret_mainnet_and_testnet() {
        let secret = BigUint::from(888u32).pow(3);
        let point = Secp256k1Point::generator().scalar_mul(&secret);
        assert_eq!(point.address(true, false), "148dY81A9BmdpMhvYEVznrM45kWN32vSCN");
        assert_eq!(point.address(true, true), "mieaqB68xDCtbUBYFoUNcmZNwk74xcBfTP");
    }

    #[test]
    fn verifies_known_signature_against_uncompressed_sec_point() {
        let px = BigUint::from_str_radix(
            "887387e452b8eacc4acfde10d9aaf7f6d9a0f975aabb10d006e4da568744d06c",
            16,
        )
        .unwrap();
        let py = BigUint::from_str_radix(
            "61de6d95231cd89026e286df3b6ae4a894a3378e393e93a0f45b666329a0ae34",
            16,
        )
        .unwrap();
        let point = Secp256k1Point::new(px, py).unwrap();

        let z = BigUint::from_str_radix(
            "7c076ff316692a3d7eb3c3bb0f8b1488cf72e1afcd929e29307032997a838a3d",
            16,
        )
        .unwrap();
        let r = BigUint::from_str_radix(
            "eff69ef2b1bd93a66ed5219add4fb51e11a840f404876325a1e8ffe0529a2c",
            16,
        )
        .unwrap();
        let s = BigUint::from_str_radix(
            "c7207fee197d27c618aea621406f6bf5ef6fca38681d82b2f06fddbdce6feab6",
            16,
        )
        .unwrap();
        let signature = crate::signature::Signature::new(r, s);

        assert!(point.verify(&z, &signature));
    }
}
