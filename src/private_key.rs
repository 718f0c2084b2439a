//! ECDSA private keys: RFC 6979 deterministic signing and WIF export.

use crate::secp256k1::{Secp256k1Point, N};
use crate::signature::Signature;
use hmac::{Hmac, Mac};
use num_bigint::BigUint;
use num_traits::{One, Zero};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

#[derive(Clone, Debug, PartialEq)]
pub struct PrivateKey {
    secret: BigUint,
    public_point: Secp256k1Point,
}

impl PrivateKey {
    pub fn new(secret: BigUint) -> Self {
        let public_point = Secp256k1Point::generator().scalar_mul(&secret);
        Self { secret, public_point }
    }

    pub fn public_point(&self) -> &Secp256k1Point {
        &self.public_point
    }

    /// Signs `z` with a deterministic nonce (RFC 6979), normalizing `s` to
    /// the low half of the order so a signature has a unique canonical form.
    pub fn sign(&self, z: &BigUint) -> Signature {
        let k = self.deterministic_k(z);
        let n = &*N;
        let r = Secp256k1Point::generator()
            .scalar_mul(&k)
            .inner()
            .x()
            .expect("k*G is never the identity for nonzero k")
            .num()
            .clone();
        let k_inv = k.modpow(&(n - BigUint::from(2u8)), n);
        let mut s = ((z + &r * &self.secret) * k_inv) % n;
        if s > n / BigUint::from(2u8) {
            s = n - s;
        }
        Signature::new(r, s)
    }

    /// RFC 6979 deterministic nonce generation specialized to secp256k1 and
    /// HMAC-SHA256, matching the reference algorithm bit for bit.
    fn deterministic_k(&self, z: &BigUint) -> BigUint {
        let n = &*N;
        let mut z = z.clone();
        if z > *n {
            z -= n;
        }
        let z_bytes = to_32_bytes(&z);
        let secret_bytes = to_32_bytes(&self.secret);

        let mut k = [0u8; 32];
        let mut v = [1u8; 32];

        let mut mac = HmacSha256::new_from_slice(&k).expect("HMAC accepts any key length");
        mac.update(&v);
        mac.update(&[0x00]);
        mac.update(&secret_bytes);
        mac.update(&z_bytes);
        k.copy_from_slice(&mac.finalize().into_bytes());

        let mut mac = HmacSha256::new_from_slice(&k).expect("HMAC accepts any key length");
        mac.update(&v);
        v.copy_from_slice(&mac.finalize().into_bytes());

        let mut mac = HmacSha256::new_from_slice(&k).expect("HMAC accepts any key length");
        mac.update(&v);
        mac.update(&[0x01]);
        mac.update(&secret_bytes);
        mac.update(&z_bytes);
        k.copy_from_slice(&mac.finalize().into_bytes());

        let mut mac = HmacSha256::new_from_slice(&k).expect("HMAC accepts any key length");
        mac.update(&v);
        v.copy_from_slice(&mac.finalize().into_bytes());

        loop {
            let mut mac = HmacSha256::new_from_slice(&k).expect("HMAC accepts any key length");
            mac.update(&v);
            v.copy_from_slice(&mac.finalize().into_bytes());
            let candidate = BigUint::from_bytes_be(&v);
            if candidate >= BigUint::one() && candidate < *n {
                return candidate;
            }
            let mut mac = HmacSha256::new_from_slice(&k).expect("HMAC accepts any key length");
            mac.update(&v);
            mac.update(&[0x00]);
            k.copy_from_slice(&mac.finalize().into_bytes());
            let mut mac = HmacSha256::new_from_slice(&k).expect("HMAC accepts any key length");
            mac.update(&v);
            v.copy_from_slice(&mac.finalize().into_bytes());
        }
    }

    /// Wallet Import Format: Base58Check of `prefix || secret[ || 0x01]`.
    pub fn wif(&self, compressed: bool, testnet: bool) -> String {
        let prefix = if testnet { 0xefu8 } else { 0x80u8 };
        let mut payload = vec![prefix];
        payload.extend_from_slice(&to_32_bytes(&self.secret));
        if compressed {
            payload.push(0x01);
        }
        crate::base58::encode_check(&payload)
    }
}

fn to_32_bytes(n: &BigUint) -> [u8; 32] {
    let bytes = n.to_bytes_be();
    let mut out = [0u8; 32];
    out[32 - bytes.len()..].copy_from_slice(&bytes);
    out
}
