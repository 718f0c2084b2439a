//! Prime-field arithmetic.
//!
//! `FieldElement` is a residue `num mod prime`, `0 <= num < prime`. Rust has
//! no operator overloading story that can fail, so the arithmetic the
//! original took for granted (`a + b`, `a / b`, ...) becomes a set of
//! explicit, fallible methods; every one of them checks that both operands
//! share the same `prime` before touching `num`.

use crate::error::{Error, Result};
use num_bigint::{BigInt, BigUint};
use num_traits::{One, Signed, Zero};

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct FieldElement {
    num: BigUint,
    prime: BigUint,
}

impl FieldElement {
    /// Builds a residue, rejecting a `num` outside `[0, prime)`.
    pub fn new(num: BigUint, prime: BigUint) -> Result<Self> {
        if num >= prime {
            return Err(Error::Parse("field element out of range"));
        }
        Ok(Self { num, prime })
    }

    /// Builds a residue by reducing `num` modulo `prime`. Useful at the
    /// boundary where upstream bytes are already known to be canonical
    /// (e.g. a secp256k1 coordinate straight out of a SEC encoding).
    pub fn reduced(num: BigUint, prime: BigUint) -> Self {
        let num = num % &prime;
        Self { num, prime }
    }

    pub fn num(&self) -> &BigUint {
        &self.num
    }

    pub fn prime(&self) -> &BigUint {
        &self.prime
    }

    fn check_domain(&self, other: &Self) -> Result<()> {
        if self.prime != other.prime {
            return Err(Error::DomainMismatch);
        }
        Ok(())
    }

    pub fn add(&self, other: &Self) -> Result<Self> {
        self.check_domain(other)?;
        let num = (&self.num + &other.num) % &self.prime;
        Ok(Self { num, prime: self.prime.clone() })
    }

    pub fn sub(&self, other: &Self) -> Result<Self> {
        self.check_domain(other)?;
        let num = (&self.prime + &self.num - &other.num) % &self.prime;
        Ok(Self { num, prime: self.prime.clone() })
    }

    pub fn mul(&self, other: &Self) -> Result<Self> {
        self.check_domain(other)?;
        let num = (&self.num * &other.num) % &self.prime;
        Ok(Self { num, prime: self.prime.clone() })
    }

    /// Multiplies by a plain scalar coefficient (no domain to mismatch).
    pub fn scalar_mul(&self, coefficient: &BigUint) -> Self {
        let num = (coefficient * &self.num) % &self.prime;
        Self { num, prime: self.prime.clone() }
    }

    /// `a / b = a * b^(prime - 2) mod prime` (Fermat's little theorem).
    pub fn div(&self, other: &Self) -> Result<Self> {
        self.check_domain(other)?;
        if other.num.is_zero() {
            return Err(Error::DomainMismatch);
        }
        let exponent = &self.prime - BigUint::from(2u8);
        let other_inv = other.num.modpow(&exponent, &self.prime);
        let num = (&self.num * other_inv) % &self.prime;
        Ok(Self { num, prime: self.prime.clone() })
    }

    /// Raises to `exponent`, first reducing it modulo `prime - 1`.
    pub fn pow(&self, exponent: &BigInt) -> Self {
        let modulus = BigInt::from(self.prime.clone()) - BigInt::one();
        let mut e = exponent % &modulus;
        if e.is_negative() {
            e += &modulus;
        }
        let e = e.to_biguint().expect("non-negative after reduction");
        let num = self.num.modpow(&e, &self.prime);
        Self { num, prime: self.prime.clone() }
    }

    pub fn is_zero(&self) -> bool {
        self.num.is_zero()
    }
}
