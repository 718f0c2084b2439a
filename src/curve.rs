//! Generic short-Weierstrass elliptic curve over a [`FieldElement`] domain.
//!
//! `Point` is deliberately curve-agnostic: the secp256k1 specialization in
//! [`crate::secp256k1`] is just a `Point` built with `a = 0`, `b = 7` and
//! coordinates reduced modulo the secp256k1 prime. The point at infinity
//! (the group identity) is represented by `x = None, y = None`.

use crate::error::{Error, Result};
use crate::field::FieldElement;
use num_bigint::BigUint;
use num_traits::Zero;

#[derive(Clone, Debug, PartialEq)]
pub struct Point {
    x: Option<FieldElement>,
    y: Option<FieldElement>,
    a: FieldElement,
    b: FieldElement,
}

impl Point {
    /// The identity element of the curve `y^2 = x^3 + ax + b`.
    pub fn identity(a: FieldElement, b: FieldElement) -> Self {
        Self { x: None, y: None, a, b }
    }

    /// A finite point. Fails with [`Error::NotOnCurve`] unless
    /// `y^2 == x^3 + a*x + b`.
    pub fn new(x: FieldElement, y: FieldElement, a: FieldElement, b: FieldElement) -> Result<Self> {
        let lhs = y.mul(&y)?;
        let rhs = x
            .mul(&x)?
            .mul(&x)?
            .add(&a.mul(&x)?)?
            .add(&b)?;
        if lhs != rhs {
            return Err(Error::NotOnCurve);
        }
        Ok(Self { x: Some(x), y: Some(y), a, b })
    }

    pub fn is_identity(&self) -> bool {
        self.x.is_none()
    }

    pub fn x(&self) -> Option<&FieldElement> {
        self.x.as_ref()
    }

    pub fn y(&self) -> Option<&FieldElement> {
        self.y.as_ref()
    }

    pub fn a(&self) -> &FieldElement {
        &self.a
    }

    pub fn b(&self) -> &FieldElement {
        &self.b
    }

    fn same_curve(&self, other: &Self) -> Result<()> {
        if self.a != other.a || self.b != other.b {
            return Err(Error::DomainMismatch);
        }
        Ok(())
    }

    /// Point addition with the standard short-Weierstrass tie cases:
    /// identity absorption, vertical-line inverses, and doubling.
    pub fn add(&self, other: &Self) -> Result<Self> {
        self.same_curve(other)?;

        if self.is_identity() {
            return Ok(other.clone());
        }
        if other.is_identity() {
            return Ok(self.clone());
        }

        let (x1, y1) = (self.x.as_ref().unwrap(), self.y.as_ref().unwrap());
        let (x2, y2) = (other.x.as_ref().unwrap(), other.y.as_ref().unwrap());

        if x1 == x2 {
            if y1 != y2 || y1.is_zero() {
                // Vertical line: P + (-P) = O, or doubling a point with y = 0.
                return Ok(Self::identity(self.a.clone(), self.b.clone()));
            }
            // Doubling: s = (3x^2 + a) / 2y
            let three = FieldElement::reduced(BigUint::from(3u8), x1.prime().clone());
            let two = FieldElement::reduced(BigUint::from(2u8), x1.prime().clone());
            let s = three.mul(x1)?.mul(x1)?.add(&self.a)?.div(&two.mul(y1)?)?;
            let x = s.mul(&s)?.sub(x1)?.sub(x1)?;
            let y = s.mul(&x1.sub(&x)?)?.sub(y1)?;
            return Ok(Self { x: Some(x), y: Some(y), a: self.a.clone(), b: self.b.clone() });
        }

        let s = y2.sub(y1)?.div(&x2.sub(x1)?)?;
        let x = s.mul(&s)?.sub(x1)?.sub(x2)?;
        let y = s.mul(&x1.sub(&x)?)?.sub(y1)?;
        Ok(Self { x: Some(x), y: Some(y), a: self.a.clone(), b: self.b.clone() })
    }

    /// Scalar multiplication by double-and-add over the binary expansion of
    /// `coefficient`. Never fails: repeated addition of points on the same
    /// curve cannot produce a domain mismatch.
    pub fn scalar_mul(&self, coefficient: &BigUint) -> Self {
        let mut coefficient = coefficient.clone();
        let mut current = self.clone();
        let mut result = Self::identity(self.a.clone(), self.b.clone());
        while !coefficient.is_zero() {
            if &coefficient & BigUint::from(1u8) == BigUint::from(1u8) {
                result = result.add(&current).expect("same curve by construction");
            }
            current = current.add(&current).expect("same curve by construction");
            coefficient >>= 1u32;
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(x: u64, y: u64, a: u64, b: u64, p: u64) -> Point {
        let prime = BigUint::from(p);
        Point::new(
            FieldElement::new(BigUint::from(x), prime.clone()).unwrap(),
            FieldElement::new(BigUint::from(y), prime.clone()).unwrap(),
            FieldElement::new(BigUint::from(a), prime.clone()).unwrap(),
            FieldElement::new(BigUint::from(b), prime).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn rejects_points_not_on_curve() {
        let prime = BigUint::from(223u64);
        let result = Point::new(
            FieldElement::new(BigUint::from(200u64), prime.clone()).unwrap(),
            FieldElement::new(BigUint::from(119u64), prime.clone()).unwrap(),
            FieldElement::new(BigUint::zero(), prime.clone()).unwrap(),
            FieldElement::new(BigUint::from(7u64), prime).unwrap(),
        );
        assert!(matches!(result, Err(Error::NotOnCurve)));
    }

    #[test]
    fn doubling_matches_spec_example_b() {
        // over (a=0,b=7,p=223): 2*(47,71) == (36,111)
        let p = point(47, 71, 0, 7, 223);
        let doubled = p.scalar_mul(&BigUint::from(2u8));
        assert_eq!(doubled, point(36, 111, 0, 7, 223));
    }

    #[test]
    fn addition_is_commutative() {
        let p1 = point(170, 142, 0, 7, 223);
        let p2 = point(60, 139, 0, 7, 223);
        assert_eq!(p1.add(&p2).unwrap(), p2.add(&p1).unwrap());
    }

    #[test]
    fn inverse_adds_to_identity() {
        let p1 = point(47, 71, 0, 7, 223);
        let p2 = point(47, 223 - 71, 0, 7, 223);
        assert!(p1.add(&p2).unwrap().is_identity());
    }

    proptest::proptest! {
        #[test]
        fn scalar_mul_is_additive(r1 in 0u64..300, r2 in 0u64..300) {
            let p = point(47, 71, 0, 7, 223);
            let lhs = p.scalar_mul(&BigUint::from(r1)).add(&p.scalar_mul(&BigUint::from(r2))).unwrap();
            let rhs = p.scalar_mul(&BigUint::from(r1 + r2));
            proptest::prop_assert_eq!(lhs, rhs);
        }
    }
}
