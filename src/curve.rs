// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! secp256k1 curve points, scalar conversions, and the ECDSA signature type
//! produced by the signing protocol.

use crate::{
    errors::{CallerError, InternalError, Result},
    transcript::TranscriptWrite,
};
use generic_array::GenericArray;
use k256::{
    elliptic_curve::{
        ops::Reduce,
        point::AffineCoordinates,
        scalar::IsHigh,
        sec1::{FromEncodedPoint, ToEncodedPoint},
        Group, PrimeField,
    },
    AffinePoint, EncodedPoint, ProjectivePoint, Scalar, U256,
};
use libpaillier::unknown_order::BigNumber;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::error;
use zeroize::{Zeroize, Zeroizing};

/// The byte length of an encoded point: a SEC1 tag plus the x-coordinate.
const POINT_BYTES: usize = 33;

/// A secp256k1 point with a fixed-width compressed encoding, so protocol
/// messages and configs always carry 33 bytes per point.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Zeroize)]
pub struct CurvePoint(pub(crate) ProjectivePoint);

impl CurvePoint {
    pub(crate) const GENERATOR: Self = CurvePoint(ProjectivePoint::GENERATOR);

    /// The identity point, used to initialize sums of curve points.
    pub(crate) const IDENTITY: Self = CurvePoint(ProjectivePoint::IDENTITY);

    pub(crate) fn is_identity(&self) -> bool {
        self.0.is_identity().into()
    }

    pub(crate) fn multiply_by_scalar(&self, scalar: &Scalar) -> Self {
        Self(self.0 * scalar)
    }

    /// Scalar-multiply by an integer, reducing it into the scalar field
    /// first.
    pub(crate) fn multiply_by_bignum(&self, scalar: &BigNumber) -> Result<Self> {
        let s = Zeroizing::new(bn_to_scalar(scalar)?);
        Ok(self.multiply_by_scalar(&s))
    }

    /// `scalar·G`.
    pub(crate) fn scale_generator(scalar: &Scalar) -> Self {
        Self::GENERATOR.multiply_by_scalar(scalar)
    }

    /// The x-coordinate of the point, reduced into the scalar field.
    pub(crate) fn x_projection(&self) -> Result<Scalar> {
        if self.is_identity() {
            error!("Attempted to take the x-projection of the identity point");
            return Err(InternalError::InternalInvariantFailed);
        }
        let x = self.0.to_affine().x();
        Ok(<Scalar as Reduce<U256>>::reduce_bytes(&x))
    }

    /// The 33-byte compressed SEC1 encoding. The identity, which SEC1 gives
    /// no fixed-width form, is pinned to all zeroes.
    pub(crate) fn to_bytes(self) -> Vec<u8> {
        if self.is_identity() {
            return vec![0u8; POINT_BYTES];
        }
        self.0.to_affine().to_encoded_point(true).as_bytes().to_vec()
    }

    /// Decode a point previously produced by [`CurvePoint::to_bytes`],
    /// rejecting anything that is not on the curve.
    pub(crate) fn try_from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != POINT_BYTES {
            error!("Encoded curve point has the wrong length");
            Err(CallerError::DeserializationFailed)?;
        }
        if bytes.iter().all(|&byte| byte == 0) {
            return Ok(Self::IDENTITY);
        }
        let sec1 = EncodedPoint::from_bytes(bytes).map_err(|_| {
            error!("Bytes are not a SEC1 point encoding");
            CallerError::DeserializationFailed
        })?;
        match Option::<AffinePoint>::from(AffinePoint::from_encoded_point(&sec1)) {
            Some(affine) => Ok(Self(affine.into())),
            None => {
                error!("Encoded x-coordinate has no point on the curve");
                Err(CallerError::DeserializationFailed)?
            }
        }
    }
}

impl std::ops::Add for CurvePoint {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl From<ProjectivePoint> for CurvePoint {
    fn from(p: ProjectivePoint) -> Self {
        Self(p)
    }
}

impl Serialize for CurvePoint {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        AffinePoint::from(self.0).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for CurvePoint {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let p = AffinePoint::deserialize(deserializer)?;
        Ok(Self(p.into()))
    }
}

impl TranscriptWrite for CurvePoint {
    fn domain(&self) -> &'static str {
        "Curve Point"
    }

    fn transcript_bytes(&self) -> Vec<u8> {
        self.to_bytes()
    }
}

/// The order `q` of secp256k1 as a [`BigNumber`].
///
/// Derived as `(q − 1) + 1`, with `q − 1` read back from `−1` in the scalar
/// field, rather than transcribing the constant.
pub(crate) fn curve_order() -> BigNumber {
    scalar_to_bn(&Scalar::ONE.negate()) + 1
}

/// Reduce an integer of either sign into the scalar field.
pub(crate) fn bn_to_scalar(value: &BigNumber) -> Result<Scalar> {
    // nmod yields the canonical non-negative residue, so no sign handling
    // is needed on top of it.
    let residue = value.nmod(&curve_order());
    let magnitude = Zeroizing::new(residue.to_bytes());

    let mut repr = Zeroizing::new([0u8; 32]);
    repr[32 - magnitude.len()..].copy_from_slice(&magnitude);
    Option::from(Scalar::from_repr((*repr).into())).ok_or_else(|| {
        error!("Residue mod q did not parse as a scalar");
        InternalError::InternalInvariantFailed
    })
}

/// Convert a scalar to a [`BigNumber`].
pub(crate) fn scalar_to_bn(x: &Scalar) -> BigNumber {
    BigNumber::from_slice(x.to_bytes())
}

/// Interpret a 32-byte message digest as a scalar, reduced mod `q`.
pub(crate) fn scalar_from_hash(digest: &[u8; 32]) -> Scalar {
    <Scalar as Reduce<U256>>::reduce_bytes(GenericArray::from_slice(digest))
}

/// An ECDSA signature produced by the signing protocol.
///
/// `R` is kept as a full curve point so that the compact encoding can carry
/// its y-parity; standard verifiers only consume `r = R.x mod q` and `s`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    /// `R = δ⁻¹·Γ = k⁻¹·G`.
    pub r: CurvePoint,
    /// `s = Σⱼ σⱼ`.
    pub s: Scalar,
}

impl Signature {
    /// Verify the signature over a pre-hashed message against a public key
    /// point.
    #[must_use]
    pub fn verify(&self, public_point: &CurvePoint, digest: &[u8; 32]) -> bool {
        let r = match self.r.x_projection() {
            Ok(r) => r,
            Err(_) => return false,
        };
        if bool::from(r.is_zero()) || bool::from(self.s.is_zero()) {
            return false;
        }
        let m = scalar_from_hash(digest);
        let s_inv = match Option::<Scalar>::from(self.s.invert()) {
            Some(s_inv) => s_inv,
            None => return false,
        };
        // R' = s⁻¹·(m·G + r·X)
        let recomputed = (CurvePoint::scale_generator(&m) + public_point.multiply_by_scalar(&r))
            .multiply_by_scalar(&s_inv);
        recomputed == self.r
    }

    /// The 65-byte compact form: SEC1-compressed `R` (leading byte 0x02 or
    /// 0x03) followed by 32 bytes of `s`, with `s` normalized to its low
    /// representative.
    pub fn to_compact(&self) -> [u8; 65] {
        let mut s = self.s;
        if s.is_high().into() {
            s = s.negate();
        }
        let mut out = [0u8; 65];
        out[..33].copy_from_slice(&self.r.to_bytes());
        out[33..].copy_from_slice(&s.to_bytes());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::test_rng;
    use k256::elliptic_curve::Field;

    #[test]
    fn point_encoding_round_trips_and_rejects_junk() {
        let rng = &mut test_rng();
        let point = CurvePoint::scale_generator(&Scalar::random(rng));

        let bytes = point.to_bytes();
        assert_eq!(bytes.len(), POINT_BYTES);
        assert!(bytes[0] == 0x02 || bytes[0] == 0x03);
        assert_eq!(CurvePoint::try_from_bytes(&bytes).unwrap(), point);

        // Wrong length, wrong tag, and an x-coordinate off the curve.
        assert!(CurvePoint::try_from_bytes(&bytes[..32]).is_err());
        let mut bad_tag = bytes.clone();
        bad_tag[0] = 0x05;
        assert!(CurvePoint::try_from_bytes(&bad_tag).is_err());
        let mut off_curve = vec![0x02u8; POINT_BYTES];
        off_curve[1..].fill(0xff);
        assert!(CurvePoint::try_from_bytes(&off_curve).is_err());
    }

    #[test]
    fn identity_keeps_a_fixed_width_encoding() {
        let bytes = CurvePoint::IDENTITY.to_bytes();
        assert_eq!(bytes, vec![0u8; POINT_BYTES]);
        assert!(CurvePoint::try_from_bytes(&bytes).unwrap().is_identity());
    }

    #[test]
    fn integers_of_either_sign_reduce_into_the_scalar_field() {
        // −2 maps to q − 2.
        let minus_two = -BigNumber::from(2u64);
        let two = Scalar::ONE + Scalar::ONE;
        assert_eq!(bn_to_scalar(&minus_two).unwrap(), -two);

        // Values past q wrap around.
        let past_q = curve_order() + 7;
        assert_eq!(bn_to_scalar(&past_q).unwrap(), Scalar::from(7u64));

        // Zero and small values pass through unchanged.
        assert_eq!(bn_to_scalar(&BigNumber::zero()).unwrap(), Scalar::ZERO);
        assert_eq!(bn_to_scalar(&BigNumber::from(11u64)).unwrap(), Scalar::from(11u64));
    }

    #[test]
    fn scalar_integer_conversions_are_inverse() {
        let rng = &mut test_rng();
        let scalar = Scalar::random(rng);
        assert_eq!(bn_to_scalar(&scalar_to_bn(&scalar)).unwrap(), scalar);
    }

    #[test]
    fn derived_curve_order_annihilates_scalars() {
        // q itself must reduce to zero.
        assert_eq!(bn_to_scalar(&curve_order()).unwrap(), Scalar::ZERO);
    }

    #[test]
    fn signatures_verify_and_compact_form_is_low_s() {
        let rng = &mut test_rng();

        // Sign directly with a known key: k, x <- F, R = k⁻¹·G,
        // s = k·(m + r·x).
        let x = Scalar::random(&mut *rng);
        let public = CurvePoint::scale_generator(&x);
        let digest = [42u8; 32];
        let m = scalar_from_hash(&digest);

        let k = Scalar::random(&mut *rng);
        let k_inv = Option::<Scalar>::from(k.invert()).unwrap();
        let big_r = CurvePoint::scale_generator(&k_inv);
        let r = big_r.x_projection().unwrap();
        let s = k * (m + r * x);

        let sig = Signature { r: big_r, s };
        assert!(sig.verify(&public, &digest));
        assert!(!sig.verify(&public, &[0u8; 32]));

        let compact = sig.to_compact();
        assert!(compact[0] == 0x02 || compact[0] == 0x03);
        let s_part = Scalar::from_repr(GenericArray::clone_from_slice(&compact[33..])).unwrap();
        assert!(!bool::from(s_part.is_high()));
    }
}
