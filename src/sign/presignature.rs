// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! The pre-signature computed in sign round 4 and consumed in round 5.

use crate::{
    curve::{CurvePoint, Signature},
    errors::{InternalError, Result},
    party::PartyId,
};
use k256::{elliptic_curve::Field, Scalar};
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt::Debug};
use tracing::error;

/// The material a signature is assembled from once every party's `σⱼ` share
/// arrives.
///
/// # 🔒 Lifetime requirements
/// A pre-signature is bound to one nonce; it must never be reused across
/// protocol executions.
#[derive(Clone, Serialize, Deserialize)]
pub struct PreSignature {
    /// A random identifier for this specific pre-signature.
    id: [u8; 32],
    /// `R = δ⁻¹·Γ = k⁻¹·G`.
    r: CurvePoint,
    /// `R̄ⱼ = δ⁻¹·Δⱼ = (k⁻¹kⱼ)·G` per signer.
    r_bar: BTreeMap<PartyId, CurvePoint>,
    /// `Sⱼ = χⱼ·R` per signer. Only populated by flows that exchange the
    /// `χ` shares in the exponent; the five-round signing protocol does
    /// not, so share-level blame stays out of scope there.
    s: BTreeMap<PartyId, CurvePoint>,
    /// `kᵢ`.
    k_share: Scalar,
    /// `χᵢ`.
    chi_share: Scalar,
}

impl Debug for PreSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreSignature")
            .field("id", &hex::encode(self.id))
            .field("r", &self.r)
            .field("k_share", &"[redacted]")
            .field("chi_share", &"[redacted]")
            .finish()
    }
}

impl PreSignature {
    /// Assemble a pre-signature from round-4 state.
    pub(crate) fn new<R: RngCore + CryptoRng>(
        delta: &Scalar,
        big_gamma: &CurvePoint,
        big_deltas: &BTreeMap<PartyId, CurvePoint>,
        k_share: Scalar,
        chi_share: Scalar,
        rng: &mut R,
    ) -> Result<Self> {
        let delta_inv = Option::<Scalar>::from(delta.invert()).ok_or_else(|| {
            error!("δ summed to zero; cannot derive the pre-signature point");
            InternalError::ProtocolError(None)
        })?;
        let r = big_gamma.multiply_by_scalar(&delta_inv);
        let r_bar = big_deltas
            .iter()
            .map(|(j, big_delta)| (j.clone(), big_delta.multiply_by_scalar(&delta_inv)))
            .collect();

        let mut id = [0u8; 32];
        rng.fill_bytes(&mut id);

        Ok(Self {
            id,
            r,
            r_bar,
            s: BTreeMap::new(),
            k_share,
            chi_share,
        })
    }

    /// Reject degenerate pre-signatures.
    pub(crate) fn validate(&self) -> Result<()> {
        if self.r.is_identity() {
            error!("Pre-signature point R is the identity");
            return Err(InternalError::ProtocolError(None));
        }
        if self.r_bar.values().any(CurvePoint::is_identity) {
            error!("A pre-signature R̄ share is the identity");
            return Err(InternalError::ProtocolError(None));
        }
        if self.s.values().any(CurvePoint::is_identity) {
            error!("A pre-signature S share is the identity");
            return Err(InternalError::ProtocolError(None));
        }
        if bool::from(self.k_share.is_zero()) || bool::from(self.chi_share.is_zero()) {
            error!("Pre-signature shares are degenerate");
            return Err(InternalError::ProtocolError(None));
        }
        Ok(())
    }

    /// The pre-signature point `R`.
    pub(crate) fn point(&self) -> &CurvePoint {
        &self.r
    }

    /// `r = R|ₓ` as a scalar.
    pub(crate) fn x_scalar(&self) -> Result<Scalar> {
        self.r.x_projection()
    }

    /// This party's signature share `σᵢ = r·χᵢ + kᵢ·m`.
    pub(crate) fn signature_share(&self, message: &Scalar) -> Result<Scalar> {
        let r = self.x_scalar()?;
        Ok(r * self.chi_share + self.k_share * message)
    }

    /// Combine the collected shares into a signature: `s = Σⱼ σⱼ`.
    pub(crate) fn signature(&self, sigmas: &BTreeMap<PartyId, Scalar>) -> Signature {
        let s = sigmas.values().fold(Scalar::ZERO, |sum, sigma| sum + sigma);
        Signature { r: self.r, s }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::test_rng;

    #[test]
    fn two_party_presignature_assembles_a_valid_signature() {
        let rng = &mut test_rng();

        // Simulate: secret x split additively, nonce k split additively,
        // χⱼ = x·kⱼ-style shares via direct computation.
        let x1 = Scalar::random(&mut *rng);
        let x2 = Scalar::random(&mut *rng);
        let x = x1 + x2;
        let public = CurvePoint::scale_generator(&x);

        let k1 = Scalar::random(&mut *rng);
        let k2 = Scalar::random(&mut *rng);
        let k = k1 + k2;
        let k_inv = Option::<Scalar>::from(k.invert()).unwrap();

        let gamma = Scalar::random(&mut *rng);
        let big_gamma = CurvePoint::scale_generator(&gamma);
        let delta = gamma * k;

        // χ shares of x·k: hand one party the whole product.
        let chi1 = x * k1;
        let chi2 = x * k2;

        let alice = PartyId::from("alice");
        let bob = PartyId::from("bob");
        let mut big_deltas = BTreeMap::new();
        big_deltas.insert(alice.clone(), big_gamma.multiply_by_scalar(&k1));
        big_deltas.insert(bob.clone(), big_gamma.multiply_by_scalar(&k2));

        let pre1 =
            PreSignature::new(&delta, &big_gamma, &big_deltas, k1, chi1, rng).unwrap();
        let pre2 =
            PreSignature::new(&delta, &big_gamma, &big_deltas, k2, chi2, rng).unwrap();
        pre1.validate().unwrap();

        // R should be k⁻¹·G for both parties.
        assert_eq!(*pre1.point(), CurvePoint::scale_generator(&k_inv));
        assert_eq!(pre1.point(), pre2.point());

        let digest = [9u8; 32];
        let m = crate::curve::scalar_from_hash(&digest);
        let mut sigmas = BTreeMap::new();
        sigmas.insert(alice, pre1.signature_share(&m).unwrap());
        sigmas.insert(bob, pre2.signature_share(&m).unwrap());

        let signature = pre1.signature(&sigmas);
        assert!(signature.verify(&public, &digest));
    }
}
