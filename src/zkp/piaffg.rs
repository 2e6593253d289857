// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Proof of a correct affine-group operation with a group commitment
//! (`Π[aff-g]`), the workhorse of the MtA conversion in sign round 2.
//!
//! Statement, for the verifier's ciphertext `Kᵥ` under `Nᵥ`:
//! `Dᵥ = (x ⊙ Kᵥ) ⊕ Encᵥ(y; s)`, `Fₚ = Encₚ(y; r)`, `Xₚ = x·G`,
//! with `|x| ≤ 2^ℓ` and `|y| ≤ 2^ℓ′`.

use crate::{
    curve::{bn_to_scalar, curve_order, CurvePoint},
    errors::{InternalError, Result},
    paillier::{Ciphertext, EncryptionKey, Nonce},
    parameters::{ELL, ELL_PRIME, EPSILON},
    ring_pedersen::RingPedersen,
    sampling,
    transcript::Transcript,
    zkp::Proof,
};
use libpaillier::unknown_order::BigNumber;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use tracing::error;

#[derive(Clone)]
pub(crate) struct CommonInput<'a> {
    /// The verifier's ciphertext the affine operation was applied to.
    kv: &'a Ciphertext,
    /// The result of the affine operation, under the verifier's key.
    dv: &'a Ciphertext,
    /// The additive mask, encrypted under the prover's key.
    fp: &'a Ciphertext,
    /// The multiplicative coefficient, in the exponent.
    xp: &'a CurvePoint,
    prover: &'a EncryptionKey,
    verifier: &'a EncryptionKey,
    aux: &'a RingPedersen,
}

impl<'a> CommonInput<'a> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        kv: &'a Ciphertext,
        dv: &'a Ciphertext,
        fp: &'a Ciphertext,
        xp: &'a CurvePoint,
        prover: &'a EncryptionKey,
        verifier: &'a EncryptionKey,
        aux: &'a RingPedersen,
    ) -> Self {
        Self {
            kv,
            dv,
            fp,
            xp,
            prover,
            verifier,
            aux,
        }
    }
}

pub(crate) struct ProverSecret<'a> {
    x: &'a BigNumber,
    y: &'a BigNumber,
    /// Nonce of `Dᵥ`'s additive part, under the verifier's key.
    s: &'a Nonce,
    /// Nonce of `Fₚ`, under the prover's key.
    r: &'a Nonce,
}

impl<'a> ProverSecret<'a> {
    pub(crate) fn new(x: &'a BigNumber, y: &'a BigNumber, s: &'a Nonce, r: &'a Nonce) -> Self {
        Self { x, y, s, r }
    }
}

#[derive(Clone, Serialize, Deserialize, Debug)]
struct PiAffgCommitment {
    /// `A = (α ⊙ Kᵥ) ⊕ Encᵥ(β; ρ)`.
    a: Ciphertext,
    /// `Bₓ = α·G`.
    bx: CurvePoint,
    /// `Bᵧ = Encₚ(β; ρᵧ)`.
    by: Ciphertext,
    /// `E = sᵅ·tᵞ (mod N̂)`.
    e_commit: BigNumber,
    /// `S = sˣ·tᵐ (mod N̂)`.
    s_commit: BigNumber,
    /// `F = sᵝ·tᵟ (mod N̂)`.
    f_commit: BigNumber,
    /// `T = sʸ·tᵘ (mod N̂)`.
    t_commit: BigNumber,
}

/// Proof of a correct affine-group operation.
#[derive(Clone, Serialize, Deserialize, Debug)]
pub(crate) struct PiAffgProof {
    commitment: PiAffgCommitment,
    /// `z₁ = α + e·x`.
    z1: BigNumber,
    /// `z₂ = β + e·y`.
    z2: BigNumber,
    /// `z₃ = γ + e·m`.
    z3: BigNumber,
    /// `z₄ = δ + e·μ`.
    z4: BigNumber,
    /// `w = ρ·sᵉ (mod Nᵥ)`.
    w: BigNumber,
    /// `wᵧ = ρᵧ·rᵉ (mod Nₚ)`.
    wy: BigNumber,
}

fn fill_transcript(
    transcript: &mut Transcript,
    input: &CommonInput<'_>,
    commitment: &PiAffgCommitment,
) {
    transcript.append(input.aux);
    transcript.append(input.verifier);
    transcript.append(input.prover);
    transcript.append(input.kv);
    transcript.append(input.dv);
    transcript.append(input.fp);
    transcript.append(input.xp);
    transcript.append(&commitment.a);
    transcript.append(&commitment.bx);
    transcript.append(&commitment.by);
    transcript.append(&commitment.e_commit);
    transcript.append(&commitment.s_commit);
    transcript.append(&commitment.f_commit);
    transcript.append(&commitment.t_commit);
}

fn challenge(transcript: &mut Transcript) -> Result<BigNumber> {
    transcript.digest().plusminus_bn(&curve_order())
}

impl Proof for PiAffgProof {
    type CommonInput<'a> = CommonInput<'a>;
    type ProverSecret<'a> = ProverSecret<'a>;

    fn prove<R: RngCore + CryptoRng>(
        input: Self::CommonInput<'_>,
        secret: Self::ProverSecret<'_>,
        transcript: &mut Transcript,
        rng: &mut R,
    ) -> Result<Self> {
        let alpha = sampling::interval_l_eps(rng);
        let beta = sampling::interval_l_prime_eps(rng);
        let rho = sampling::unit_mod_n(rng, input.verifier.modulus())?;
        let rho_y = sampling::unit_mod_n(rng, input.prover.modulus())?;
        let gamma = sampling::interval_l_eps_scaled(rng, input.aux.modulus());
        let m = sampling::interval_l_scaled(rng, input.aux.modulus());
        let delta = sampling::interval_l_eps_scaled(rng, input.aux.modulus());
        let mu = sampling::interval_l_scaled(rng, input.aux.modulus());

        let c_alpha = input.verifier.mul(input.kv, &alpha)?;
        let commitment = PiAffgCommitment {
            a: input
                .verifier
                .add(&input.verifier.encrypt_with_nonce(&beta, &rho)?, &c_alpha),
            bx: CurvePoint::GENERATOR.multiply_by_bignum(&alpha)?,
            by: input.prover.encrypt_with_nonce(&beta, &rho_y)?,
            e_commit: input.aux.commit(&alpha, &gamma)?,
            s_commit: input.aux.commit(secret.x, &m)?,
            f_commit: input.aux.commit(&beta, &delta)?,
            t_commit: input.aux.commit(secret.y, &mu)?,
        };

        fill_transcript(transcript, &input, &commitment);
        let e = challenge(transcript)?;

        let z1 = &alpha + &e * secret.x;
        let z2 = &beta + &e * secret.y;
        let z3 = &gamma + &e * &m;
        let z4 = &delta + &e * &mu;
        let w = (rho * secret.s.modpow(&e, input.verifier.modulus()))
            .nmod(input.verifier.modulus());
        let wy =
            (rho_y * secret.r.modpow(&e, input.prover.modulus())).nmod(input.prover.modulus());

        Ok(Self {
            commitment,
            z1,
            z2,
            z3,
            z4,
            w,
            wy,
        })
    }

    fn verify(self, input: Self::CommonInput<'_>, transcript: &mut Transcript) -> Result<()> {
        if !input.verifier.validate_ciphertext(&self.commitment.a)
            || !input.prover.validate_ciphertext(&self.commitment.by)
            || self.commitment.bx.is_identity()
        {
            error!("PiAffg commitment elements are invalid");
            return Err(InternalError::ProtocolError(None));
        }
        if !sampling::in_symmetric_range(&self.z1, ELL + EPSILON + 1) {
            error!("PiAffg response z1 is out of range");
            return Err(InternalError::ProtocolError(None));
        }
        if !sampling::in_symmetric_range(&self.z2, ELL_PRIME + EPSILON + 1) {
            error!("PiAffg response z2 is out of range");
            return Err(InternalError::ProtocolError(None));
        }

        fill_transcript(transcript, &input, &self.commitment);
        let e = challenge(transcript)?;

        if !input.aux.verify_response(
            &self.z1,
            &self.z3,
            &e,
            &self.commitment.e_commit,
            &self.commitment.s_commit,
        )? {
            error!("PiAffg Pedersen response check for x failed");
            return Err(InternalError::ProtocolError(None));
        }
        if !input.aux.verify_response(
            &self.z2,
            &self.z4,
            &e,
            &self.commitment.f_commit,
            &self.commitment.t_commit,
        )? {
            error!("PiAffg Pedersen response check for y failed");
            return Err(InternalError::ProtocolError(None));
        }

        // Encᵥ(z₂; w) ⊕ (z₁ ⊙ Kᵥ) == A ⊕ (e ⊙ Dᵥ)
        let lhs = input.verifier.add(
            &input.verifier.encrypt_with_nonce(&self.z2, &self.w)?,
            &input.verifier.mul(input.kv, &self.z1)?,
        );
        let rhs = input
            .verifier
            .add(&self.commitment.a, &input.verifier.mul(input.dv, &e)?);
        if lhs != rhs {
            error!("PiAffg affine ciphertext equation failed");
            return Err(InternalError::ProtocolError(None));
        }

        // z₁·G == Bₓ + e·Xₚ
        let lhs_point = CurvePoint::GENERATOR.multiply_by_bignum(&self.z1)?;
        let rhs_point = self.commitment.bx + input.xp.multiply_by_scalar(&bn_to_scalar(&e)?);
        if lhs_point != rhs_point {
            error!("PiAffg group equation failed");
            return Err(InternalError::ProtocolError(None));
        }

        // Encₚ(z₂; wᵧ) == Bᵧ ⊕ (e ⊙ Fₚ)
        let lhs_y = input.prover.encrypt_with_nonce(&self.z2, &self.wy)?;
        let rhs_y = input
            .prover
            .add(&self.commitment.by, &input.prover.mul(input.fp, &e)?);
        if lhs_y != rhs_y {
            error!("PiAffg mask ciphertext equation failed");
            return Err(InternalError::ProtocolError(None));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        paillier::DecryptionKey,
        sampling::{interval_l, interval_l_prime, symmetric_by_bits, unit_mod_n},
        testing::test_rng,
    };

    fn transcript() -> Transcript {
        Transcript::new("PiAffgProof Test")
    }

    struct AffgTest {
        rng: rand::rngs::StdRng,
        prover_pk: EncryptionKey,
        verifier_pk: EncryptionKey,
        aux: RingPedersen,
    }

    fn setup() -> AffgTest {
        let mut rng = test_rng();
        let prover_pk = DecryptionKey::generate(&mut rng).unwrap().encryption_key();
        let verifier_pk = DecryptionKey::generate(&mut rng).unwrap().encryption_key();
        let aux_dk = DecryptionKey::generate(&mut rng).unwrap();
        let (aux, _) = RingPedersen::gen(&mut rng, &aux_dk).unwrap();
        AffgTest {
            rng,
            prover_pk,
            verifier_pk,
            aux,
        }
    }

    /// Build a random valid statement and its witness.
    #[allow(clippy::type_complexity)]
    fn random_statement(
        t: &mut AffgTest,
    ) -> (
        Ciphertext,
        Ciphertext,
        Ciphertext,
        CurvePoint,
        BigNumber,
        BigNumber,
        Nonce,
        Nonce,
    ) {
        let rng = &mut t.rng;
        let x = interval_l(rng);
        let y = interval_l_prime(rng);

        let k_plaintext = interval_l(rng);
        let (kv, _) = t.verifier_pk.encrypt(rng, &k_plaintext).unwrap();
        let s = unit_mod_n(rng, t.verifier_pk.modulus()).unwrap();
        let r = unit_mod_n(rng, t.prover_pk.modulus()).unwrap();

        let dv = t.verifier_pk.add(
            &t.verifier_pk.mul(&kv, &x).unwrap(),
            &t.verifier_pk.encrypt_with_nonce(&y, &s).unwrap(),
        );
        let fp = t.prover_pk.encrypt_with_nonce(&y, &r).unwrap();
        let xp = CurvePoint::GENERATOR.multiply_by_bignum(&x).unwrap();

        (kv, dv, fp, xp, x, y, s, r)
    }

    #[test]
    fn proof_verifies_for_valid_statement() {
        let mut t = setup();
        let (kv, dv, fp, xp, x, y, s, r) = random_statement(&mut t);

        let input = CommonInput::new(&kv, &dv, &fp, &xp, &t.prover_pk, &t.verifier_pk, &t.aux);
        let proof = PiAffgProof::prove(
            input.clone(),
            ProverSecret::new(&x, &y, &s, &r),
            &mut transcript(),
            &mut t.rng,
        )
        .unwrap();
        assert!(proof.verify(input, &mut transcript()).is_ok());
    }

    #[test]
    fn proof_rejects_tampered_affine_result() {
        let mut t = setup();
        let (kv, dv, fp, xp, x, y, s, r) = random_statement(&mut t);

        // Homomorphically bump the claimed result by one.
        let bumped = t.verifier_pk.add(
            &dv,
            &t.verifier_pk
                .encrypt(&mut t.rng, &BigNumber::one())
                .unwrap()
                .0,
        );

        let input = CommonInput::new(&kv, &dv, &fp, &xp, &t.prover_pk, &t.verifier_pk, &t.aux);
        let proof = PiAffgProof::prove(
            input,
            ProverSecret::new(&x, &y, &s, &r),
            &mut transcript(),
            &mut t.rng,
        )
        .unwrap();

        let bad_input =
            CommonInput::new(&kv, &bumped, &fp, &xp, &t.prover_pk, &t.verifier_pk, &t.aux);
        assert!(proof.verify(bad_input, &mut transcript()).is_err());
    }

    #[test]
    fn proof_rejects_wrong_exponent_point() {
        let mut t = setup();
        let (kv, dv, fp, xp, x, y, s, r) = random_statement(&mut t);
        let wrong_xp = CurvePoint::GENERATOR
            .multiply_by_bignum(&(&x + BigNumber::one()))
            .unwrap();

        let input = CommonInput::new(&kv, &dv, &fp, &xp, &t.prover_pk, &t.verifier_pk, &t.aux);
        let proof = PiAffgProof::prove(
            input,
            ProverSecret::new(&x, &y, &s, &r),
            &mut transcript(),
            &mut t.rng,
        )
        .unwrap();

        let bad_input =
            CommonInput::new(&kv, &dv, &fp, &wrong_xp, &t.prover_pk, &t.verifier_pk, &t.aux);
        assert!(proof.verify(bad_input, &mut transcript()).is_err());
    }

    #[test]
    fn proof_rejects_oversized_multiplicative_witness() {
        let mut t = setup();
        let rng = &mut t.rng;
        // x far beyond ±2^(ℓ+ε) must fail the z1 interval check.
        let x = symmetric_by_bits(rng, ELL + EPSILON + 128);
        let y = interval_l_prime(rng);

        let k_plaintext = interval_l(rng);
        let (kv, _) = t.verifier_pk.encrypt(rng, &k_plaintext).unwrap();
        let s = unit_mod_n(rng, t.verifier_pk.modulus()).unwrap();
        let r = unit_mod_n(rng, t.prover_pk.modulus()).unwrap();
        let dv = t.verifier_pk.add(
            &t.verifier_pk.mul(&kv, &x).unwrap(),
            &t.verifier_pk.encrypt_with_nonce(&y, &s).unwrap(),
        );
        let fp = t.prover_pk.encrypt_with_nonce(&y, &r).unwrap();
        let xp = CurvePoint::GENERATOR.multiply_by_bignum(&x).unwrap();

        let input = CommonInput::new(&kv, &dv, &fp, &xp, &t.prover_pk, &t.verifier_pk, &t.aux);
        let proof = PiAffgProof::prove(
            input.clone(),
            ProverSecret::new(&x, &y, &s, &r),
            &mut transcript(),
            &mut t.rng,
        )
        .unwrap();
        assert!(proof.verify(input, &mut transcript()).is_err());
    }
}
