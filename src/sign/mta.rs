// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! The multiplicative-to-additive share conversion.
//!
//! The sender holds `x` (with public image `X = x·G`) and the receiver
//! holds `k`, published encrypted as `K = Enc_receiver(k)`. The sender picks
//! a mask `β` and returns `D = (x ⊙ K) ⊕ Enc_receiver(β)`; the receiver
//! decrypts `α = x·k + β`. Then `α − β = x·k`: the product now lives in two
//! additive shares, `α` held by the receiver and `β` held by the sender
//! (who subtracts it). The accompanying `Π[aff-g]` proof pins `D` to the
//! published `X` and to the mask commitment `F = Enc_sender(β)`.

use crate::{
    curve::CurvePoint,
    errors::Result,
    paillier::{Ciphertext, EncryptionKey},
    ring_pedersen::RingPedersen,
    sampling,
    transcript::Transcript,
    zkp::{
        piaffg::{self, PiAffgProof},
        Proof,
    },
};
use libpaillier::unknown_order::BigNumber;
use rand::{CryptoRng, RngCore};

/// The sender's half of one MtA conversion.
pub(crate) struct MtaOutput {
    /// The sender's additive share `β` (to be subtracted).
    pub(crate) beta: BigNumber,
    /// `D = (x ⊙ K) ⊕ Enc_receiver(β)`.
    pub(crate) d: Ciphertext,
    /// `F = Enc_sender(β)`, binding the mask.
    pub(crate) f: Ciphertext,
    pub(crate) proof: PiAffgProof,
}

/// Run the sender side of an MtA conversion and prove it correct.
#[allow(clippy::too_many_arguments)]
pub(crate) fn prove_affg<R: RngCore + CryptoRng>(
    x: &BigNumber,
    x_point: &CurvePoint,
    receiver_ciphertext: &Ciphertext,
    sender_key: &EncryptionKey,
    receiver_key: &EncryptionKey,
    receiver_aux: &RingPedersen,
    transcript: &mut Transcript,
    rng: &mut R,
) -> Result<MtaOutput> {
    let beta = sampling::interval_l_prime(rng);

    let s = sampling::unit_mod_n(rng, receiver_key.modulus())?;
    let r = sampling::unit_mod_n(rng, sender_key.modulus())?;

    let d = receiver_key.add(
        &receiver_key.mul(receiver_ciphertext, x)?,
        &receiver_key.encrypt_with_nonce(&beta, &s)?,
    );
    let f = sender_key.encrypt_with_nonce(&beta, &r)?;

    let proof = PiAffgProof::prove(
        piaffg::CommonInput::new(
            receiver_ciphertext,
            &d,
            &f,
            x_point,
            sender_key,
            receiver_key,
            receiver_aux,
        ),
        piaffg::ProverSecret::new(x, &beta, &s, &r),
        transcript,
        rng,
    )?;

    Ok(MtaOutput { beta, d, f, proof })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{curve::scalar_to_bn, paillier::DecryptionKey, testing::test_rng, zkp::piaffg};
    use k256::{elliptic_curve::Field, Scalar};

    #[test]
    fn mta_produces_additive_shares_of_the_product() {
        let rng = &mut test_rng();

        let sender_dk = DecryptionKey::generate(rng).unwrap();
        let receiver_dk = DecryptionKey::generate(rng).unwrap();
        let aux_dk = DecryptionKey::generate(rng).unwrap();
        let (receiver_aux, _) = RingPedersen::gen(rng, &aux_dk).unwrap();

        // Receiver's k, encrypted to itself; sender's x.
        let k = Scalar::random(&mut *rng);
        let x = Scalar::random(&mut *rng);
        let k_bn = scalar_to_bn(&k);
        let x_bn = scalar_to_bn(&x);
        let receiver_pk = receiver_dk.encryption_key();
        let (k_ciphertext, _) = receiver_pk.encrypt(rng, &k_bn).unwrap();
        let x_point = CurvePoint::GENERATOR.multiply_by_bignum(&x_bn).unwrap();

        let mut transcript = Transcript::new("MtA Test");
        let output = prove_affg(
            &x_bn,
            &x_point,
            &k_ciphertext,
            &sender_dk.encryption_key(),
            &receiver_pk,
            &receiver_aux,
            &mut transcript.fork(),
            rng,
        )
        .unwrap();

        // The receiver decrypts α = x·k + β, so α − β == x·k.
        let alpha = receiver_dk.decrypt(&output.d).unwrap();
        assert_eq!(&alpha - &output.beta, &x_bn * &k_bn);

        // The proof convinces the receiver.
        assert!(output
            .proof
            .verify(
                piaffg::CommonInput::new(
                    &k_ciphertext,
                    &output.d,
                    &output.f,
                    &x_point,
                    &sender_dk.encryption_key(),
                    &receiver_pk,
                    &receiver_aux,
                ),
                &mut transcript.fork(),
            )
            .is_ok());
    }
}
