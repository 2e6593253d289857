// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

use crate::{
    curve::{scalar_to_bn, CurvePoint},
    errors::Result,
    paillier::{Ciphertext, DecryptionKey, EncryptionKey},
    party::PartyId,
    protocol::{Content, Helper, RoundMessage, Session},
    ring_pedersen::RingPedersen,
    sign::round_two::{Message2, Round2},
    zkp::{
        pienc::{self, PiEncProof},
        Proof,
    },
};
use k256::{elliptic_curve::Field, Scalar};
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt::Debug};

/// The encrypted nonce and mask shares: `Kᵢ = Encᵢ(kᵢ)`, `Gᵢ = Encᵢ(γᵢ)`.
#[derive(Clone, Serialize, Deserialize, Debug)]
pub(crate) struct Broadcast2 {
    pub(crate) k: Ciphertext,
    pub(crate) g: Ciphertext,
}

/// Round 1 samples the nonce and mask shares and encrypts them.
#[derive(Serialize, Deserialize)]
pub(crate) struct Round1 {
    pub(crate) helper: Helper,

    /// The joint public key over the signer set.
    pub(crate) public_key: CurvePoint,
    /// `ℓᵢ·xᵢ`: this party's Lagrange-adjusted secret share.
    pub(crate) secret_ecdsa: Scalar,
    pub(crate) paillier_secret: DecryptionKey,
    pub(crate) paillier: BTreeMap<PartyId, EncryptionKey>,
    pub(crate) pedersen: BTreeMap<PartyId, RingPedersen>,
    /// `ℓⱼ·Xⱼ`: every signer's Lagrange-adjusted public share.
    pub(crate) ecdsa: BTreeMap<PartyId, CurvePoint>,
    /// The pre-hashed message being signed.
    pub(crate) digest: [u8; 32],
}

impl Debug for Round1 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("sign::Round1")
            .field("self_id", self.helper.self_id())
            .field("secret_ecdsa", &"[redacted]")
            .field("paillier_secret", &"[redacted]")
            .field("digest", &hex::encode(self.digest))
            .finish()
    }
}

impl Round1 {
    /// Sample `kᵢ, γᵢ`, publish their encryptions, and prove `Kᵢ` well
    /// formed to each peer.
    pub(crate) fn finalize<R: RngCore + CryptoRng>(
        self,
        out: &mut Vec<RoundMessage>,
        rng: &mut R,
    ) -> Result<Session> {
        let self_id = self.helper.self_id().clone();
        let self_key = &self.paillier[&self_id];

        // γᵢ <- 𝔽, Γᵢ = γᵢ·G, Gᵢ = Encᵢ(γᵢ; νᵢ)
        let gamma = Scalar::random(&mut *rng);
        let big_gamma = CurvePoint::scale_generator(&gamma);
        let gamma_bn = scalar_to_bn(&gamma);
        let (g, g_nonce) = self_key.encrypt(rng, &gamma_bn)?;

        // kᵢ <- 𝔽, Kᵢ = Encᵢ(kᵢ; ρᵢ)
        let k = Scalar::random(&mut *rng);
        let k_bn = scalar_to_bn(&k);
        let (k_ciphertext, k_nonce) = self_key.encrypt(rng, &k_bn)?;

        self.helper.broadcast(
            out,
            Content::SignEncryptedNonces(Broadcast2 {
                k: k_ciphertext.clone(),
                g: g.clone(),
            }),
        );

        for j in self.helper.other_party_ids() {
            let proof = PiEncProof::prove(
                pienc::CommonInput::new(&k_ciphertext, self_key, &self.pedersen[&j]),
                pienc::ProverSecret::new(&k_bn, &k_nonce),
                &mut self.helper.transcript_for_party(&self_id),
                rng,
            )?;
            self.helper
                .send(out, Content::SignEncProof(Box::new(Message2 { proof })), &j);
        }

        let mut round2 = Round2 {
            round1: self,
            k_ciphertexts: BTreeMap::new(),
            g_ciphertexts: BTreeMap::new(),
            big_gammas: BTreeMap::new(),
            gamma: gamma_bn,
            k,
            k_nonce,
            g_nonce,
        };
        round2.k_ciphertexts.insert(self_id.clone(), k_ciphertext);
        round2.g_ciphertexts.insert(self_id.clone(), g);
        round2.big_gammas.insert(self_id, big_gamma);
        Ok(Session::SignRound2(Box::new(round2)))
    }

    pub(crate) fn helper(&self) -> &Helper {
        &self.helper
    }

    pub(crate) fn helper_mut(&mut self) -> &mut Helper {
        &mut self.helper
    }
}
