// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! The per-party record produced by key generation, consumed by signing,
//! and extended by unhardened BIP32 child derivation.

use crate::{
    curve::CurvePoint,
    errors::{CallerError, InternalError, Result},
    paillier::{DecryptionKey, EncryptionKey},
    party::{PartyId, PartySet},
    polynomial::lagrange_coefficient_at_zero,
    ring_pedersen::RingPedersen,
    transcript::TranscriptWrite,
};
use generic_array::{
    sequence::Split,
    typenum::{U32, U64},
    GenericArray,
};
use hmac::Mac;
use k256::{elliptic_curve::PrimeField, Scalar};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt::Debug};
use tracing::error;

type HmacSha512 = hmac::Hmac<sha2::Sha512>;

/// Public information for one party: its ECDSA and ElGamal public shares
/// and its Paillier/Pedersen setup.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Debug)]
pub struct PublicData {
    pub(crate) ecdsa: CurvePoint,
    pub(crate) elgamal: CurvePoint,
    pub(crate) paillier: EncryptionKey,
    pub(crate) pedersen: RingPedersen,
}

/// All key material a party holds after a keygen run.
///
/// The `ecdsa`, `elgamal`, and `paillier` fields are secret; a `Config`
/// should only ever be serialized into storage the calling application
/// treats as confidential.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    id: PartyId,
    threshold: usize,
    /// This party's share `xᵢ` of the joint ECDSA secret.
    ecdsa: Scalar,
    /// This party's ElGamal secret `yᵢ`.
    elgamal: Scalar,
    /// This party's Paillier decryption key.
    paillier: DecryptionKey,
    rid: [u8; 32],
    chain_key: [u8; 32],
    public: BTreeMap<PartyId, PublicData>,
}

impl Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("id", &self.id)
            .field("threshold", &self.threshold)
            .field("ecdsa", &"[redacted]")
            .field("elgamal", &"[redacted]")
            .field("paillier", &"[redacted]")
            .field("rid", &hex::encode(self.rid))
            .field("parties", &self.public.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Config {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: PartyId,
        threshold: usize,
        ecdsa: Scalar,
        elgamal: Scalar,
        paillier: DecryptionKey,
        rid: [u8; 32],
        chain_key: [u8; 32],
        public: BTreeMap<PartyId, PublicData>,
    ) -> Result<Self> {
        if !public.contains_key(&id) {
            error!("Config does not include its own party");
            return Err(InternalError::InternalInvariantFailed);
        }
        Ok(Self {
            id,
            threshold,
            ecdsa,
            elgamal,
            paillier,
            rid,
            chain_key,
            public,
        })
    }

    /// This party's identifier.
    pub fn id(&self) -> &PartyId {
        &self.id
    }

    /// The corruption threshold `t`; `t+1` shares reconstruct the secret.
    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// The chain key used for BIP32 derivation.
    pub fn chain_key(&self) -> &[u8; 32] {
        &self.chain_key
    }

    /// The sorted IDs of all parties in this config.
    pub fn party_ids(&self) -> Vec<PartyId> {
        self.public.keys().cloned().collect()
    }

    pub(crate) fn rid(&self) -> &[u8; 32] {
        &self.rid
    }

    pub(crate) fn ecdsa_share(&self) -> &Scalar {
        &self.ecdsa
    }

    pub(crate) fn paillier_secret(&self) -> &DecryptionKey {
        &self.paillier
    }

    pub(crate) fn public_data(&self, id: &PartyId) -> Result<&PublicData> {
        self.public.get(id).ok_or_else(|| {
            error!("Party {id} is not part of this config");
            InternalError::CallingApplicationMistake(CallerError::UnknownSender)
        })
    }

    /// The joint public key: `Σⱼ Lⱼ(0)·Xⱼ` over all parties.
    pub fn public_point(&self) -> Result<CurvePoint> {
        let ids = self.party_ids();
        let mut sum = CurvePoint::IDENTITY;
        for (j, data) in &self.public {
            let coefficient = lagrange_coefficient_at_zero(j, &ids)?;
            sum = sum + data.ecdsa.multiply_by_scalar(&coefficient);
        }
        Ok(sum)
    }

    /// The public ECDSA share point of one party.
    pub fn public_share(&self, id: &PartyId) -> Result<CurvePoint> {
        Ok(self.public_data(id)?.ecdsa)
    }

    /// True if the given sorted signer set can produce a signature with this
    /// config: more than `t` signers, all known, including self.
    pub fn can_sign(&self, signers: &PartySet) -> bool {
        if signers.len() <= self.threshold {
            return false;
        }
        if !signers.contains(&self.id) {
            return false;
        }
        signers.iter().all(|id| self.public.contains_key(id))
    }

    /// Additively shift the joint secret by `adjust`, producing a new
    /// config. Adding `adjust` to each private share and `adjust·G` to each
    /// verification share shifts the reconstructed secret by exactly
    /// `adjust`.
    pub(crate) fn derive(&self, adjust: &Scalar, new_chain_key: [u8; 32]) -> Result<Config> {
        let adjust_point = CurvePoint::scale_generator(adjust);
        let public = self
            .public
            .iter()
            .map(|(id, data)| {
                (
                    id.clone(),
                    PublicData {
                        ecdsa: data.ecdsa + adjust_point,
                        elgamal: data.elgamal,
                        paillier: data.paillier.clone(),
                        pedersen: data.pedersen.clone(),
                    },
                )
            })
            .collect();
        Ok(Config {
            id: self.id.clone(),
            threshold: self.threshold,
            ecdsa: self.ecdsa + adjust,
            elgamal: self.elgamal,
            paillier: self.paillier.clone(),
            rid: self.rid,
            chain_key: new_chain_key,
            public,
        })
    }

    /// Derive a sharing of the `i`-th unhardened BIP32 child of the joint
    /// key. Fails for hardened indices (`i ≥ 2³¹`) and for the negligible
    /// set of indices that generate an invalid key.
    pub fn derive_bip32(&self, index: u32) -> Result<Config> {
        if index >= 0x8000_0000 {
            error!("Hardened derivation is not supported");
            Err(CallerError::InvalidDerivationPath)?;
        }
        let public_point = self.public_point()?;
        let (adjust, new_chain_key) = derive_scalar(&public_point, &self.chain_key, index)?;
        self.derive(&adjust, new_chain_key)
    }

    /// Derive along a path of exactly three unhardened levels,
    /// `m/a/b/c`.
    pub fn derive_path(&self, path: &str) -> Result<Config> {
        let components: Vec<&str> = path.split('/').collect();
        if components.len() != 4 || components[0] != "m" {
            error!("Derivation path must have the form m/a/b/c");
            Err(CallerError::InvalidDerivationPath)?;
        }
        let mut config = self.clone();
        for component in &components[1..] {
            let index: u32 = component
                .parse()
                .map_err(|_| CallerError::InvalidDerivationPath)?;
            config = config.derive_bip32(index)?;
        }
        Ok(config)
    }
}

impl TranscriptWrite for Config {
    fn domain(&self) -> &'static str {
        "CMP Config"
    }

    /// Canonical public bytes: threshold, party set, RID, and every party's
    /// public data. Secrets never enter the transcript.
    fn transcript_bytes(&self) -> Vec<u8> {
        let mut bytes = (self.threshold as u64).to_be_bytes().to_vec();
        for (id, data) in &self.public {
            bytes.extend_from_slice(&(id.as_bytes().len() as u64).to_be_bytes());
            bytes.extend_from_slice(id.as_bytes());
            bytes.extend(data.ecdsa.to_bytes());
            bytes.extend(data.elgamal.to_bytes());
            bytes.extend(data.paillier.modulus().to_bytes());
            bytes.extend(data.pedersen.s().to_bytes());
            bytes.extend(data.pedersen.t().to_bytes());
        }
        bytes.extend_from_slice(&self.rid);
        bytes
    }
}

/// The BIP32 unhardened child-key shift: `I = HMAC-SHA512(chain_key,
/// serP(K) ‖ ser32(i))`, split into a scalar (left half) and the child
/// chain key (right half).
pub(crate) fn derive_scalar(
    public_point: &CurvePoint,
    chain_key: &[u8; 32],
    index: u32,
) -> Result<(Scalar, [u8; 32])> {
    let mut data = public_point.to_bytes();
    data.extend_from_slice(&index.to_be_bytes());

    let hmac = HmacSha512::new_from_slice(chain_key)
        .map_err(|_| InternalError::InternalInvariantFailed)?;
    let digest: GenericArray<u8, U64> = hmac.chain_update(&data).finalize().into_bytes();
    let (left, right): (GenericArray<u8, U32>, GenericArray<u8, U32>) = digest.split();

    // Per BIP32, an I_L ≥ q makes the child invalid; callers should move on
    // to the next index.
    let scalar = Option::<Scalar>::from(Scalar::from_repr(left)).ok_or_else(|| {
        error!("Derived scalar is out of range; this index generates an invalid key");
        InternalError::CallingApplicationMistake(CallerError::InvalidDerivationPath)
    })?;

    let mut new_chain_key = [0u8; 32];
    new_chain_key.copy_from_slice(&right);
    Ok((scalar, new_chain_key))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_scalar_is_deterministic_and_index_sensitive() {
        let point = CurvePoint::GENERATOR;
        let chain_key = [7u8; 32];

        let (s1, c1) = derive_scalar(&point, &chain_key, 0).unwrap();
        let (s2, c2) = derive_scalar(&point, &chain_key, 0).unwrap();
        assert_eq!(s1, s2);
        assert_eq!(c1, c2);

        let (s3, _) = derive_scalar(&point, &chain_key, 1).unwrap();
        assert_ne!(s1, s3);
    }

    #[test]
    fn hardened_indices_are_rejected_by_path_parsing() {
        // Path parsing happens before any curve work, so a config is not
        // needed to exercise rejection.
        let components: Vec<&str> = "m/0'/0/0".split('/').collect();
        assert!(components[1].parse::<u32>().is_err());
    }
}
