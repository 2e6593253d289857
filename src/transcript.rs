// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! A domain-separated transcript hash over BLAKE3, used both as the
//! Fiat-Shamir oracle for every proof in this crate and as the
//! commitment/decommitment hash of the keygen rounds.
//!
//! Every object written to the transcript is framed as
//! `"(" ‖ domain ‖ bytes ‖ ")"` so that values of different types can never
//! collide across contexts. The transcript keeps the absorbed byte stream,
//! which makes a fork a cheap copy and lets mid-protocol state round-trip
//! through serialization without losing hash state.

use crate::{
    errors::{CallerError, Result},
    sampling::SAMPLING_RETRY_LIMIT,
};
use k256::{elliptic_curve::PrimeField, Scalar};
use libpaillier::unknown_order::BigNumber;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};

/// A value that can be absorbed into a [`Transcript`] under a fixed domain
/// tag.
pub trait TranscriptWrite {
    /// The domain tag for this type. Must be unique per type.
    fn domain(&self) -> &'static str;

    /// Canonical bytes for this value.
    fn transcript_bytes(&self) -> Vec<u8>;
}

/// A streaming, cloneable transcript hash.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transcript {
    buf: Vec<u8>,
}

impl std::fmt::Debug for Transcript {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transcript")
            .field("absorbed_bytes", &self.buf.len())
            .finish()
    }
}

impl Transcript {
    /// Start a fresh transcript under the given protocol label.
    pub fn new(label: &str) -> Self {
        let mut transcript = Self { buf: Vec::new() };
        transcript.append_bytes("Transcript Label", label.as_bytes());
        transcript
    }

    /// Absorb raw bytes under a domain tag.
    pub fn append_bytes(&mut self, domain: &str, bytes: &[u8]) {
        self.buf.push(b'(');
        self.buf.extend_from_slice(domain.as_bytes());
        self.buf.extend_from_slice(bytes);
        self.buf.push(b')');
    }

    /// Absorb a domain-tagged value.
    pub fn append(&mut self, value: &impl TranscriptWrite) {
        self.append_bytes(value.domain(), &value.transcript_bytes());
    }

    /// A snapshot of the current state. Mutating the fork never affects the
    /// parent.
    pub fn fork(&self) -> Transcript {
        self.clone()
    }

    /// An unbounded pseudorandom byte stream derived from the current state.
    pub fn digest(&self) -> Digest {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.buf);
        Digest {
            reader: hasher.finalize_xof(),
        }
    }

    /// The first 32 bytes of the digest stream.
    pub fn digest_bytes(&self) -> [u8; 32] {
        let mut out = [0u8; 32];
        self.digest().fill(&mut out);
        out
    }

    /// Commit to everything absorbed so far. Samples a fresh 32-byte
    /// decommitment value, absorbs it, and returns the resulting digest as
    /// the commitment.
    pub fn commit<R: RngCore + CryptoRng>(&mut self, rng: &mut R) -> (Commitment, Decommitment) {
        let mut nonce = [0u8; 32];
        rng.fill_bytes(&mut nonce);
        let decommitment = Decommitment(nonce);
        self.append(&decommitment);
        (Commitment(self.digest_bytes()), decommitment)
    }

    /// Check an opening: the verifier rebuilds the transcript with the
    /// claimed values and compares the resulting digest with the commitment.
    #[must_use]
    pub fn decommit(&mut self, commitment: &Commitment, decommitment: &Decommitment) -> bool {
        self.append(decommitment);
        self.digest_bytes() == commitment.0
    }
}

/// A reader over the transcript's BLAKE3 XOF output.
pub struct Digest {
    reader: blake3::OutputReader,
}

impl Digest {
    /// Fill `out` with the next bytes of the stream.
    pub fn fill(&mut self, out: &mut [u8]) {
        self.reader.fill(out);
    }

    fn next_byte(&mut self) -> u8 {
        let mut byte = [0u8; 1];
        self.fill(&mut byte);
        byte[0]
    }

    /// A uniform scalar in `[0, q)`, by rejection sampling over 32-byte
    /// reads.
    pub fn scalar(&mut self) -> Scalar {
        loop {
            let mut bytes = [0u8; 32];
            self.fill(&mut bytes);
            if let Some(scalar) = Option::<Scalar>::from(Scalar::from_repr(bytes.into())) {
                return scalar;
            }
        }
    }

    /// A uniform value in `[0, n)`.
    ///
    /// To avoid sampling bias we reject values `≥ n` rather than reducing
    /// mod `n`, with a bounded number of retries.
    pub fn positive_bn_below(&mut self, n: &BigNumber) -> Result<BigNumber> {
        let len = n.to_bytes().len();
        let mut bytes = vec![0u8; len];
        for _ in 0..SAMPLING_RETRY_LIMIT {
            self.fill(&mut bytes);
            let candidate = BigNumber::from_slice(&bytes);
            if &candidate < n {
                return Ok(candidate);
            }
        }
        Err(CallerError::RetryFailed)?
    }

    /// A uniform value in `[-n, n]`.
    pub fn plusminus_bn(&mut self, n: &BigNumber) -> Result<BigNumber> {
        let is_neg = self.next_byte() & 1 == 1;
        let value = self.positive_bn_below(&(n + 1))?;
        Ok(if is_neg { -value } else { value })
    }

    /// A uniform value in `[-2^bits, 2^bits)`.
    pub fn plusminus_bn_by_size(&mut self, bits: usize) -> BigNumber {
        let is_neg = self.next_byte() & 1 == 1;
        let mut bytes = vec![0u8; bits / 8];
        self.fill(&mut bytes);
        let value = BigNumber::from_slice(&bytes);
        if is_neg {
            -value
        } else {
            value
        }
    }

    /// A uniform challenge bit.
    pub fn bit(&mut self) -> bool {
        self.next_byte() & 1 == 1
    }
}

/// A 32-byte transcript commitment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commitment([u8; 32]);

/// The 32-byte opening for a [`Commitment`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decommitment([u8; 32]);

impl TranscriptWrite for Decommitment {
    fn domain(&self) -> &'static str {
        "Decommitment"
    }

    fn transcript_bytes(&self) -> Vec<u8> {
        self.0.to_vec()
    }
}

/// Sign-and-magnitude canonical bytes for a (possibly negative) big integer.
pub(crate) fn bn_transcript_bytes(value: &BigNumber) -> Vec<u8> {
    let mut bytes = vec![u8::from(value < &BigNumber::zero())];
    bytes.extend_from_slice(&value.to_bytes());
    bytes
}

impl TranscriptWrite for BigNumber {
    fn domain(&self) -> &'static str {
        "Big Integer"
    }

    fn transcript_bytes(&self) -> Vec<u8> {
        bn_transcript_bytes(self)
    }
}

impl TranscriptWrite for Scalar {
    fn domain(&self) -> &'static str {
        "Scalar"
    }

    fn transcript_bytes(&self) -> Vec<u8> {
        self.to_bytes().to_vec()
    }
}

/// Bytes carried under an ad-hoc domain, for one-off writes.
pub(crate) struct BytesWithDomain<'a> {
    pub(crate) domain: &'static str,
    pub(crate) bytes: &'a [u8],
}

impl TranscriptWrite for BytesWithDomain<'_> {
    fn domain(&self) -> &'static str {
        self.domain
    }

    fn transcript_bytes(&self) -> Vec<u8> {
        self.bytes.to_vec()
    }
}
