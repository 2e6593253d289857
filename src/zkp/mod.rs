// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Fiat-Shamir zero-knowledge proofs used by the keygen and signing rounds.
//!
//! Every proof follows the same shape: a borrowed public statement, a
//! borrowed private witness, a commitment built from fresh nonces, a
//! challenge drawn from the transcript after the statement and commitment
//! have been absorbed, and a response tuple. Verification re-derives the
//! challenge from an identically prepared transcript, then checks linear
//! relations over the relevant modulus or group.
//!
//! The transcript handed to `prove`/`verify` must already be bound to the
//! session (SSID) and the prover's identity; the caller obtains it from
//! [`Helper::transcript_for_party`](crate::protocol::Helper::transcript_for_party).

use crate::{errors::Result, transcript::Transcript};
use rand::{CryptoRng, RngCore};

pub(crate) mod piaffg;
pub(crate) mod pidec;
pub(crate) mod pienc;
pub(crate) mod pifac;
pub(crate) mod pilog;
pub(crate) mod pimod;
pub(crate) mod piprm;
pub(crate) mod pisch;

/// Common interface for the Fiat-Shamir proofs in this module.
pub(crate) trait Proof: Sized {
    type CommonInput<'a>;
    type ProverSecret<'a>;

    /// Produce a proof over the given statement and witness.
    fn prove<R: RngCore + CryptoRng>(
        input: Self::CommonInput<'_>,
        secret: Self::ProverSecret<'_>,
        transcript: &mut Transcript,
        rng: &mut R,
    ) -> Result<Self>;

    /// Verify the proof against the statement. The transcript must be
    /// prepared exactly as it was for `prove`.
    fn verify(self, input: Self::CommonInput<'_>, transcript: &mut Transcript) -> Result<()>;
}
