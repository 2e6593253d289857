// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Threshold ECDSA key generation and signing over secp256k1, following the
//! five-round CMP protocol of Canetti, Gennaro, Goldfeder, Makriyannis and
//! Peled[^cite].
//!
//! In a threshold signature scheme, a subset of `t+1` out of `n` signers,
//! each holding a share of a private signing key, cooperate to produce a
//! signature valid under the joint public key, while any `t` of them learn
//! nothing. Signatures produced here verify under a standard ECDSA
//! verification function.
//!
//! This crate provides the protocol core only: per-party state machines for
//! distributed key generation and signing, driven by a resumable
//! [`Handler`]. The handler is transport-agnostic — the calling
//! application moves [`Message`]s between parties however it likes, feeding
//! inbound ones to [`Handler::accept`] and collecting outbound ones from
//! [`Handler::process_round`]. A handler serializes between rounds, so a
//! protocol execution can span processes.
//!
//! Key material lives in a per-party [`Config`], which also supports
//! unhardened BIP32 child derivation. The [`api`] module exposes the same
//! functionality as JSON-string entry points for foreign callers.
//!
//! [^cite]: Ran Canetti, Rosario Gennaro, Steven Goldfeder, Nikolaos
//! Makriyannis, and Udi Peled. UC Non-Interactive, Proactive, Threshold
//! ECDSA with Identifiable Aborts. [EPrint archive,
//! 2021](https://eprint.iacr.org/2021/060.pdf).

/// Serialize a value with the crate's wire codec.
macro_rules! serialize {
    ($x:expr) => {{
        bincode::serialize($x)
            .map_err(|_| crate::errors::InternalError::from(crate::errors::CallerError::SerializationFailed))
    }};
}

/// Deserialize bytes with the crate's wire codec.
macro_rules! deserialize {
    ($x:expr) => {{
        bincode::deserialize($x)
            .map_err(|_| crate::errors::InternalError::from(crate::errors::CallerError::DeserializationFailed))
    }};
}

pub mod api;
mod config;
mod curve;
pub mod errors;
mod handler;
mod keygen;
mod paillier;
mod parameters;
mod party;
mod polynomial;
mod protocol;
mod ring_pedersen;
mod sampling;
mod sign;
#[cfg(test)]
mod testing;
mod transcript;
mod zkp;

pub use config::{Config, PublicData};
pub use curve::Signature;
pub use handler::{Handler, ProtocolError};
pub use party::{PartyId, PartySet};
pub use protocol::{Message, ProtocolResult};
pub use sign::PreSignature;
