// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Statistical and computational security parameters, instantiated the way
//! CGGMP'21 prescribes them for a 128-bit security level.

/// Computational security parameter `ℓ`, the bit length of the plaintext
/// values bound by the range proofs (matches the secp256k1 scalar size).
pub(crate) const ELL: usize = 256;

/// `ℓ'`, the bit length bounding the `β` masks exchanged during MtA.
pub(crate) const ELL_PRIME: usize = 5 * ELL;

/// Slack parameter `ε` added to proof response intervals.
pub(crate) const EPSILON: usize = 2 * ELL;

/// Number of iterations for the proofs whose soundness is per-repetition
/// (`mod` and `prm`).
pub(crate) const STAT_PARAM: usize = 80;

/// Bit length of each Blum prime factor of a Paillier modulus.
pub(crate) const PRIME_BITS: usize = 1024;

/// Bit length of a Paillier modulus `N = p·q`.
pub(crate) const PAILLIER_BITS: usize = 2 * PRIME_BITS;
