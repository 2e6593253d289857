// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Shared support for the crate's tests.

use rand::{
    rngs::{OsRng, StdRng},
    RngCore, SeedableRng,
};

/// A fresh RNG for a test, with its seed echoed to stderr so a failing run
/// can be replayed through [`replay_rng`].
pub(crate) fn test_rng() -> StdRng {
    let mut seed = <StdRng as SeedableRng>::Seed::default();
    OsRng.fill_bytes(&mut seed);
    eprintln!("test rng seed (pass to replay_rng to reproduce): {seed:?}");
    StdRng::from_seed(seed)
}

/// Re-run a test with a seed captured from a failing run.
#[allow(unused)]
pub(crate) fn replay_rng(seed: [u8; 32]) -> StdRng {
    StdRng::from_seed(seed)
}

/// Route this crate's tracing output through the test harness, filtered by
/// `RUST_LOG`. Call from the failing test while debugging; leaving it on
/// makes expected-failure tests noisy.
#[allow(unused)]
pub(crate) fn enable_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
