// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Paillier encryption over moduli built from Blum-like safe primes.
//!
//! Plaintexts are signed: the decryption routine returns the symmetric
//! representative in `(-N/2, N/2]`, which is what the MtA conversion needs
//! for its `α` shares.

use crate::{
    errors::{InternalError, Result},
    parameters::PAILLIER_BITS,
    sampling::unit_mod_n,
    transcript::{bn_transcript_bytes, TranscriptWrite},
};
use libpaillier::unknown_order::BigNumber;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use tracing::error;

/// A Paillier ciphertext.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Debug)]
pub(crate) struct Ciphertext(pub(crate) BigNumber);

impl TranscriptWrite for Ciphertext {
    fn domain(&self) -> &'static str {
        "Paillier Ciphertext"
    }

    fn transcript_bytes(&self) -> Vec<u8> {
        bn_transcript_bytes(&self.0)
    }
}

/// The nonce used to produce a ciphertext.
pub(crate) type Nonce = BigNumber;

/// A public Paillier encryption key.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Debug)]
pub(crate) struct EncryptionKey {
    n: BigNumber,
    n_squared: BigNumber,
}

/// The bit length of a [`BigNumber`]'s magnitude.
pub(crate) fn bit_length(n: &BigNumber) -> usize {
    let bytes = n.to_bytes();
    match bytes.iter().position(|&b| b != 0) {
        Some(first) => (bytes.len() - first - 1) * 8 + (8 - bytes[first].leading_zeros() as usize),
        None => 0,
    }
}

/// Check that a claimed Paillier modulus is odd and of the expected length.
pub(crate) fn validate_modulus(n: &BigNumber) -> Result<()> {
    if n % BigNumber::from(2u64) == BigNumber::zero() {
        error!("Paillier modulus is even");
        return Err(InternalError::ProtocolError(None));
    }
    if bit_length(n) != PAILLIER_BITS {
        error!(
            "Paillier modulus has wrong bit length (got {}, expected {})",
            bit_length(n),
            PAILLIER_BITS
        );
        return Err(InternalError::ProtocolError(None));
    }
    Ok(())
}

impl EncryptionKey {
    pub(crate) fn new(n: BigNumber) -> Self {
        let n_squared = &n * &n;
        Self { n, n_squared }
    }

    pub(crate) fn modulus(&self) -> &BigNumber {
        &self.n
    }

    pub(crate) fn modulus_squared(&self) -> &BigNumber {
        &self.n_squared
    }

    /// Encrypt a signed plaintext `x` with `|x| < N/2` under a fresh nonce.
    pub(crate) fn encrypt<R: RngCore + CryptoRng>(
        &self,
        rng: &mut R,
        x: &BigNumber,
    ) -> Result<(Ciphertext, Nonce)> {
        let nonce = unit_mod_n(rng, &self.n)?;
        let ciphertext = self.encrypt_with_nonce(x, &nonce)?;
        Ok((ciphertext, nonce))
    }

    /// Encrypt with a caller-chosen nonce: `c = (1 + N)^x · ρ^N mod N²`.
    pub(crate) fn encrypt_with_nonce(&self, x: &BigNumber, nonce: &Nonce) -> Result<Ciphertext> {
        let bound = &self.n / BigNumber::from(2u64);
        if x > &bound || x < &-bound.clone() {
            error!("Plaintext is out of range for this Paillier modulus");
            return Err(InternalError::InternalInvariantFailed);
        }
        let m = x.nmod(&self.n);
        // (1 + N)^m = 1 + m·N (mod N²)
        let one_plus_n_to_m = (BigNumber::one() + &m * &self.n).nmod(&self.n_squared);
        let nonce_to_n = nonce.modpow(&self.n, &self.n_squared);
        Ok(Ciphertext(
            (one_plus_n_to_m * nonce_to_n).nmod(&self.n_squared),
        ))
    }

    /// Homomorphic addition of plaintexts: `c₁ ⊕ c₂`.
    pub(crate) fn add(&self, c1: &Ciphertext, c2: &Ciphertext) -> Ciphertext {
        Ciphertext((&c1.0 * &c2.0).nmod(&self.n_squared))
    }

    /// Homomorphic scalar multiplication: `k ⊙ c`. The scalar may be
    /// negative.
    pub(crate) fn mul(&self, c: &Ciphertext, k: &BigNumber) -> Result<Ciphertext> {
        Ok(Ciphertext(modpow_signed(&c.0, k, &self.n_squared)?))
    }

    /// Check that a ciphertext is a unit in the correct range.
    pub(crate) fn validate_ciphertext(&self, c: &Ciphertext) -> bool {
        c.0 > BigNumber::zero()
            && c.0 < self.n_squared
            && c.0.gcd(&self.n) == BigNumber::one()
    }

    pub(crate) fn validate_ciphertexts(&self, cs: &[&Ciphertext]) -> bool {
        cs.iter().all(|c| self.validate_ciphertext(c))
    }
}

impl TranscriptWrite for EncryptionKey {
    fn domain(&self) -> &'static str {
        "Paillier Encryption Key"
    }

    fn transcript_bytes(&self) -> Vec<u8> {
        self.n.to_bytes()
    }
}

/// A Paillier decryption key: the two Blum-like safe primes behind `N`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct DecryptionKey {
    p: BigNumber,
    q: BigNumber,
    n: BigNumber,
}

impl Debug for DecryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecryptionKey")
            .field("p", &"[redacted]")
            .field("q", &"[redacted]")
            .field("n", &self.n)
            .finish()
    }
}

impl DecryptionKey {
    /// Build a key from two primes `p ≡ q ≡ 3 (mod 4)`.
    pub(crate) fn from_primes(p: BigNumber, q: BigNumber) -> Result<Self> {
        let three = BigNumber::from(3u64);
        let four = BigNumber::from(4u64);
        if p.nmod(&four) != three || q.nmod(&four) != three {
            error!("Paillier primes are not both 3 mod 4");
            return Err(InternalError::InternalInvariantFailed);
        }
        if p == q {
            error!("Paillier primes are equal");
            return Err(InternalError::InternalInvariantFailed);
        }
        let n = &p * &q;
        validate_modulus(&n)?;
        Ok(Self { p, q, n })
    }

    /// Generate a fresh key from two random safe primes.
    ///
    /// This is slow: it dominates the runtime of keygen round 1.
    #[cfg(not(test))]
    pub(crate) fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Result<Self> {
        let (p, q) = prime_gen::safe_prime_pair(rng)?;
        Self::from_primes(p, q)
    }

    #[cfg(test)]
    pub(crate) fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Result<Self> {
        let (p, q) = prime_gen::test_pool_pair(rng)?;
        Self::from_primes(p, q)
    }

    pub(crate) fn p(&self) -> &BigNumber {
        &self.p
    }

    pub(crate) fn q(&self) -> &BigNumber {
        &self.q
    }

    pub(crate) fn modulus(&self) -> &BigNumber {
        &self.n
    }

    /// `φ(N) = (p−1)(q−1)`.
    pub(crate) fn totient(&self) -> BigNumber {
        (&self.p - 1) * (&self.q - 1)
    }

    pub(crate) fn encryption_key(&self) -> EncryptionKey {
        EncryptionKey::new(self.n.clone())
    }

    /// Decrypt to the symmetric representative in `(-N/2, N/2]`.
    pub(crate) fn decrypt(&self, c: &Ciphertext) -> Result<BigNumber> {
        let pk = self.encryption_key();
        if !pk.validate_ciphertext(c) {
            error!("Attempted to decrypt an invalid ciphertext");
            return Err(InternalError::ProtocolError(None));
        }
        let phi = self.totient();
        let mu = phi.invert(&self.n).ok_or_else(|| {
            error!("Paillier totient is not invertible; the key is malformed");
            InternalError::InternalInvariantFailed
        })?;
        // x = L(c^φ mod N²)·φ⁻¹ mod N, with L(u) = (u − 1)/N
        let u = c.0.modpow(&phi, pk.modulus_squared());
        let ell = (u - BigNumber::one()) / &self.n;
        let x = (ell * mu).nmod(&self.n);
        if &x * 2 > self.n {
            Ok(x - &self.n)
        } else {
            Ok(x)
        }
    }
}

/// `a^e mod n` for a signed exponent, inverting `a` when `e < 0`.
pub(crate) fn modpow_signed(a: &BigNumber, e: &BigNumber, n: &BigNumber) -> Result<BigNumber> {
    if e >= &BigNumber::zero() {
        return Ok(a.modpow(e, n));
    }
    let a_inv = a.invert(n).ok_or_else(|| {
        error!("Attempted to raise a non-unit to a negative power");
        InternalError::ProtocolError(None)
    })?;
    Ok(a_inv.modpow(&-e.clone(), n))
}

pub(crate) mod prime_gen {
    //! Generation of the safe primes behind a Paillier modulus.

    use super::*;
    use crate::parameters::PRIME_BITS;

    /// Sample two distinct random safe primes `p ≡ q ≡ 3 (mod 4)`.
    #[allow(unused)]
    pub(crate) fn safe_prime_pair<R: RngCore + CryptoRng>(
        rng: &mut R,
    ) -> Result<(BigNumber, BigNumber)> {
        let p = BigNumber::safe_prime_from_rng(PRIME_BITS, rng);
        let mut q = BigNumber::safe_prime_from_rng(PRIME_BITS, rng);
        while q == p {
            q = BigNumber::safe_prime_from_rng(PRIME_BITS, rng);
        }
        Ok((p, q))
    }

    /// A pool of precomputed 1024-bit safe primes, for tests only.
    ///
    /// Sampling real safe primes of this size takes on the order of minutes
    /// per prime, which is far too slow for a test suite. Every value in the
    /// pool is a genuine safe prime (`p` and `(p−1)/2` both prime), so all
    /// the number theory downstream behaves exactly as in production; the
    /// pool is "insecure" only because the primes are public.
    #[cfg(test)]
    static POOL_OF_PRIMES: &[&str] = &[
        "af5d60edb5089afdc18af0f72ecdad9fa2584950bb7f493dae576cdcaa42d95a3c855f3c957a0b9df556dd551fb2dca9e3a0672212c0456c002d06ae54fa15cafad182ff5729fac87170fe2b7b4811377442e40c8cad2d08e7556bd6cc6490094a487f457d6ef2b54d065882ce3a3271049f5f7a33a62a8b5a49dfebb6a4cc07",
        "ac0c7b756a00d11b9edd2f75c7ec765147c7ade13161178e4c72e5d615257ad84d50d37d9c36253aee392e70340538f1b3a4ef156a1108763d1a1bce55543468d8c725c7abb039e025df2c2c880943b1c14153160288f3ae4300759725bce4f1ecb3b1e6635b729fd78cfabe91b8e9a325c1d2853de98d5436c243dd497e12cb",
        "b1ee452d9a5a68da448bd0e4aad548600b8214ddaca8fe82ccbfcf1a6c33bfac388c4947808ca9e0a5b5a5d9535413fdd62512a7c7088a4237bcfaaed5a4affc7586906dc6e6afcc4182ff39734509df1cebff622d820d612ecec05256ec8dd8b84e5eed5aac7080acf657eeaba983951187dc263f7ad0ade031767bdafa72a7",
        "facfd1419909b984af95eeac5ccd9db9736f1511e2a5695f7422cf9104c6262acfbf4aeecfc16f6148435102cc9201da3f7ed1a86f505868d1788ed2ee78c67e32ed3635d1fa1cd0334db29d5bc9ec3ebb17d2b523cbc246ca4f4720c63287c9c35900d418ea191d7ff3326de6a80278c8ca03c32f0f0065874b31dc97dd0223",
        "a0ea8e51b34890dd371103ea6e3363b16f5fe0b598f940e0f98c621e610b699aaa5fccab7bc310b90d6c10ab291dfa657f88f9b164c4552949d00f144f7734ea7f0067601a0ce6ac98c3b8661a31db408ce37b8497d01dc36b7b4e7e5b4c0f729f95649c7e62d4a0144dfce8b915b198e6418b4b8d67a2cfe64def09f073586b",
        "bd94dcd24aae5486126c9fc3ab5b6f70a6b60075023f61126efba84688a5f555d708680294ad4fafc41dcf2f752bd6c76f714b38a6dfe48bda1399a4fe285c7e3ee16f2f5fd2df2c5515ec04eca7e84b4f3255b02f6dbf4a24b8ab6862b8c088257420ea0605094a9acc1676c13d703a14a31fc20c462f5e135642a42120ac5b",
        "84d2953829374ab36adfdcc3f944a3b0a71294c631c7789dc85678b5bec3612678bed2bcc70e4f7465047dfbfe2ee8ca7718639c85c8b415abc9abcd3343432105a2f0a78c066d6e4ee0c478b2628ecd1e6355112ca9301a36b1c32ab911d92800bfb21fc7f500151b09482024c656ea502382bdcee984b071a70c6648cf13c7",
        "d24c7248d9c2a7699cc3a42e8e2ccfc5a9d8aceac7a8fdb49216a5a77884d2b6fed4eeeb9b4a9fd712648a87afe0d4151c36fec42b935f737a004d25179218a4f9f1c3976575bf4a97603e73b1738e43c31f786d4874761121ebe61b620ae32df432b0bad10ff12d4ccf6c1326d4cba0c8d2734f09691136b6667ed709b76fb7",
        "f8eec64703549510bdb75a521bd7a61106077f304aa646a5ec2187a9455963a17e0fd49dcf885953416d1f235f956f8985f5f55e31ccc3faa058ab93d19b9aba5e5bbfc18364e9d5b6260cc4239d7e8375e8e49d31f4733f1331415fe7339fbece4aab6b8e0077232144db971dba7be769d7db6cd45645590fcb8216368ac3e7",
        "b86cd4a855a6c60d00d2a2c57418e4ad08d2d13a2cf8b708ac538fc3833617464df6a0b6fe4e922bbcc775197af74a8d8cace03f46e5e75b19f6503aa2499f71220c419a279d4f79626bab6a4eb03455eae49203dfa06636ab88a83f93f6d32e3093dd94afc14edc8d942a8e95fcd7cf3e70ae57e488493f616b021c9ecfffbb",
        "a0884b598b56180e45a7c4e8491b75cac10ef9885ce021bab8a24f3aec953b572d340afd404651a1d4db5c70b3b3b98b773134b010193b17a7b6f1ed2fa4bbe37501a7de4711091414ba1ad0a95220a1da7d17045da1798ef873ff7dc39f3cce444edc6babac201bda8d0c9e8937473b4927980f875a5d16a35c196974b8c70b",
        "d824485f639d53401b55f13666924e9d402bc386ded4dd8dacba43cac46169917583eb8ce9541e047d5d1d5a0dad7f5b9db94dd3be31fa19b2b57443dd666b6e1ad49143034beb5ea90a9ff32f3ca9ebfc32455620079b5d0fbdb9d98a89c9f6d8cfcf9499286e88b83fc6be33234d051db1950d2c71622af3636dca7512a26b",
        "b6931de6ca0c08c8e92493e1330628ea9f2e9cac785ff4b5abc3c1da8d5559dc4646523ef327e674f56270fd33a20d72533ae2e3a74400756d0051734332adfe02068f03f5f04fa614b65e6f08df903c66a8358a1dc5ad08fed909d522633bce9f5721ea262f11c81885c6df8fd367b1760c948937aff484b7050d6aafc0e433",
        "f3ff4e7dbc3eaa4038d81faa78fe126e7cb699c114de6b3eccefe65ceed689a5d986362148412c9d9b2a51772cf4d81e6f81cfa3cd16f9b9a70c00eb0cd19d7aa99809df88a65a8d61f56fa1792ad852a49a8f3eb22c47f9627a08fdf0dac8e6de85cf35348c70f08af86f14ace3c0018d201a26029c5650f18dc7ed935ef543",
        "fee1a75a8e48f89b8e1d77eafe5176bdf525dd6563af13fdf0ad36ed66dc8b140ae2cd8756fa624b343ad261d5c209d8cc4d7afb00ee28a281ea1829c74bfb30907064e77890d8f1088c41dd7619164430f2ec5616b08a526ac3ffd6ef70038f261ad2ed6ae43b34067e0d6930bcd36e45bce1133ff1e3e0490933c7a656f91b",
        "fa035bd401df7c0c816d30b1641d7d2f800940799c25d674d5c84fa4d455b71b4ab660a2c1ada2b05479c371e771e5b984a429d8f893189492cbd641986c1519c85f9cca2283327e0177775ba5f6162faffbeba229cb28a878d4012d48cc295899290d2e9e9185b05ba35d5b7d61be9a7b8d942aa76c5dee38937f18353008db",
    ];

    /// Pick a random pair of distinct primes from the test pool.
    #[cfg(test)]
    pub(crate) fn test_pool_pair<R: RngCore + CryptoRng>(
        rng: &mut R,
    ) -> Result<(BigNumber, BigNumber)> {
        use rand::Rng;

        let i = rng.gen_range(0..POOL_OF_PRIMES.len());
        let mut j = rng.gen_range(0..POOL_OF_PRIMES.len());
        while j == i {
            j = rng.gen_range(0..POOL_OF_PRIMES.len());
        }
        let decode = |hexstr: &str| -> Result<BigNumber> {
            let bytes = hex::decode(hexstr).map_err(|_| InternalError::InternalInvariantFailed)?;
            Ok(BigNumber::from_slice(bytes))
        };
        Ok((decode(POOL_OF_PRIMES[i])?, decode(POOL_OF_PRIMES[j])?))
    }
}
