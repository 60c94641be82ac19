/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Types that exist only to store bytes, and do not have any major "active" behavior.

use std::{
    collections::BTreeMap,
    fmt::{self, Debug, Display, Formatter},
    hash::Hash,
    ops::{Add, AddAssign, Sub},
};

use borsh::{BorshDeserialize, BorshSerialize};

use super::crypto_primitives::{CryptoHasher, Digest, VerifyingKey};

/// Number that uniquely identifies a blockchain.
///
/// Every sync request carries the `ChainID` of its sender. Servers ignore requests whose `ChainID` is
/// different from their own, so all replicas that replicate the same chain should be configured to use
/// the same `ChainID`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, BorshDeserialize, BorshSerialize)]
pub struct ChainID(u64);

impl ChainID {
    /// Create a new `ChainID` with an `int` value.
    pub const fn new(int: u64) -> Self {
        Self(int)
    }

    /// Get the `u64` value of this `ChainID`.
    pub const fn int(&self) -> u64 {
        self.0
    }
}

/// 32-byte cryptographic hash.
///
/// Vertex ids, command hashes, and accumulator hashes are all SHA256 hashes.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize, BorshSerialize)]
pub struct CryptoHash([u8; 32]);

impl CryptoHash {
    /// Create a new `CryptoHash` wrapping `bytes`.
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the inner `[u8; 32]` value of this `CryptoHash`.
    pub const fn bytes(&self) -> [u8; 32] {
        self.0
    }

    /// Compute the SHA256 hash of `bytes`.
    pub fn digest(bytes: &[u8]) -> Self {
        let mut hasher = CryptoHasher::new();
        hasher.update(bytes);
        Self(hasher.finalize().into())
    }
}

impl Display for CryptoHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl Debug for CryptoHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Ed25519 digital signature.
#[derive(Clone, Copy, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct SignatureBytes([u8; 64]);

impl SignatureBytes {
    /// Create a new `SignatureBytes` wrapping `bytes`.
    pub fn new(bytes: [u8; 64]) -> Self {
        Self(bytes)
    }

    /// Get the inner `[u8; 64]` value of this `SignatureBytes`.
    pub const fn bytes(&self) -> [u8; 64] {
        self.0
    }
}

impl Debug for SignatureBytes {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.0[..8].fmt(f)
    }
}

/// The bytes of an Ed25519 verifying key.
///
/// `VerifyingKey` does not implement the Borsh traits, so messages and certificates refer to signers
/// through this type instead.
pub type VerifyingKeyBytes = [u8; 32];

/// Signatures collected from members of the same validator set, keyed by the signers' verifying keys.
///
/// # Ordering
///
/// Signatures are kept in ascending order of their signers' `VerifyingKeyBytes`, which is the same
/// order as the validators in a [`ValidatorSet`](super::validator_set::ValidatorSet).
#[derive(Clone, Debug, Default, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct SignatureSet(BTreeMap<VerifyingKeyBytes, SignatureBytes>);

impl SignatureSet {
    /// Create the empty `SignatureSet` that forms part of the genesis QC.
    pub fn genesis() -> Self {
        Self(BTreeMap::new())
    }

    /// Create a new, empty `SignatureSet`.
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Insert `signature` from `signer`, replacing any signature previously inserted for `signer`.
    pub fn insert(&mut self, signer: &VerifyingKey, signature: SignatureBytes) {
        self.0.insert(signer.to_bytes(), signature);
    }

    /// Get the signature of `signer`, if there is one.
    pub fn get(&self, signer: &VerifyingKeyBytes) -> Option<&SignatureBytes> {
        self.0.get(signer)
    }

    /// Iterate through the `(signer, signature)` pairs in ascending order of signer.
    pub fn iter(&self) -> std::collections::btree_map::Iter<'_, VerifyingKeyBytes, SignatureBytes> {
        self.0.iter()
    }

    /// Get how many signatures are in this `SignatureSet`.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check whether this `SignatureSet` contains no signatures.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Weight of a specific validator's votes in consensus decisions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, BorshDeserialize, BorshSerialize)]
pub struct Power(u64);

impl Power {
    /// Create a new `Power` wrapping `int`.
    pub fn new(int: u64) -> Self {
        Self(int)
    }

    /// Get the inner `u64` value of this `Power`.
    pub const fn int(&self) -> u64 {
        self.0
    }
}

/// Sum of the [`Power`]s of all validators in a [`ValidatorSet`](super::validator_set::ValidatorSet).
///
/// The inner type is `u128` so that summing up large `Power`s does not overflow.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, BorshDeserialize, BorshSerialize)]
pub struct TotalPower(u128);

impl TotalPower {
    /// Create a new `TotalPower` wrapping `int`.
    pub fn new(int: u128) -> Self {
        Self(int)
    }

    /// Get the inner `u128` value of this `TotalPower`.
    pub const fn int(&self) -> u128 {
        self.0
    }
}

impl AddAssign<Power> for TotalPower {
    fn add_assign(&mut self, rhs: Power) {
        self.0.add_assign(rhs.0 as u128)
    }
}

/// View number. Starts at 0 for the genesis vertex and increases by 1 every view.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize, BorshSerialize,
)]
pub struct ViewNumber(u64);

impl ViewNumber {
    /// Create a new `ViewNumber` wrapping `int`.
    pub fn new(int: u64) -> Self {
        Self(int)
    }

    /// Get the genesis `ViewNumber`, which is 0.
    pub const fn genesis() -> Self {
        Self(0)
    }

    /// Check whether this is the genesis view.
    pub const fn is_genesis(&self) -> bool {
        self.0 == 0
    }

    /// Get the inner `u64` of this `ViewNumber`.
    pub const fn int(&self) -> u64 {
        self.0
    }
}

impl Display for ViewNumber {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Debug::fmt(&self.0, f)
    }
}

impl Add<u64> for ViewNumber {
    type Output = ViewNumber;

    fn add(self, rhs: u64) -> Self::Output {
        ViewNumber(self.0.add(rhs))
    }
}

impl Sub<u64> for ViewNumber {
    type Output = ViewNumber;

    fn sub(self, rhs: u64) -> Self::Output {
        ViewNumber(self.0.sub(rhs))
    }
}

/// Number of commands committed into the ledger so far.
///
/// The genesis ledger header has state version 0, and every committed command increases the state
/// version by exactly 1.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize, BorshSerialize,
)]
pub struct StateVersion(u64);

impl StateVersion {
    /// Create a new `StateVersion` wrapping `int`.
    pub const fn new(int: u64) -> Self {
        Self(int)
    }

    /// Get the inner `u64` of this `StateVersion`.
    pub const fn int(&self) -> u64 {
        self.0
    }
}

impl Display for StateVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Debug::fmt(&self.0, f)
    }
}

impl Add<u64> for StateVersion {
    type Output = StateVersion;

    fn add(self, rhs: u64) -> Self::Output {
        StateVersion(self.0.add(rhs))
    }
}

impl Sub<StateVersion> for StateVersion {
    type Output = u64;

    fn sub(self, rhs: StateVersion) -> Self::Output {
        self.0.saturating_sub(rhs.0)
    }
}

/// Epoch number of the validator set that signed a ledger header.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, BorshDeserialize, BorshSerialize)]
pub struct Epoch(u64);

impl Epoch {
    /// Create a new `Epoch` wrapping `int`.
    pub const fn new(int: u64) -> Self {
        Self(int)
    }

    /// Get the inner `u64` of this `Epoch`.
    pub const fn int(&self) -> u64 {
        self.0
    }
}

/// An opaque command that has been, or will be, committed into the ledger.
///
/// This crate never interprets the contents of a `Command`. It only hashes them when replaying
/// batches of committed commands against the ledger accumulator.
#[derive(Clone, Debug, PartialEq, Eq, Hash, BorshDeserialize, BorshSerialize)]
pub struct Command(Vec<u8>);

impl Command {
    /// Create a new `Command` wrapping `bytes`.
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Get a reference to the inner bytes of this `Command`.
    pub const fn bytes(&self) -> &Vec<u8> {
        &self.0
    }

    /// Get the SHA256 hash of this `Command`.
    pub fn hash(&self) -> CryptoHash {
        CryptoHash::digest(&self.0)
    }
}
