/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Types that store information about validator sets and the signatures collected from them.

use std::{
    collections::{HashMap, HashSet},
    slice,
};

use super::{
    crypto_primitives::VerifyingKey,
    data_types::{Power, TotalPower},
};

/// Stores the identities of validators and their voting powers.
///
/// ## Ordering of validators
///
/// `ValidatorSet` internally maintains the list of validators in ascending order of their
/// `VerifyingKey`s, and [`validators`](ValidatorSet::validators) walks through them in this order.
///
/// ## Limits to total power
///
/// Users must make sure that the total power of the validator set does not exceed `u128::MAX/2`.
#[derive(Clone, Debug, PartialEq)]
pub struct ValidatorSet {
    // The verifying keys of validators are included here in ascending order.
    validators: Vec<VerifyingKey>,
    powers: HashMap<VerifyingKey, Power>,
}

impl Default for ValidatorSet {
    // Create an empty validator set.
    fn default() -> Self {
        ValidatorSet::new()
    }
}

impl ValidatorSet {
    /// Create an empty validator set.
    pub fn new() -> ValidatorSet {
        Self {
            validators: Vec::new(),
            powers: HashMap::new(),
        }
    }

    /// Put a `validator` with the specified `power` into the validator set, placing them in a position that
    /// preserves the [ordering of validators](Self#ordering-of-validators).
    ///
    /// If `validator` already exists in the validator set, this function updates its power instead.
    pub fn put(&mut self, validator: &VerifyingKey, power: Power) {
        if let Err(insert_pos) = self.search(validator) {
            self.validators.insert(insert_pos, *validator);
        }

        self.powers.insert(*validator, power);
    }

    /// Get the power of the specified `validator` inside the validator set.
    pub fn power(&self, validator: &VerifyingKey) -> Option<&Power> {
        self.powers.get(validator)
    }

    /// Get the sum of the powers of all of the validators inside the validator set.
    pub fn total_power(&self) -> TotalPower {
        let mut total_power = TotalPower::new(0);
        for power in self.powers.values() {
            total_power += *power
        }
        total_power
    }

    /// Check whether the validator set contains `validator`.
    pub fn contains(&self, validator: &VerifyingKey) -> bool {
        self.powers.contains_key(validator)
    }

    /// Get an iterator through validators' verifying keys which walks through them in ascending order.
    pub fn validators(&self) -> slice::Iter<VerifyingKey> {
        self.validators.iter()
    }

    /// Get the number of validators currently in the validator set.
    pub fn len(&self) -> usize {
        self.validators.len()
    }

    /// Check whether the validator set is empty (i.e., `self.len() == 0`).
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Compute the total power that a set of signatures must match or exceed (`>=`) in order to count as
    /// a quorum under the validator set.
    ///
    /// The quorum is `⌊2 * total_power / 3⌋ + 1`. The multiplication saturates, which only matters for
    /// validator sets that break the [limit on total power](Self#limits-to-total-power).
    pub fn quorum(&self) -> TotalPower {
        TotalPower::new((self.total_power().int().saturating_mul(2) / 3) + 1)
    }

    fn search(&self, validator: &VerifyingKey) -> Result<usize, usize> {
        let validator_bytes = validator.to_bytes();
        self.validators
            .binary_search_by(|v| v.to_bytes().cmp(&validator_bytes))
    }
}

/// Progressively accumulates the power of distinct signers from a single [`ValidatorSet`].
///
/// A `ValidationState` is "complete" once the power it has accumulated reaches the validator set's
/// [`quorum`](ValidatorSet::quorum). Signers that are not in the validator set, and signers that have
/// already been added, do not contribute any power.
///
/// `ValidationState` does not check signatures itself. Callers should only
/// [`add_signer`](Self::add_signer) after having verified the signer's signature.
pub struct ValidationState<'a> {
    validator_set: &'a ValidatorSet,
    signers: HashSet<VerifyingKey>,
    power: TotalPower,
}

impl<'a> ValidationState<'a> {
    /// Create an empty `ValidationState` for `validator_set`.
    pub fn new(validator_set: &'a ValidatorSet) -> Self {
        Self {
            validator_set,
            signers: HashSet::new(),
            power: TotalPower::new(0),
        }
    }

    /// Add `signer`'s power to the validation state. Returns whether the signer was accepted, i.e.,
    /// whether it is a member of the validator set that has not been added before.
    pub fn add_signer(&mut self, signer: &VerifyingKey) -> bool {
        match self.validator_set.power(signer) {
            Some(power) if self.signers.insert(*signer) => {
                self.power += *power;
                true
            }
            _ => false,
        }
    }

    /// Get the total power of the signers accepted so far.
    pub fn power(&self) -> TotalPower {
        self.power
    }

    /// Check whether the accepted signers' power has reached a quorum.
    pub fn is_complete(&self) -> bool {
        !self.validator_set.is_empty() && self.power >= self.validator_set.quorum()
    }
}
