/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Types and traits that are used across multiple sub-protocols or components of this crate.
//!
//! Types specific to a single sub-protocol can be found in the "types" or "messages" submodules of
//! that sub-protocol, e.g., [`crate::bft_sync::types`].

pub mod data_types;

pub mod crypto_primitives;

pub mod validator_set;

pub mod ledger;

pub mod certificates;

pub mod vertex;
