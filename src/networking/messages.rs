/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Exhaustive enumeration of every message variant sent between replicas.

use borsh::{BorshDeserialize, BorshSerialize};

use crate::{bft_sync::messages::BFTSyncMessage, ledger_sync::messages::LedgerSyncMessage};

/// All message variants sent between replicas.
#[derive(Clone, Debug, BorshSerialize, BorshDeserialize)]
pub enum Message {
    /// See: [`BFTSyncMessage`].
    BFTSyncMessage(BFTSyncMessage),

    /// See: [`LedgerSyncMessage`].
    LedgerSyncMessage(LedgerSyncMessage),
}
