use std::collections::BTreeMap;

use hotstuff_sync::{
    ledger_sync::{ledger::Ledger, messages::LedgerUpdate},
    types::{
        certificates::LedgerProof,
        data_types::{Command, StateVersion},
    },
};

use super::fixtures::Chain;

/// An in-memory ledger that keeps every committed command and every proof it has committed with.
pub(crate) struct MemLedger {
    commands: Vec<Command>,
    proofs: BTreeMap<StateVersion, LedgerProof>,
    current: LedgerProof,
}

impl MemLedger {
    /// Create an empty ledger at the genesis header of `chain`.
    pub(crate) fn genesis(chain: &Chain) -> MemLedger {
        let current = chain.ledger_proof(0);
        let mut proofs = BTreeMap::new();
        proofs.insert(current.state_version(), current.clone());
        MemLedger {
            commands: Vec::new(),
            proofs,
            current,
        }
    }

    /// Create a ledger that has committed `chain.vertices[1..=committed]`, with a proof at every version.
    pub(crate) fn from_chain(chain: &Chain, committed: usize) -> MemLedger {
        let mut ledger = MemLedger::genesis(chain);
        for j in 1..=committed {
            ledger.commit(&LedgerUpdate {
                commands: chain.commands(j - 1, j),
                tail: chain.ledger_proof(j),
            });
        }
        ledger
    }

    pub(crate) fn commands(&self) -> &Vec<Command> {
        &self.commands
    }
}

impl Ledger for MemLedger {
    fn current_proof(&self) -> LedgerProof {
        self.current.clone()
    }

    fn commands_after(
        &self,
        state_version: StateVersion,
        limit: usize,
    ) -> Option<(Vec<Command>, LedgerProof)> {
        let (end_version, end) = self
            .proofs
            .range(..=StateVersion::new(state_version.int() + limit as u64))
            .next_back()?;
        if *end_version <= state_version {
            return None;
        }
        let commands = self.commands[state_version.int() as usize..end_version.int() as usize].to_vec();
        Some((commands, end.clone()))
    }

    fn commit(&mut self, update: &LedgerUpdate) {
        let tail_version = update.tail.state_version();
        if tail_version.int() != (self.commands.len() + update.commands.len()) as u64 {
            return;
        }
        self.commands.extend(update.commands.iter().cloned());
        self.proofs.insert(tail_version, update.tail.clone());
        self.current = update.tail.clone();
    }
}
