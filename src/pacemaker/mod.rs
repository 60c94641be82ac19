/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Pluggable notification of QC progress to the view-synchronization layer.
//!
//! A replica that has fallen behind cannot advance its view until it has caught up with the QCs that
//! the rest of the network has formed. Whenever [`sync_to_qc`](crate::bft_sync::BFTSync::sync_to_qc)
//! succeeds in installing a new highest QC, the sync engine calls
//! [`process_qc`](Pacemaker::process_qc) so that the pacemaker can move on to the next view.

use crate::types::certificates::HighQC;

pub trait Pacemaker {
    /// Inform the pacemaker that `high_qc` has been installed in the vertex store.
    fn process_qc(&mut self, high_qc: &HighQC);
}

/// A pacemaker that ignores QC progress, for replicas that only follow the chain.
#[derive(Clone, Copy, Default)]
pub struct NoopPacemaker;

impl Pacemaker for NoopPacemaker {
    fn process_qc(&mut self, _: &HighQC) {}
}
