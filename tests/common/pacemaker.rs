use std::sync::{Arc, Mutex};

use hotstuff_sync::{
    pacemaker::Pacemaker,
    types::{certificates::HighQC, data_types::ViewNumber},
};

/// A pacemaker that records the view of every highest QC it is told about.
#[derive(Clone, Default)]
pub(crate) struct RecordingPacemaker {
    processed: Arc<Mutex<Vec<ViewNumber>>>,
}

impl RecordingPacemaker {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn processed(&self) -> Vec<ViewNumber> {
        self.processed.lock().unwrap().clone()
    }
}

impl Pacemaker for RecordingPacemaker {
    fn process_qc(&mut self, high_qc: &HighQC) {
        self.processed
            .lock()
            .unwrap()
            .push(high_qc.highest_qc().view());
    }
}
