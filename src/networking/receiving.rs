/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Functions for receiving messages from the P2P network.

use std::{
    sync::mpsc::{Receiver, Sender, TryRecvError},
    thread::{self, JoinHandle},
};

use crate::sync_loop::SyncInput;

use super::network::Network;

/// Spawn the poller thread, which polls the [`Network`] for messages and forwards every one of them into
/// the sync loop's input channel.
///
/// Inbound messages share the input channel with locally formed QCs and ledger updates, so that the
/// sync loop handles all of them in a single sequence.
pub(crate) fn start_polling<N: Network + 'static>(
    mut network: N,
    to_sync_loop: Sender<SyncInput>,
    shutdown_signal: Receiver<()>,
) -> JoinHandle<()> {
    thread::spawn(move || loop {
        match shutdown_signal.try_recv() {
            Ok(()) => return,
            Err(TryRecvError::Empty) => (),
            Err(TryRecvError::Disconnected) => {
                panic!("Poller thread disconnected from main thread")
            }
        }

        if let Some((origin, msg)) = network.recv() {
            // The sync loop is shut down before the poller, so sending only fails during shutdown.
            let _ = to_sync_loop.send(SyncInput::Message(origin, msg));
        } else {
            thread::yield_now()
        }
    })
}
