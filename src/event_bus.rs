/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The event bus thread, which runs the registered handlers for every event published by the sync loop.

use crate::events::*;
use crate::logging::Logger;
use std::sync::mpsc::Receiver;
use std::sync::mpsc::TryRecvError;
use std::thread;
use std::thread::JoinHandle;

pub(crate) type HandlerPtr<T> = Box<dyn Fn(&T) + Send>;

#[derive(Default)]
pub(crate) struct EventHandlers {
    pub(crate) start_bft_sync_handlers: Vec<HandlerPtr<StartBFTSyncEvent>>,
    pub(crate) synced_to_qc_handlers: Vec<HandlerPtr<SyncedToQCEvent>>,
    pub(crate) send_get_vertices_handlers: Vec<HandlerPtr<SendGetVerticesEvent>>,
    pub(crate) receive_get_vertices_handlers: Vec<HandlerPtr<ReceiveGetVerticesEvent>>,
    pub(crate) vertex_request_timeout_handlers: Vec<HandlerPtr<VertexRequestTimeoutEvent>>,
    pub(crate) rebuild_vertex_store_handlers: Vec<HandlerPtr<RebuildVertexStoreEvent>>,
    pub(crate) start_ledger_sync_handlers: Vec<HandlerPtr<StartLedgerSyncEvent>>,
    pub(crate) start_sync_check_handlers: Vec<HandlerPtr<StartSyncCheckEvent>>,
    pub(crate) send_sync_request_handlers: Vec<HandlerPtr<SendSyncRequestEvent>>,
    pub(crate) receive_sync_response_handlers: Vec<HandlerPtr<ReceiveSyncResponseEvent>>,
    pub(crate) reject_sync_response_handlers: Vec<HandlerPtr<RejectSyncResponseEvent>>,
    pub(crate) commit_ledger_update_handlers: Vec<HandlerPtr<CommitLedgerUpdateEvent>>,
    pub(crate) receive_sync_request_handlers: Vec<HandlerPtr<ReceiveSyncRequestEvent>>,
    pub(crate) send_sync_response_handlers: Vec<HandlerPtr<SendSyncResponseEvent>>,
}

impl EventHandlers {
    /// Add the default logger of every event type in front of the user-defined handlers.
    pub(crate) fn add_loggers(&mut self) {
        self.start_bft_sync_handlers.insert(0, StartBFTSyncEvent::get_logger());
        self.synced_to_qc_handlers.insert(0, SyncedToQCEvent::get_logger());
        self.send_get_vertices_handlers.insert(0, SendGetVerticesEvent::get_logger());
        self.receive_get_vertices_handlers.insert(0, ReceiveGetVerticesEvent::get_logger());
        self.vertex_request_timeout_handlers.insert(0, VertexRequestTimeoutEvent::get_logger());
        self.rebuild_vertex_store_handlers.insert(0, RebuildVertexStoreEvent::get_logger());
        self.start_ledger_sync_handlers.insert(0, StartLedgerSyncEvent::get_logger());
        self.start_sync_check_handlers.insert(0, StartSyncCheckEvent::get_logger());
        self.send_sync_request_handlers.insert(0, SendSyncRequestEvent::get_logger());
        self.receive_sync_response_handlers.insert(0, ReceiveSyncResponseEvent::get_logger());
        self.reject_sync_response_handlers.insert(0, RejectSyncResponseEvent::get_logger());
        self.commit_ledger_update_handlers.insert(0, CommitLedgerUpdateEvent::get_logger());
        self.receive_sync_request_handlers.insert(0, ReceiveSyncRequestEvent::get_logger());
        self.send_sync_response_handlers.insert(0, SendSyncResponseEvent::get_logger());
    }

    /// Check whether no handler is registered for any event type.
    pub(crate) fn is_empty(&self) -> bool {
        self.start_bft_sync_handlers.is_empty()
            && self.synced_to_qc_handlers.is_empty()
            && self.send_get_vertices_handlers.is_empty()
            && self.receive_get_vertices_handlers.is_empty()
            && self.vertex_request_timeout_handlers.is_empty()
            && self.rebuild_vertex_store_handlers.is_empty()
            && self.start_ledger_sync_handlers.is_empty()
            && self.start_sync_check_handlers.is_empty()
            && self.send_sync_request_handlers.is_empty()
            && self.receive_sync_response_handlers.is_empty()
            && self.reject_sync_response_handlers.is_empty()
            && self.commit_ledger_update_handlers.is_empty()
            && self.receive_sync_request_handlers.is_empty()
            && self.send_sync_response_handlers.is_empty()
    }

    pub(crate) fn fire_handlers(&self, event: Event) {
        match event {
            Event::StartBFTSync(start_bft_sync_event) =>
                self.start_bft_sync_handlers.iter().for_each(|handler| handler(&start_bft_sync_event)),

            Event::SyncedToQC(synced_to_qc_event) =>
                self.synced_to_qc_handlers.iter().for_each(|handler| handler(&synced_to_qc_event)),

            Event::SendGetVertices(send_get_vertices_event) =>
                self.send_get_vertices_handlers.iter().for_each(|handler| handler(&send_get_vertices_event)),

            Event::ReceiveGetVertices(receive_get_vertices_event) =>
                self.receive_get_vertices_handlers.iter().for_each(|handler| handler(&receive_get_vertices_event)),

            Event::VertexRequestTimeout(vertex_request_timeout_event) =>
                self.vertex_request_timeout_handlers.iter().for_each(|handler| handler(&vertex_request_timeout_event)),

            Event::RebuildVertexStore(rebuild_vertex_store_event) =>
                self.rebuild_vertex_store_handlers.iter().for_each(|handler| handler(&rebuild_vertex_store_event)),

            Event::StartLedgerSync(start_ledger_sync_event) =>
                self.start_ledger_sync_handlers.iter().for_each(|handler| handler(&start_ledger_sync_event)),

            Event::StartSyncCheck(start_sync_check_event) =>
                self.start_sync_check_handlers.iter().for_each(|handler| handler(&start_sync_check_event)),

            Event::SendSyncRequest(send_sync_request_event) =>
                self.send_sync_request_handlers.iter().for_each(|handler| handler(&send_sync_request_event)),

            Event::ReceiveSyncResponse(receive_sync_response_event) =>
                self.receive_sync_response_handlers.iter().for_each(|handler| handler(&receive_sync_response_event)),

            Event::RejectSyncResponse(reject_sync_response_event) =>
                self.reject_sync_response_handlers.iter().for_each(|handler| handler(&reject_sync_response_event)),

            Event::CommitLedgerUpdate(commit_ledger_update_event) =>
                self.commit_ledger_update_handlers.iter().for_each(|handler| handler(&commit_ledger_update_event)),

            Event::ReceiveSyncRequest(receive_sync_request_event) =>
                self.receive_sync_request_handlers.iter().for_each(|handler| handler(&receive_sync_request_event)),

            Event::SendSyncResponse(send_sync_response_event) =>
                self.send_sync_response_handlers.iter().for_each(|handler| handler(&send_sync_response_event)),
        }
    }
}

pub(crate) fn start_event_bus(
    event_handlers: EventHandlers,
    event_subscriber: Receiver<Event>,
    shutdown_signal: Receiver<()>,
) -> JoinHandle<()> {
    thread::spawn(move || loop {
        match shutdown_signal.try_recv() {
            Ok(()) => return,
            Err(TryRecvError::Empty) => (),
            Err(TryRecvError::Disconnected) => {
                panic!("Event bus thread disconnected from main thread")
            }
        }

        match event_subscriber.try_recv() {
            Ok(event) => event_handlers.fire_handlers(event),
            // The sync loop hung up first: wait for the shutdown signal.
            Err(TryRecvError::Disconnected) | Err(TryRecvError::Empty) => thread::yield_now(),
        }
    })
}
