/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Functions that log out events.
//!
//! The logs defined in this module are printed if the user enabled them via replica's
//! [config](crate::replica::Configuration).
//!
//! This crate logs using the [log](https://docs.rs/log/latest/log/) crate. To get these messages
//! printed onto a terminal or to a file, set up a
//! [logging implementation](https://docs.rs/log/latest/log/#available-logging-implementations).
//!
//! ## Log message format
//!
//! Log messages are CSVs (Comma Separated Values) with at least two values. The first two values are
//! always:
//! 1. The name of the [event](crate::events) in PascalCase (defined in this module as constants).
//! 2. The time the event was emitted (as number of seconds since the Unix Epoch).
//!
//! The rest of the values differ depending on the kind of event. For example, the following snippet
//! is how a [SendGetVertices](crate::events::SendGetVerticesEvent) is printed:
//!
//! ```text
//! SendGetVertices, 1701329264, Id5u7f6, fNGCJyk, 3
//! ```
//!
//! In the snippet:
//! - The third value is the first seven characters of the Base64 encoding of the verifying key of the
//!   peer the request was sent to.
//! - The fourth value is the first seven characters of the Base64 encoding of the id of the highest
//!   requested vertex.
//! - The fifth value is the number of vertices requested.

use crate::events::*;
use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine as _};
use log;
use std::time::SystemTime;

// Names of each event in PascalCase for printing:
pub const START_BFT_SYNC: &str = "StartBFTSync";
pub const SYNCED_TO_QC: &str = "SyncedToQC";
pub const SEND_GET_VERTICES: &str = "SendGetVertices";
pub const RECEIVE_GET_VERTICES: &str = "ReceiveGetVertices";
pub const VERTEX_REQUEST_TIMEOUT: &str = "VertexRequestTimeout";
pub const REBUILD_VERTEX_STORE: &str = "RebuildVertexStore";

pub const START_LEDGER_SYNC: &str = "StartLedgerSync";
pub const START_SYNC_CHECK: &str = "StartSyncCheck";
pub const SEND_SYNC_REQUEST: &str = "SendSyncRequest";
pub const RECEIVE_SYNC_RESPONSE: &str = "ReceiveSyncResponse";
pub const REJECT_SYNC_RESPONSE: &str = "RejectSyncResponse";
pub const COMMIT_LEDGER_UPDATE: &str = "CommitLedgerUpdate";

pub const RECEIVE_SYNC_REQUEST: &str = "ReceiveSyncRequest";
pub const SEND_SYNC_RESPONSE: &str = "SendSyncResponse";

/// Implemented by event types. Used to get a closure that logs the event.
pub(crate) trait Logger {
    /// Returns a pointer to the default logging handler for a given event type.
    fn get_logger() -> Box<dyn Fn(&Self) + Send>;
}

impl Logger for StartBFTSyncEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |start_bft_sync_event: &StartBFTSyncEvent| {
            log::info!(
                "{}, {}, {}, {}, {}, {:?}",
                START_BFT_SYNC,
                secs_since_unix_epoch(start_bft_sync_event.timestamp),
                first_seven_base64_chars(&start_bft_sync_event.target.bytes()),
                start_bft_sync_event.view,
                first_seven_base64_chars(&start_bft_sync_event.author.to_bytes()),
                start_bft_sync_event.stage
            )
        };
        Box::new(logger)
    }
}

impl Logger for SyncedToQCEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |synced_to_qc_event: &SyncedToQCEvent| {
            log::info!(
                "{}, {}, {}, {}",
                SYNCED_TO_QC,
                secs_since_unix_epoch(synced_to_qc_event.timestamp),
                first_seven_base64_chars(&synced_to_qc_event.vertex.bytes()),
                synced_to_qc_event.view
            )
        };
        Box::new(logger)
    }
}

impl Logger for SendGetVerticesEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |send_get_vertices_event: &SendGetVerticesEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                SEND_GET_VERTICES,
                secs_since_unix_epoch(send_get_vertices_event.timestamp),
                first_seven_base64_chars(&send_get_vertices_event.peer.to_bytes()),
                first_seven_base64_chars(&send_get_vertices_event.request.vertex_id.bytes()),
                send_get_vertices_event.request.count
            )
        };
        Box::new(logger)
    }
}

impl Logger for ReceiveGetVerticesEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |receive_get_vertices_event: &ReceiveGetVerticesEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                RECEIVE_GET_VERTICES,
                secs_since_unix_epoch(receive_get_vertices_event.timestamp),
                first_seven_base64_chars(&receive_get_vertices_event.origin.to_bytes()),
                first_seven_base64_chars(&receive_get_vertices_event.vertex.bytes()),
                receive_get_vertices_event.count
            )
        };
        Box::new(logger)
    }
}

impl Logger for VertexRequestTimeoutEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |vertex_request_timeout_event: &VertexRequestTimeoutEvent| {
            log::info!(
                "{}, {}, {}, {}",
                VERTEX_REQUEST_TIMEOUT,
                secs_since_unix_epoch(vertex_request_timeout_event.timestamp),
                first_seven_base64_chars(&vertex_request_timeout_event.request.vertex_id.bytes()),
                vertex_request_timeout_event.request.count
            )
        };
        Box::new(logger)
    }
}

impl Logger for RebuildVertexStoreEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |rebuild_vertex_store_event: &RebuildVertexStoreEvent| {
            log::info!(
                "{}, {}, {}, {}",
                REBUILD_VERTEX_STORE,
                secs_since_unix_epoch(rebuild_vertex_store_event.timestamp),
                first_seven_base64_chars(&rebuild_vertex_store_event.root.bytes()),
                rebuild_vertex_store_event.root_view
            )
        };
        Box::new(logger)
    }
}

impl Logger for StartLedgerSyncEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |start_ledger_sync_event: &StartLedgerSyncEvent| {
            log::info!(
                "{}, {}, {}, {}",
                START_LEDGER_SYNC,
                secs_since_unix_epoch(start_ledger_sync_event.timestamp),
                start_ledger_sync_event.current_version,
                start_ledger_sync_event.target_version
            )
        };
        Box::new(logger)
    }
}

impl Logger for StartSyncCheckEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |start_sync_check_event: &StartSyncCheckEvent| {
            log::info!(
                "{}, {}, {}, {}",
                START_SYNC_CHECK,
                secs_since_unix_epoch(start_sync_check_event.timestamp),
                start_sync_check_event.current_version,
                start_sync_check_event.peers
            )
        };
        Box::new(logger)
    }
}

impl Logger for SendSyncRequestEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |send_sync_request_event: &SendSyncRequestEvent| {
            log::info!(
                "{}, {}, {}, {}",
                SEND_SYNC_REQUEST,
                secs_since_unix_epoch(send_sync_request_event.timestamp),
                first_seven_base64_chars(&send_sync_request_event.peer.to_bytes()),
                send_sync_request_event.current_version
            )
        };
        Box::new(logger)
    }
}

impl Logger for ReceiveSyncResponseEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |receive_sync_response_event: &ReceiveSyncResponseEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                RECEIVE_SYNC_RESPONSE,
                secs_since_unix_epoch(receive_sync_response_event.timestamp),
                first_seven_base64_chars(&receive_sync_response_event.origin.to_bytes()),
                receive_sync_response_event.start_version,
                receive_sync_response_event.end_version
            )
        };
        Box::new(logger)
    }
}

impl Logger for RejectSyncResponseEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |reject_sync_response_event: &RejectSyncResponseEvent| {
            log::info!(
                "{}, {}, {}, {:?}",
                REJECT_SYNC_RESPONSE,
                secs_since_unix_epoch(reject_sync_response_event.timestamp),
                first_seven_base64_chars(&reject_sync_response_event.origin.to_bytes()),
                reject_sync_response_event.reason
            )
        };
        Box::new(logger)
    }
}

impl Logger for CommitLedgerUpdateEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |commit_ledger_update_event: &CommitLedgerUpdateEvent| {
            log::info!(
                "{}, {}, {}, {}",
                COMMIT_LEDGER_UPDATE,
                secs_since_unix_epoch(commit_ledger_update_event.timestamp),
                commit_ledger_update_event.tail_version,
                commit_ledger_update_event.commands
            )
        };
        Box::new(logger)
    }
}

impl Logger for ReceiveSyncRequestEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |receive_sync_request_event: &ReceiveSyncRequestEvent| {
            log::info!(
                "{}, {}, {}, {}",
                RECEIVE_SYNC_REQUEST,
                secs_since_unix_epoch(receive_sync_request_event.timestamp),
                first_seven_base64_chars(&receive_sync_request_event.origin.to_bytes()),
                receive_sync_request_event.current_version
            )
        };
        Box::new(logger)
    }
}

impl Logger for SendSyncResponseEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |send_sync_response_event: &SendSyncResponseEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                SEND_SYNC_RESPONSE,
                secs_since_unix_epoch(send_sync_response_event.timestamp),
                first_seven_base64_chars(&send_sync_response_event.peer.to_bytes()),
                send_sync_response_event.start_version,
                send_sync_response_event.end_version
            )
        };
        Box::new(logger)
    }
}

// Get a more readable representation of a bytesequence by base64-encoding it and taking the first 7 characters.
fn first_seven_base64_chars(bytes: &[u8]) -> String {
    let encoded = STANDARD_NO_PAD.encode(bytes);
    if encoded.len() > 7 {
        encoded[0..7].to_string()
    } else {
        encoded
    }
}

// Events are never timestamped before the Unix Epoch, but a skewed clock prints 0 rather than panicking.
fn secs_since_unix_epoch(timestamp: SystemTime) -> u64 {
    timestamp
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|duration| duration.as_secs())
        .unwrap_or(0)
}
