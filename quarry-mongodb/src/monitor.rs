//! Command logging for debug mode.
//!
//! When a connection is in debug mode the driver reports every command it
//! sends. Each event is rendered as relaxed extended JSON and logged through
//! `tracing` under the `quarry_mongodb::monitor` target.

use bson::{Bson, Document};
use mongodb::event::command::{
    CommandEventHandler, CommandFailedEvent, CommandStartedEvent, CommandSucceededEvent,
};
use tracing::{debug, error};

/// Logs commands, replies and failures at `debug`/`error` level.
#[derive(Debug, Default, Clone, Copy)]
pub struct CommandLogger;

impl CommandLogger {
    /// Create a new command logger.
    pub fn new() -> Self {
        Self
    }
}

/// Render a document as indented JSON.
pub fn render(document: &Document) -> String {
    let value = Bson::Document(document.clone()).into_relaxed_extjson();
    serde_json::to_string_pretty(&value).unwrap_or_else(|_| document.to_string())
}

/// The part of a reply worth logging: the first batch of a cursor reply,
/// otherwise the whole reply.
pub fn reply_payload(reply: &Document) -> String {
    if let Ok(cursor) = reply.get_document("cursor") {
        if let Ok(batch) = cursor.get_array("firstBatch") {
            let value = Bson::Array(batch.clone()).into_relaxed_extjson();
            return serde_json::to_string_pretty(&value).unwrap_or_else(|_| format!("{batch:?}"));
        }
    }
    render(reply)
}

impl CommandEventHandler for CommandLogger {
    fn handle_command_started_event(&self, event: CommandStartedEvent) {
        debug!(
            db = %event.db,
            command_name = %event.command_name,
            request_id = event.request_id,
            command = %render(&event.command),
            "command started"
        );
    }

    fn handle_command_succeeded_event(&self, event: CommandSucceededEvent) {
        debug!(
            command_name = %event.command_name,
            request_id = event.request_id,
            duration_ms = event.duration.as_millis() as u64,
            result = %reply_payload(&event.reply),
            "command succeeded"
        );
    }

    fn handle_command_failed_event(&self, event: CommandFailedEvent) {
        error!(
            command_name = %event.command_name,
            request_id = event.request_id,
            duration_ms = event.duration.as_millis() as u64,
            error = %event.failure,
            "command failed"
        );
    }
}
