//! Subscriber-side change detection.
//!
//! The gate remembers the last selection it acted on. A repeated selection is
//! ignored; a new one clears what is displayed and yields a [`FetchRequest`]
//! tagged with a fresh [`FetchTicket`]. Only the response carrying the most
//! recently issued ticket may change what is displayed, so a late answer for
//! a superseded selection is dropped without any cancellation support from
//! the record source.

use tracing::{debug, trace};

use crate::error::{reduce_error, SyncError};
use crate::projection::Record;
use crate::resolver::Selection;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FetchTicket(u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub ticket: FetchTicket,
    pub selection: Selection,
}

#[derive(Debug)]
pub struct FetchResponse {
    pub ticket: FetchTicket,
    pub selection: Selection,
    pub result: Result<Record, SyncError>,
}

impl FetchRequest {
    pub fn respond(self, result: Result<Record, SyncError>) -> FetchResponse {
        FetchResponse {
            ticket: self.ticket,
            selection: self.selection,
            result,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseOutcome {
    /// The payload is now displayed.
    Loaded,
    /// The current fetch failed; the message should be surfaced once.
    Failed(String),
    /// The response belongs to a superseded request.
    Discarded,
}

#[derive(Debug, Default)]
pub struct SelectionGate {
    previous: Option<Selection>,
    issued: u64,
    pending: Option<FetchTicket>,
    data: Option<Record>,
    error: Option<Vec<String>>,
}

impl SelectionGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_message(&mut self, incoming: Selection) -> Option<FetchRequest> {
        if self.previous.as_ref() == Some(&incoming) {
            trace!(id = %incoming.id, kind = %incoming.kind, "selection unchanged");
            return None;
        }

        self.issued += 1;
        let ticket = FetchTicket(self.issued);
        self.previous = Some(incoming.clone());
        self.pending = Some(ticket);
        self.data = None;
        self.error = None;

        debug!(id = %incoming.id, kind = %incoming.kind, ticket = ticket.0, "selection changed");
        Some(FetchRequest {
            ticket,
            selection: incoming,
        })
    }

    pub fn on_response(&mut self, response: FetchResponse) -> ResponseOutcome {
        if self.pending != Some(response.ticket)
            || self.previous.as_ref() != Some(&response.selection)
        {
            debug!(
                id = %response.selection.id,
                ticket = response.ticket.0,
                "discarding stale fetch result"
            );
            return ResponseOutcome::Discarded;
        }
        self.pending = None;

        match response.result {
            Ok(record) => {
                self.data = Some(record);
                self.error = None;
                ResponseOutcome::Loaded
            }
            Err(err) => {
                let messages = reduce_error(&err);
                let text = messages.join(", ");
                self.data = None;
                self.error = Some(messages);
                // a failed selection can be retried by picking it again
                self.previous = None;
                ResponseOutcome::Failed(text)
            }
        }
    }

    pub fn previous(&self) -> Option<&Selection> {
        self.previous.as_ref()
    }

    pub fn data(&self) -> Option<&Record> {
        self.data.as_ref()
    }

    pub fn error(&self) -> Option<&[String]> {
        self.error.as_deref()
    }

    pub fn is_loading(&self) -> bool {
        self.pending.is_some()
    }
}
