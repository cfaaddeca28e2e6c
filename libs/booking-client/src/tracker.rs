use std::sync::atomic::{AtomicU64, Ordering};

use chrono::NaiveDate;
use tracing::debug;

/// Issued when a slot lookup starts; identifies that lookup among later ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestTicket {
    generation: u64,
    pub date: NaiveDate,
}

/// Keeps only the newest slot lookup. A user clicking through dates fires
/// several lookups; a response whose ticket has been superseded is dropped.
#[derive(Debug, Default)]
pub struct SlotRequestTracker {
    latest: AtomicU64,
}

impl SlotRequestTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issue(&self, date: NaiveDate) -> RequestTicket {
        let generation = self.latest.fetch_add(1, Ordering::SeqCst) + 1;
        RequestTicket { generation, date }
    }

    pub fn is_current(&self, ticket: &RequestTicket) -> bool {
        self.latest.load(Ordering::SeqCst) == ticket.generation
    }

    /// Returns the response if its ticket is still the newest.
    pub fn accept<T>(&self, ticket: &RequestTicket, response: T) -> Option<T> {
        if self.is_current(ticket) {
            Some(response)
        } else {
            debug!("Discarding stale slot response for {}", ticket.date);
            None
        }
    }
}
